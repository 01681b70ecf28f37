//! Database row types, mapped directly from SQLite rows.
//! Conversion into the shared `parley_types` values happens here so the
//! rest of the workspace never sees text-encoded ids or timestamps.
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use parley_types::models::{Account, Message, Role};

pub struct AccountRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub role: String,
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Account {
            id: parse_uuid(&row.id).with_context(|| format!("account '{}'", row.username))?,
            display_name: row.display_name,
            avatar: row.avatar,
            role: row.role.parse::<Role>().map_err(|e| anyhow!(e))?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let ctx = || format!("message {}", row.id);
        Ok(Message {
            id: row.id,
            sender_id: parse_uuid(&row.sender_id).with_context(ctx)?,
            receiver_id: parse_uuid(&row.receiver_id).with_context(ctx)?,
            read: row.read,
            created_at: parse_timestamp(&row.created_at).with_context(ctx)?,
            updated_at: parse_timestamp(&row.updated_at).with_context(ctx)?,
            content: row.content,
        })
    }
}

pub fn parse_uuid(s: &str) -> Result<Uuid> {
    s.parse::<Uuid>().map_err(|e| anyhow!("corrupt id '{}': {}", s, e))
}

/// Timestamps are written as RFC 3339 with millisecond precision, which
/// sorts lexically. Older rows may carry SQLite's `datetime('now')` format.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .map_err(|e| anyhow!("corrupt timestamp '{}': {}", s, e))
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
