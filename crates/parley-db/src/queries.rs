use crate::models::{AccountRow, MessageRow, format_timestamp};
use crate::store::{AccountDirectory, AccountStore, Credentials, MessageStore, NewAccount};
use crate::Database;
use anyhow::{Result, bail};
use chrono::{SubsecRound, Utc};
use rusqlite::{Connection, Row};
use tracing::warn;
use uuid::Uuid;

use parley_types::models::{Account, Message, NewMessage};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, read, created_at, updated_at";
const ACCOUNT_COLUMNS: &str = "u.id, u.username, u.password, u.display_name, u.avatar, u.role";

impl MessageStore for Database {
    fn create_message(&self, new: NewMessage) -> Result<Message> {
        if new.sender_id == new.receiver_id {
            bail!("sender and receiver must differ");
        }

        // Stored with millisecond precision; return exactly what a read would.
        let now = Utc::now().trunc_subsecs(3);
        let ts = format_timestamp(now);
        let id = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, content, read, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                rusqlite::params![new.sender_id.to_string(), new.receiver_id.to_string(), &new.content, &ts],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(Message {
            id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content: new.content,
            read: false,
            created_at: now,
            updated_at: now,
        })
    }

    fn get_message(&self, id: i64) -> Result<Option<Message>> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
            conn.query_row(&sql, [id], map_message_row).optional()
        })?;
        row.map(Message::try_from).transpose()
    }

    fn conversation_between(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        let rows = self.with_conn(|conn| {
            query_messages(
                conn,
                "WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, id ASC",
                rusqlite::params![a.to_string(), b.to_string()],
            )
        })?;
        Ok(convert_rows(rows))
    }

    fn messages_involving(&self, user_id: Uuid) -> Result<Vec<Message>> {
        let rows = self.with_conn(|conn| {
            query_messages(
                conn,
                "WHERE sender_id = ?1 OR receiver_id = ?1
                 ORDER BY created_at DESC, id DESC",
                rusqlite::params![user_id.to_string()],
            )
        })?;
        Ok(convert_rows(rows))
    }

    fn count_unread(&self, user_id: Uuid, partner_id: Option<Uuid>) -> Result<u64> {
        let count: i64 = self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE receiver_id = ?1 AND read = 0 AND (?2 IS NULL OR sender_id = ?2)",
                rusqlite::params![user_id.to_string(), partner_id.map(|p| p.to_string())],
                |row| row.get(0),
            )?)
        })?;
        Ok(count as u64)
    }

    fn mark_message_read(&self, id: i64) -> Result<bool> {
        let now = format_timestamp(Utc::now());
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE messages SET read = 1, updated_at = ?2 WHERE id = ?1 AND read = 0",
                rusqlite::params![id, &now],
            )?;
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    fn mark_conversation_read(&self, user_id: Uuid, partner_id: Uuid) -> Result<usize> {
        let now = format_timestamp(Utc::now());
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read = 1, updated_at = ?3
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND read = 0",
                rusqlite::params![partner_id.to_string(), user_id.to_string(), &now],
            )?;
            Ok(changed)
        })
    }

    fn delete_message(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }
}

impl AccountDirectory for Database {
    fn get_user(&self, id: Uuid) -> Result<Option<Account>> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", ACCOUNT_COLUMNS);
            conn.query_row(&sql, [id.to_string()], map_account_row).optional()
        })?;
        row.map(Account::try_from).transpose()
    }

    fn get_designer_profile(&self, profile_id: Uuid) -> Result<Option<Account>> {
        let row = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM designer_profiles d JOIN users u ON u.id = d.user_id WHERE d.id = ?1",
                ACCOUNT_COLUMNS
            );
            conn.query_row(&sql, [profile_id.to_string()], map_account_row).optional()
        })?;
        row.map(Account::try_from).transpose()
    }
}

impl AccountStore for Database {
    fn create_account(&self, new: NewAccount) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password, display_name, avatar, role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(username) DO NOTHING",
                rusqlite::params![
                    new.id.to_string(),
                    &new.username,
                    &new.password_hash,
                    &new.display_name,
                    &new.avatar,
                    new.role.as_str(),
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    fn get_credentials(&self, username: &str) -> Result<Option<Credentials>> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users u WHERE u.username = ?1", ACCOUNT_COLUMNS);
            conn.query_row(&sql, [username], map_account_row).optional()
        })?;

        match row {
            Some(row) => Ok(Some(Credentials {
                user_id: crate::models::parse_uuid(&row.id)?,
                username: row.username,
                password_hash: row.password,
            })),
            None => Ok(None),
        }
    }

    fn create_designer_profile(&self, profile_id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO designer_profiles (id, user_id) VALUES (?1, ?2)",
                (profile_id.to_string(), user_id.to_string()),
            )?;
            Ok(())
        })
    }
}

fn query_messages(
    conn: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<MessageRow>> {
    let sql = format!("SELECT {} FROM messages {}", MESSAGE_COLUMNS, clause);
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(params, map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Corrupt rows are logged and skipped.
fn convert_rows(rows: Vec<MessageRow>) -> Vec<Message> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            Message::try_from(row)
                .map_err(|e| warn!("Skipping corrupt message {}: {:#}", id, e))
                .ok()
        })
        .collect()
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        read: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn map_account_row(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        display_name: row.get(3)?,
        avatar: row.get(4)?,
        role: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
