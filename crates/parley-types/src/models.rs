use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder content shown for a conversation that has no messages yet.
pub const STUB_MESSAGE_CONTENT: &str = "Start a conversation";

/// Message id used by the stub placeholder. Real ids start at 1.
pub const STUB_MESSAGE_ID: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Designer,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Designer => "designer",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "designer" => Ok(Self::Designer),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Public identity of an account, as shown next to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub display_name: String,
    pub avatar: Option<String>,
    pub role: Role,
}

impl Account {
    /// Identity used when a partner's account has disappeared but its history remains.
    pub fn unknown(id: Uuid) -> Self {
        Self {
            id,
            display_name: "Unknown user".to_string(),
            avatar: None,
            role: Role::User,
        }
    }
}

/// A single direct message. Only `read` (and `updated_at` with it) ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// The other party of this message, seen from `user_id`.
    pub fn partner_of(&self, user_id: Uuid) -> Uuid {
        if self.sender_id == user_id {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

/// Input to `MessageStore::create_message`; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_from_user: bool,
}

/// Derived per-partner view of a user's message history. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub partner: Account,
    pub last_message: LastMessage,
    pub unread_count: u64,
    /// True while no message between the pair has been persisted.
    #[serde(default)]
    pub is_stub: bool,
    /// The `stubPartnerId` this row answers, which may be a designer profile id
    /// rather than `partner.id`. Set on the stub or on the real row that
    /// suppressed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_as: Option<Uuid>,
}

impl Conversation {
    pub fn from_message(partner: Account, message: &Message, user_id: Uuid, unread_count: u64) -> Self {
        Self {
            partner,
            last_message: LastMessage {
                id: message.id,
                content: message.content.clone(),
                created_at: message.created_at,
                is_from_user: message.sender_id == user_id,
            },
            unread_count,
            is_stub: false,
            requested_as: None,
        }
    }

    pub fn stub(partner: Account, now: DateTime<Utc>) -> Self {
        Self {
            partner,
            last_message: LastMessage {
                id: STUB_MESSAGE_ID,
                content: STUB_MESSAGE_CONTENT.to_string(),
                created_at: now,
                is_from_user: false,
            },
            unread_count: 0,
            is_stub: true,
            requested_as: None,
        }
    }

    pub fn partner_id(&self) -> Uuid {
        self.partner.id
    }
}
