use anyhow::Result;
use uuid::Uuid;

use parley_types::models::{Account, Message, NewMessage, Role};

/// Append-only store of direct messages.
///
/// Implementations must make `create_message` atomic: one call yields one
/// row with one id, fully visible to the next read. Ids are strictly
/// increasing so they break ties between messages sharing a timestamp.
pub trait MessageStore: Send + Sync {
    fn create_message(&self, new: NewMessage) -> Result<Message>;

    fn get_message(&self, id: i64) -> Result<Option<Message>>;

    /// Messages exchanged between `a` and `b`, oldest first.
    fn conversation_between(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>>;

    /// Messages sent or received by `user_id`, newest first.
    fn messages_involving(&self, user_id: Uuid) -> Result<Vec<Message>>;

    /// Unread messages addressed to `user_id`, optionally only those from `partner_id`.
    fn count_unread(&self, user_id: Uuid, partner_id: Option<Uuid>) -> Result<u64>;

    /// Returns false if no message has this id. Marking an already-read message is a no-op.
    fn mark_message_read(&self, id: i64) -> Result<bool>;

    /// Marks every unread message from `partner_id` to `user_id` as read.
    /// Returns how many rows changed.
    fn mark_conversation_read(&self, user_id: Uuid, partner_id: Uuid) -> Result<usize>;

    fn delete_message(&self, id: i64) -> Result<bool>;
}

/// Read side of the account directory.
pub trait AccountDirectory: Send + Sync {
    fn get_user(&self, id: Uuid) -> Result<Option<Account>>;

    /// Resolves a designer profile id to the account that owns it.
    fn get_designer_profile(&self, profile_id: Uuid) -> Result<Option<Account>>;
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: Uuid,
    pub username: String,
    pub password_hash: String,
}

pub trait AccountStore: AccountDirectory {
    /// Returns false, creating nothing, if the username is already taken.
    /// The check and the insert are one atomic step.
    fn create_account(&self, new: NewAccount) -> Result<bool>;

    fn get_credentials(&self, username: &str) -> Result<Option<Credentials>>;

    fn create_designer_profile(&self, profile_id: Uuid, user_id: Uuid) -> Result<()>;
}
