use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use parley_types::models::{Account, Message, NewMessage};

use crate::store::{AccountDirectory, AccountStore, Credentials, MessageStore, NewAccount};

/// Volatile store for development and tests. Same contract as [`crate::Database`].
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Kept in insertion order, so ids ascend along the vector.
    messages: Vec<Message>,
    next_id: i64,
    accounts: HashMap<Uuid, StoredAccount>,
    /// designer profile id -> account id
    designer_profiles: HashMap<Uuid, Uuid>,
}

struct StoredAccount {
    account: Account,
    username: String,
    password_hash: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Using in-memory message store");
        Self {
            inner: RwLock::new(Inner { next_id: 1, ..Default::default() }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|e| anyhow!("Store lock poisoned: {}", e))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|e| anyhow!("Store lock poisoned: {}", e))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(a: &Message, b: &Message) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

impl MessageStore for MemoryStore {
    fn create_message(&self, new: NewMessage) -> Result<Message> {
        if new.sender_id == new.receiver_id {
            bail!("sender and receiver must differ");
        }

        let mut inner = self.write()?;
        let now = Utc::now();
        let message = Message {
            id: inner.next_id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content: new.content,
            read: false,
            created_at: now,
            updated_at: now,
        };
        inner.next_id += 1;
        inner.messages.push(message.clone());
        Ok(message)
    }

    fn get_message(&self, id: i64) -> Result<Option<Message>> {
        Ok(self.read()?.messages.iter().find(|m| m.id == id).cloned())
    }

    fn conversation_between(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        let inner = self.read()?;
        let mut out: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect();
        out.sort_by(|x, y| newest_first(y, x));
        Ok(out)
    }

    fn messages_involving(&self, user_id: Uuid) -> Result<Vec<Message>> {
        let inner = self.read()?;
        let mut out: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.sender_id == user_id || m.receiver_id == user_id)
            .cloned()
            .collect();
        out.sort_by(newest_first);
        Ok(out)
    }

    fn count_unread(&self, user_id: Uuid, partner_id: Option<Uuid>) -> Result<u64> {
        let inner = self.read()?;
        let count = inner
            .messages
            .iter()
            .filter(|m| m.receiver_id == user_id && !m.read)
            .filter(|m| partner_id.is_none_or(|p| m.sender_id == p))
            .count();
        Ok(count as u64)
    }

    fn mark_message_read(&self, id: i64) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                if !m.read {
                    m.read = true;
                    m.updated_at = Utc::now();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn mark_conversation_read(&self, user_id: Uuid, partner_id: Uuid) -> Result<usize> {
        let mut inner = self.write()?;
        let now = Utc::now();
        let mut changed = 0;
        for m in inner
            .messages
            .iter_mut()
            .filter(|m| m.sender_id == partner_id && m.receiver_id == user_id && !m.read)
        {
            m.read = true;
            m.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }

    fn delete_message(&self, id: i64) -> Result<bool> {
        let mut inner = self.write()?;
        let before = inner.messages.len();
        inner.messages.retain(|m| m.id != id);
        Ok(inner.messages.len() < before)
    }
}

impl AccountDirectory for MemoryStore {
    fn get_user(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(&id).map(|s| s.account.clone()))
    }

    fn get_designer_profile(&self, profile_id: Uuid) -> Result<Option<Account>> {
        let inner = self.read()?;
        Ok(inner
            .designer_profiles
            .get(&profile_id)
            .and_then(|user_id| inner.accounts.get(user_id))
            .map(|s| s.account.clone()))
    }
}

impl AccountStore for MemoryStore {
    fn create_account(&self, new: NewAccount) -> Result<bool> {
        let mut inner = self.write()?;
        if inner.accounts.values().any(|s| s.username == new.username) {
            return Ok(false);
        }
        if inner.accounts.contains_key(&new.id) {
            bail!("account {} already exists", new.id);
        }
        inner.accounts.insert(
            new.id,
            StoredAccount {
                account: Account {
                    id: new.id,
                    display_name: new.display_name,
                    avatar: new.avatar,
                    role: new.role,
                },
                username: new.username,
                password_hash: new.password_hash,
            },
        );
        Ok(true)
    }

    fn get_credentials(&self, username: &str) -> Result<Option<Credentials>> {
        Ok(self
            .read()?
            .accounts
            .values()
            .find(|s| s.username == username)
            .map(|s| Credentials {
                user_id: s.account.id,
                username: s.username.clone(),
                password_hash: s.password_hash.clone(),
            }))
    }

    fn create_designer_profile(&self, profile_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.accounts.contains_key(&user_id) {
            bail!("account {} does not exist", user_id);
        }
        if inner.designer_profiles.values().any(|owner| *owner == user_id) {
            bail!("account {} already has a designer profile", user_id);
        }
        inner.designer_profiles.insert(profile_id, user_id);
        Ok(())
    }
}
