use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_db::{AccountDirectory, MessageStore};
use parley_types::models::{Account, Conversation, Message, NewMessage, Role};

use crate::error::{ChatError, ChatResult};

/// Longest message body accepted, in characters, after trimming.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Conversation aggregation, unread tracking, read-state commits and sends.
///
/// Holds no state of its own: every call is a read or a single conditional
/// write against the message store, so concurrent requests need no locking.
#[derive(Clone)]
pub struct ChatService {
    messages: Arc<dyn MessageStore>,
    accounts: Arc<dyn AccountDirectory>,
}

impl ChatService {
    pub fn new(messages: Arc<dyn MessageStore>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { messages, accounts }
    }

    /// Resolves the session's account. A token for a vanished account is not a session.
    pub fn authorize(&self, user_id: Uuid) -> ChatResult<Account> {
        self.accounts.get_user(user_id)?.ok_or(ChatError::Unauthorized)
    }

    /// One conversation per partner, most recently active first, with an
    /// optional stub appended for a partner the user has not messaged yet.
    pub fn get_conversations(
        &self,
        user_id: Uuid,
        stub_partner_id: Option<Uuid>,
    ) -> ChatResult<Vec<Conversation>> {
        self.authorize(user_id)?;

        let history = self.messages.messages_involving(user_id)?;
        let latest = latest_per_partner(user_id, &history);
        let seen: HashSet<Uuid> = latest.iter().map(|(partner_id, _)| *partner_id).collect();

        let mut conversations = Vec::with_capacity(latest.len() + 1);
        for (partner_id, message) in latest {
            let partner = match self.accounts.get_user(partner_id)? {
                Some(account) => account,
                None => {
                    warn!("Conversation partner {} has no account", partner_id);
                    Account::unknown(partner_id)
                }
            };
            let unread = self.messages.count_unread(user_id, Some(partner_id))?;
            conversations.push(Conversation::from_message(partner, message, user_id, unread));
        }

        // Real history is checked first; a stub never shadows or duplicates it.
        // Whichever row answers the request is tagged with the requested id.
        if let Some(requested) = stub_partner_id.filter(|id| *id != user_id) {
            let resolved = if seen.contains(&requested) {
                Some(requested)
            } else {
                match self.resolve_partner(requested)? {
                    Some(partner) if partner.id == user_id => None,
                    Some(partner) if seen.contains(&partner.id) => {
                        debug!("Stub {} resolves to {}, already listed", requested, partner.id);
                        Some(partner.id)
                    }
                    Some(partner) => {
                        let id = partner.id;
                        conversations.push(Conversation::stub(partner, Utc::now()));
                        Some(id)
                    }
                    None => {
                        debug!("Stub partner {} not found", requested);
                        None
                    }
                }
            };
            if let Some(id) = resolved {
                if let Some(conv) = conversations.iter_mut().find(|c| c.partner_id() == id) {
                    conv.requested_as = Some(requested);
                }
            }
        }

        Ok(conversations)
    }

    /// Account id first, then designer profile id.
    fn resolve_partner(&self, id: Uuid) -> ChatResult<Option<Account>> {
        if let Some(account) = self.accounts.get_user(id)? {
            return Ok(Some(account));
        }
        Ok(self.accounts.get_designer_profile(id)?)
    }

    pub fn count_unread(&self, user_id: Uuid, partner_id: Option<Uuid>) -> ChatResult<u64> {
        self.authorize(user_id)?;
        Ok(self.messages.count_unread(user_id, partner_id)?)
    }

    pub fn mark_conversation_read(&self, user_id: Uuid, partner_id: Uuid) -> ChatResult<usize> {
        Ok(self.messages.mark_conversation_read(user_id, partner_id)?)
    }

    /// Returns the thread with `partner_id`, oldest first, after marking the
    /// partner's messages as read. A failed mark is logged and retried by the
    /// next fetch; it never hides the messages.
    ///
    /// A partner whose account is gone can still be opened while history with
    /// them exists, matching the "Unknown user" row in the conversation list.
    pub fn open_conversation(&self, user_id: Uuid, partner_id: Uuid) -> ChatResult<Vec<Message>> {
        self.authorize(user_id)?;
        if self.accounts.get_user(partner_id)?.is_none()
            && self.messages.conversation_between(user_id, partner_id)?.is_empty()
        {
            return Err(ChatError::NotFound("user".into()));
        }

        match self.mark_conversation_read(user_id, partner_id) {
            Ok(0) => {}
            Ok(n) => debug!("Marked {} messages from {} read for {}", n, partner_id, user_id),
            Err(e) => warn!("Read-state commit failed for {} <- {}: {}", user_id, partner_id, e),
        }

        Ok(self.messages.conversation_between(user_id, partner_id)?)
    }

    pub fn send_message(&self, sender_id: Uuid, receiver_id: Uuid, content: &str) -> ChatResult<Message> {
        self.authorize(sender_id)?;

        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::InvalidArgument("message content must not be empty".into()));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(ChatError::InvalidArgument(format!(
                "message content exceeds {} characters",
                MAX_CONTENT_CHARS
            )));
        }
        if sender_id == receiver_id {
            return Err(ChatError::InvalidArgument("cannot message yourself".into()));
        }
        if self.accounts.get_user(receiver_id)?.is_none() {
            return Err(ChatError::NotFound("user".into()));
        }

        let message = self.messages.create_message(NewMessage {
            sender_id,
            receiver_id,
            content: content.to_string(),
        })?;

        info!("Message {} sent {} -> {}", message.id, sender_id, receiver_id);
        Ok(message)
    }

    /// Only the receiver may mark a message; anyone else sees NotFound.
    pub fn mark_message_read(&self, user_id: Uuid, message_id: i64) -> ChatResult<()> {
        self.authorize(user_id)?;
        match self.messages.get_message(message_id)? {
            Some(message) if message.receiver_id == user_id => {
                self.messages.mark_message_read(message_id)?;
                Ok(())
            }
            _ => Err(ChatError::NotFound("message".into())),
        }
    }

    /// Administrative removal of a single message.
    pub fn delete_message(&self, user_id: Uuid, message_id: i64) -> ChatResult<()> {
        let account = self.authorize(user_id)?;
        if account.role != Role::Admin {
            return Err(ChatError::Unauthorized);
        }
        if !self.messages.delete_message(message_id)? {
            return Err(ChatError::NotFound("message".into()));
        }
        warn!("Message {} deleted by admin {}", message_id, user_id);
        Ok(())
    }
}

/// Walks a newest-first history and keeps the first message seen per partner.
/// Messages addressed to oneself are ignored.
pub fn latest_per_partner(user_id: Uuid, history: &[Message]) -> Vec<(Uuid, &Message)> {
    let mut seen = HashSet::new();
    history
        .iter()
        .filter_map(|message| {
            let partner_id = message.partner_of(user_id);
            (partner_id != user_id && seen.insert(partner_id)).then_some((partner_id, message))
        })
        .collect()
}

/// Run blocking store work off the async runtime.
pub async fn blocking<F, T>(f: F) -> ChatResult<T>
where
    F: FnOnce() -> ChatResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ChatError::DependencyUnavailable("worker task failed".into())
    })?
}
