use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use parley_types::models::{Conversation, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Poller not running.
    #[default]
    Idle,
    /// Conversation list shown, no thread open.
    Listing,
    /// Thread with this partner open.
    Active(Uuid),
}

impl Phase {
    pub fn partner(&self) -> Option<Uuid> {
        match self {
            Self::Active(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStatus {
    Sending,
    /// Accepted by the server under this id; dropped by the next thread fetch.
    Sent(i64),
}

/// Optimistic copy of a message the user just sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMessage {
    pub local_id: u64,
    pub partner_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: LocalStatus,
}

/// A request to show a placeholder row for a partner with no history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubRequest {
    /// Id as given by the caller; may be a designer profile id.
    pub requested: Uuid,
    /// Account id the server resolved the stub to, once seen.
    pub resolved: Option<Uuid>,
}

impl StubRequest {
    fn matches(&self, partner_id: Uuid) -> bool {
        self.requested == partner_id || self.resolved == Some(partner_id)
    }
}

/// Everything a UI needs to render the messaging view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientState {
    pub phase: Phase,
    pub conversations: Vec<Conversation>,
    /// Canonical thread for the active partner, oldest first.
    pub messages: Vec<Message>,
    pub pending: Vec<LocalMessage>,
    pub stub: Option<StubRequest>,
    /// Set while the server is unreachable; cleared by the next successful fetch.
    pub transient_error: Option<String>,
    /// Last failure the user has to see (rejected send, unknown partner).
    pub error: Option<String>,
    next_local_id: u64,
}

impl ClientState {
    /// Replace the conversation list with a fetched one, one row per partner.
    /// Returns the partner the pending stub request resolved to, if this fetch
    /// answered it with either a stub or a real row.
    pub fn apply_conversations(&mut self, fetched: Vec<Conversation>) -> Option<Uuid> {
        let mut seen = HashSet::new();
        self.conversations = fetched
            .into_iter()
            .filter(|c| seen.insert(c.partner_id()))
            .collect();

        let stub = self.stub.as_mut()?;
        let answered = self
            .conversations
            .iter()
            .find(|c| c.requested_as == Some(stub.requested) || c.partner_id() == stub.requested)
            .map(|c| c.partner_id());
        if answered.is_some() {
            stub.resolved = answered;
        }
        let stub = *stub;
        if self.conversations.iter().any(|c| !c.is_stub && stub.matches(c.partner_id())) {
            self.stub = None;
        }
        answered
    }

    /// Replace the open thread with the server's copy. An accepted entry is
    /// superseded only once the fetched thread contains it; a fetch that
    /// started before the send landed leaves it visible.
    pub fn apply_thread(&mut self, partner_id: Uuid, messages: Vec<Message>) {
        self.pending.retain(|m| {
            m.partner_id == partner_id
                && match m.status {
                    LocalStatus::Sending => true,
                    LocalStatus::Sent(id) => !messages.iter().any(|msg| msg.id == id),
                }
        });
        self.messages = messages;

        // The fetch marked this partner's messages read.
        if let Some(conv) = self.conversations.iter_mut().find(|c| c.partner_id() == partner_id) {
            conv.unread_count = 0;
        }
    }

    pub fn push_pending(&mut self, partner_id: Uuid, content: String) -> u64 {
        self.next_local_id += 1;
        let local_id = self.next_local_id;
        self.pending.push(LocalMessage {
            local_id,
            partner_id,
            content,
            created_at: Utc::now(),
            status: LocalStatus::Sending,
        });
        local_id
    }

    pub fn confirm_pending(&mut self, local_id: u64, message: &Message) {
        if let Some(entry) = self.pending.iter_mut().find(|m| m.local_id == local_id) {
            entry.status = LocalStatus::Sent(message.id);
        }
    }

    /// Roll back an optimistic entry after a failed send.
    pub fn fail_pending(&mut self, local_id: u64) -> Option<LocalMessage> {
        let idx = self.pending.iter().position(|m| m.local_id == local_id)?;
        Some(self.pending.remove(idx))
    }

    /// Leave the current thread, dropping its messages and optimistic entries.
    pub fn clear_thread(&mut self) {
        self.messages.clear();
        self.pending.clear();
    }

    /// Requested stub partner to pass to the conversation fetch, while still needed.
    pub fn stub_partner(&self) -> Option<Uuid> {
        self.stub.map(|s| s.requested)
    }

    pub fn total_unread(&self) -> u64 {
        self.conversations.iter().map(|c| c.unread_count).sum()
    }
}
