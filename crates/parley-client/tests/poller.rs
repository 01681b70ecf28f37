use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use parley_client::{ChatApi, ClientError, LocalStatus, Phase, PollConfig, Poller};
use parley_types::models::{Account, Conversation, Message, Role};

/// Scripted in-process server for driving the poller under paused time.
#[derive(Clone)]
struct FakeApi {
    me: Uuid,
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    /// designer profile id -> account id
    profiles: HashMap<Uuid, Uuid>,
    conversations: Vec<Conversation>,
    threads: HashMap<Uuid, Vec<Message>>,
    thread_delay: HashMap<Uuid, Duration>,
    send_delay: Duration,
    conversation_failures: VecDeque<ClientError>,
    send_failure: Option<ClientError>,
    conversation_calls: usize,
    stub_params: Vec<Option<Uuid>>,
    thread_calls: HashMap<Uuid, usize>,
    next_id: i64,
}

impl FakeApi {
    fn new() -> Self {
        Self { me: Uuid::new_v4(), inner: Arc::new(Mutex::new(Inner::default())) }
    }

    fn add_partner(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let account = Account { id, display_name: name.into(), avatar: None, role: Role::User };
        self.inner.lock().unwrap().accounts.insert(id, account);
        id
    }

    fn add_designer(&self, name: &str) -> (Uuid, Uuid) {
        let id = self.add_partner(name);
        let profile = Uuid::new_v4();
        self.with(|inner| {
            inner.accounts.get_mut(&id).unwrap().role = Role::Designer;
            inner.profiles.insert(profile, id);
        });
        (id, profile)
    }

    /// Store a message from `partner` to the poller's user.
    fn deliver(&self, partner: Uuid, content: &str) {
        let mut inner = self.inner.lock().unwrap();
        let msg = inner.message(partner, self.me, content);
        inner.record(self.me, partner, msg);
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }
}

impl Inner {
    fn message(&mut self, sender_id: Uuid, receiver_id: Uuid, content: &str) -> Message {
        self.next_id += 1;
        let now = Utc::now();
        Message {
            id: self.next_id,
            sender_id,
            receiver_id,
            content: content.into(),
            read: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn record(&mut self, me: Uuid, partner: Uuid, msg: Message) {
        self.threads.entry(partner).or_default().push(msg.clone());
        let account = self.accounts.get(&partner).cloned().unwrap_or_else(|| Account::unknown(partner));
        let unread = self.threads[&partner].iter().filter(|m| m.receiver_id == me && !m.read).count() as u64;
        self.conversations.retain(|c| c.partner_id() != partner);
        self.conversations.insert(0, Conversation::from_message(account, &msg, me, unread));
    }
}

impl ChatApi for FakeApi {
    async fn conversations(&self, stub_partner_id: Option<Uuid>) -> Result<Vec<Conversation>, ClientError> {
        let mut inner = self.inner.lock().unwrap();
        inner.conversation_calls += 1;
        inner.stub_params.push(stub_partner_id);
        if let Some(err) = inner.conversation_failures.pop_front() {
            return Err(err);
        }

        let mut list = inner.conversations.clone();
        if let Some(requested) = stub_partner_id {
            let resolved = inner
                .accounts
                .get(&requested)
                .or_else(|| inner.profiles.get(&requested).and_then(|owner| inner.accounts.get(owner)))
                .cloned();
            if let Some(account) = resolved {
                let id = account.id;
                if !list.iter().any(|c| c.partner_id() == id) {
                    list.push(Conversation::stub(account, Utc::now()));
                }
                if let Some(conv) = list.iter_mut().find(|c| c.partner_id() == id) {
                    conv.requested_as = Some(requested);
                }
            }
        }
        Ok(list)
    }

    /// Snapshots the thread when called; a delay only postpones the reply.
    async fn messages(&self, partner_id: Uuid) -> Result<Vec<Message>, ClientError> {
        let (snapshot, delay) = {
            let mut inner = self.inner.lock().unwrap();
            *inner.thread_calls.entry(partner_id).or_default() += 1;
            let me = self.me;
            let thread = inner.threads.entry(partner_id).or_default();
            for m in thread.iter_mut().filter(|m| m.receiver_id == me) {
                m.read = true;
            }
            let snapshot = thread.clone();
            if let Some(conv) = inner.conversations.iter_mut().find(|c| c.partner_id() == partner_id) {
                conv.unread_count = 0;
            }
            (snapshot, inner.thread_delay.get(&partner_id).copied())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn send(&self, partner_id: Uuid, content: String) -> Result<Message, ClientError> {
        let delay = self.with(|inner| inner.send_delay);
        tokio::time::sleep(delay).await;

        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.send_failure.clone() {
            return Err(err);
        }
        if !inner.accounts.contains_key(&partner_id) {
            return Err(ClientError::NotFound("partner not found".into()));
        }
        let msg = inner.message(self.me, partner_id, &content);
        inner.record(self.me, partner_id, msg.clone());
        Ok(msg)
    }

    async fn unread_count(&self, partner_id: Option<Uuid>) -> Result<u64, ClientError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .conversations
            .iter()
            .filter(|c| partner_id.is_none_or(|p| c.partner_id() == p))
            .map(|c| c.unread_count)
            .sum())
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_list_polls_on_interval_and_dedupes() {
    let api = FakeApi::new();
    let bob = api.add_partner("bob");
    api.deliver(bob, "hey");

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;

    let state = handle.state();
    assert_eq!(state.phase, Phase::Listing);
    assert_eq!(state.conversations.len(), 1);
    assert_eq!(state.total_unread(), 1);
    assert_eq!(api.with(|i| i.conversation_calls), 1);

    // A second row for the same partner collapses into the first.
    api.deliver(bob, "still there?");
    api.with(|i| {
        let mut stale = i.conversations[0].clone();
        stale.last_message.content = "stale".into();
        i.conversations.push(stale);
    });

    tokio::time::sleep(Duration::from_secs(15)).await;
    let state = handle.state();
    assert_eq!(api.with(|i| i.conversation_calls), 2);
    assert_eq!(state.conversations.len(), 1);
    assert_eq!(state.conversations[0].last_message.content, "still there?");
    assert_eq!(state.total_unread(), 2);

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(api.with(|i| i.conversation_calls), 3);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_selected_thread_polls_until_left() {
    let api = FakeApi::new();
    let bob = api.add_partner("bob");
    api.deliver(bob, "ping");

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;

    handle.select(bob);
    settle().await;
    let state = handle.state();
    assert_eq!(state.phase, Phase::Active(bob));
    assert_eq!(state.messages.len(), 1);
    assert!(state.messages[0].read);
    assert_eq!(state.conversations[0].unread_count, 0);
    assert_eq!(api.with(|i| i.thread_calls[&bob]), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(api.with(|i| i.thread_calls[&bob]), 2);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(api.with(|i| i.thread_calls[&bob]), 3);

    handle.leave();
    settle().await;
    assert_eq!(handle.state().phase, Phase::Listing);
    assert!(handle.state().messages.is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.with(|i| i.thread_calls[&bob]), 3);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stale_thread_response_is_discarded() {
    let api = FakeApi::new();
    let slow = api.add_partner("slow");
    let fast = api.add_partner("fast");
    api.deliver(slow, "from slow");
    api.deliver(fast, "from fast");
    api.with(|i| i.thread_delay.insert(slow, Duration::from_secs(5)));

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;

    handle.select(slow);
    settle().await;
    handle.select(fast);
    settle().await;
    assert_eq!(handle.state().messages[0].content, "from fast");

    // The slow response lands well after the switch.
    tokio::time::sleep(Duration::from_secs(6)).await;
    let state = handle.state();
    assert_eq!(state.phase, Phase::Active(fast));
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].content, "from fast");
    assert_eq!(api.with(|i| i.thread_calls[&slow]), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_optimistic_send_superseded_by_thread_poll() {
    let api = FakeApi::new();
    let bob = api.add_partner("bob");
    api.deliver(bob, "hi");
    api.with(|i| i.send_delay = Duration::from_secs(1));

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;
    handle.select(bob);
    settle().await;

    handle.send("  hello back  ");
    settle().await;
    let state = handle.state();
    assert_eq!(state.pending.len(), 1);
    assert_eq!(state.pending[0].content, "hello back");
    assert_eq!(state.pending[0].status, LocalStatus::Sending);
    assert_eq!(state.messages.len(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let state = handle.state();
    assert!(matches!(state.pending[0].status, LocalStatus::Sent(_)));
    assert!(state.error.is_none());

    // Next thread tick brings the canonical copy and drops the local one.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let state = handle.state();
    assert!(state.pending.is_empty());
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].content, "hello back");

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_send_rolls_back_and_surfaces_error() {
    let api = FakeApi::new();
    let bob = api.add_partner("bob");
    api.with(|i| i.send_failure = Some(ClientError::InvalidArgument("content too long".into())));

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;
    handle.select(bob);
    settle().await;

    handle.send("doomed");
    settle().await;
    let state = handle.state();
    assert!(state.pending.is_empty());
    assert!(state.messages.is_empty());
    assert!(state.error.as_deref().unwrap().contains("message not sent"));

    // Sending without an open thread never reaches the server.
    handle.leave();
    handle.send("nowhere");
    settle().await;
    assert_eq!(handle.state().error.as_deref(), Some("no conversation is open"));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_clears_on_next_success() {
    let api = FakeApi::new();
    api.with(|i| i.conversation_failures.push_back(ClientError::Unavailable("connection refused".into())));

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;
    let state = handle.state();
    assert_eq!(state.phase, Phase::Listing);
    assert!(state.transient_error.is_some());
    assert!(state.error.is_none());

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(handle.state().transient_error.is_none());

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_stops_the_poller() {
    let api = FakeApi::new();
    api.with(|i| i.conversation_failures.push_back(ClientError::Unauthorized));

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    let mut updates = handle.subscribe();

    assert_eq!(handle.join().await, Err(ClientError::Unauthorized));
    assert_eq!(updates.borrow_and_update().phase, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_in_flight_responses() {
    let api = FakeApi::new();
    let bob = api.add_partner("bob");
    api.deliver(bob, "late");
    api.with(|i| i.thread_delay.insert(bob, Duration::from_secs(5)));

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;
    handle.select(bob);
    settle().await;

    let updates = handle.subscribe();
    handle.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    let state = updates.borrow().clone();
    assert_eq!(state.phase, Phase::Idle);
    assert!(state.messages.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_with_opens_stub_until_history_exists() {
    let api = FakeApi::new();
    let bob = api.add_partner("bob");

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;
    assert!(handle.state().conversations.is_empty());

    handle.start_with(bob);
    settle().await;
    let state = handle.state();
    assert_eq!(state.phase, Phase::Active(bob));
    assert_eq!(state.conversations.len(), 1);
    assert!(state.conversations[0].is_stub);
    assert_eq!(state.conversations[0].unread_count, 0);
    assert_eq!(state.stub_partner(), Some(bob));

    handle.send("first message");
    settle().await;

    // The next list poll returns real history and the stub request goes away.
    tokio::time::sleep(Duration::from_secs(15)).await;
    let state = handle.state();
    assert_eq!(state.conversations.len(), 1);
    assert!(!state.conversations[0].is_stub);
    assert_eq!(state.conversations[0].last_message.content, "first message");
    assert!(state.stub.is_none());

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(api.with(|i| i.stub_params.last().copied()), Some(None));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_with_unknown_partner_reports_error() {
    let api = FakeApi::new();

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;
    handle.start_with(Uuid::new_v4());
    settle().await;

    let state = handle.state();
    assert_eq!(state.phase, Phase::Listing);
    assert_eq!(state.error.as_deref(), Some("conversation partner not found"));
    assert!(state.stub.is_none());

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(api.with(|i| i.stub_params.last().copied()), Some(None));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_with_designer_profile_opens_existing_thread() {
    let api = FakeApi::new();
    let (dora, profile) = api.add_designer("dora");
    api.deliver(dora, "thanks for reaching out");

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;
    handle.start_with(profile);
    settle().await;

    let state = handle.state();
    assert_eq!(state.phase, Phase::Active(dora));
    assert!(state.error.is_none());
    assert!(state.stub.is_none());
    assert_eq!(state.conversations.len(), 1);
    assert!(!state.conversations[0].is_stub);
    assert_eq!(state.messages.len(), 1);

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(api.with(|i| i.stub_params.last().copied()), Some(None));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_with_designer_profile_opens_stub() {
    let api = FakeApi::new();
    let (dora, profile) = api.add_designer("dora");

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;
    handle.start_with(profile);
    settle().await;

    let state = handle.state();
    assert_eq!(state.phase, Phase::Active(dora));
    assert!(state.conversations[0].is_stub);
    assert_eq!(state.stub.unwrap().resolved, Some(dora));

    handle.send("commission?");
    tokio::time::sleep(Duration::from_secs(15)).await;
    let state = handle.state();
    assert!(state.stub.is_none());
    assert!(!state.conversations[0].is_stub);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_thread_fetch_started_before_send_keeps_sent_entry() {
    let api = FakeApi::new();
    let bob = api.add_partner("bob");

    let handle = Poller::spawn(api.clone(), PollConfig::default());
    settle().await;
    handle.select(bob);
    settle().await;

    // The next tick snapshots the empty thread, then replies late.
    api.with(|i| i.thread_delay.insert(bob, Duration::from_millis(500)));
    tokio::time::sleep(Duration::from_secs(3)).await;
    handle.send("hello");
    settle().await;
    let state = handle.state();
    assert_eq!(state.pending.len(), 1);
    assert!(matches!(state.pending[0].status, LocalStatus::Sent(_)));

    tokio::time::sleep(Duration::from_millis(600)).await;
    let state = handle.state();
    assert!(state.messages.is_empty());
    assert_eq!(state.pending.len(), 1, "sent message stays visible");

    // A fetch that includes it replaces the local copy.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let state = handle.state();
    assert!(state.pending.is_empty());
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].content, "hello");

    handle.shutdown().await.unwrap();
}
