use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::models::{Conversation, Message};

use crate::api::ChatApi;
use crate::error::ClientError;
use crate::state::{ClientState, Phase, StubRequest};

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Conversation list refresh, while listing or in a thread.
    pub list_interval: Duration,
    /// Open thread refresh, layered on top of the list refresh.
    pub thread_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            list_interval: Duration::from_secs(15),
            thread_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug)]
enum Command {
    Select(Uuid),
    StartWith(Uuid),
    Leave,
    Send(String),
    Refresh,
}

/// Results of spawned fetches, tagged with what they were issued for.
enum Outcome {
    Conversations {
        stub: Option<Uuid>,
        result: Result<Vec<Conversation>, ClientError>,
    },
    Thread {
        partner_id: Uuid,
        result: Result<Vec<Message>, ClientError>,
    },
    Sent {
        partner_id: Uuid,
        local_id: u64,
        result: Result<Message, ClientError>,
    },
}

/// Caller's side of a running [`Poller`]. Dropping it tears the poller down.
pub struct PollerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ClientState>,
    task: JoinHandle<Result<(), ClientError>>,
}

impl PollerHandle {
    /// Open the thread with `partner_id`.
    pub fn select(&self, partner_id: Uuid) {
        self.command(Command::Select(partner_id));
    }

    /// Show a placeholder conversation for a partner (account or designer
    /// profile id) and open it as soon as the server returns it.
    pub fn start_with(&self, partner_id: Uuid) {
        self.command(Command::StartWith(partner_id));
    }

    /// Close the open thread and go back to the list.
    pub fn leave(&self) {
        self.command(Command::Leave);
    }

    pub fn send(&self, content: impl Into<String>) {
        self.command(Command::Send(content.into()));
    }

    /// Poll now instead of waiting for the next tick.
    pub fn refresh(&self) {
        self.command(Command::Refresh);
    }

    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.clone()
    }

    /// Stop polling. Responses still in flight are discarded.
    pub async fn shutdown(self) -> Result<(), ClientError> {
        drop(self.commands);
        self.task
            .await
            .map_err(|e| ClientError::Unavailable(format!("poller task failed: {}", e)))?
    }

    /// Wait for the poller to stop on its own, which only happens on a terminal error.
    pub async fn join(self) -> Result<(), ClientError> {
        let Self { commands, task, .. } = self;
        let result = task
            .await
            .map_err(|e| ClientError::Unavailable(format!("poller task failed: {}", e)))?;
        drop(commands);
        result
    }

    fn command(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            debug!("Poller already stopped, command dropped");
        }
    }
}

/// Single-task scheduler keeping a [`ClientState`] in sync with the server.
pub struct Poller<A: ChatApi> {
    api: A,
    config: PollConfig,
    state: ClientState,
    state_tx: watch::Sender<ClientState>,
    commands: mpsc::UnboundedReceiver<Command>,
    results_tx: mpsc::UnboundedSender<Outcome>,
    results_rx: mpsc::UnboundedReceiver<Outcome>,
    in_flight: JoinSet<()>,
    thread_timer: Option<Interval>,
    /// Partner from `start_with`, opened once a list fetched for it arrives.
    open_on_arrival: Option<Uuid>,
}

impl<A: ChatApi> Poller<A> {
    pub fn spawn(api: A, config: PollConfig) -> PollerHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientState::default());

        let poller = Poller {
            api,
            config,
            state: ClientState::default(),
            state_tx,
            commands: cmd_rx,
            results_tx,
            results_rx,
            in_flight: JoinSet::new(),
            thread_timer: None,
            open_on_arrival: None,
        };

        PollerHandle {
            commands: cmd_tx,
            state: state_rx,
            task: tokio::spawn(poller.run()),
        }
    }

    async fn run(mut self) -> Result<(), ClientError> {
        info!("Poller started");
        self.state.phase = Phase::Listing;
        self.fetch_conversations();
        self.publish();

        let mut list_timer = timer(self.config.list_interval);

        let result = loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break Ok(()),
                },
                Some(outcome) = self.results_rx.recv() => {
                    if let Err(e) = self.apply(outcome) {
                        break Err(e);
                    }
                }
                _ = list_timer.tick() => {
                    debug!("List poll tick");
                    self.fetch_conversations();
                }
                _ = tick(&mut self.thread_timer) => {
                    if let Some(partner_id) = self.state.phase.partner() {
                        self.fetch_thread(partner_id);
                    }
                }
            }

            while self.in_flight.try_join_next().is_some() {}
            self.publish();
        };

        // Teardown: abort whatever is still in flight so nothing lands late.
        self.in_flight.abort_all();
        self.thread_timer = None;
        self.state.phase = Phase::Idle;
        self.publish();

        match &result {
            Ok(()) => info!("Poller stopped"),
            Err(e) => warn!("Poller stopped: {}", e),
        }
        result
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Select(partner_id) => self.select(partner_id),
            Command::StartWith(partner_id) => {
                self.state.stub = Some(StubRequest { requested: partner_id, resolved: None });
                self.open_on_arrival = Some(partner_id);
                self.fetch_conversations();
            }
            Command::Leave => {
                self.state.phase = Phase::Listing;
                self.thread_timer = None;
                self.state.clear_thread();
            }
            Command::Send(content) => self.send(content),
            Command::Refresh => {
                self.fetch_conversations();
                if let Some(partner_id) = self.state.phase.partner() {
                    self.fetch_thread(partner_id);
                }
            }
        }
    }

    fn select(&mut self, partner_id: Uuid) {
        if self.state.phase == Phase::Active(partner_id) {
            return;
        }
        self.state.phase = Phase::Active(partner_id);
        self.state.clear_thread();
        self.state.error = None;
        self.thread_timer = Some(timer(self.config.thread_interval));
        self.fetch_thread(partner_id);
    }

    fn send(&mut self, content: String) {
        let Some(partner_id) = self.state.phase.partner() else {
            self.state.error = Some("no conversation is open".into());
            return;
        };
        let content = content.trim().to_string();
        if content.is_empty() {
            self.state.error = Some("message content must not be empty".into());
            return;
        }

        self.state.error = None;
        let local_id = self.state.push_pending(partner_id, content.clone());
        let api = self.api.clone();
        let tx = self.results_tx.clone();
        self.in_flight.spawn(async move {
            let result = api.send(partner_id, content).await;
            let _ = tx.send(Outcome::Sent { partner_id, local_id, result });
        });
    }

    fn fetch_conversations(&mut self) {
        let stub = self.state.stub_partner();
        let api = self.api.clone();
        let tx = self.results_tx.clone();
        self.in_flight.spawn(async move {
            let result = api.conversations(stub).await;
            let _ = tx.send(Outcome::Conversations { stub, result });
        });
    }

    fn fetch_thread(&mut self, partner_id: Uuid) {
        let api = self.api.clone();
        let tx = self.results_tx.clone();
        self.in_flight.spawn(async move {
            let result = api.messages(partner_id).await;
            let _ = tx.send(Outcome::Thread { partner_id, result });
        });
    }

    /// Fold a finished fetch into local state. Only `Unauthorized` escapes.
    fn apply(&mut self, outcome: Outcome) -> Result<(), ClientError> {
        match outcome {
            Outcome::Conversations { stub, result } => {
                let Some(conversations) = self.absorb(result)? else {
                    return Ok(());
                };
                let answered = self.state.apply_conversations(conversations);
                // Lists fetched before `start_with` know nothing of the stub.
                if let Some(requested) = self.open_on_arrival.filter(|r| stub == Some(*r)) {
                    self.open_on_arrival = None;
                    self.open_requested(requested, answered);
                }
            }
            Outcome::Thread { partner_id, result } => {
                if self.state.phase != Phase::Active(partner_id) {
                    debug!("Discarding stale thread response for {}", partner_id);
                    return Ok(());
                }
                if let Some(messages) = self.absorb(result)? {
                    self.state.apply_thread(partner_id, messages);
                }
            }
            Outcome::Sent { partner_id, local_id, result } => match result {
                Ok(message) => {
                    self.state.transient_error = None;
                    self.state.confirm_pending(local_id, &message);
                }
                Err(ClientError::Unauthorized) => return Err(ClientError::Unauthorized),
                Err(e) => {
                    warn!("Send to {} failed: {}", partner_id, e);
                    self.state.fail_pending(local_id);
                    self.state.error = Some(format!("message not sent: {}", e));
                }
            },
        }
        Ok(())
    }

    /// After `start_with`, open the row the server answered the request with:
    /// the real conversation if history exists, otherwise the stub.
    fn open_requested(&mut self, requested: Uuid, answered: Option<Uuid>) {
        match answered {
            Some(partner_id) => self.select(partner_id),
            None => {
                debug!("Stub request {} matched no partner", requested);
                self.state.stub = None;
                self.state.error = Some("conversation partner not found".into());
            }
        }
    }

    /// Split a fetch result into data, a transient indicator, or a surfaced error.
    fn absorb<T>(&mut self, result: Result<T, ClientError>) -> Result<Option<T>, ClientError> {
        match result {
            Ok(value) => {
                self.state.transient_error = None;
                Ok(Some(value))
            }
            Err(ClientError::Unauthorized) => Err(ClientError::Unauthorized),
            Err(e) if e.is_transient() => {
                warn!("Poll failed, retrying next tick: {}", e);
                self.state.transient_error = Some(e.to_string());
                Ok(None)
            }
            Err(e) => {
                self.state.error = Some(e.to_string());
                Ok(None)
            }
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }
}

/// Interval whose first tick is one period from now; the caller fetches immediately itself.
fn timer(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
