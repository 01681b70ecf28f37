//! Poll-based client for the parley conversation API.
//!
//! [`poller::Poller`] keeps a [`state::ClientState`] in sync with the server
//! by re-fetching the conversation list on a coarse interval and the open
//! thread on a finer one. Any [`api::ChatApi`] implementation can drive it;
//! [`api::HttpChatApi`] talks to a running server.

pub mod api;
pub mod error;
pub mod poller;
pub mod state;

pub use api::{ChatApi, HttpChatApi};
pub use error::ClientError;
pub use poller::{PollConfig, Poller, PollerHandle};
pub use state::{ClientState, LocalMessage, LocalStatus, Phase};
