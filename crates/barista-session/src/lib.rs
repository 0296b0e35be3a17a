//! Realtime session management for the Barista voice ordering assistant.
//!
//! Connects to the realtime service through a [`Connector`], feeds every
//! inbound event to a per-connection
//! [`EventReconciler`](barista_transcript::EventReconciler), drains streamed
//! deltas on a fixed cadence, and resubmits rate-limited requests. User
//! intents (typed text, push-to-talk, mute, interrupt) go out through the
//! connection's [`Transport`].
//!
//! [`ChannelConnector`] is an in-memory connector used for replays and tests.

pub mod channel;
pub mod config;
pub mod error;
pub mod retry;
pub mod session;
pub mod transport;

pub use channel::{ChannelConnector, ChannelHandle, ChannelTransport};
pub use config::SessionConfig;
pub use error::SessionError;
pub use retry::{RetryController, RetryDecision};
pub use session::{NoopObserver, SessionBuilder, SessionManager, SessionObserver};
pub use transport::{ConnectRequest, Connection, Connector, Transport};
