use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("realtime session not connected")]
    NotConnected,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("connect aborted by disconnect")]
    Aborted,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport closed")]
    Closed,
}
