//! Error types for transcript mutation.

/// Errors that can occur while mutating the transcript store.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    /// No item exists with the given id.
    #[error("transcript item not found: {0}")]
    UnknownItem(String),

    /// A text operation targeted a breadcrumb.
    #[error("transcript item is not a message: {0}")]
    NotAMessage(String),

    /// A breadcrumb operation targeted a message.
    #[error("transcript item is not a breadcrumb: {0}")]
    NotABreadcrumb(String),

    /// An inbound event could not be decoded.
    #[error("malformed {kind} event: {source}")]
    MalformedEvent {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
