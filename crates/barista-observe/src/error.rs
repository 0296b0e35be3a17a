//! Error types for the observability layer.

/// Errors that can occur during event log operations.
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    /// JSON serialization of a payload failed.
    #[error("observe serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A typed payload serialized to something other than a JSON object.
    #[error("observe payload is not an object: {0}")]
    NotAnObject(String),
}
