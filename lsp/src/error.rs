//! Error types for the synchronization engine.
//!
//! Both enums are `Clone` because a failed open handshake is memoized in a
//! shared future and handed to every waiter.

use url::Url;

/// Failure reported by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("language server is not running")]
    NotRunning,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request '{method}' failed ({code}): {message}")]
    Request {
        method: String,
        code: i64,
        message: String,
    },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("document {0} is closed")]
    Closed(Url),
    #[error("malformed diagnostic report: {0}")]
    MalformedReport(String),
}
