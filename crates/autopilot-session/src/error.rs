//! Error types for privileged session operations

use thiserror::Error;

/// Failures of the provider transport itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The binder call could not be completed; worth retrying
    #[error("binder call failed: {0}")]
    CallFailed(String),

    /// The provider did not answer in time; worth retrying
    #[error("provider call timed out")]
    Timeout,

    /// The provider process is gone or was never reachable
    #[error("provider is dead: {0}")]
    Dead(String),

    /// The provider refused the request as malformed; never retried
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether repeating the same call may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::CallFailed(_) | TransportError::Timeout)
    }
}

/// Session gateway errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The privileged service is not running or was lost
    #[error("privileged provider unavailable")]
    ProviderUnavailable,

    /// The session exists but privileged calls are not permitted
    #[error("session is not authorized for privileged calls")]
    NotAuthorized,

    /// Transport failure while talking to a live provider
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, SessionError>;
