//! Error types for device primitives

use autopilot_session::SessionError;
use thiserror::Error;

/// Device controller errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The session exists but is not authorized for privileged calls
    #[error("not authorized for privileged device access")]
    NotAuthorized,

    /// The privileged service is not running or was lost
    #[error("privileged provider unavailable")]
    ProviderUnavailable,

    /// Malformed primitive arguments; rejected before any call
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport or provider-side failure, after retries where applicable
    #[error("execution failed: {cause}")]
    ExecutionFailed { cause: String },
}

impl DeviceError {
    pub(crate) fn failed(cause: impl Into<String>) -> Self {
        DeviceError::ExecutionFailed {
            cause: cause.into(),
        }
    }
}

impl From<SessionError> for DeviceError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::ProviderUnavailable => DeviceError::ProviderUnavailable,
            SessionError::NotAuthorized => DeviceError::NotAuthorized,
            SessionError::Transport(t) => DeviceError::failed(t.to_string()),
        }
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, DeviceError>;
