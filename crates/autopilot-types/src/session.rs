use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the session with the privileged provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No live connection to the provider
    #[default]
    Disconnected,
    /// Binding to the provider is in progress
    Connecting,
    /// Bound; `authorized` reports whether privileged calls are allowed
    Connected { authorized: bool },
    /// A permission request is outstanding
    PermissionPending { request_code: u64 },
    /// The user denied the last permission request
    PermissionDenied,
}

impl SessionState {
    /// Whether privileged calls may be issued in this state
    pub fn is_authorized(&self) -> bool {
        matches!(self, SessionState::Connected { authorized: true })
    }

    /// Whether a provider binding exists, regardless of permission
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Connected { .. }
                | SessionState::PermissionPending { .. }
                | SessionState::PermissionDenied
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected { authorized: true } => write!(f, "connected (authorized)"),
            SessionState::Connected { authorized: false } => write!(f, "connected (unauthorized)"),
            SessionState::PermissionPending { request_code } => {
                write!(f, "permission pending (request {})", request_code)
            }
            SessionState::PermissionDenied => write!(f, "permission denied"),
        }
    }
}
