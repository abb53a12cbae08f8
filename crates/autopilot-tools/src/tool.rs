use async_trait::async_trait;
use autopilot_session::SessionGateway;
use autopilot_types::SessionState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::Result;
use crate::schema::{ToolSchema, ValidatedArgs};

/// Session requirement checked before a tool runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// Runs in any session state
    Always,
    /// Needs a bound provider; authorization is enforced by the device layer
    SessionConnected,
    /// Needs an authorized session
    SessionAuthorized,
}

impl Precondition {
    pub fn is_met(&self, state: &SessionState) -> bool {
        match self {
            Precondition::Always => true,
            Precondition::SessionConnected => state.is_connected(),
            Precondition::SessionAuthorized => state.is_authorized(),
        }
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::Always => f.write_str("nothing"),
            Precondition::SessionConnected => f.write_str("a connected session"),
            Precondition::SessionAuthorized => f.write_str("an authorized session"),
        }
    }
}

/// Session view that preconditions are checked against
pub trait SessionStatus: Send + Sync {
    fn state(&self) -> SessionState;

    /// Whether the privileged provider died and has not been reconnected
    fn provider_lost(&self) -> bool {
        false
    }
}

impl SessionStatus for watch::Receiver<SessionState> {
    fn state(&self) -> SessionState {
        *self.borrow()
    }
}

impl SessionStatus for SessionGateway {
    fn state(&self) -> SessionState {
        SessionGateway::state(self)
    }

    fn provider_lost(&self) -> bool {
        self.is_provider_lost()
    }
}

impl<T: SessionStatus + ?Sized> SessionStatus for Arc<T> {
    fn state(&self) -> SessionState {
        (**self).state()
    }

    fn provider_lost(&self) -> bool {
        (**self).provider_lost()
    }
}

/// An atomic, independently dispatchable action
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique registry identifier
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    fn schema(&self) -> &ToolSchema;

    fn precondition(&self) -> Precondition {
        Precondition::Always
    }

    /// Run the tool with arguments already validated against [`Tool::schema`]
    async fn execute(&self, args: ValidatedArgs) -> Result<Value>;
}
