//! Autopilot privileged session gateway
//!
//! Mediates every privileged action through a binder-style session with an
//! externally running privileged service.
//!
//! ## Overview
//!
//! - [`PrivilegedProvider`] is the provider protocol: bind, permission
//!   handshake, privileged command calls and an event listener channel
//! - [`SessionGateway`] owns the session state machine, the correlation
//!   counter and the single-file call lane every privileged call goes through
//! - [`SocketProvider`] talks to the privileged daemon over a Unix socket
//!
//! Permission results are delivered asynchronously through the listener
//! channel; callers poll [`SessionGateway::is_authorized`] or wait on
//! [`SessionGateway::subscribe`].

#![warn(missing_docs)]

pub mod error;
pub mod gateway;
pub mod provider;
#[cfg(unix)]
pub mod socket;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use autopilot_types::SessionState;
pub use error::{Result, SessionError, TransportError};
pub use gateway::{PermissionStatus, PrivilegedSession, SessionGateway};
pub use provider::{
    CommandOutput, ListenerId, ListenerRegistration, PrivilegedProvider, ProviderEvent,
    ProviderInfo, ProviderRequest, ShellCommand,
};
#[cfg(unix)]
pub use socket::SocketProvider;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        PermissionStatus, PrivilegedProvider, SessionError, SessionGateway, ShellCommand,
    };
}
