//! Provider protocol for the external privileged service

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identity reported by the provider when bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider protocol version
    pub version: u32,
    /// Uid the provider executes commands as (0 = root, 2000 = shell)
    pub uid: u32,
}

/// A command line executed with the provider's privileges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommand {
    argv: Vec<String>,
}

impl ShellCommand {
    /// Start a command with the given program
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
        }
    }

    /// Run a script through `sh -c`
    pub fn sh(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program name
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Full argument vector including the program
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.argv.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, "'{}'", arg.replace('\'', r"'\''"))?;
            } else {
                f.write_str(arg)?;
            }
        }
        Ok(())
    }
}

/// A privileged call, stamped with the gateway's correlation id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    /// Correlation id, unique for the gateway's lifetime
    pub id: u64,
    /// Command to execute
    pub command: ShellCommand,
}

/// Result of a privileged command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit status
    pub exit_code: i32,
    /// Raw standard output (may be binary, e.g. `screencap -p`)
    pub stdout: Vec<u8>,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit status and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Standard output decoded as UTF-8 (lossy)
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Notifications pushed by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Outcome of a permission request
    PermissionResult {
        /// Correlation id passed to `request_permission`
        request_code: u64,
        /// Whether the user granted the permission
        granted: bool,
    },
    /// The provider binder became available
    BinderReceived,
    /// The provider process died
    BinderDead,
}

/// Sending end handed to the provider for event delivery
pub type EventSender = mpsc::UnboundedSender<ProviderEvent>;

/// Handle identifying one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Binder-style protocol of the external privileged service
#[async_trait]
pub trait PrivilegedProvider: Send + Sync {
    /// Establish or verify the connection to the provider
    async fn bind(&self) -> Result<ProviderInfo, TransportError>;

    /// Whether this client already holds the privileged permission
    async fn check_permission(&self) -> Result<bool, TransportError>;

    /// Submit a permission request; the outcome arrives later as
    /// [`ProviderEvent::PermissionResult`] carrying `request_code`
    async fn request_permission(&self, request_code: u64) -> Result<(), TransportError>;

    /// Execute one privileged command
    async fn call(&self, request: ProviderRequest) -> Result<CommandOutput, TransportError>;

    /// Register an event channel
    fn add_listener(&self, sender: EventSender) -> ListenerId;

    /// Remove a previously registered event channel
    fn remove_listener(&self, id: ListenerId);
}

/// Registered listener that is removed from the provider when dropped
pub struct ListenerRegistration {
    provider: Arc<dyn PrivilegedProvider>,
    id: ListenerId,
}

impl ListenerRegistration {
    /// Register `sender` with `provider` for the lifetime of the returned value
    pub fn register(provider: Arc<dyn PrivilegedProvider>, sender: EventSender) -> Self {
        let id = provider.add_listener(sender);
        Self { provider, id }
    }

    /// Listener handle assigned by the provider
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.provider.remove_listener(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_command_display_quotes_whitespace() {
        let cmd = ShellCommand::new("input").args(["text", "hello world"]);
        assert_eq!(cmd.to_string(), "input text 'hello world'");
        assert_eq!(cmd.program(), "input");
    }

    #[test]
    fn test_sh_wraps_script() {
        let cmd = ShellCommand::sh("pm list packages");
        assert_eq!(cmd.argv(), &["sh", "-c", "pm list packages"]);
    }

    #[test]
    fn test_command_output_helpers() {
        assert!(CommandOutput::ok(b"x".to_vec()).success());
        let failed = CommandOutput::failed(1, "boom");
        assert!(!failed.success());
        assert_eq!(failed.stderr, "boom");
    }
}
