//! Error types for tool registration and dispatch

use autopilot_device::DeviceError;
use thiserror::Error;

use crate::tool::Precondition;

/// Tool registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// A tool with this id is already registered
    #[error("tool '{0}' is already registered")]
    DuplicateIdentifier(String),

    /// No tool with this id is registered
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// Arguments violate the tool's schema; lists every violation found
    #[error("invalid arguments: {}", details.join("; "))]
    InvalidArguments { details: Vec<String> },

    /// The session state does not satisfy the tool's precondition
    #[error("precondition not met for '{tool}': requires {required}")]
    PreconditionNotMet { tool: String, required: Precondition },

    /// The session is not authorized for privileged calls
    #[error("not authorized for privileged device access")]
    NotAuthorized,

    /// The privileged service is not running or was lost
    #[error("privileged provider unavailable")]
    ProviderUnavailable,

    /// The tool ran but failed
    #[error("execution failed: {cause}")]
    ExecutionFailed { cause: String },
}

impl ToolError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            details: vec![detail.into()],
        }
    }

    pub fn failed(cause: impl Into<String>) -> Self {
        ToolError::ExecutionFailed {
            cause: cause.into(),
        }
    }
}

impl From<DeviceError> for ToolError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::NotAuthorized => ToolError::NotAuthorized,
            DeviceError::ProviderUnavailable => ToolError::ProviderUnavailable,
            DeviceError::InvalidArgument(detail) => ToolError::invalid(detail),
            DeviceError::ExecutionFailed { cause } => ToolError::ExecutionFailed { cause },
        }
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_arguments_lists_all_details() {
        let err = ToolError::InvalidArguments {
            details: vec!["missing 'x'".into(), "missing 'y'".into()],
        };
        assert_eq!(err.to_string(), "invalid arguments: missing 'x'; missing 'y'");
    }

    #[test]
    fn test_device_errors_map_one_to_one() {
        assert_eq!(ToolError::from(DeviceError::NotAuthorized), ToolError::NotAuthorized);
        assert_eq!(
            ToolError::from(DeviceError::ProviderUnavailable),
            ToolError::ProviderUnavailable
        );
        assert_eq!(
            ToolError::from(DeviceError::ExecutionFailed { cause: "boom".into() }),
            ToolError::failed("boom")
        );
    }
}
