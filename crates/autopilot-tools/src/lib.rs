//! Autopilot tool registry
//!
//! Tools are atomic, independently dispatchable device actions with a declared
//! argument schema and a precondition on the session state. The registry
//! validates arguments (reporting every violation at once), checks the
//! precondition, and only then invokes the tool.

pub mod builtin;
pub mod error;
pub mod registry;
pub mod schema;
pub mod tool;

pub use builtin::register_builtin_tools;
pub use error::{Result, ToolError};
pub use registry::ToolRegistry;
pub use schema::{ParamSpec, ParamType, ToolSchema, ValidatedArgs};
pub use tool::{Precondition, SessionStatus, Tool};
