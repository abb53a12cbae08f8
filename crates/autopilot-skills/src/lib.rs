//! Autopilot skill registry
//!
//! A skill is a named, ordered composition of tool invocations, gated by the
//! set of applications it needs installed.
//!
//! - Definitions are validated when registered: ids, descriptions, argument
//!   placeholders, and every referenced tool.
//! - Availability is a pure function of the registered skills and the
//!   snapshot passed in.
//! - Execution runs steps strictly in order, applies each step's failure
//!   policy, and always returns a step-by-step report.

pub mod catalog;
pub mod error;
pub mod registry;
pub mod report;
pub mod skill;

pub use catalog::{load_builtin_catalog, parse_catalog, register_builtin_skills};
pub use error::{Result, SkillError};
pub use registry::SkillRegistry;
pub use report::{ExecutionReport, StepOutcome, StepRecord};
pub use skill::{FailurePolicy, Skill, Step};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{ExecutionReport, Skill, SkillError, SkillRegistry};
}
