//! Error types for skill registration and execution

use autopilot_tools::ToolError;
use autopilot_types::PackageId;
use thiserror::Error;

use crate::report::ExecutionReport;

/// Skill registry errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkillError {
    /// A skill with this id is already registered
    #[error("skill '{0}' is already registered")]
    DuplicateIdentifier(String),

    /// A step names a tool the tool registry does not have
    #[error("skill '{skill}' step {step} references unknown tool '{tool}'")]
    UnknownToolReference {
        skill: String,
        step: usize,
        tool: String,
    },

    /// Malformed id, description or argument template
    #[error("invalid skill definition: {0}")]
    InvalidDefinition(String),

    /// The catalogue document could not be parsed
    #[error("invalid skill catalogue: {0}")]
    Catalog(String),

    #[error("unknown skill '{0}'")]
    UnknownSkill(String),

    /// Required applications are missing from the snapshot
    #[error("skill '{skill}' unavailable, missing apps: {}", missing.join(", "))]
    SkillUnavailable {
        skill: String,
        missing: Vec<PackageId>,
    },

    #[error("invalid arguments: {}", details.join("; "))]
    InvalidArguments { details: Vec<String> },

    /// An abort-policy step failed; `report` holds the steps before it
    #[error("step {step_index} failed: {cause}")]
    PartialFailure {
        step_index: usize,
        cause: ToolError,
        report: ExecutionReport,
    },

    /// Cancelled between steps; `report` holds the steps that ran
    #[error("skill cancelled after {} steps", report.steps.len())]
    Cancelled { report: ExecutionReport },
}

impl SkillError {
    /// The report of an interrupted run, if any
    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            SkillError::PartialFailure { report, .. } | SkillError::Cancelled { report } => {
                Some(report)
            }
            _ => None,
        }
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, SkillError>;
