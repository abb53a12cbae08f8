use autopilot_tools::ToolError;
use serde_json::Value;

/// What happened to one step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Succeeded { output: Value },
    Failed { error: ToolError },
}

/// One executed step, in execution order
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub index: usize,
    pub tool: String,
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, StepOutcome::Succeeded { .. })
    }
}

/// Ordered account of a skill run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub skill: String,
    pub steps: Vec<StepRecord>,
}

impl ExecutionReport {
    pub fn new(skill: impl Into<String>) -> Self {
        Self {
            skill: skill.into(),
            steps: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, index: usize, tool: &str, outcome: StepOutcome) {
        self.steps.push(StepRecord {
            index,
            tool: tool.to_string(),
            outcome,
        });
    }

    /// Steps that failed under a continue policy
    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| !s.succeeded())
    }

    /// Whether every step succeeded
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(StepRecord::succeeded)
    }
}
