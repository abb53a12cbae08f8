//! Skill registry: registration, availability and execution

use autopilot_tools::{ToolError, ToolRegistry};
use autopilot_types::AppSnapshot;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SkillError};
use crate::report::{ExecutionReport, StepOutcome};
use crate::skill::{render, FailurePolicy, Skill};

/// Registry of skills composed from the tools of a [`ToolRegistry`]
pub struct SkillRegistry {
    tools: Arc<ToolRegistry>,
    skills: HashMap<String, Skill>,
}

impl SkillRegistry {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            skills: HashMap::new(),
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Validate and add a skill. Nothing is added on failure.
    ///
    /// # Errors
    /// [`SkillError::DuplicateIdentifier`] if the id is taken,
    /// [`SkillError::UnknownToolReference`] if a step names a missing tool,
    /// [`SkillError::InvalidDefinition`] for malformed definitions
    pub fn register(&mut self, skill: Skill) -> Result<()> {
        if self.skills.contains_key(&skill.id) {
            return Err(SkillError::DuplicateIdentifier(skill.id));
        }

        skill.validate()?;

        if let Some((step, tool)) = skill
            .steps
            .iter()
            .enumerate()
            .find(|(_, s)| !self.tools.contains(&s.tool))
        {
            return Err(SkillError::UnknownToolReference {
                skill: skill.id.clone(),
                step,
                tool: tool.tool.clone(),
            });
        }

        debug!(
            skill = %skill.id,
            steps = skill.steps.len(),
            "Registered skill (requires {:?})",
            skill.required_apps
        );
        self.skills.insert(skill.id.clone(), skill);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Skill> {
        self.skills.get(id)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.skills.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Whether `id` is registered and all its required apps are in `snapshot`
    pub fn is_available(&self, id: &str, snapshot: &AppSnapshot) -> bool {
        self.skills
            .get(id)
            .is_some_and(|skill| snapshot.contains_all(&skill.required_apps))
    }

    /// Skills whose required apps are all in `snapshot`, sorted by id
    pub fn list_available(&self, snapshot: &AppSnapshot) -> Vec<&Skill> {
        let mut available: Vec<&Skill> = self
            .skills
            .values()
            .filter(|skill| snapshot.contains_all(&skill.required_apps))
            .collect();
        available.sort_by(|a, b| a.id.cmp(&b.id));
        available
    }

    /// Summary lines of the skills available in `snapshot`
    pub fn available_summary(&self, snapshot: &AppSnapshot) -> String {
        let available = self.list_available(snapshot);
        if available.is_empty() {
            return "No skills available".to_string();
        }
        available
            .iter()
            .map(|skill| skill.to_summary())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run a skill's steps in order against `snapshot`.
    ///
    /// `cancel` is checked before each step; a step in progress always runs
    /// to completion.
    ///
    /// # Errors
    /// [`SkillError::UnknownSkill`], [`SkillError::SkillUnavailable`] and
    /// [`SkillError::InvalidArguments`] before any step runs;
    /// [`SkillError::PartialFailure`] when an abort-policy step fails;
    /// [`SkillError::Cancelled`] when cancelled between steps
    pub async fn execute(
        &self,
        id: &str,
        args: Value,
        snapshot: &AppSnapshot,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport> {
        let skill = self
            .skills
            .get(id)
            .ok_or_else(|| SkillError::UnknownSkill(id.to_string()))?;

        let missing = snapshot.missing(&skill.required_apps);
        if !missing.is_empty() {
            return Err(SkillError::SkillUnavailable {
                skill: id.to_string(),
                missing,
            });
        }

        let args = skill.parameters.validate(args).map_err(|e| match e {
            ToolError::InvalidArguments { details } => SkillError::InvalidArguments { details },
            other => SkillError::InvalidArguments {
                details: vec![other.to_string()],
            },
        })?;

        info!(skill = %id, steps = skill.steps.len(), "Executing skill");
        let mut report = ExecutionReport::new(id);

        for (index, step) in skill.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(skill = %id, step = index, "Skill cancelled");
                return Err(SkillError::Cancelled { report });
            }

            let step_args = render(&step.args, &args);
            debug!(skill = %id, step = index, tool = %step.tool, "Running step");

            match self.tools.dispatch(&step.tool, step_args).await {
                Ok(output) => report.record(index, &step.tool, StepOutcome::Succeeded { output }),
                Err(cause) => match step.on_failure {
                    FailurePolicy::Abort => {
                        warn!(
                            skill = %id,
                            step = index,
                            tool = %step.tool,
                            "Step failed, aborting: {}",
                            cause
                        );
                        return Err(SkillError::PartialFailure {
                            step_index: index,
                            cause,
                            report,
                        });
                    }
                    FailurePolicy::Continue => {
                        warn!(
                            skill = %id,
                            step = index,
                            tool = %step.tool,
                            "Step failed, continuing: {}",
                            cause
                        );
                        report.record(index, &step.tool, StepOutcome::Failed { error: cause });
                    }
                },
            }
        }

        info!(
            skill = %id,
            failed = report.failures().count(),
            "Skill finished"
        );
        Ok(report)
    }
}
