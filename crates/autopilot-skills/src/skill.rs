//! Skill definitions and argument templating
//!
//! Step arguments may reference skill arguments as `{{name}}`. A string that
//! is exactly one placeholder takes the argument's JSON value unchanged;
//! placeholders inside longer strings are replaced by the argument's text.
//!
//! `{{name|uri}}` percent-encodes the text, for values placed inside a URI.

use autopilot_tools::{ToolSchema, ValidatedArgs};
use autopilot_types::PackageId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::warn;

use crate::error::{Result, SkillError};

const MAX_ID_LENGTH: usize = 64;
const MAX_DESCRIPTION_LENGTH: usize = 1024;

const URI_FILTER: &str = "uri";

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*(?:\|\s*([A-Za-z0-9_]+)\s*)?\}\}")
        .expect("placeholder pattern is valid")
});

#[allow(clippy::expect_used)]
static SKILL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("id pattern is valid"));

/// What to do when a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the skill and report a partial failure
    #[default]
    Abort,
    /// Record the failure and run the next step
    Continue,
}

/// One tool invocation inside a skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub tool: String,
    #[serde(default = "empty_object")]
    pub args: Value,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Step {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
            on_failure: FailurePolicy::Abort,
        }
    }

    #[must_use]
    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }
}

/// A named, ordered composition of tool invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub parameters: ToolSchema,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub required_apps: Vec<PackageId>,
}

impl Skill {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            parameters: ToolSchema::new(),
            steps: Vec::new(),
            required_apps: Vec::new(),
        }
    }

    #[must_use]
    pub fn parameters(mut self, parameters: ToolSchema) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn requires(mut self, package: impl Into<PackageId>) -> Self {
        self.required_apps.push(package.into());
        self
    }

    /// One-line summary: `- {id}: {description}`
    pub fn to_summary(&self) -> String {
        format!("- {}: {}", self.id, self.description)
    }

    /// Check everything that does not depend on the tool registry
    pub(crate) fn validate(&self) -> Result<()> {
        validate_id(&self.id)?;

        if self.description.trim().is_empty() {
            return Err(SkillError::InvalidDefinition(format!(
                "skill '{}' has an empty description",
                self.id
            )));
        }
        if self.description.len() > MAX_DESCRIPTION_LENGTH {
            warn!(
                "Skill '{}' description exceeds {} characters (was {})",
                self.id,
                MAX_DESCRIPTION_LENGTH,
                self.description.len()
            );
        }
        if self.steps.is_empty() {
            return Err(SkillError::InvalidDefinition(format!(
                "skill '{}' has no steps",
                self.id
            )));
        }

        for (index, step) in self.steps.iter().enumerate() {
            if !step.args.is_object() {
                return Err(SkillError::InvalidDefinition(format!(
                    "skill '{}' step {} arguments must be a mapping",
                    self.id, index
                )));
            }
            let mut names = BTreeSet::new();
            let mut filters = BTreeSet::new();
            collect_placeholders(&step.args, &mut names, &mut filters);
            if let Some(unknown) = names.iter().find(|n| self.parameters.get(n).is_none()) {
                return Err(SkillError::InvalidDefinition(format!(
                    "skill '{}' step {} uses undeclared argument '{{{{{}}}}}'",
                    self.id, index, unknown
                )));
            }
            if let Some(filter) = filters.iter().find(|f| f.as_str() != URI_FILTER) {
                return Err(SkillError::InvalidDefinition(format!(
                    "skill '{}' step {} uses unknown filter '{}'",
                    self.id, index, filter
                )));
            }
        }
        Ok(())
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(SkillError::InvalidDefinition("skill id cannot be empty".into()));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(SkillError::InvalidDefinition(format!(
            "skill id '{}' exceeds {} characters",
            id, MAX_ID_LENGTH
        )));
    }

    if !SKILL_ID.is_match(id) {
        return Err(SkillError::InvalidDefinition(format!(
            "skill id '{}' must contain only lowercase letters, numbers, '_' and '-'",
            id
        )));
    }
    Ok(())
}

fn collect_placeholders(
    value: &Value,
    names: &mut BTreeSet<String>,
    filters: &mut BTreeSet<String>,
) {
    match value {
        Value::String(s) => {
            for caps in PLACEHOLDER.captures_iter(s) {
                if let Some(name) = caps.get(1) {
                    names.insert(name.as_str().to_string());
                }
                if let Some(filter) = caps.get(2) {
                    filters.insert(filter.as_str().to_string());
                }
            }
        }
        Value::Array(items) => items
            .iter()
            .for_each(|item| collect_placeholders(item, names, filters)),
        Value::Object(map) => map
            .values()
            .for_each(|item| collect_placeholders(item, names, filters)),
        _ => {}
    }
}

/// Substitute skill arguments into a step's argument template.
/// Omitted optional arguments render as `null` or the empty string.
pub(crate) fn render(template: &Value, args: &ValidatedArgs) -> Value {
    match template {
        Value::String(s) => render_string(s, args),
        Value::Array(items) => Value::Array(items.iter().map(|item| render(item, args)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render(v, args)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_string(s: &str, args: &ValidatedArgs) -> Value {
    if let Some(caps) = PLACEHOLDER.captures(s) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        if whole == (0..s.len()) && caps.get(2).is_none() {
            let name = caps.get(1).map_or("", |m| m.as_str());
            return args.get(name).cloned().unwrap_or(Value::Null);
        }
    }

    let rendered = PLACEHOLDER.replace_all(s, |caps: &regex::Captures<'_>| {
        let name = caps.get(1).map_or("", |m| m.as_str());
        let text = match args.get(name) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        match caps.get(2).map(|m| m.as_str()) {
            Some(URI_FILTER) => urlencoding::encode(&text).into_owned(),
            _ => text,
        }
    });
    Value::String(rendered.into_owned())
}
