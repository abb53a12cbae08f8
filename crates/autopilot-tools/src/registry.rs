//! Tool registry: registration and dispatch

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, ToolError};
use crate::tool::{SessionStatus, Tool};

/// Registry of dispatchable tools.
///
/// Populated once at startup, then shared read-only; dispatch never mutates
/// the registry.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    session: Box<dyn SessionStatus>,
}

impl ToolRegistry {
    /// Create an empty registry evaluating preconditions against `session`
    pub fn new(session: impl SessionStatus + 'static) -> Self {
        Self {
            tools: HashMap::new(),
            session: Box::new(session),
        }
    }

    /// Register a tool under its id.
    ///
    /// # Errors
    /// Returns [`ToolError::DuplicateIdentifier`] if the id is taken; the
    /// existing tool stays registered
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let id = tool.id().to_string();
        if self.tools.contains_key(&id) {
            warn!(tool = %id, "Rejecting duplicate tool registration");
            return Err(ToolError::DuplicateIdentifier(id));
        }
        debug!(tool = %id, "Registered tool");
        self.tools.insert(id, tool);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function-style definitions of every tool, sorted by id
    pub fn definitions(&self) -> Vec<Value> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.tools.get(id))
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.id(),
                        "description": tool.description(),
                        "parameters": tool.schema().to_json_schema(),
                    }
                })
            })
            .collect()
    }

    /// Look up, validate, check the precondition, then execute.
    ///
    /// # Errors
    /// In order of evaluation: [`ToolError::UnknownTool`],
    /// [`ToolError::InvalidArguments`], [`ToolError::ProviderUnavailable`] or
    /// [`ToolError::PreconditionNotMet`], then whatever the tool itself reports
    pub async fn dispatch(&self, id: &str, args: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(id)
            .ok_or_else(|| ToolError::UnknownTool(id.to_string()))?;

        let args = tool.schema().validate(args)?;

        let required = tool.precondition();
        let state = self.session.state();
        if !required.is_met(&state) {
            if self.session.provider_lost() {
                debug!(tool = %id, "Provider lost, not dispatching");
                return Err(ToolError::ProviderUnavailable);
            }
            debug!(tool = %id, %state, "Precondition not met");
            return Err(ToolError::PreconditionNotMet {
                tool: id.to_string(),
                required,
            });
        }

        debug!(tool = %id, "Dispatching tool");
        match tool.execute(args).await {
            Ok(output) => Ok(output),
            Err(e) => {
                info!(tool = %id, "Tool failed: {}", e);
                Err(e)
            }
        }
    }
}
