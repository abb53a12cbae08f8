use async_trait::async_trait;
use autopilot_scanner::SnapshotHandle;
use serde_json::{json, Value};

use crate::error::Result;
use crate::schema::{ParamSpec, ParamType, ToolSchema, ValidatedArgs};
use crate::tool::Tool;

/// List applications from the latest snapshot
pub struct ListAppsTool {
    snapshot: SnapshotHandle,
    schema: ToolSchema,
}

impl ListAppsTool {
    pub fn new(snapshot: SnapshotHandle) -> Self {
        Self {
            snapshot,
            schema: ToolSchema::new().param(
                ParamSpec::optional("include_system", ParamType::Boolean, "Include system apps")
                    .with_default(false),
            ),
        }
    }
}

#[async_trait]
impl Tool for ListAppsTool {
    fn id(&self) -> &str {
        "list_apps"
    }

    fn description(&self) -> &str {
        "List installed applications"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        let include_system = args.bool("include_system")?;
        let snapshot = self.snapshot.current();

        let apps: Vec<Value> = snapshot
            .packages()
            .into_iter()
            .filter_map(|package| snapshot.get(package))
            .filter(|app| include_system || !app.system)
            .map(|app| json!({"package": app.package, "label": app.label, "system": app.system}))
            .collect();

        Ok(json!({"generation": snapshot.generation(), "apps": apps}))
    }
}

/// Check one package against the latest snapshot
pub struct IsAppInstalledTool {
    snapshot: SnapshotHandle,
    schema: ToolSchema,
}

impl IsAppInstalledTool {
    pub fn new(snapshot: SnapshotHandle) -> Self {
        Self {
            snapshot,
            schema: ToolSchema::new().param(ParamSpec::required(
                "package",
                ParamType::String,
                "Package name to look up",
            )),
        }
    }
}

#[async_trait]
impl Tool for IsAppInstalledTool {
    fn id(&self) -> &str {
        "is_app_installed"
    }

    fn description(&self) -> &str {
        "Check whether an application is installed"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        let package = args.str("package")?;
        let installed = self.snapshot.current().contains(package);
        Ok(json!({"package": package, "installed": installed}))
    }
}
