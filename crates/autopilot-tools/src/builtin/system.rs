use async_trait::async_trait;
use autopilot_device::DeviceController;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, ToolError};
use crate::schema::{ParamSpec, ParamType, ToolSchema, ValidatedArgs};
use crate::tool::{Precondition, Tool};

/// Longest pause accepted by `wait`
const MAX_WAIT_MS: u64 = 60_000;

/// Run a shell command with the provider's privileges
pub struct ShellTool {
    controller: Arc<DeviceController>,
    schema: ToolSchema,
}

impl ShellTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self {
            controller,
            schema: ToolSchema::new().param(ParamSpec::required(
                "command",
                ParamType::String,
                "Shell command line",
            )),
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn id(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command on the device and return its output"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        let output = self.controller.shell(args.str("command")?).await?;
        Ok(json!({
            "exit_code": output.exit_code,
            "stdout": output.stdout_lossy(),
            "stderr": output.stderr,
        }))
    }
}

/// Capture the screen into the cache directory
pub struct ScreenCaptureTool {
    controller: Arc<DeviceController>,
    schema: ToolSchema,
}

impl ScreenCaptureTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self {
            controller,
            schema: ToolSchema::new(),
        }
    }
}

#[async_trait]
impl Tool for ScreenCaptureTool {
    fn id(&self) -> &str {
        "screen_capture"
    }

    fn description(&self) -> &str {
        "Capture the screen as a PNG file and return its path"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, _args: ValidatedArgs) -> Result<Value> {
        let capture = self.controller.screen_capture().await?;
        Ok(json!({
            "path": capture.path.to_string_lossy(),
            "size_bytes": capture.size_bytes,
            "captured_at": capture.captured_at.to_rfc3339(),
        }))
    }
}

/// Launch an installed application
pub struct OpenAppTool {
    controller: Arc<DeviceController>,
    schema: ToolSchema,
}

impl OpenAppTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self {
            controller,
            schema: ToolSchema::new().param(ParamSpec::required(
                "package",
                ParamType::String,
                "Package name, e.g. com.android.settings",
            )),
        }
    }
}

#[async_trait]
impl Tool for OpenAppTool {
    fn id(&self) -> &str {
        "open_app"
    }

    fn description(&self) -> &str {
        "Launch an application by package name"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        let package = args.str("package")?;
        self.controller.open_app(package).await?;
        Ok(json!({"ok": true, "package": package}))
    }
}

/// Open a URI (deep link or settings action)
pub struct OpenUriTool {
    controller: Arc<DeviceController>,
    schema: ToolSchema,
}

impl OpenUriTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self {
            controller,
            schema: ToolSchema::new().param(ParamSpec::required(
                "uri",
                ParamType::String,
                "URI to view, e.g. bilibili://search?keyword=...",
            )),
        }
    }
}

#[async_trait]
impl Tool for OpenUriTool {
    fn id(&self) -> &str {
        "open_uri"
    }

    fn description(&self) -> &str {
        "Open a URI with the default handler"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        self.controller.open_uri(args.str("uri")?).await?;
        Ok(json!({"ok": true}))
    }
}

/// Report the display resolution
pub struct ScreenSizeTool {
    controller: Arc<DeviceController>,
    schema: ToolSchema,
}

impl ScreenSizeTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self {
            controller,
            schema: ToolSchema::new(),
        }
    }
}

#[async_trait]
impl Tool for ScreenSizeTool {
    fn id(&self) -> &str {
        "screen_size"
    }

    fn description(&self) -> &str {
        "Report the screen resolution in pixels"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, _args: ValidatedArgs) -> Result<Value> {
        let size = self.controller.screen_size().await?;
        Ok(json!({"width": size.width, "height": size.height}))
    }
}

/// Pause between steps, e.g. while an app launches
pub struct WaitTool {
    schema: ToolSchema,
}

impl WaitTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new().param(ParamSpec::required(
                "ms",
                ParamType::Integer,
                "Milliseconds to wait",
            )),
        }
    }
}

impl Default for WaitTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WaitTool {
    fn id(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Wait for the given number of milliseconds"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        let ms = args.u64("ms")?;
        if ms > MAX_WAIT_MS {
            return Err(ToolError::invalid(format!(
                "parameter 'ms' must be at most {}, got {}",
                MAX_WAIT_MS, ms
            )));
        }
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({"waited_ms": ms}))
    }
}
