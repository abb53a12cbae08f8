use async_trait::async_trait;
use autopilot_device::{DeviceController, KeyCode, Point};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::schema::{ParamSpec, ParamType, ToolSchema, ValidatedArgs};
use crate::tool::{Precondition, Tool};

fn point(args: &ValidatedArgs, x: &str, y: &str) -> Result<Point> {
    Ok(Point::new(args.i32(x)?, args.i32(y)?))
}

fn coordinates(schema: ToolSchema, x: &str, y: &str) -> ToolSchema {
    schema
        .param(ParamSpec::required(x, ParamType::Integer, "Horizontal pixel coordinate"))
        .param(ParamSpec::required(y, ParamType::Integer, "Vertical pixel coordinate"))
}

fn done() -> Value {
    json!({"ok": true})
}

/// Tap a screen coordinate
pub struct TapTool {
    controller: Arc<DeviceController>,
    schema: ToolSchema,
}

impl TapTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self {
            controller,
            schema: coordinates(ToolSchema::new(), "x", "y"),
        }
    }
}

#[async_trait]
impl Tool for TapTool {
    fn id(&self) -> &str {
        "tap"
    }

    fn description(&self) -> &str {
        "Tap the screen at (x, y)"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        self.controller.tap(point(&args, "x", "y")?).await?;
        Ok(done())
    }
}

/// Press and hold a screen coordinate
pub struct LongPressTool {
    controller: Arc<DeviceController>,
    schema: ToolSchema,
}

impl LongPressTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self {
            controller,
            schema: coordinates(ToolSchema::new(), "x", "y").param(
                ParamSpec::optional("duration_ms", ParamType::Integer, "Hold time in milliseconds")
                    .with_default(800),
            ),
        }
    }
}

#[async_trait]
impl Tool for LongPressTool {
    fn id(&self) -> &str {
        "long_press"
    }

    fn description(&self) -> &str {
        "Press and hold the screen at (x, y)"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        let duration = Duration::from_millis(args.u64("duration_ms")?);
        self.controller
            .long_press(point(&args, "x", "y")?, duration)
            .await?;
        Ok(done())
    }
}

/// Swipe between two coordinates
pub struct SwipeTool {
    controller: Arc<DeviceController>,
    schema: ToolSchema,
}

impl SwipeTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        let schema = coordinates(ToolSchema::new(), "x1", "y1");
        let schema = coordinates(schema, "x2", "y2").param(
            ParamSpec::optional("duration_ms", ParamType::Integer, "Gesture length in milliseconds")
                .with_default(300),
        );
        Self { controller, schema }
    }
}

#[async_trait]
impl Tool for SwipeTool {
    fn id(&self) -> &str {
        "swipe"
    }

    fn description(&self) -> &str {
        "Swipe from (x1, y1) to (x2, y2)"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        let from = point(&args, "x1", "y1")?;
        let to = point(&args, "x2", "y2")?;
        let duration = Duration::from_millis(args.u64("duration_ms")?);
        self.controller.swipe(from, to, duration).await?;
        Ok(done())
    }
}

/// Type text into the focused field
pub struct InputTextTool {
    controller: Arc<DeviceController>,
    schema: ToolSchema,
}

impl InputTextTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self {
            controller,
            schema: ToolSchema::new().param(ParamSpec::required(
                "text",
                ParamType::String,
                "ASCII text to type",
            )),
        }
    }
}

#[async_trait]
impl Tool for InputTextTool {
    fn id(&self) -> &str {
        "input_text"
    }

    fn description(&self) -> &str {
        "Type text into the focused input field"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        self.controller.input_text(args.str("text")?).await?;
        Ok(done())
    }
}

/// Send a key event by name or number
pub struct KeyEventTool {
    controller: Arc<DeviceController>,
    schema: ToolSchema,
}

impl KeyEventTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self {
            controller,
            schema: ToolSchema::new().param(ParamSpec::required(
                "key",
                ParamType::String,
                "Key name (home, back, enter, ...) or numeric key code",
            )),
        }
    }
}

#[async_trait]
impl Tool for KeyEventTool {
    fn id(&self) -> &str {
        "key_event"
    }

    fn description(&self) -> &str {
        "Send a key event"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, args: ValidatedArgs) -> Result<Value> {
        let key: KeyCode = args.str("key")?.parse()?;
        self.controller.key_event(key).await?;
        Ok(json!({"ok": true, "key_code": key.code()}))
    }
}

/// Fixed-key shortcut shared by `press_back` and `press_home`
struct KeyPress {
    controller: Arc<DeviceController>,
    key: KeyCode,
    schema: ToolSchema,
}

impl KeyPress {
    fn new(controller: Arc<DeviceController>, key: KeyCode) -> Self {
        Self {
            controller,
            key,
            schema: ToolSchema::new(),
        }
    }

    async fn press(&self) -> Result<Value> {
        self.controller.key_event(self.key).await?;
        Ok(done())
    }
}

pub struct PressBackTool(KeyPress);

impl PressBackTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self(KeyPress::new(controller, KeyCode::Back))
    }
}

#[async_trait]
impl Tool for PressBackTool {
    fn id(&self) -> &str {
        "press_back"
    }

    fn description(&self) -> &str {
        "Press the Back key"
    }

    fn schema(&self) -> &ToolSchema {
        &self.0.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, _args: ValidatedArgs) -> Result<Value> {
        self.0.press().await
    }
}

pub struct PressHomeTool(KeyPress);

impl PressHomeTool {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self(KeyPress::new(controller, KeyCode::Home))
    }
}

#[async_trait]
impl Tool for PressHomeTool {
    fn id(&self) -> &str {
        "press_home"
    }

    fn description(&self) -> &str {
        "Press the Home key"
    }

    fn schema(&self) -> &ToolSchema {
        &self.0.schema
    }

    fn precondition(&self) -> Precondition {
        Precondition::SessionConnected
    }

    async fn execute(&self, _args: ValidatedArgs) -> Result<Value> {
        self.0.press().await
    }
}
