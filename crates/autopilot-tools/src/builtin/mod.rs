//! Built-in tools over the device controller and the application snapshot

mod apps;
mod gesture;
mod system;

pub use apps::{IsAppInstalledTool, ListAppsTool};
pub use gesture::{
    InputTextTool, KeyEventTool, LongPressTool, PressBackTool, PressHomeTool, SwipeTool, TapTool,
};
pub use system::{
    OpenAppTool, OpenUriTool, ScreenCaptureTool, ScreenSizeTool, ShellTool, WaitTool,
};

use autopilot_device::DeviceController;
use autopilot_scanner::SnapshotHandle;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::registry::ToolRegistry;
use crate::tool::Tool;

/// Register every built-in tool.
///
/// # Errors
/// Returns [`ToolError::DuplicateIdentifier`](crate::ToolError) if any
/// built-in id is already taken
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    controller: Arc<DeviceController>,
    snapshot: SnapshotHandle,
) -> Result<()> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(TapTool::new(Arc::clone(&controller))),
        Arc::new(LongPressTool::new(Arc::clone(&controller))),
        Arc::new(SwipeTool::new(Arc::clone(&controller))),
        Arc::new(InputTextTool::new(Arc::clone(&controller))),
        Arc::new(KeyEventTool::new(Arc::clone(&controller))),
        Arc::new(PressBackTool::new(Arc::clone(&controller))),
        Arc::new(PressHomeTool::new(Arc::clone(&controller))),
        Arc::new(ShellTool::new(Arc::clone(&controller))),
        Arc::new(ScreenCaptureTool::new(Arc::clone(&controller))),
        Arc::new(OpenAppTool::new(Arc::clone(&controller))),
        Arc::new(OpenUriTool::new(Arc::clone(&controller))),
        Arc::new(ScreenSizeTool::new(controller)),
        Arc::new(WaitTool::new()),
        Arc::new(ListAppsTool::new(snapshot.clone())),
        Arc::new(IsAppInstalledTool::new(snapshot)),
    ];

    let count = tools.len();
    for tool in tools {
        registry.register(tool)?;
    }
    info!("Registered {} built-in tools", count);
    Ok(())
}
