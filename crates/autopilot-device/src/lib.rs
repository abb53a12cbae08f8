//! Autopilot device controller
//!
//! Device-level primitives (tap, swipe, text input, key events, shell, screen
//! capture, app launch) issued through the privileged session gateway, with
//! bounded retry of transient transport failures.

pub mod controller;
pub mod error;
pub mod input;
pub mod retry;

pub use controller::{DeviceConfig, DeviceController};
pub use error::{DeviceError, Result};
pub use input::{KeyCode, Point, ScreenCapture, ScreenSize};
pub use retry::RetryPolicy;
