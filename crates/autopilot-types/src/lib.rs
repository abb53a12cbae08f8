//! Autopilot Types - Core types shared by the autopilot crates
//!
//! This module defines the data model exchanged between the session gateway,
//! the device controller, the registries and the application scanner.

pub mod app;
pub mod session;

pub use app::{AppInfo, AppSnapshot};
pub use session::SessionState;

/// Android package identifier (e.g. `com.android.settings`)
pub type PackageId = String;
