//! Autopilot application scanner
//!
//! Periodically lists installed packages and publishes immutable
//! [`AppSnapshot`]s. Readers take the current snapshot without ever blocking
//! the writer; subscribers are told the generation of each new snapshot.

pub mod error;
pub mod scanner;
pub mod snapshot;
pub mod source;

pub use autopilot_types::{AppInfo, AppSnapshot};
pub use error::{Result, ScanError};
pub use scanner::{AppScanner, ScannerTask};
pub use snapshot::SnapshotHandle;
pub use source::{PackageSource, PmPackageSource};
