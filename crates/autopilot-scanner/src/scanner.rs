//! Refresh loop publishing snapshots into a [`SnapshotHandle`]

use crate::error::Result;
use crate::snapshot::SnapshotHandle;
use crate::source::PackageSource;
use autopilot_types::AppSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builds application snapshots from a [`PackageSource`]
pub struct AppScanner {
    source: Arc<dyn PackageSource>,
    handle: SnapshotHandle,
    refresh_lock: Mutex<()>,
}

impl AppScanner {
    pub fn new(source: Arc<dyn PackageSource>, handle: SnapshotHandle) -> Self {
        Self {
            source,
            handle,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn handle(&self) -> &SnapshotHandle {
        &self.handle
    }

    /// Scan once and publish the result with the next generation number.
    ///
    /// On failure the previously published snapshot stays current.
    pub async fn refresh(&self) -> Result<Arc<AppSnapshot>> {
        let _guard = self.refresh_lock.lock().await;

        let apps = self.source.list_packages().await?;
        let generation = self.handle.generation() + 1;
        let snapshot = AppSnapshot::new(generation, apps);

        let previous = self.handle.current();
        if previous.packages() != snapshot.packages() {
            info!(
                generation,
                "Installed applications changed: {} -> {}",
                previous.len(),
                snapshot.len()
            );
        } else {
            debug!(generation, "Application scan complete ({} apps)", snapshot.len());
        }

        self.handle.publish(snapshot);
        Ok(self.handle.current())
    }

    /// Scan now, then every `interval` until `cancel` fires.
    /// A zero interval scans once.
    pub fn spawn(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> ScannerTask {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            if interval.is_zero() {
                tokio::select! {
                    _ = token.cancelled() => {}
                    result = self.refresh() => log_failure(result),
                }
                return;
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            result = self.refresh() => log_failure(result),
                        }
                    }
                }
            }
            debug!("Application scanner stopped");
        });

        ScannerTask { cancel, handle }
    }
}

fn log_failure(result: Result<Arc<AppSnapshot>>) {
    if let Err(e) = result {
        warn!("Application scan failed, keeping previous snapshot: {}", e);
    }
}

/// Running scanner loop
pub struct ScannerTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScannerTask {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Application scanner task ended abnormally: {}", e);
        }
    }
}
