//! Rebinds the privileged session after the provider goes away

use autopilot_device::RetryPolicy;
use autopilot_session::{PermissionStatus, SessionGateway};
use autopilot_types::SessionState;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Background task that reconnects a lost provider with doubling backoff
pub struct SessionSupervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SessionSupervisor {
    /// Start watching `gateway`. Stops when `cancel` fires or on `shutdown`.
    pub fn spawn(
        gateway: Arc<SessionGateway>,
        backoff: RetryPolicy,
        request_permission: bool,
        cancel: &CancellationToken,
    ) -> Self {
        let cancel = cancel.child_token();
        let handle = tokio::spawn(supervise(gateway, backoff, request_permission, cancel.clone()));
        Self { cancel, handle }
    }

    /// Cancel the task and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Session supervisor ended abnormally: {}", e);
        }
    }
}

async fn supervise(
    gateway: Arc<SessionGateway>,
    backoff: RetryPolicy,
    request_permission: bool,
    cancel: CancellationToken,
) {
    let mut states = gateway.subscribe();
    loop {
        let state = *states.borrow_and_update();
        if state == SessionState::Disconnected && gateway.is_provider_lost() {
            warn!("Privileged provider lost, reconnecting");
            if !reconnect(&gateway, backoff, &cancel).await {
                break;
            }
            if request_permission {
                ask_permission(&gateway).await;
            }
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Session supervisor stopped");
}

/// Retry `connect` until it succeeds. Returns false if cancelled first.
async fn reconnect(
    gateway: &SessionGateway,
    backoff: RetryPolicy,
    cancel: &CancellationToken,
) -> bool {
    let mut attempt = 1u32;
    loop {
        let delay = backoff.backoff(attempt);
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }

        match gateway.connect().await {
            Ok(state) => {
                info!(attempt, "Privileged provider reconnected: {}", state);
                return true;
            }
            Err(e) => {
                debug!(attempt, ?delay, "Reconnect failed: {}", e);
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// Submit a permission request unless already granted, logging the outcome
pub(crate) async fn ask_permission(gateway: &SessionGateway) {
    match gateway.request_permission().await {
        Ok(PermissionStatus::AlreadyGranted) => info!("Privileged permission already granted"),
        Ok(PermissionStatus::Pending(code)) => {
            info!(request_code = code, "Waiting for the user to grant privileged access")
        }
        Err(e) => warn!("Permission request failed: {}", e),
    }
}
