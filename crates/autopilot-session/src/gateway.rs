//! Session gateway: lifecycle, permission handshake and the privileged call lane

use crate::error::{Result, SessionError, TransportError};
use crate::provider::{
    CommandOutput, ListenerRegistration, PrivilegedProvider, ProviderEvent, ProviderRequest,
    ShellCommand,
};
use autopilot_types::SessionState;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of [`SessionGateway::request_permission`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// The session is already authorized; nothing was submitted
    AlreadyGranted,
    /// A request was submitted; the result will arrive for this correlation id
    Pending(u64),
}

/// State shared between the gateway and its event pump
struct Shared {
    state: watch::Sender<SessionState>,
    next_id: AtomicU64,
    pending: Mutex<HashSet<u64>>,
    provider_lost: AtomicBool,
}

impl Shared {
    fn next_correlation_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Session state: {} -> {}", previous, state);
        }
    }

    async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::PermissionResult {
                request_code,
                granted,
            } => self.on_permission_result(request_code, granted).await,
            ProviderEvent::BinderReceived => debug!("Provider binder received"),
            ProviderEvent::BinderDead => self.on_provider_lost("binder died").await,
        }
    }

    async fn on_permission_result(&self, request_code: u64, granted: bool) {
        let mut pending = self.pending.lock().await;
        if !pending.remove(&request_code) {
            warn!(
                request_code,
                granted, "Dropping permission result for unknown request"
            );
            return;
        }

        info!(request_code, granted, "Permission result received");

        if granted {
            pending.clear();
            self.set_state(SessionState::Connected { authorized: true });
            return;
        }

        // A denial only settles the session if no newer request is outstanding
        let current = *self.state.borrow();
        let superseded = matches!(
            current,
            SessionState::PermissionPending { request_code: latest } if latest != request_code
        );
        if !superseded && !current.is_authorized() {
            self.set_state(SessionState::PermissionDenied);
        }
    }

    async fn on_provider_lost(&self, reason: &str) {
        warn!("Privileged provider lost: {}", reason);
        self.pending.lock().await.clear();
        self.provider_lost.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Disconnected);
    }

    /// Translate a transport failure, recording provider death locally
    async fn transport_failure(&self, error: TransportError) -> SessionError {
        match error {
            TransportError::Dead(reason) => {
                self.on_provider_lost(&reason).await;
                SessionError::ProviderUnavailable
            }
            other => SessionError::Transport(other),
        }
    }

    fn check_access(&self) -> Result<()> {
        let state = *self.state.borrow();
        if state.is_authorized() {
            Ok(())
        } else if state == SessionState::Disconnected && self.provider_lost.load(Ordering::SeqCst) {
            Err(SessionError::ProviderUnavailable)
        } else {
            Err(SessionError::NotAuthorized)
        }
    }
}

/// Registered provider listener plus the task draining its channel
struct Listener {
    _registration: ListenerRegistration,
    pump: JoinHandle<()>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Sole path through which privileged actions reach the provider.
///
/// Owns the session state machine:
///
/// ```text
/// Disconnected -> Connecting -> Connected | Disconnected (ProviderUnavailable)
/// Connected -> PermissionPending -> Connected(authorized) | PermissionDenied
/// any -> Disconnected on provider death
/// ```
pub struct SessionGateway {
    provider: Arc<dyn PrivilegedProvider>,
    shared: Arc<Shared>,
    connect_lock: Mutex<()>,
    call_lock: Mutex<()>,
    listener: Mutex<Option<Listener>>,
}

impl SessionGateway {
    /// Create a gateway over `provider`; nothing is contacted until `connect`
    pub fn new(provider: Arc<dyn PrivilegedProvider>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            provider,
            shared: Arc::new(Shared {
                state,
                next_id: AtomicU64::new(1),
                pending: Mutex::new(HashSet::new()),
                provider_lost: AtomicBool::new(false),
            }),
            connect_lock: Mutex::new(()),
            call_lock: Mutex::new(()),
            listener: Mutex::new(None),
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Whether privileged calls are currently permitted
    pub fn is_authorized(&self) -> bool {
        self.state().is_authorized()
    }

    /// Whether the provider died and no `connect` has succeeded since
    pub fn is_provider_lost(&self) -> bool {
        self.shared.provider_lost.load(Ordering::SeqCst)
    }

    /// Watch session state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Bind to the provider. Idempotent: an existing binding is reported as is.
    ///
    /// # Errors
    /// Returns [`SessionError::ProviderUnavailable`] if the privileged service
    /// is not running
    pub async fn connect(&self) -> Result<SessionState> {
        let _guard = self.connect_lock.lock().await;

        let current = self.state();
        if current.is_connected() {
            return Ok(current);
        }

        self.ensure_listener().await;
        self.shared.set_state(SessionState::Connecting);

        match self.provider.bind().await {
            Ok(info) => info!(
                version = info.version,
                uid = info.uid,
                "Bound to privileged provider"
            ),
            Err(e) => {
                warn!("Privileged provider unavailable: {}", e);
                self.shared.set_state(SessionState::Disconnected);
                return Err(SessionError::ProviderUnavailable);
            }
        }

        let authorized = match self.provider.check_permission().await {
            Ok(granted) => granted,
            Err(e) => {
                warn!("Permission check failed, assuming not granted: {}", e);
                false
            }
        };

        self.shared.provider_lost.store(false, Ordering::SeqCst);
        let state = SessionState::Connected { authorized };
        self.shared.set_state(state);
        Ok(state)
    }

    /// Submit a permission request without waiting for its outcome.
    ///
    /// The result is delivered through the provider listener; observe it via
    /// [`is_authorized`](Self::is_authorized) or [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    /// Returns an error if the provider is unreachable or rejects the submission
    pub async fn request_permission(&self) -> Result<PermissionStatus> {
        let state = self.connect().await?;
        if state.is_authorized() {
            return Ok(PermissionStatus::AlreadyGranted);
        }

        let request_code = self.shared.next_correlation_id();
        self.shared.pending.lock().await.insert(request_code);
        self.shared
            .set_state(SessionState::PermissionPending { request_code });

        if let Err(e) = self.provider.request_permission(request_code).await {
            warn!(request_code, "Permission request submission failed: {}", e);
            self.shared.pending.lock().await.remove(&request_code);
            if self.state() == (SessionState::PermissionPending { request_code }) {
                self.shared
                    .set_state(SessionState::Connected { authorized: false });
            }
            return Err(self.shared.transport_failure(e).await);
        }

        info!(request_code, "Permission requested");
        Ok(PermissionStatus::Pending(request_code))
    }

    /// Wait until no permission request is outstanding and report whether the
    /// session ended up authorized
    pub async fn wait_for_authorization(&self) -> bool {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|s| {
                !matches!(
                    s,
                    SessionState::PermissionPending { .. } | SessionState::Connecting
                )
            })
            .await
            .map(|s| s.is_authorized());
        settled.unwrap_or(false)
    }

    /// Enter the privileged call lane.
    ///
    /// Callers queue in FIFO order; the returned guard keeps every other
    /// caller out until it is dropped, so a multi-call primitive is never
    /// interleaved with another.
    ///
    /// # Errors
    /// Returns [`SessionError::NotAuthorized`] or
    /// [`SessionError::ProviderUnavailable`] if calls are not permitted
    pub async fn privileged(&self) -> Result<PrivilegedSession<'_>> {
        self.shared.check_access()?;
        let guard = self.call_lock.lock().await;
        // State may have changed while queued
        self.shared.check_access()?;
        Ok(PrivilegedSession {
            gateway: self,
            _guard: guard,
        })
    }

    /// Run a single privileged command in its own lane slot
    ///
    /// # Errors
    /// Returns an error if the session is not authorized or the call fails
    pub async fn execute(&self, command: &ShellCommand) -> Result<CommandOutput> {
        self.privileged().await?.call(command).await
    }

    /// Deregister the provider listener and reset to `Disconnected`.
    /// Safe to call when never connected, and more than once.
    pub async fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().await.take() {
            info!("Releasing provider listener {:?}", listener._registration.id());
            drop(listener);
        }
        self.shared.pending.lock().await.clear();
        self.shared.set_state(SessionState::Disconnected);
    }

    async fn ensure_listener(&self) {
        let mut slot = self.listener.lock().await;
        if slot.as_ref().is_some_and(|l| !l.pump.is_finished()) {
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let registration = ListenerRegistration::register(Arc::clone(&self.provider), tx);
        let shared = Arc::clone(&self.shared);
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                shared.handle_event(event).await;
            }
            shared.on_provider_lost("listener channel closed").await;
        });

        debug!("Registered provider listener {:?}", registration.id());
        *slot = Some(Listener {
            _registration: registration,
            pump,
        });
    }
}

/// Exclusive slot in the privileged call lane
pub struct PrivilegedSession<'a> {
    gateway: &'a SessionGateway,
    _guard: MutexGuard<'a, ()>,
}

impl PrivilegedSession<'_> {
    /// Execute one command through the provider
    ///
    /// # Errors
    /// Returns an error if authorization was lost or the transport fails
    pub async fn call(&self, command: &ShellCommand) -> Result<CommandOutput> {
        let shared = &self.gateway.shared;
        shared.check_access()?;

        let id = shared.next_correlation_id();
        debug!(id, "Privileged call: {}", command);

        let request = ProviderRequest {
            id,
            command: command.clone(),
        };
        match self.gateway.provider.call(request).await {
            Ok(output) => Ok(output),
            Err(e) => Err(shared.transport_failure(e).await),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::{CallEvent, ScriptedProvider};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn settle(gateway: &SessionGateway, expected: SessionState) {
        let mut rx = gateway.subscribe();
        timeout(Duration::from_secs(2), rx.wait_for(|s| *s == expected))
            .await
            .expect("state did not settle")
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_unavailable_provider() {
        let provider = Arc::new(ScriptedProvider::unavailable());
        let gateway = SessionGateway::new(provider);

        assert_eq!(gateway.connect().await, Err(SessionError::ProviderUnavailable));
        assert_eq!(gateway.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        let gateway = SessionGateway::new(provider.clone());

        let first = gateway.connect().await.unwrap();
        let second = gateway.connect().await.unwrap();

        assert_eq!(first, SessionState::Connected { authorized: true });
        assert_eq!(first, second);
        assert_eq!(provider.bind_count(), 1);
        assert_eq!(provider.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_permission_granted_asynchronously() {
        let provider = Arc::new(ScriptedProvider::new());
        let gateway = SessionGateway::new(provider.clone());

        let status = gateway.request_permission().await.unwrap();
        let PermissionStatus::Pending(code) = status else {
            panic!("expected pending request, got {status:?}");
        };
        assert!(!gateway.is_authorized());
        assert_eq!(gateway.state(), SessionState::PermissionPending { request_code: code });

        provider.deliver_permission_result(code, true);
        settle(&gateway, SessionState::Connected { authorized: true }).await;
        assert!(gateway.is_authorized());
    }

    #[tokio::test]
    async fn test_permission_denied_then_new_request() {
        let provider = Arc::new(ScriptedProvider::new());
        let gateway = SessionGateway::new(provider.clone());

        let PermissionStatus::Pending(first) = gateway.request_permission().await.unwrap() else {
            panic!("expected pending request");
        };
        provider.deliver_permission_result(first, false);
        settle(&gateway, SessionState::PermissionDenied).await;

        // Denied stays put until the caller asks again
        assert_eq!(gateway.connect().await.unwrap(), SessionState::PermissionDenied);

        let PermissionStatus::Pending(second) = gateway.request_permission().await.unwrap() else {
            panic!("expected pending request");
        };
        assert_ne!(first, second);
        provider.deliver_permission_result(second, true);
        settle(&gateway, SessionState::Connected { authorized: true }).await;
    }

    #[tokio::test]
    async fn test_already_granted_skips_request() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        let gateway = SessionGateway::new(provider.clone());

        let status = gateway.request_permission().await.unwrap();
        assert_eq!(status, PermissionStatus::AlreadyGranted);
        assert!(provider.permission_requests().is_empty());
    }

    #[tokio::test]
    async fn test_stale_permission_result_is_dropped() {
        let provider = Arc::new(ScriptedProvider::new());
        let gateway = SessionGateway::new(provider.clone());
        gateway.connect().await.unwrap();

        provider.deliver_permission_result(9_999, true);
        let PermissionStatus::Pending(code) = gateway.request_permission().await.unwrap() else {
            panic!("expected pending request");
        };
        // Duplicate delivery after the real one
        provider.deliver_permission_result(code, false);
        provider.deliver_permission_result(code, true);
        settle(&gateway, SessionState::PermissionDenied).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gateway.state(), SessionState::PermissionDenied);
    }

    #[tokio::test]
    async fn test_wait_for_authorization() {
        let provider = Arc::new(ScriptedProvider::new().auto_respond(true));
        let gateway = SessionGateway::new(provider);

        gateway.request_permission().await.unwrap();
        assert!(gateway.wait_for_authorization().await);
    }

    #[tokio::test]
    async fn test_unauthorized_calls_fail_fast() {
        let provider = Arc::new(ScriptedProvider::new());
        let gateway = SessionGateway::new(provider.clone());

        let cmd = ShellCommand::new("input").args(["tap", "1", "2"]);
        assert_eq!(gateway.execute(&cmd).await, Err(SessionError::NotAuthorized));

        gateway.connect().await.unwrap();
        assert_eq!(gateway.execute(&cmd).await, Err(SessionError::NotAuthorized));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_death_surfaces_unavailable() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        let gateway = SessionGateway::new(provider.clone());
        gateway.connect().await.unwrap();

        assert!(!gateway.is_provider_lost());
        provider.kill();
        settle(&gateway, SessionState::Disconnected).await;
        assert!(gateway.is_provider_lost());

        let cmd = ShellCommand::new("input").args(["keyevent", "3"]);
        assert_eq!(gateway.execute(&cmd).await, Err(SessionError::ProviderUnavailable));

        // A failed attempt keeps the flag
        assert_eq!(gateway.connect().await, Err(SessionError::ProviderUnavailable));
        assert!(gateway.is_provider_lost());

        // Reconnecting once the service is back clears the lost flag
        provider.set_available(true);
        assert!(gateway.connect().await.unwrap().is_authorized());
        assert!(!gateway.is_provider_lost());
        assert!(gateway.execute(&cmd).await.is_ok());
    }

    #[tokio::test]
    async fn test_dead_transport_during_call() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        provider.push_response(Err(TransportError::Dead("binder gone".into())));
        let gateway = SessionGateway::new(provider.clone());
        gateway.connect().await.unwrap();

        let cmd = ShellCommand::new("input").args(["keyevent", "4"]);
        assert_eq!(gateway.execute(&cmd).await, Err(SessionError::ProviderUnavailable));
        assert_eq!(gateway.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_calls_are_serialized() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_permission(true)
                .with_call_delay(Duration::from_millis(10)),
        );
        let gateway = Arc::new(SessionGateway::new(provider.clone()));
        gateway.connect().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let gateway = Arc::clone(&gateway);
            handles.push(tokio::spawn(async move {
                let cmd = ShellCommand::new("input").args(["tap", &i.to_string(), "0"]);
                gateway.execute(&cmd).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let journal = provider.journal();
        assert_eq!(journal.len(), 8);
        for pair in journal.chunks(2) {
            match pair {
                [CallEvent::Enter(a), CallEvent::Exit(b)] => assert_eq!(a, b),
                other => panic!("interleaved calls: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_shutdown_releases_listener() {
        let provider = Arc::new(ScriptedProvider::new());
        let gateway = SessionGateway::new(provider.clone());

        // Never connected
        gateway.shutdown().await;
        assert_eq!(provider.listener_count(), 0);

        gateway.connect().await.unwrap();
        assert_eq!(provider.listener_count(), 1);

        gateway.shutdown().await;
        gateway.shutdown().await;
        assert_eq!(provider.listener_count(), 0);
        assert_eq!(gateway.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_drop_releases_listener() {
        let provider = Arc::new(ScriptedProvider::new());
        {
            let gateway = SessionGateway::new(provider.clone());
            gateway.connect().await.unwrap();
            assert_eq!(provider.listener_count(), 1);
        }
        assert_eq!(provider.listener_count(), 0);
    }
}
