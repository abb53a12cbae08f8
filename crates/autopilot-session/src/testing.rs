//! In-memory provider for tests.
//!
//! [`ScriptedProvider`] answers binds and permission checks from flags,
//! replays queued call results, and journals call entry/exit so tests can
//! assert that privileged calls never overlap.

use crate::error::TransportError;
use crate::provider::{
    CommandOutput, EventSender, ListenerId, PrivilegedProvider, ProviderEvent, ProviderInfo,
    ProviderRequest, ShellCommand,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Computes a call result from the request when no queued result remains
pub type Responder =
    Box<dyn Fn(&ProviderRequest) -> Result<CommandOutput, TransportError> + Send + Sync>;

/// Entry in the call journal, keyed by correlation id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    /// The provider started executing the request
    Enter(u64),
    /// The provider finished executing the request
    Exit(u64),
}

/// Programmable [`PrivilegedProvider`]
pub struct ScriptedProvider {
    available: AtomicBool,
    granted: AtomicBool,
    auto_respond: Option<bool>,
    call_delay: Duration,
    binds: AtomicUsize,
    next_listener: AtomicU64,
    listeners: Mutex<HashMap<ListenerId, EventSender>>,
    responses: Mutex<VecDeque<Result<CommandOutput, TransportError>>>,
    responder: Mutex<Option<Responder>>,
    calls: Mutex<Vec<ShellCommand>>,
    journal: Mutex<Vec<CallEvent>>,
    permission_requests: Mutex<Vec<u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedProvider {
    /// A running provider that has not granted the permission
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            granted: AtomicBool::new(false),
            auto_respond: None,
            call_delay: Duration::ZERO,
            binds: AtomicUsize::new(0),
            next_listener: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
            responses: Mutex::new(VecDeque::new()),
            responder: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
            permission_requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose service is not running
    pub fn unavailable() -> Self {
        let provider = Self::new();
        provider.set_available(false);
        provider
    }

    /// Preset the answer of `check_permission`
    #[must_use]
    pub fn with_permission(self, granted: bool) -> Self {
        self.granted.store(granted, Ordering::SeqCst);
        self
    }

    /// Answer every permission request immediately with `granted`
    #[must_use]
    pub fn auto_respond(mut self, granted: bool) -> Self {
        self.auto_respond = Some(granted);
        self
    }

    /// Hold each call for `delay` between entry and exit
    #[must_use]
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Compute results for calls once the queue is exhausted
    #[must_use]
    pub fn with_responder(self, responder: Responder) -> Self {
        *lock(&self.responder) = Some(responder);
        self
    }

    /// Toggle whether `bind` succeeds
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Queue the result of the next call
    pub fn push_response(&self, response: Result<CommandOutput, TransportError>) {
        lock(&self.responses).push_back(response);
    }

    /// Push a permission result to every listener, as the provider would
    pub fn deliver_permission_result(&self, request_code: u64, granted: bool) {
        if granted {
            self.granted.store(true, Ordering::SeqCst);
        }
        self.emit(ProviderEvent::PermissionResult {
            request_code,
            granted,
        });
    }

    /// Push an arbitrary event to every listener
    pub fn emit(&self, event: ProviderEvent) {
        lock(&self.listeners).retain(|_, sender| sender.send(event).is_ok());
    }

    /// Simulate the provider process dying
    pub fn kill(&self) {
        self.set_available(false);
        self.emit(ProviderEvent::BinderDead);
    }

    /// Number of successful or failed `bind` attempts
    pub fn bind_count(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    /// Number of currently registered listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Commands received so far, in order
    pub fn calls(&self) -> Vec<ShellCommand> {
        lock(&self.calls).clone()
    }

    /// Entry/exit journal of all calls
    pub fn journal(&self) -> Vec<CallEvent> {
        lock(&self.journal).clone()
    }

    /// Request codes submitted through `request_permission`
    pub fn permission_requests(&self) -> Vec<u64> {
        lock(&self.permission_requests).clone()
    }

    fn ensure_alive(&self) -> Result<(), TransportError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Dead("provider not running".into()))
        }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrivilegedProvider for ScriptedProvider {
    async fn bind(&self) -> Result<ProviderInfo, TransportError> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        self.ensure_alive()?;
        Ok(ProviderInfo {
            version: 13,
            uid: 2000,
        })
    }

    async fn check_permission(&self) -> Result<bool, TransportError> {
        self.ensure_alive()?;
        Ok(self.granted.load(Ordering::SeqCst))
    }

    async fn request_permission(&self, request_code: u64) -> Result<(), TransportError> {
        self.ensure_alive()?;
        lock(&self.permission_requests).push(request_code);
        if let Some(granted) = self.auto_respond {
            self.deliver_permission_result(request_code, granted);
        }
        Ok(())
    }

    async fn call(&self, request: ProviderRequest) -> Result<CommandOutput, TransportError> {
        self.ensure_alive()?;
        lock(&self.journal).push(CallEvent::Enter(request.id));
        lock(&self.calls).push(request.command.clone());

        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }

        let queued = lock(&self.responses).pop_front();
        let result = match queued {
            Some(result) => result,
            None => match lock(&self.responder).as_ref() {
                Some(responder) => responder(&request),
                None => Ok(CommandOutput::ok(Vec::new())),
            },
        };

        lock(&self.journal).push(CallEvent::Exit(request.id));
        result
    }

    fn add_listener(&self, sender: EventSender) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        lock(&self.listeners).insert(id, sender);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        lock(&self.listeners).remove(&id);
    }
}
