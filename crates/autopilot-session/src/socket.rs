//! Unix socket transport to the privileged daemon.
//!
//! The daemon speaks newline-delimited JSON. Every request frame carries a
//! frame id which the matching reply echoes back:
//!
//! ```text
//! -> {"type":"ping","id":1}
//! <- {"type":"response","id":1,"result":{"version":13,"uid":2000}}
//! -> {"type":"check_permission","id":2}
//! <- {"type":"response","id":2,"result":{"granted":false}}
//! -> {"type":"request_permission","id":3,"request_code":7}
//! <- {"type":"response","id":3,"result":null}
//! <- {"type":"permission_result","request_code":7,"granted":true}
//! -> {"type":"exec","id":4,"argv":["input","tap","10","20"]}
//! <- {"type":"response","id":4,"result":{"exit_code":0,"stdout":"","stderr":""}}
//! <- {"type":"error","id":5,"message":"...","transient":true}
//! ```
//!
//! `stdout` is base64 encoded because commands such as `screencap -p` emit
//! binary data. Losing the connection fails all in-flight frames and is
//! reported to listeners as [`ProviderEvent::BinderDead`].

use crate::error::TransportError;
use crate::provider::{
    CommandOutput, EventSender, ListenerId, PrivilegedProvider, ProviderEvent, ProviderInfo,
    ProviderRequest,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Reply = Result<Value, TransportError>;
type PendingFrames = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Outgoing request frames
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outgoing {
    Ping { id: u64 },
    CheckPermission { id: u64 },
    RequestPermission { id: u64, request_code: u64 },
    Exec { id: u64, argv: Vec<String> },
}

/// Incoming frames: replies or notifications
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Incoming {
    Response {
        id: u64,
        #[serde(default)]
        result: Value,
    },
    Error {
        id: u64,
        message: String,
        #[serde(default)]
        transient: bool,
    },
    PermissionResult {
        request_code: u64,
        granted: bool,
    },
}

#[derive(Debug, Deserialize)]
struct PermissionReply {
    granted: bool,
}

#[derive(Debug, Deserialize)]
struct ExecReply {
    exit_code: i32,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

/// Listener table shared with the reader task
#[derive(Default)]
struct Listeners {
    next: AtomicU64,
    senders: StdMutex<HashMap<ListenerId, EventSender>>,
}

impl Listeners {
    fn senders(&self) -> MutexGuard<'_, HashMap<ListenerId, EventSender>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast(&self, event: ProviderEvent) {
        self.senders().retain(|_, sender| sender.send(event).is_ok());
    }
}

/// One live socket connection
struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingFrames,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// [`PrivilegedProvider`] backed by the privileged daemon's Unix socket
pub struct SocketProvider {
    path: PathBuf,
    call_timeout: Duration,
    next_frame: AtomicU64,
    connection: Mutex<Option<Arc<Connection>>>,
    listeners: Arc<Listeners>,
}

impl SocketProvider {
    /// Create a provider for the daemon socket at `path`
    pub fn new(path: impl Into<PathBuf>, call_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            call_timeout,
            next_frame: AtomicU64::new(1),
            connection: Mutex::new(None),
            listeners: Arc::new(Listeners::default()),
        }
    }

    /// Socket path of the daemon
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current connection, dialing the daemon if there is none
    async fn connection(&self) -> Result<Arc<Connection>, TransportError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            if conn.alive.load(Ordering::SeqCst) {
                return Ok(Arc::clone(conn));
            }
        }

        let stream = UnixStream::connect(&self.path).await.map_err(|e| {
            TransportError::Dead(format!("cannot reach {}: {e}", self.path.display()))
        })?;
        let (reader, writer) = stream.into_split();

        let pending: PendingFrames = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&self.listeners),
            Arc::clone(&alive),
        ));

        info!("Connected to privileged daemon at {}", self.path.display());
        self.listeners.broadcast(ProviderEvent::BinderReceived);

        let conn = Arc::new(Connection {
            writer: Mutex::new(writer),
            pending,
            alive,
            reader,
        });
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Send one frame and wait for the reply carrying the same id
    async fn roundtrip<F>(&self, build: F) -> Reply
    where
        F: FnOnce(u64) -> Outgoing,
    {
        let conn = self.connection().await?;
        let id = self.next_frame.fetch_add(1, Ordering::SeqCst);

        let mut line = serde_json::to_string(&build(id))
            .map_err(|e| TransportError::Rejected(format!("unencodable frame: {e}")))?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        conn.pending.lock().await.insert(id, tx);

        let written = {
            let mut writer = conn.writer.lock().await;
            writer.write_all(line.as_bytes()).await
        };
        if let Err(e) = written {
            conn.pending.lock().await.remove(&id);
            return Err(TransportError::CallFailed(format!("write failed: {e}")));
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(TransportError::Dead("connection closed".into())),
            Err(_) => {
                conn.pending.lock().await.remove(&id);
                Err(TransportError::Timeout)
            }
        }
    }
}

#[async_trait]
impl PrivilegedProvider for SocketProvider {
    async fn bind(&self) -> Result<ProviderInfo, TransportError> {
        let result = self.roundtrip(|id| Outgoing::Ping { id }).await?;
        serde_json::from_value(result)
            .map_err(|e| TransportError::Rejected(format!("malformed ping reply: {e}")))
    }

    async fn check_permission(&self) -> Result<bool, TransportError> {
        let result = self
            .roundtrip(|id| Outgoing::CheckPermission { id })
            .await?;
        let reply: PermissionReply = serde_json::from_value(result)
            .map_err(|e| TransportError::Rejected(format!("malformed permission reply: {e}")))?;
        Ok(reply.granted)
    }

    async fn request_permission(&self, request_code: u64) -> Result<(), TransportError> {
        self.roundtrip(|id| Outgoing::RequestPermission { id, request_code })
            .await
            .map(|_| ())
    }

    async fn call(&self, request: ProviderRequest) -> Result<CommandOutput, TransportError> {
        let argv = request.command.argv().to_vec();
        debug!(correlation = request.id, "exec: {}", request.command);

        let result = self
            .roundtrip(move |id| Outgoing::Exec { id, argv })
            .await?;
        let reply: ExecReply = serde_json::from_value(result)
            .map_err(|e| TransportError::Rejected(format!("malformed exec reply: {e}")))?;
        let stdout = BASE64
            .decode(reply.stdout.as_bytes())
            .map_err(|e| TransportError::Rejected(format!("stdout is not base64: {e}")))?;

        Ok(CommandOutput {
            exit_code: reply.exit_code,
            stdout,
            stderr: reply.stderr,
        })
    }

    fn add_listener(&self, sender: EventSender) -> ListenerId {
        let id = ListenerId(self.listeners.next.fetch_add(1, Ordering::SeqCst));
        self.listeners.senders().insert(id, sender);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.senders().remove(&id);
    }
}

/// Drain incoming frames until the daemon closes the connection
async fn read_loop(
    reader: OwnedReadHalf,
    pending: PendingFrames,
    listeners: Arc<Listeners>,
    alive: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                handle_frame(&line, &pending, &listeners).await;
            }
            Ok(None) => {
                debug!("Privileged daemon closed the connection");
                break;
            }
            Err(e) => {
                warn!("Privileged daemon read failed: {}", e);
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders fails every in-flight roundtrip with `Dead`
    pending.lock().await.clear();
    listeners.broadcast(ProviderEvent::BinderDead);
}

async fn handle_frame(line: &str, pending: &PendingFrames, listeners: &Listeners) {
    let frame: Incoming = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Ignoring malformed frame from daemon: {}", e);
            return;
        }
    };

    let (id, reply) = match frame {
        Incoming::PermissionResult {
            request_code,
            granted,
        } => {
            listeners.broadcast(ProviderEvent::PermissionResult {
                request_code,
                granted,
            });
            return;
        }
        Incoming::Response { id, result } => (id, Ok(result)),
        Incoming::Error {
            id,
            message,
            transient,
        } => {
            let error = if transient {
                TransportError::CallFailed(message)
            } else {
                TransportError::Rejected(message)
            };
            (id, Err(error))
        }
    };

    match pending.lock().await.remove(&id) {
        Some(tx) => {
            // The caller may have timed out and gone away
            let _ = tx.send(reply);
        }
        None => debug!(id, "Reply for unknown frame"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::provider::ShellCommand;
    use tokio::net::UnixListener;
    use tokio::sync::mpsc;

    /// Minimal daemon answering each frame from a closure
    fn spawn_daemon<F>(path: &Path, answer: F) -> JoinHandle<()>
    where
        F: Fn(Value) -> Vec<Value> + Send + 'static,
    {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let frame: Value = serde_json::from_str(&line).unwrap();
                for reply in answer(frame) {
                    let mut out = reply.to_string();
                    out.push('\n');
                    writer.write_all(out.as_bytes()).await.unwrap();
                }
            }
        })
    }

    #[tokio::test]
    async fn test_bind_and_exec_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let _daemon = spawn_daemon(&path, |frame| {
            let id = frame["id"].clone();
            match frame["type"].as_str().unwrap() {
                "ping" => vec![serde_json::json!({
                    "type": "response", "id": id, "result": {"version": 13, "uid": 2000}
                })],
                "exec" => {
                    assert_eq!(frame["argv"], serde_json::json!(["echo", "hi"]));
                    vec![serde_json::json!({
                        "type": "response", "id": id,
                        "result": {"exit_code": 0, "stdout": BASE64.encode(b"hi\n"), "stderr": ""}
                    })]
                }
                other => panic!("unexpected frame {other}"),
            }
        });

        let provider = SocketProvider::new(&path, Duration::from_secs(2));
        let info = provider.bind().await.unwrap();
        assert_eq!(info, ProviderInfo { version: 13, uid: 2000 });

        let output = provider
            .call(ProviderRequest {
                id: 1,
                command: ShellCommand::new("echo").arg("hi"),
            })
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout_lossy(), "hi\n");
    }

    #[tokio::test]
    async fn test_permission_result_notification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let _daemon = spawn_daemon(&path, |frame| {
            let id = frame["id"].clone();
            match frame["type"].as_str().unwrap() {
                "request_permission" => vec![
                    serde_json::json!({"type": "response", "id": id, "result": null}),
                    serde_json::json!({
                        "type": "permission_result",
                        "request_code": frame["request_code"], "granted": true
                    }),
                ],
                _ => vec![serde_json::json!({"type": "response", "id": id, "result": {}})],
            }
        });

        let provider = SocketProvider::new(&path, Duration::from_secs(2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        provider.add_listener(tx);

        provider.request_permission(42).await.unwrap();

        let mut saw_result = false;
        while let Some(event) = rx.recv().await {
            if event
                == (ProviderEvent::PermissionResult {
                    request_code: 42,
                    granted: true,
                })
            {
                saw_result = true;
                break;
            }
        }
        assert!(saw_result);
    }

    #[tokio::test]
    async fn test_error_frames_map_to_transport_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let _daemon = spawn_daemon(&path, |frame| {
            let id = frame["id"].clone();
            let transient = frame["argv"][0] == "retry";
            vec![serde_json::json!({
                "type": "error", "id": id, "message": "nope", "transient": transient
            })]
        });

        let provider = SocketProvider::new(&path, Duration::from_secs(2));
        let transient = provider
            .call(ProviderRequest {
                id: 1,
                command: ShellCommand::new("retry"),
            })
            .await;
        assert_eq!(transient, Err(TransportError::CallFailed("nope".into())));

        let permanent = provider
            .call(ProviderRequest {
                id: 2,
                command: ShellCommand::new("bad"),
            })
            .await;
        assert_eq!(permanent, Err(TransportError::Rejected("nope".into())));
    }

    #[tokio::test]
    async fn test_missing_daemon_is_dead() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SocketProvider::new(dir.path().join("absent.sock"), Duration::from_secs(1));

        assert!(matches!(provider.bind().await, Err(TransportError::Dead(_))));
    }

    #[tokio::test]
    async fn test_daemon_exit_reports_binder_dead() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let daemon = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let frame: Value = serde_json::from_str(&line).unwrap();
            let reply = serde_json::json!({
                "type": "response", "id": frame["id"], "result": {"version": 1, "uid": 0}
            });
            writer
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .unwrap();
            // Dropping both halves closes the connection
        });

        let provider = SocketProvider::new(&path, Duration::from_secs(2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        provider.add_listener(tx);

        provider.bind().await.unwrap();
        daemon.await.unwrap();

        let mut saw_dead = false;
        while let Some(event) = rx.recv().await {
            if event == ProviderEvent::BinderDead {
                saw_dead = true;
                break;
            }
        }
        assert!(saw_dead);
    }
}
