//! Device controller: typed primitives over the privileged call lane

use crate::error::{DeviceError, Result};
use crate::input::{
    encode_input_text, validate_package, KeyCode, Point, ScreenCapture, ScreenSize,
};
use crate::retry::RetryPolicy;
use autopilot_session::{
    CommandOutput, PrivilegedSession, SessionError, SessionGateway, ShellCommand,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Longest gesture accepted by `swipe` and `long_press`
const MAX_GESTURE: Duration = Duration::from_secs(60);

/// Controller configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Writable root for screen captures; retention is the caller's concern
    pub cache_dir: PathBuf,
    pub retry: RetryPolicy,
}

impl DeviceConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Device-level primitives.
///
/// Every primitive validates its arguments, then enters the gateway's
/// privileged lane for its whole duration (including retries), so concurrent
/// primitives queue instead of interleaving on the device.
pub struct DeviceController {
    gateway: Arc<SessionGateway>,
    config: DeviceConfig,
}

impl DeviceController {
    pub fn new(gateway: Arc<SessionGateway>, config: DeviceConfig) -> Self {
        info!(
            "Device controller initialized (cache: {:?}, attempts: {})",
            config.cache_dir, config.retry.max_attempts
        );
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &Arc<SessionGateway> {
        &self.gateway
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    pub async fn tap(&self, at: Point) -> Result<()> {
        at.validate()?;
        self.exec(input(["tap".to_string(), at.x.to_string(), at.y.to_string()]))
            .await
            .map(drop)
    }

    pub async fn long_press(&self, at: Point, duration: Duration) -> Result<()> {
        at.validate()?;
        validate_gesture(duration)?;
        self.exec(swipe_command(at, at, duration)).await.map(drop)
    }

    pub async fn swipe(&self, from: Point, to: Point, duration: Duration) -> Result<()> {
        from.validate()?;
        to.validate()?;
        validate_gesture(duration)?;
        self.exec(swipe_command(from, to, duration)).await.map(drop)
    }

    pub async fn input_text(&self, text: &str) -> Result<()> {
        let encoded = encode_input_text(text)?;
        self.exec(input(["text".to_string(), encoded])).await.map(drop)
    }

    pub async fn key_event(&self, key: KeyCode) -> Result<()> {
        self.exec(input(["keyevent".to_string(), key.code().to_string()]))
            .await
            .map(drop)
    }

    /// Run a shell script with the provider's privileges; non-zero exit
    /// status is reported as `ExecutionFailed`
    pub async fn shell(&self, script: &str) -> Result<CommandOutput> {
        if script.trim().is_empty() {
            return Err(DeviceError::InvalidArgument("command must not be empty".into()));
        }
        self.exec(ShellCommand::sh(script)).await
    }

    /// Launch the package's launcher activity
    pub async fn open_app(&self, package: &str) -> Result<()> {
        validate_package(package)?;
        let command = ShellCommand::new("monkey").args([
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ]);
        self.exec(command).await.map(drop)
    }

    /// Fire a VIEW intent for `uri` (deep links, settings actions)
    pub async fn open_uri(&self, uri: &str) -> Result<()> {
        if uri.is_empty() || uri.chars().any(char::is_whitespace) || !uri.contains(':') {
            return Err(DeviceError::InvalidArgument(format!(
                "'{}' is not a valid URI",
                uri
            )));
        }
        let command = ShellCommand::new("am").args([
            "start",
            "-a",
            "android.intent.action.VIEW",
            "-d",
            uri,
        ]);
        self.exec(command).await.map(drop)
    }

    pub async fn screen_size(&self) -> Result<ScreenSize> {
        let output = self.exec(ShellCommand::new("wm").arg("size")).await?;
        let text = output.stdout_lossy();
        ScreenSize::parse_wm_size(&text).ok_or_else(|| {
            DeviceError::failed(format!("unrecognized `wm size` output: {}", text.trim()))
        })
    }

    /// Capture the screen as PNG into `<cache_dir>/captures/`
    pub async fn screen_capture(&self) -> Result<ScreenCapture> {
        let output = self
            .exec(ShellCommand::new("screencap").arg("-p"))
            .await?;

        if output.stdout.is_empty() {
            return Err(DeviceError::failed("screencap produced no data"));
        }
        if !output.stdout.starts_with(PNG_MAGIC) {
            return Err(DeviceError::failed("screencap output is not a PNG image"));
        }

        let dir = self.config.cache_dir.join("captures");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DeviceError::failed(format!("cannot create {}: {e}", dir.display())))?;

        let captured_at = Utc::now();
        let path = dir.join(format!(
            "capture-{}-{}.png",
            captured_at.format("%Y%m%d-%H%M%S%3f"),
            uuid::Uuid::new_v4().simple()
        ));
        tokio::fs::write(&path, &output.stdout)
            .await
            .map_err(|e| DeviceError::failed(format!("cannot write {}: {e}", path.display())))?;

        debug!("Screen captured to {:?} ({} bytes)", path, output.stdout.len());
        Ok(ScreenCapture {
            path,
            size_bytes: output.stdout.len() as u64,
            captured_at,
        })
    }

    /// Run one command in its own lane slot
    async fn exec(&self, command: ShellCommand) -> Result<CommandOutput> {
        let session = self.gateway.privileged().await?;
        self.run_with_retry(&session, &command).await
    }

    async fn run_with_retry(
        &self,
        session: &PrivilegedSession<'_>,
        command: &ShellCommand,
    ) -> Result<CommandOutput> {
        let policy = self.config.retry;
        let mut attempt = 1;

        loop {
            match session.call(command).await {
                Ok(output) if output.success() => return Ok(output),
                Ok(output) => {
                    return Err(DeviceError::failed(format!(
                        "`{}` exited with status {}: {}",
                        command,
                        output.exit_code,
                        output.stderr.trim()
                    )));
                }
                Err(SessionError::Transport(e))
                    if e.is_transient() && attempt < policy.max_attempts =>
                {
                    let delay = policy.backoff(attempt);
                    warn!(
                        attempt,
                        "Transient failure for `{}`, retrying in {:?}: {}", command, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn input<I>(args: I) -> ShellCommand
where
    I: IntoIterator<Item = String>,
{
    ShellCommand::new("input").args(args)
}

fn swipe_command(from: Point, to: Point, duration: Duration) -> ShellCommand {
    input([
        "swipe".to_string(),
        from.x.to_string(),
        from.y.to_string(),
        to.x.to_string(),
        to.y.to_string(),
        duration.as_millis().to_string(),
    ])
}

fn validate_gesture(duration: Duration) -> Result<()> {
    if duration.is_zero() || duration > MAX_GESTURE {
        return Err(DeviceError::InvalidArgument(format!(
            "gesture duration must be between 1ms and {:?}, got {:?}",
            MAX_GESTURE, duration
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use autopilot_session::testing::ScriptedProvider;
    use autopilot_session::TransportError;

    async fn authorized(provider: Arc<ScriptedProvider>, retry: RetryPolicy) -> DeviceController {
        let gateway = Arc::new(SessionGateway::new(provider));
        gateway.connect().await.unwrap();
        DeviceController::new(gateway, DeviceConfig::new("/tmp/unused").with_retry(retry))
    }

    #[tokio::test]
    async fn test_tap_issues_input_command() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        let device = authorized(provider.clone(), RetryPolicy::default()).await;

        device.tap(Point::new(10, 20)).await.unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].argv(), &["input", "tap", "10", "20"]);
    }

    #[tokio::test]
    async fn test_unauthorized_is_never_a_noop() {
        let provider = Arc::new(ScriptedProvider::new());
        let device = authorized(provider.clone(), RetryPolicy::default()).await;

        assert_eq!(
            device.key_event(KeyCode::Home).await,
            Err(DeviceError::NotAuthorized)
        );
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        provider.push_response(Err(TransportError::CallFailed("EPIPE".into())));
        provider.push_response(Err(TransportError::Timeout));
        let device = authorized(provider.clone(), RetryPolicy::immediate(3)).await;

        device
            .swipe(Point::new(0, 0), Point::new(0, 500), Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        for _ in 0..3 {
            provider.push_response(Err(TransportError::Timeout));
        }
        let device = authorized(provider.clone(), RetryPolicy::immediate(3)).await;

        let result = device.key_event(KeyCode::Back).await;
        assert!(matches!(result, Err(DeviceError::ExecutionFailed { .. })));
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        provider.push_response(Err(TransportError::Rejected("bad argv".into())));
        let device = authorized(provider.clone(), RetryPolicy::immediate(3)).await;

        let result = device.tap(Point::new(1, 1)).await;
        assert!(matches!(result, Err(DeviceError::ExecutionFailed { .. })));
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_without_retry() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        provider.push_response(Ok(CommandOutput::failed(1, "Error: unknown package")));
        let device = authorized(provider.clone(), RetryPolicy::immediate(3)).await;

        let err = device.open_app("com.example.app").await.unwrap_err();
        match err {
            DeviceError::ExecutionFailed { cause } => assert!(cause.contains("unknown package")),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_arguments_never_reach_provider() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        let device = authorized(provider.clone(), RetryPolicy::default()).await;

        assert!(matches!(
            device.tap(Point::new(-5, 3)).await,
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(matches!(
            device.swipe(Point::new(0, 0), Point::new(1, 1), Duration::ZERO).await,
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(matches!(
            device.input_text("").await,
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(matches!(
            device.open_uri("not a uri").await,
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(matches!(
            device.shell("  ").await,
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_screen_size() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        provider.push_response(Ok(CommandOutput::ok(b"Physical size: 1080x2400\n".to_vec())));
        let device = authorized(provider, RetryPolicy::default()).await;

        assert_eq!(
            device.screen_size().await.unwrap(),
            ScreenSize { width: 1080, height: 2400 }
        );
    }

    #[tokio::test]
    async fn test_long_press_is_stationary_swipe() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(true));
        let device = authorized(provider.clone(), RetryPolicy::default()).await;

        device
            .long_press(Point::new(5, 6), Duration::from_millis(800))
            .await
            .unwrap();
        assert_eq!(
            provider.calls()[0].argv(),
            &["input", "swipe", "5", "6", "5", "6", "800"]
        );
    }
}
