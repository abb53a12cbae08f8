use autopilot_device::RetryPolicy;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Default config template created when no config exists
const DEFAULT_CONFIG: &str = r#"
[provider]
socket_path = "/data/local/tmp/autopilot-provider.sock"  # Set via AUTOPILOT_PROVIDER_SOCKET env var
connect_on_start = true
request_permission_on_start = true
call_timeout_ms = 10000
reconnect_initial_ms = 500  # Retry delay after the provider dies, doubled per failure
reconnect_max_ms = 30000

[device]
cache_dir = ""  # Set via AUTOPILOT_CACHE_DIR env var; empty uses the user cache directory
max_attempts = 3
initial_backoff_ms = 100
max_backoff_ms = 1000

[scanner]
refresh_interval_secs = 300  # 0 scans once at startup
pm_binary = "pm"

[logging]
level = "info"  # trace, debug, info, warn, error
json = false
crash_dir = ""  # Optional directory for crash reports
"#;

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub socket_path: PathBuf,
    pub connect_on_start: bool,
    pub request_permission_on_start: bool,
    pub call_timeout_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
}

impl ProviderConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Backoff between reconnect attempts; attempts are unbounded
    pub fn reconnect_backoff(&self) -> RetryPolicy {
        RetryPolicy::new(
            u32::MAX,
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceSection {
    pub cache_dir: String,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl DeviceSection {
    /// Configured cache directory, or `<user cache dir>/autopilot`
    pub fn cache_dir(&self) -> PathBuf {
        if !self.cache_dir.trim().is_empty() {
            return PathBuf::from(&self.cache_dir);
        }
        dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join("autopilot")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub refresh_interval_secs: u64,
    pub pm_binary: String,
}

impl ScannerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub crash_dir: String,
}

impl LoggingConfig {
    pub fn crash_dir(&self) -> Option<PathBuf> {
        let dir = self.crash_dir.trim();
        (!dir.is_empty()).then(|| PathBuf::from(dir))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub device: DeviceSection,
    pub scanner: ScannerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Get the global config path: ~/.autopilot/autopilot.toml
    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".autopilot").join("autopilot.toml"))
    }

    /// Ensure global config directory and file exist, creating defaults if needed
    fn ensure_global_config() -> anyhow::Result<Option<PathBuf>> {
        let Some(config_path) = Self::global_config_path() else {
            eprintln!("No home directory; using built-in defaults");
            return Ok(None);
        };

        if let Some(config_dir) = config_path.parent() {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir)?;
                eprintln!("Created config directory: {}", config_dir.display());
            }
        }

        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG.trim())?;
            eprintln!("Created default config: {}", config_path.display());
        }

        Ok(Some(config_path))
    }

    /// The built-in template as a configuration
    pub fn defaults() -> anyhow::Result<Self> {
        Ok(toml::from_str(DEFAULT_CONFIG)?)
    }

    /// Load configuration with layered approach:
    /// 1. Built-in template
    /// 2. Global config: ~/.autopilot/autopilot.toml (auto-created if missing)
    /// 3. Local override: ./autopilot.toml (optional)
    /// 4. Environment variables (highest priority)
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file from current directory
        dotenvy::dotenv().ok();

        let mut config_builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        if let Some(global_config_path) = Self::ensure_global_config()? {
            config_builder = config_builder.add_source(config::File::from(global_config_path));
        }

        config_builder = config_builder
            .add_source(config::File::with_name("autopilot").required(false))
            // AUTOPILOT__SECTION__KEY
            .add_source(
                config::Environment::with_prefix("AUTOPILOT")
                    .separator("__")
                    .try_parsing(true),
            );

        // Convenience env var overrides (highest priority)
        if let Ok(socket) = env::var("AUTOPILOT_PROVIDER_SOCKET") {
            config_builder = config_builder.set_override("provider.socket_path", socket)?;
        }

        if let Ok(dir) = env::var("AUTOPILOT_CACHE_DIR") {
            config_builder = config_builder.set_override("device.cache_dir", dir)?;
        }

        let config = config_builder.build()?;

        let config: Self = config.try_deserialize()?;
        Ok(config)
    }
}
