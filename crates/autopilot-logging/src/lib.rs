use anyhow::Result;
use std::fs;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the logging system
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true),
        )
        .try_init()?;

    Ok(())
}

/// Initialize the logging system with line-delimited JSON output
pub fn init_logging_json(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_thread_ids(true),
        )
        .try_init()?;

    Ok(())
}

/// Record panics through `tracing` and, when `crash_dir` is set, as
/// `crash-<timestamp>.log` files. The previously installed hook still runs.
pub fn install_panic_hook(crash_dir: Option<PathBuf>) {
    let previous = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let report = crash_report(info);
        error!(target: "crash", "{}", report);

        if let Some(dir) = &crash_dir {
            if let Err(e) = write_crash_file(dir, &report) {
                error!(target: "crash", "Failed to write crash log to {:?}: {}", dir, e);
            }
        }

        previous(info);
    }));
}

fn crash_report(info: &PanicHookInfo<'_>) -> String {
    let message = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-string panic payload>".to_string());

    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "<unknown>".to_string());

    let thread = std::thread::current();
    format!(
        "panic in thread '{}' at {}: {}",
        thread.name().unwrap_or("<unnamed>"),
        location,
        message
    )
}

fn write_crash_file(dir: &Path, report: &str) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let now = chrono::Utc::now();
    let path = dir.join(format!("crash-{}.log", now.format("%Y%m%d-%H%M%S%.3f")));
    fs::write(&path, format!("{}\n{}\n", now.to_rfc3339(), report))?;
    Ok(path)
}
