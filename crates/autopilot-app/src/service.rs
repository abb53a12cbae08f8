use crate::config::Config;
use crate::context::AppContext;
use anyhow::Result;
use autopilot_scanner::PmPackageSource;
use autopilot_session::SocketProvider;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Agent service - owns startup, the run loop and shutdown
pub struct AgentService {
    config: Config,
}

impl AgentService {
    /// Create a new agent service
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the agent until Ctrl+C
    pub async fn run(self) -> Result<()> {
        // Initialize logging
        if self.config.logging.json {
            autopilot_logging::init_logging_json(&self.config.logging.level)?;
        } else {
            autopilot_logging::init_logging(&self.config.logging.level)?;
        }
        autopilot_logging::install_panic_hook(self.config.logging.crash_dir());
        info!("Starting Autopilot agent v{}", env!("CARGO_PKG_VERSION"));

        info!(
            "Provider config: socket={:?}, call_timeout={:?}",
            self.config.provider.socket_path,
            self.config.provider.call_timeout()
        );
        let provider = Arc::new(SocketProvider::new(
            &self.config.provider.socket_path,
            self.config.provider.call_timeout(),
        ));
        let packages = Arc::new(PmPackageSource::new(&self.config.scanner.pm_binary));

        let cancel = CancellationToken::new();
        let context = AppContext::start(self.config, provider, packages, cancel.clone()).await?;

        info!(
            "Device cache directory: {:?}, app scan interval: {:?}",
            context.controller.cache_dir(),
            context.config.scanner.refresh_interval()
        );
        info!("Tools: {}", context.tools.ids().join(", "));
        info!(
            "{} skills registered, available now: {:?}",
            context.skills.len(),
            context.available_skills()
        );

        // Setup signal handler for graceful shutdown
        let shutdown = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
            info!("Received shutdown signal");
        };
        tokio::pin!(shutdown);

        let mut generations = context.snapshot.subscribe();
        let mut session = context.gateway.subscribe();
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                changed = generations.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let generation = *generations.borrow_and_update();
                    info!(
                        generation,
                        "Available skills: {:?}",
                        context.available_skills()
                    );
                }
                changed = session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *session.borrow_and_update();
                    info!("Privileged session is now {}", state);
                }
            }
        }

        info!("Shutting down gracefully...");
        cancel.cancel();
        context.shutdown().await;
        info!("Autopilot agent stopped");
        Ok(())
    }
}
