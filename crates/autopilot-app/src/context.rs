//! Explicit application context, built once at startup

use anyhow::{Context as _, Result};
use autopilot_device::{DeviceConfig, DeviceController};
use autopilot_scanner::{AppScanner, PackageSource, ScannerTask, SnapshotHandle};
use autopilot_session::{PrivilegedProvider, SessionGateway};
use autopilot_skills::{register_builtin_skills, SkillRegistry};
use autopilot_tools::{register_builtin_tools, ToolRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::supervisor::{ask_permission, SessionSupervisor};

/// Every long-lived component, owned in one place and passed by reference
pub struct AppContext {
    pub config: Config,
    pub gateway: Arc<SessionGateway>,
    pub controller: Arc<DeviceController>,
    pub snapshot: SnapshotHandle,
    pub tools: Arc<ToolRegistry>,
    pub skills: SkillRegistry,
    scanner: ScannerTask,
    supervisor: SessionSupervisor,
}

impl AppContext {
    /// Build the component graph in dependency order.
    ///
    /// Provider problems are logged and never fatal; registration errors are.
    pub async fn start(
        config: Config,
        provider: Arc<dyn PrivilegedProvider>,
        packages: Arc<dyn PackageSource>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        // Gateway
        let gateway = Arc::new(SessionGateway::new(provider));
        if config.provider.connect_on_start {
            connect(&gateway, config.provider.request_permission_on_start).await;
        }
        let supervisor = SessionSupervisor::spawn(
            Arc::clone(&gateway),
            config.provider.reconnect_backoff(),
            config.provider.request_permission_on_start,
            &cancel,
        );

        // Device controller
        let device_config = DeviceConfig::new(config.device.cache_dir())
            .with_retry(config.device.retry_policy());
        let controller = Arc::new(DeviceController::new(Arc::clone(&gateway), device_config));

        // Application scanner; registries see the empty snapshot until it reports
        let snapshot = SnapshotHandle::new();
        let scanner = Arc::new(AppScanner::new(packages, snapshot.clone()))
            .spawn(config.scanner.refresh_interval(), cancel);

        // Registries
        let mut tools = ToolRegistry::new(Arc::clone(&gateway));
        register_builtin_tools(&mut tools, Arc::clone(&controller), snapshot.clone())
            .context("Failed to register built-in tools")?;
        let tools = Arc::new(tools);
        info!("Tool registry initialized with {} tools", tools.len());

        let mut skills = SkillRegistry::new(Arc::clone(&tools));
        register_builtin_skills(&mut skills).context("Failed to register built-in skills")?;
        info!("Skill registry initialized with {} skills", skills.len());

        Ok(Self {
            config,
            gateway,
            controller,
            snapshot,
            tools,
            skills,
            scanner,
            supervisor,
        })
    }

    /// Ids of the skills usable with the latest snapshot
    pub fn available_skills(&self) -> Vec<String> {
        self.skills
            .list_available(&self.snapshot.current())
            .into_iter()
            .map(|skill| skill.id.clone())
            .collect()
    }

    /// Stop the background tasks, then release the provider session
    pub async fn shutdown(self) {
        self.supervisor.shutdown().await;
        self.scanner.shutdown().await;
        self.gateway.shutdown().await;
        info!("Application context shut down");
    }
}

async fn connect(gateway: &SessionGateway, request_permission: bool) {
    match gateway.connect().await {
        Ok(state) => info!("Privileged session: {}", state),
        Err(e) => {
            warn!("Privileged provider not reachable at startup: {}", e);
            return;
        }
    }

    if request_permission {
        ask_permission(gateway).await;
    }
}
