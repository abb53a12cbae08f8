mod config;
mod context;
mod service;
mod supervisor;

use anyhow::Result;
use config::Config;
use service::AgentService;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Wire components and run until interrupted
    let agent = AgentService::new(config);
    agent.run().await
}
