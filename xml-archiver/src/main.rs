//! Background agent that archives settled XML files.
//!
//! Startup order matters: the singleton lock is taken before anything else,
//! so a second instance exits without ever touching the archive.

use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xml_archiver::{
    agent::Agent, config::AgentConfig, instance::InstanceLock,
    watch::XmlWriteWatcher,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("xml_archiver=info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = AgentConfig::default()
        .with_env_overrides()
        .context("Invalid configuration")?;

    let _lock = InstanceLock::acquire(&config.lock_name)?;

    let mut watcher = XmlWriteWatcher::new()?;
    watcher.watch(&config.watch_dir)?;

    let running = Agent::new(config)
        .context("Invalid archive path")?
        .spawn(Some(watcher));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Shutting down");
    running.shutdown().await;

    Ok(())
}
