use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;

use ss_coordinator::cli::Cli;
use ss_coordinator::config::AppConfig;
use ss_coordinator::coordinator::Coordinator;
use ss_coordinator::ss::build_cipher;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; -d raises the level to debug
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .init();

    if cli.plugin_addr.is_empty() {
        bail!("plugin address is nil");
    }
    if cli.control_addr.is_empty() {
        bail!("client control address is nil");
    }
    if cli.data_addr.is_empty() {
        bail!("client data address is nil");
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    let cipher = build_cipher(&config.method, &config.password)?;

    let mut coordinator = Coordinator::new(
        cli.plugin_addr,
        cli.control_addr,
        cli.data_addr,
        cipher,
        config.timing(),
    )
    .await?;

    // ctrl-c 走干净取消，事件循环以 Ok 返回
    let cancel = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
            cancel.cancel();
        }
    });

    coordinator.run().await?;

    Ok(())
}
