use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use dlhd_edge::{AppConfig, EdgeApplicationServer, Logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards have to live as long as the process or buffered logs get lost
    let _guards = Logger::init(config.cargo_env, config.sentry_dsn.clone());

    info!(
        "logger and env prepped, starting dlhd edge v{}...",
        dlhd_edge::get_app_version()
    );

    EdgeApplicationServer::serve(config)
        .await
        .context("edge server failed to start")?;

    Ok(())
}
