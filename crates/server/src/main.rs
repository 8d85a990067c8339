//! TestWatch daemon
//!
//! Schedules browser-test runs, supervises the test-runner subprocess, and
//! serves the monitoring API.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use testwatch_common::WatchConfig;
use testwatch_server::server::Service;
use testwatch_server::state::AppState;

#[derive(Parser)]
#[command(name = "testwatchd")]
#[command(about = "TestWatch - scheduled browser-test runs and site health checks")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "testwatch.toml")]
    config: PathBuf,

    /// Listen address (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("TestWatch v{}", env!("CARGO_PKG_VERSION"));

    let mut config = WatchConfig::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    let addr: SocketAddr = config.server.listen.parse()?;
    info!(
        sites = config.sites.len(),
        projects = config.runner.projects.len(),
        "configuration loaded"
    );

    let state = AppState::new(config);
    let service = Service::new(state)?;
    service.serve(addr).await
}
