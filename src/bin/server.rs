use anyhow::Context;
use clap::Parser;
use fleet_sentinel::{
    actors::registry::RegistryHandle,
    alerts::AlertDispatcher,
    api::{ApiConfig, ApiState, spawn_api_server},
    config,
};
use tokio::sync::broadcast;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Snapshots kept for slow dashboard clients
const DASHBOARD_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Parser)]
#[command(name = "sentinel-server", about = "Fleet health-monitoring server")]
struct Args {
    /// Config file (defaults to ./server-config.json when present)
    #[arg(short, long)]
    file: Option<String>,

    /// Disable every alert provider
    #[arg(long)]
    no_alert: bool,

    /// Override the configured logging level
    #[arg(long)]
    log_level: Option<String>,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleet_sentinel", level),
        ("sentinel_server", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::load(args.file.as_deref()).context("failed to load configuration")?;
    if let Some(level) = &args.log_level {
        config.logging_level = level.clone();
    }

    init(config.log_level()?);
    trace!("started with args: {args:?}");

    let settings = config.monitoring_settings()?;
    let alerts = AlertDispatcher::from_config(&config, args.no_alert)?;
    info!(
        "probes degrade after {:?} of inactivity, alert dispatcher: {alerts:?}",
        settings.inactivity_delay
    );

    let dashboard_tx = if config.dashboard {
        Some(broadcast::channel(DASHBOARD_CHANNEL_CAPACITY).0)
    } else {
        warn!("dashboard is disabled");
        None
    };

    let registry = RegistryHandle::spawn(settings, alerts, dashboard_tx.clone());

    let api_config = ApiConfig::from_config(&config);
    let addr = spawn_api_server(api_config, ApiState::new(registry.clone(), dashboard_tx)).await?;
    info!("accepting reports on {addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutting down");
    registry.shutdown().await?;

    Ok(())
}
