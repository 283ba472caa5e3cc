use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use heartbeat::{
    config::{Config, apply_seed, read_config_file},
    monitor::{Monitor, MonitorSettings},
    ssh::RusshConnector,
    storage::build_storage,
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("heartbeat", LevelFilter::TRACE),
        ("heartbeat_hub", LevelFilter::TRACE),
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

fn settings(config: &Config) -> MonitorSettings {
    MonitorSettings {
        status_period: Duration::from_secs(config.board.status_interval_secs.max(1)),
        resource_period: Duration::from_secs(config.board.resource_interval_secs.max(1)),
        max_chart_bars: config
            .board
            .max_chart_bars
            .unwrap_or_else(heartbeat::util::get_max_chart_bars),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let storage = build_storage(config.storage.as_ref()).await?;
    let seeded = apply_seed(storage.as_ref(), &config.servers).await?;
    if seeded > 0 {
        info!("registered {seeded} record(s) from the config file");
    }

    let monitor = Arc::new(Monitor::new(
        storage.clone(),
        Arc::new(RusshConnector::new()),
        settings(&config),
    ));
    monitor.start().await?;

    #[cfg(feature = "api")]
    {
        use heartbeat::api::{ApiConfig, ApiState, spawn_api_server};

        if let Some(api) = &config.api {
            let api_config = ApiConfig::from_settings(api)?;
            spawn_api_server(api_config, ApiState::new(monitor.clone())).await?;
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    monitor.shutdown().await;
    if let Err(e) = storage.close().await {
        error!("failed to close storage: {e}");
    }

    Ok(())
}
