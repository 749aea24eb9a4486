use analytics_service::{
    analytics::AnalyticsFacade, cli, config::AppConfig, metrics_server, observability,
};
use anyhow::{bail, Context, Result};
use meter_client::{PgReadingStore, TimeWindow};
use std::env;

const USAGE: &str = "usage: analytics-service <dashboard|demand> <start> <end>";

async fn run(
    facade: &AnalyticsFacade<PgReadingStore>,
    command: &str,
    window: &TimeWindow,
) -> Result<String> {
    let json = match command {
        "dashboard" => serde_json::to_string_pretty(&facade.dashboard(window).await?)?,
        "demand" => serde_json::to_string_pretty(&facade.demand(window).await?)?,
        other => bail!("unknown report '{other}'; {USAGE}"),
    };
    Ok(json)
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        bail!(USAGE);
    }
    let command = args[1].as_str();
    let window = cli::parse_window(&args[2], &args[3])?;

    // Load configuration
    let cfg = AppConfig::load()?;
    let settings = cfg.engine_settings()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let db = cfg
        .database
        .as_ref()
        .context("config is missing the [database] section")?;
    let store = PgReadingStore::connect(&db.uri, db.max_connections).await?;

    let facade = AnalyticsFacade::new(store, settings);
    let report = run(&facade, command, &window).await;

    // Close the pool before surfacing any report error.
    facade.store().close().await;

    println!("{}", report?);
    Ok(())
}
