use analytics_service::{analytics::AnalyticsFacade, cli, config::AppConfig, observability};
use anyhow::{bail, Context, Result};
use meter_client::{MeterId, PgReadingStore};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        bail!("usage: generator_runtime <meter_id> <start> <end>");
    }
    let meter_id: MeterId = args[1]
        .parse()
        .with_context(|| format!("invalid meter_id '{}'", args[1]))?;
    let window = cli::parse_window(&args[2], &args[3])?;

    let cfg = AppConfig::load()?;
    let settings = cfg.engine_settings()?;
    let db = cfg
        .database
        .as_ref()
        .context("config is missing the [database] section")?;

    let store = PgReadingStore::connect(&db.uri, db.max_connections).await?;
    let facade = AnalyticsFacade::new(store, settings);

    let report = facade.generator(meter_id, &window).await;
    facade.store().close().await;
    let report = report?;

    tracing::info!(
        meter_id,
        running_hours = report.running_time.hours,
        energy_kwh = report.energy_kwh,
        "generator runtime"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
