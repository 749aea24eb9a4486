use analytics_service::{
    analytics::AnalyticsFacade, cli, config::AppConfig, observability, sources::load_readings,
};
use anyhow::{bail, Result};
use meter_client::MemoryReadingStore;
use std::{env, path::Path};

/// Offline dashboard over a CSV or NDJSON export; no database involved.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        bail!("usage: analyze_readings_file <readings.csv|readings.ndjson> <start> <end>");
    }
    let window = cli::parse_window(&args[2], &args[3])?;

    // ANALYTICS_CONFIG may point at a site file; otherwise built-in defaults.
    let settings = AppConfig::load_or_default()?.engine_settings()?;

    let store = MemoryReadingStore::new(load_readings(Path::new(&args[1])).await?);
    if store.is_empty() {
        tracing::warn!(path = %args[1], "no usable readings in file");
    } else {
        tracing::info!(path = %args[1], readings = store.len(), "readings loaded");
    }
    let facade = AnalyticsFacade::new(store, settings);

    let report = facade.dashboard(&window).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
