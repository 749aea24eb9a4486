pub mod meter_reading_csv_file;
pub mod meter_reading_ndjson_file;

pub use meter_reading_csv_file::MeterReadingCsvFileSource;
pub use meter_reading_ndjson_file::MeterReadingNdjsonFileSource;

use std::{path::Path, sync::Arc};

use meter_client::domain::MeterReading;

use crate::{
    pipeline::{Pipeline, PipelineError, Transform},
    transform::MeterReadingValidation,
};

/// Load and validate readings from a `.csv` or `.ndjson`/`.jsonl` file.
///
/// Rows that fail validation are dropped; unreadable files and unparsable
/// rows fail the whole load.
pub async fn load_readings(path: &Path) -> Result<Vec<MeterReading>, PipelineError> {
    let validation: Arc<dyn Transform<MeterReading, MeterReading> + Send + Sync> =
        Arc::new(MeterReadingValidation);
    let transforms = vec![validation];

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let readings = match extension.as_deref() {
        Some("csv") => {
            Pipeline {
                source: MeterReadingCsvFileSource::new(path),
                transforms,
            }
            .collect()
            .await?
        }
        Some("ndjson") | Some("jsonl") => {
            Pipeline {
                source: MeterReadingNdjsonFileSource::new(path),
                transforms,
            }
            .collect()
            .await?
        }
        _ => {
            return Err(PipelineError::Source(format!(
                "unsupported readings file '{}', expected .csv or .ndjson",
                path.display()
            )))
        }
    };

    tracing::info!(path = %path.display(), readings = readings.len(), "readings file loaded");
    Ok(readings)
}
