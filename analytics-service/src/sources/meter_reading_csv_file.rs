use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use meter_client::domain::MeterReading;
use time::OffsetDateTime;

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// CSV file source for `MeterReading`.
///
/// Expected header columns (by name):
/// - ts (RFC3339 timestamp)
/// - meter_id
/// - kwh (optional)
/// - kvah (optional)
/// - total_kva (optional)
/// - avg_vln (optional)
/// - avg_current (optional)
/// - power_factor (optional)
///
/// Optional columns may be absent from the header or left blank per row.
pub struct MeterReadingCsvFileSource {
    path: PathBuf,
}

impl MeterReadingCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn parse_optional_f64(name: &str, s: &str) -> Result<Option<f64>, PipelineError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|e| PipelineError::Source(format!("invalid {name} '{trimmed}': {e}")))
}

fn record_to_meter_reading(
    record: &StringRecord,
    headers: &StringRecord,
) -> Result<MeterReading, PipelineError> {
    let get = |name: &str| -> Option<&str> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
    };
    let required = |name: &str| -> Result<&str, PipelineError> {
        get(name).ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in CSV record")))
    };
    let optional = |name: &str| parse_optional_f64(name, get(name).unwrap_or(""));

    let ts_str = required("ts")?;
    let ts = OffsetDateTime::parse(ts_str.trim(), &time::format_description::well_known::Rfc3339)
        .map_err(|e| PipelineError::Source(format!("invalid ts '{ts_str}': {e}")))?;

    let meter_str = required("meter_id")?;
    let meter_id = meter_str
        .trim()
        .parse()
        .map_err(|e| PipelineError::Source(format!("invalid meter_id '{meter_str}': {e}")))?;

    Ok(MeterReading {
        ts,
        meter_id,
        kwh: optional("kwh")?,
        kvah: optional("kvah")?,
        total_kva: optional("total_kva")?,
        avg_vln: optional("avg_vln")?,
        avg_current: optional("avg_current")?,
        power_factor: optional("power_factor")?,
    })
}

#[async_trait::async_trait]
impl Source<MeterReading> for MeterReadingCsvFileSource {
    async fn stream(&self) -> EnvelopeStream<MeterReading> {
        // Blocking CSV reader inside one async task; export files are small.
        let path = self.path.clone();
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open CSV file: {e}")))?;
            let mut rdr = csv::Reader::from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
                .clone();

            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read CSV record: {e}"
                )))?;

                let reading = match record_to_meter_reading(&record, &headers) {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("reading_file_parse_errors_total", "format" => "csv")
                            .increment(1);
                        Err(e)?
                    }
                };

                yield Envelope::now(reading);
            }
        };

        Box::pin(s)
    }
}
