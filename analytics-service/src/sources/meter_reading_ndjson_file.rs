use std::path::PathBuf;

use async_stream::try_stream;
use meter_client::domain::{MeterId, MeterReading};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// NDJSON file source for `MeterReading`.
///
/// Each non-blank line is a JSON object with an RFC3339 `ts`, an integer
/// `meter_id` and any of the optional measurement fields.
pub struct MeterReadingNdjsonFileSource {
    path: PathBuf,
}

#[derive(serde::Deserialize)]
struct NdjsonMeterReading {
    #[serde(with = "time::serde::rfc3339")]
    ts: time::OffsetDateTime,
    meter_id: MeterId,
    kwh: Option<f64>,
    kvah: Option<f64>,
    total_kva: Option<f64>,
    avg_vln: Option<f64>,
    avg_current: Option<f64>,
    power_factor: Option<f64>,
}

impl From<NdjsonMeterReading> for MeterReading {
    fn from(i: NdjsonMeterReading) -> Self {
        MeterReading {
            ts: i.ts,
            meter_id: i.meter_id,
            kwh: i.kwh,
            kvah: i.kvah,
            total_kva: i.total_kva,
            avg_vln: i.avg_vln,
            avg_current: i.avg_current,
            power_factor: i.power_factor,
        }
    }
}

impl MeterReadingNdjsonFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<MeterReading> for MeterReadingNdjsonFileSource {
    async fn stream(&self) -> EnvelopeStream<MeterReading> {
        let path = self.path.clone();
        let s = try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to open readings file: {e}"))
            })?;
            let reader = BufReader::new(file);
            let mut lines = reader.lines();

            while let Some(line) = lines.next_line().await.map_err(|e| {
                PipelineError::Source(format!("failed to read readings line: {e}"))
            })? {
                if line.trim().is_empty() {
                    continue;
                }
                let parsed: NdjsonMeterReading = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        metrics::counter!("reading_file_parse_errors_total", "format" => "ndjson")
                            .increment(1);
                        Err(PipelineError::Source(format!(
                            "failed to parse readings json line: {e}"
                        )))?
                    }
                };
                yield Envelope::now(MeterReading::from(parsed));
            }
        };

        Box::pin(s)
    }
}
