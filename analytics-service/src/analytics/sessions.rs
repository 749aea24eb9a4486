//! Generator run-session detection from a cumulative kWh register.
//!
//! A generator is taken to be running while its kWh counter keeps rising
//! between samples that are no further apart than the sampling gap
//! threshold. An exactly equal consecutive value ends the session, even when
//! it is just two samples landing before the next increment.

use meter_client::domain::{MeterId, MeterReading};
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use super::round_to;

/// Sampling gap beyond which two readings are no longer considered part of
/// the same run.
pub const DEFAULT_MAX_SAMPLE_GAP: Duration = Duration::seconds(300);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSession {
    pub meter_id: MeterId,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
    pub start_kwh: f64,
    pub end_kwh: f64,
    pub energy_delta: f64,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    meter_id: MeterId,
    ts: OffsetDateTime,
    kwh: f64,
}

impl RunSession {
    fn between(start: Sample, end: Sample) -> Self {
        Self {
            meter_id: start.meter_id,
            start: start.ts,
            end: end.ts,
            start_kwh: start.kwh,
            end_kwh: end.kwh,
            energy_delta: (end.kwh - start.kwh).max(0.0),
            duration_seconds: (end.ts - start.ts).whole_seconds(),
        }
    }
}

/// Detect run sessions in one meter's readings.
///
/// Readings without a finite kWh value are skipped. Input order does not
/// matter; samples are sorted by timestamp first.
pub fn detect_run_sessions(readings: &[MeterReading], max_gap: Duration) -> Vec<RunSession> {
    let mut samples: Vec<Sample> = readings
        .iter()
        .filter_map(|r| {
            r.kwh.filter(|v| v.is_finite()).map(|kwh| Sample {
                meter_id: r.meter_id,
                ts: r.ts,
                kwh,
            })
        })
        .collect();
    samples.sort_by_key(|s| s.ts);

    let mut sessions = Vec::new();
    let Some(&last) = samples.last() else {
        return sessions;
    };

    let mut open: Option<Sample> = None;
    for pair in samples.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        let rising = curr.kwh > prev.kwh && curr.ts - prev.ts <= max_gap;

        if rising {
            open.get_or_insert(prev);
        } else if let Some(start) = open.take() {
            sessions.push(RunSession::between(start, prev));
        }
    }

    if let Some(start) = open {
        sessions.push(RunSession::between(start, last));
    }

    sessions
}

/// Total running time across a set of sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunningTime {
    pub total_seconds: i64,
    /// Rounded to the nearest minute.
    pub minutes: i64,
    /// Rounded to two decimals.
    pub hours: f64,
}

impl RunningTime {
    pub fn from_sessions(sessions: &[RunSession]) -> Self {
        let total_seconds: i64 = sessions.iter().map(|s| s.duration_seconds).sum();
        let minutes = total_seconds as f64 / 60.0;
        Self {
            total_seconds,
            minutes: minutes.round() as i64,
            hours: round_to(minutes / 60.0, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorEventKind {
    Started,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratorEvent {
    pub meter_id: MeterId,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: GeneratorEventKind,
    pub kwh: f64,
}

/// Start/stop events for a set of sessions, in time order.
pub fn session_events(sessions: &[RunSession]) -> Vec<GeneratorEvent> {
    let mut events: Vec<GeneratorEvent> = sessions
        .iter()
        .flat_map(|s| {
            [
                GeneratorEvent {
                    meter_id: s.meter_id,
                    ts: s.start,
                    kind: GeneratorEventKind::Started,
                    kwh: s.start_kwh,
                },
                GeneratorEvent {
                    meter_id: s.meter_id,
                    ts: s.end,
                    kind: GeneratorEventKind::Stopped,
                    kwh: s.end_kwh,
                },
            ]
        })
        .collect();
    events.sort_by(|a, b| a.ts.cmp(&b.ts).then(a.meter_id.cmp(&b.meter_id)));
    events
}
