//! Consumption from cumulative registers.

use std::collections::BTreeMap;

use meter_client::domain::{MeterId, MeterReading, MeterSelection};
use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};

use super::{local_hour, round_to, ReadingStream, ZoneConsumption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    /// Cumulative kWh.
    Active,
    /// Cumulative kVAh.
    Apparent,
}

impl CounterKind {
    pub fn value(self, reading: &MeterReading) -> Option<f64> {
        match self {
            Self::Active => reading.kwh,
            Self::Apparent => reading.kvah,
        }
    }
}

/// `max - min` over the strictly positive, finite values.
///
/// Zero and missing register reads are treated as unset samples, so a meter
/// with nothing usable yields `None` rather than a zero delta.
pub fn counter_delta<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    values
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
        })
        .map(|(lo, hi)| hi - lo)
}

fn meter_deltas(
    readings: &ReadingStream,
    selection: &MeterSelection,
    kind: CounterKind,
) -> Vec<(MeterId, f64)> {
    readings
        .selected(selection)
        .map(|(meter_id, rows)| {
            let delta = counter_delta(rows.iter().filter_map(|r| kind.value(r)));
            (meter_id, delta.unwrap_or(0.0))
        })
        .collect()
}

/// Per-meter consumption, rounded to one decimal, in meter-id order.
pub fn meter_consumption(
    readings: &ReadingStream,
    selection: &MeterSelection,
    kind: CounterKind,
) -> Vec<ZoneConsumption> {
    meter_deltas(readings, selection, kind)
        .into_iter()
        .map(|(meter_id, delta)| ZoneConsumption {
            meter_id,
            consumption: round_to(delta, 1),
        })
        .collect()
}

/// Summed consumption across the selection, rounded once at the end.
pub fn total_consumption(
    readings: &ReadingStream,
    selection: &MeterSelection,
    kind: CounterKind,
) -> f64 {
    let total: f64 = meter_deltas(readings, selection, kind)
        .into_iter()
        .map(|(_, delta)| delta)
        .sum();
    round_to(total, 1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyConsumption {
    #[serde(with = "time::serde::rfc3339")]
    pub hour: OffsetDateTime,
    pub consumption: f64,
}

/// Consumption per local hour, summed over meters.
pub fn hourly_consumption(
    readings: &ReadingStream,
    selection: &MeterSelection,
    kind: CounterKind,
    offset: UtcOffset,
) -> Vec<HourlyConsumption> {
    let mut per_hour: BTreeMap<OffsetDateTime, f64> = BTreeMap::new();

    for (_, rows) in readings.selected(selection) {
        // Rows are time-ordered, so each hour is one contiguous run.
        for hour_rows in rows.chunk_by(|a, b| local_hour(a.ts, offset) == local_hour(b.ts, offset)) {
            let hour = local_hour(hour_rows[0].ts, offset);
            let delta = counter_delta(hour_rows.iter().filter_map(|r| kind.value(r)));
            *per_hour.entry(hour).or_insert(0.0) += round_to(delta.unwrap_or(0.0), 1);
        }
    }

    per_hour
        .into_iter()
        .map(|(hour, consumption)| HourlyConsumption {
            hour,
            consumption: round_to(consumption, 1),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterReset {
    pub meter_id: MeterId,
    pub counter: CounterKind,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub before: f64,
    pub after: f64,
}

/// Every point where a register went backwards between consecutive usable
/// samples of the same meter.
pub fn detect_counter_resets(readings: &ReadingStream, kind: CounterKind) -> Vec<CounterReset> {
    let mut resets = Vec::new();

    for (meter_id, rows) in readings.by_meter() {
        let mut prev: Option<f64> = None;
        for r in rows {
            let Some(value) = kind.value(r).filter(|v| v.is_finite() && *v > 0.0) else {
                continue;
            };
            if let Some(before) = prev {
                if value < before {
                    resets.push(CounterReset {
                        meter_id,
                        counter: kind,
                        at: r.ts,
                        before,
                        after: value,
                    });
                }
            }
            prev = Some(value);
        }
    }

    resets
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    fn reading(meter_id: MeterId, ts: OffsetDateTime, kwh: f64, kvah: f64) -> MeterReading {
        MeterReading::new(meter_id, ts).with_kwh(kwh).with_kvah(kvah)
    }

    fn sub_meters() -> MeterSelection {
        MeterSelection::Range { first: 1, last: 11 }
    }

    #[test]
    fn counter_delta_ignores_unset_samples() {
        assert_eq!(counter_delta([0.0, 10.0, 12.5, f64::NAN, 11.0]), Some(2.5));
        assert_eq!(counter_delta([0.0, -1.0]), None);
        assert_eq!(counter_delta(std::iter::empty()), None);
        assert_eq!(counter_delta([7.0]), Some(0.0));
    }

    #[test]
    fn per_meter_and_total_consumption() {
        let stream = ReadingStream::new(vec![
            reading(1, datetime!(2025-06-01 10:00:00 +05:30), 100.0, 120.0),
            reading(1, datetime!(2025-06-01 11:00:00 +05:30), 104.24, 125.0),
            reading(2, datetime!(2025-06-01 10:00:00 +05:30), 50.0, 60.0),
            reading(2, datetime!(2025-06-01 11:00:00 +05:30), 51.02, 61.5),
            reading(12, datetime!(2025-06-01 10:00:00 +05:30), 1.0, 1.0),
            reading(12, datetime!(2025-06-01 11:00:00 +05:30), 900.0, 900.0),
        ]);

        let per_meter = meter_consumption(&stream, &sub_meters(), CounterKind::Apparent);
        assert_eq!(
            per_meter,
            vec![
                ZoneConsumption { meter_id: 1, consumption: 5.0 },
                ZoneConsumption { meter_id: 2, consumption: 1.5 },
            ]
        );

        // 4.24 + 1.02 summed before rounding.
        assert_eq!(total_consumption(&stream, &sub_meters(), CounterKind::Active), 5.3);
        assert_eq!(total_consumption(&stream, &sub_meters(), CounterKind::Apparent), 6.5);
    }

    #[test]
    fn meter_without_usable_samples_reports_zero() {
        let stream = ReadingStream::new(vec![MeterReading::new(
            4,
            datetime!(2025-06-01 10:00:00 +05:30),
        )]);
        let per_meter = meter_consumption(&stream, &sub_meters(), CounterKind::Active);
        assert_eq!(per_meter, vec![ZoneConsumption { meter_id: 4, consumption: 0.0 }]);
    }

    #[test]
    fn hourly_consumption_sums_meters_per_local_hour() {
        let stream = ReadingStream::new(vec![
            reading(1, datetime!(2025-06-01 04:30:00 UTC), 10.0, 10.0),
            reading(1, datetime!(2025-06-01 04:59:00 UTC), 12.0, 12.0),
            reading(2, datetime!(2025-06-01 04:35:00 UTC), 20.0, 20.0),
            reading(2, datetime!(2025-06-01 04:50:00 UTC), 20.5, 20.5),
            reading(1, datetime!(2025-06-01 05:30:00 UTC), 13.0, 13.0),
            reading(1, datetime!(2025-06-01 05:45:00 UTC), 14.0, 14.0),
        ]);

        let hourly = hourly_consumption(
            &stream,
            &sub_meters(),
            CounterKind::Active,
            offset!(+05:30),
        );

        assert_eq!(
            hourly,
            vec![
                HourlyConsumption {
                    hour: datetime!(2025-06-01 10:00:00 +05:30),
                    consumption: 2.5,
                },
                HourlyConsumption {
                    hour: datetime!(2025-06-01 11:00:00 +05:30),
                    consumption: 1.0,
                },
            ]
        );
    }

    #[test]
    fn resets_are_reported_per_meter() {
        let stream = ReadingStream::new(vec![
            reading(1, datetime!(2025-06-01 10:00:00 +05:30), 500.0, 500.0),
            reading(1, datetime!(2025-06-01 10:01:00 +05:30), 501.0, 501.0),
            reading(1, datetime!(2025-06-01 10:02:00 +05:30), 2.0, 2.0),
            reading(1, datetime!(2025-06-01 10:03:00 +05:30), 3.0, 3.0),
            reading(2, datetime!(2025-06-01 10:00:00 +05:30), 10.0, 10.0),
            // Unset read between two good ones is not a reset.
            reading(2, datetime!(2025-06-01 10:01:00 +05:30), 0.0, 0.0),
            reading(2, datetime!(2025-06-01 10:02:00 +05:30), 11.0, 11.0),
        ]);

        let resets = detect_counter_resets(&stream, CounterKind::Active);

        assert_eq!(resets.len(), 1);
        assert_eq!(resets[0].meter_id, 1);
        assert_eq!(resets[0].before, 501.0);
        assert_eq!(resets[0].after, 2.0);
        assert_eq!(resets[0].at, datetime!(2025-06-01 10:02:00 +05:30));
    }

    #[test]
    fn empty_stream_is_safe() {
        let stream = ReadingStream::default();
        assert!(meter_consumption(&stream, &sub_meters(), CounterKind::Apparent).is_empty());
        assert_eq!(total_consumption(&stream, &sub_meters(), CounterKind::Active), 0.0);
        assert!(hourly_consumption(&stream, &sub_meters(), CounterKind::Active, offset!(+05:30))
            .is_empty());
        assert!(detect_counter_resets(&stream, CounterKind::Active).is_empty());
    }
}
