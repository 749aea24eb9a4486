//! Facility demand (kVA) per minute.
//!
//! Before the aggregate meter was commissioned, facility demand only exists
//! as the sum of the zone sub-meters sampled in the same minute. After the
//! cutover the aggregate meter reports it directly.

use std::collections::BTreeMap;

use meter_client::domain::{MeterId, MeterSelection, TimeWindow};
use serde::Serialize;
use time::{Duration, OffsetDateTime, UtcOffset};

use super::{local_minute, round_to, ReadingStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandMode {
    /// Legacy topology: sum the sub-meters per minute.
    SubMeterSum,
    /// Current topology: read the aggregate meter.
    AggregateMeter,
}

/// Which meters feed facility demand, and when that changed.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandTopology {
    pub sub_meters: MeterSelection,
    pub aggregate_meter: MeterId,
    pub cutover: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemandPlan {
    pub mode: DemandMode,
    pub meters: MeterSelection,
}

impl DemandTopology {
    /// Mode is keyed on the window start: only windows that open after the
    /// cutover read the aggregate meter. A window straddling the cutover is
    /// treated as legacy.
    pub fn plan(&self, window: &TimeWindow) -> DemandPlan {
        if window.start() > self.cutover {
            DemandPlan {
                mode: DemandMode::AggregateMeter,
                meters: MeterSelection::Single(self.aggregate_meter),
            }
        } else {
            DemandPlan {
                mode: DemandMode::SubMeterSum,
                meters: self.sub_meters.clone(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandSample {
    #[serde(with = "time::serde::rfc3339")]
    pub minute: OffsetDateTime,
    pub total_kva: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandSummary {
    pub mode: DemandMode,
    pub meters: Vec<MeterId>,
    /// Only minutes that had samples; there is no zero-fill.
    pub series: Vec<DemandSample>,
    pub peak: f64,
}

/// Per-minute demand over `window` and its peak.
pub fn compute_demand(
    readings: &ReadingStream,
    window: &TimeWindow,
    topology: &DemandTopology,
    offset: UtcOffset,
) -> DemandSummary {
    let plan = topology.plan(window);
    let mut buckets: BTreeMap<OffsetDateTime, f64> = BTreeMap::new();

    for (_, rows) in readings.selected(&plan.meters) {
        for r in rows.iter().filter(|r| window.contains(r.ts)) {
            let Some(kva) = r.total_kva.filter(|v| v.is_finite()) else {
                continue;
            };
            let minute = local_minute(r.ts, offset);
            match plan.mode {
                DemandMode::SubMeterSum => *buckets.entry(minute).or_insert(0.0) += kva,
                DemandMode::AggregateMeter => {
                    let slot = buckets.entry(minute).or_insert(kva);
                    if kva > *slot {
                        *slot = kva;
                    }
                }
            }
        }
    }

    let series: Vec<DemandSample> = buckets
        .into_iter()
        .map(|(minute, total)| DemandSample {
            minute,
            total_kva: round_to(total, 1),
        })
        .collect();

    tracing::debug!(
        mode = ?plan.mode,
        minutes = series.len(),
        "demand series computed"
    );

    DemandSummary {
        mode: plan.mode,
        meters: plan.meters.ids(),
        peak: peak_demand(&series),
        series,
    }
}

/// Largest bucket value, or 0 for an empty series.
pub fn peak_demand(series: &[DemandSample]) -> f64 {
    series.iter().map(|s| s.total_kva).fold(0.0, f64::max)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandAlert {
    pub id: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub minute: OffsetDateTime,
    pub total_kva: f64,
}

/// Minutes whose demand is strictly above `threshold_kva`, newest first.
pub fn peaks_above(series: &[DemandSample], threshold_kva: f64) -> Vec<DemandAlert> {
    series
        .iter()
        .rev()
        .filter(|s| s.total_kva > threshold_kva)
        .enumerate()
        .map(|(i, s)| DemandAlert {
            id: i + 1,
            minute: s.minute,
            total_kva: s.total_kva,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandBlock {
    #[serde(with = "time::serde::rfc3339")]
    pub block_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub block_end: OffsetDateTime,
    pub peak_kva: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub peak_at: OffsetDateTime,
}

/// Peak of each fixed-length block counted from `window_start`.
///
/// Blocks that contain no samples are left out.
pub fn block_peaks(
    series: &[DemandSample],
    window_start: OffsetDateTime,
    block: Duration,
) -> Vec<DemandBlock> {
    let block_secs = block.whole_seconds();
    if block_secs <= 0 {
        return Vec::new();
    }

    let mut blocks: BTreeMap<i64, (f64, OffsetDateTime)> = BTreeMap::new();
    for s in series {
        let index = (s.minute - window_start).whole_seconds().div_euclid(block_secs);
        match blocks.get_mut(&index) {
            Some(best) if s.total_kva > best.0 => *best = (s.total_kva, s.minute),
            Some(_) => {}
            None => {
                blocks.insert(index, (s.total_kva, s.minute));
            }
        }
    }

    blocks
        .into_iter()
        .map(|(index, (peak_kva, peak_at))| {
            let block_start = window_start + block * index as i32;
            DemandBlock {
                block_start,
                block_end: block_start + block,
                peak_kva,
                peak_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_client::domain::MeterReading;
    use time::macros::{datetime, offset};

    const IST: UtcOffset = offset!(+05:30);

    fn topology() -> DemandTopology {
        DemandTopology {
            sub_meters: MeterSelection::Range { first: 1, last: 11 },
            aggregate_meter: 12,
            cutover: datetime!(2025-05-15 00:00:00 +05:30),
        }
    }

    fn kva(meter_id: MeterId, ts: OffsetDateTime, value: f64) -> MeterReading {
        MeterReading::new(meter_id, ts).with_total_kva(value)
    }

    fn window(start: OffsetDateTime, end: OffsetDateTime) -> TimeWindow {
        TimeWindow::new(start, end).unwrap()
    }

    #[test]
    fn legacy_window_sums_sub_meters_per_minute() {
        let w = window(
            datetime!(2025-05-01 12:00:00 +05:30),
            datetime!(2025-05-01 13:00:00 +05:30),
        );
        let stream = ReadingStream::new(vec![
            kva(1, datetime!(2025-05-01 12:00:07 +05:30), 40.0),
            kva(2, datetime!(2025-05-01 12:00:53 +05:30), 60.0),
            kva(1, datetime!(2025-05-01 12:01:10 +05:30), 70.0),
            kva(2, datetime!(2025-05-01 12:01:40 +05:30), 80.0),
            kva(1, datetime!(2025-05-01 12:02:00 +05:30), 90.0),
            // Aggregate meter must not be consulted before the cutover.
            kva(12, datetime!(2025-05-01 12:00:30 +05:30), 999.0),
        ]);

        let summary = compute_demand(&stream, &w, &topology(), IST);

        assert_eq!(summary.mode, DemandMode::SubMeterSum);
        assert_eq!(summary.meters, (1..=11).collect::<Vec<_>>());
        let values: Vec<_> = summary.series.iter().map(|s| s.total_kva).collect();
        assert_eq!(values, vec![100.0, 150.0, 90.0]);
        assert_eq!(summary.series[0].minute, datetime!(2025-05-01 12:00:00 +05:30));
        assert_eq!(summary.peak, 150.0);
    }

    #[test]
    fn current_window_reads_aggregate_meter_only() {
        let w = window(
            datetime!(2025-06-01 12:00:00 +05:30),
            datetime!(2025-06-01 13:00:00 +05:30),
        );
        let stream = ReadingStream::new(vec![
            kva(12, datetime!(2025-06-01 12:00:10 +05:30), 210.0),
            kva(12, datetime!(2025-06-01 12:00:40 +05:30), 230.0),
            kva(12, datetime!(2025-06-01 12:01:10 +05:30), 220.0),
            kva(3, datetime!(2025-06-01 12:00:10 +05:30), 500.0),
        ]);

        let summary = compute_demand(&stream, &w, &topology(), IST);

        assert_eq!(summary.mode, DemandMode::AggregateMeter);
        assert_eq!(summary.meters, vec![12]);
        let values: Vec<_> = summary.series.iter().map(|s| s.total_kva).collect();
        assert_eq!(values, vec![230.0, 220.0]);
        assert_eq!(summary.peak, 230.0);
    }

    #[test]
    fn plan_differs_across_cutover() {
        let before = window(
            datetime!(2025-05-14 00:00:00 +05:30),
            datetime!(2025-05-15 00:00:00 +05:30),
        );
        let after = window(
            datetime!(2025-05-16 00:00:00 +05:30),
            datetime!(2025-05-17 00:00:00 +05:30),
        );
        let straddling = window(
            datetime!(2025-05-14 12:00:00 +05:30),
            datetime!(2025-05-15 12:00:00 +05:30),
        );

        let t = topology();
        assert_eq!(t.plan(&before).mode, DemandMode::SubMeterSum);
        assert_eq!(t.plan(&after).mode, DemandMode::AggregateMeter);
        assert_ne!(t.plan(&before).meters, t.plan(&after).meters);
        assert_eq!(t.plan(&straddling).mode, DemandMode::SubMeterSum);
    }

    #[test]
    fn readings_outside_window_or_without_kva_are_ignored() {
        let w = window(
            datetime!(2025-05-01 12:00:00 +05:30),
            datetime!(2025-05-01 12:05:00 +05:30),
        );
        let stream = ReadingStream::new(vec![
            kva(1, datetime!(2025-05-01 11:59:59 +05:30), 10.0),
            kva(1, datetime!(2025-05-01 12:05:00 +05:30), 10.0),
            MeterReading::new(1, datetime!(2025-05-01 12:01:00 +05:30)),
            kva(1, datetime!(2025-05-01 12:03:00 +05:30), 5.0),
        ]);

        let summary = compute_demand(&stream, &w, &topology(), IST);
        assert_eq!(summary.series.len(), 1);
        assert_eq!(summary.peak, 5.0);
    }

    #[test]
    fn minutes_without_samples_are_absent() {
        let w = window(
            datetime!(2025-06-01 12:00:00 +05:30),
            datetime!(2025-06-01 13:00:00 +05:30),
        );
        let stream = ReadingStream::new(vec![
            kva(12, datetime!(2025-06-01 12:00:20 +05:30), 300.0),
            kva(12, datetime!(2025-06-01 12:02:05 +05:30), 310.0),
        ]);

        let summary = compute_demand(&stream, &w, &topology(), IST);

        let minutes: Vec<_> = summary.series.iter().map(|s| s.minute).collect();
        assert_eq!(
            minutes,
            vec![
                datetime!(2025-06-01 12:00:00 +05:30),
                datetime!(2025-06-01 12:02:00 +05:30),
            ]
        );
        assert!(summary.series.iter().all(|s| s.total_kva > 0.0));
    }

    #[test]
    fn empty_input_gives_empty_series_and_zero_peak() {
        let w = window(
            datetime!(2025-05-01 00:00:00 +05:30),
            datetime!(2025-05-02 00:00:00 +05:30),
        );
        let summary = compute_demand(&ReadingStream::default(), &w, &topology(), IST);
        assert!(summary.series.is_empty());
        assert_eq!(summary.peak, 0.0);
        assert_eq!(peak_demand(&[]), 0.0);
    }

    fn sample(minute: OffsetDateTime, total_kva: f64) -> DemandSample {
        DemandSample { minute, total_kva }
    }

    #[test]
    fn alerts_are_newest_first_and_strictly_above() {
        let series = vec![
            sample(datetime!(2025-05-01 12:00:00 +05:30), 600.0),
            sample(datetime!(2025-05-01 12:01:00 +05:30), 596.0),
            sample(datetime!(2025-05-01 12:02:00 +05:30), 610.5),
        ];

        let alerts = peaks_above(&series, 596.0);

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].id, 1);
        assert_eq!(alerts[0].minute, datetime!(2025-05-01 12:02:00 +05:30));
        assert_eq!(alerts[1].total_kva, 600.0);
    }

    #[test]
    fn block_peaks_group_from_window_start() {
        let start = datetime!(2025-06-01 00:00:00 +05:30);
        let series = vec![
            sample(datetime!(2025-06-01 00:05:00 +05:30), 100.0),
            sample(datetime!(2025-06-01 00:10:00 +05:30), 140.0),
            sample(datetime!(2025-06-01 00:20:00 +05:30), 140.0),
            sample(datetime!(2025-06-01 01:15:00 +05:30), 90.0),
        ];

        let blocks = block_peaks(&series, start, Duration::minutes(30));

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].block_start, start);
        assert_eq!(blocks[0].block_end, datetime!(2025-06-01 00:30:00 +05:30));
        assert_eq!(blocks[0].peak_kva, 140.0);
        // First occurrence wins a tie.
        assert_eq!(blocks[0].peak_at, datetime!(2025-06-01 00:10:00 +05:30));
        assert_eq!(blocks[1].block_start, datetime!(2025-06-01 01:00:00 +05:30));
        assert_eq!(blocks[1].peak_kva, 90.0);
    }
}
