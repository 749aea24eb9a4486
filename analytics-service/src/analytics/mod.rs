//! Meter telemetry analytics.
//!
//! Everything under this module is a pure computation over readings that
//! were already fetched. The only async code is in [`facade`], which pulls
//! readings from a [`meter_client::ReadingStore`] and fans them out.

pub mod consumption;
pub mod demand;
pub mod facade;
pub mod sessions;
pub mod stream;
pub mod tariff;
pub mod zones;

pub use consumption::{
    counter_delta, detect_counter_resets, hourly_consumption, meter_consumption,
    total_consumption, CounterKind, CounterReset, HourlyConsumption,
};
pub use demand::{
    block_peaks, compute_demand, peak_demand, peaks_above, DemandAlert, DemandBlock, DemandMode,
    DemandPlan, DemandSample, DemandSummary, DemandTopology,
};
pub use facade::{
    AnalyticsError, AnalyticsFacade, AnalyticsWarning, DashboardReport, DemandReport,
    ElectricalSnapshot, EngineSettings, GeneratorReport,
};
pub use sessions::{
    detect_run_sessions, session_events, GeneratorEvent, GeneratorEventKind, RunSession,
    RunningTime,
};
pub use stream::ReadingStream;
pub use tariff::{
    compute_tariff_cost, hourly_cost, BandCost, HourlyCost, TariffBand, TariffCost, TariffError,
    TariffSchedule,
};
pub use zones::{rank_zones, ZoneConsumption, ZoneLeader, ZoneRanking};

use time::{Duration, OffsetDateTime, UtcOffset};

/// Truncate an instant to the start of its minute in facility-local time.
pub(crate) fn local_minute(ts: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
    let local = ts.to_offset(offset);
    local
        - Duration::seconds(i64::from(local.second()))
        - Duration::nanoseconds(i64::from(local.nanosecond()))
}

/// Truncate an instant to the start of its hour in facility-local time.
pub(crate) fn local_hour(ts: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
    let minute = local_minute(ts, offset);
    minute - Duration::minutes(i64::from(minute.minute()))
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn local_minute_truncates_in_facility_offset() {
        let ts = datetime!(2025-06-01 06:30:53.250 UTC);
        let minute = local_minute(ts, offset!(+05:30));
        assert_eq!(minute, datetime!(2025-06-01 12:00:00 +05:30));
        assert_eq!(minute.offset(), offset!(+05:30));
    }

    #[test]
    fn local_hour_truncates_minutes_too() {
        let ts = datetime!(2025-06-01 12:47:07 +05:30);
        assert_eq!(
            local_hour(ts, offset!(+05:30)),
            datetime!(2025-06-01 12:00:00 +05:30)
        );
    }

    #[test]
    fn round_to_handles_binary_fractions() {
        assert_eq!(round_to(60.35000000000001, 2), 60.35);
        assert_eq!(round_to(4.96, 1), 5.0);
        assert_eq!(round_to(0.0, 1), 0.0);
    }
}
