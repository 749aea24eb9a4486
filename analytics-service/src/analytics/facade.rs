use std::time::Instant;

use meter_client::{MeterId, MeterReading, MeterSelection, ReadingStore, StoreError, TimeWindow};
use serde::Serialize;
use time::{macros::datetime, Duration, OffsetDateTime, UtcOffset};

use super::{
    block_peaks, compute_demand, compute_tariff_cost, counter_delta, detect_counter_resets,
    detect_run_sessions, hourly_consumption, hourly_cost, meter_consumption, peaks_above,
    rank_zones, round_to, session_events, sessions::DEFAULT_MAX_SAMPLE_GAP, total_consumption,
    CounterKind, CounterReset, DemandAlert, DemandBlock, DemandSummary, DemandTopology,
    GeneratorEvent, HourlyConsumption, HourlyCost, ReadingStream, RunSession, RunningTime,
    TariffCost, TariffSchedule, ZoneConsumption, ZoneRanking,
};

#[derive(thiserror::Error, Debug)]
pub enum AnalyticsError {
    #[error("reading store error: {0}")]
    Store(#[from] StoreError),
    #[error("meter {0} is not configured as a generator")]
    UnknownGenerator(MeterId),
}

/// Reference data the engine computes against.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Offset of facility-local time, used for minute/hour/day bucketing.
    pub offset: UtcOffset,
    pub sub_meters: MeterSelection,
    pub aggregate_meter: MeterId,
    pub generator_meters: Vec<MeterId>,
    pub demand_cutover: OffsetDateTime,
    pub max_sample_gap: Duration,
    pub demand_alert_threshold_kva: f64,
    pub demand_block: Duration,
    pub tariff: TariffSchedule,
}

impl EngineSettings {
    pub fn demand_topology(&self) -> DemandTopology {
        DemandTopology {
            sub_meters: self.sub_meters.clone(),
            aggregate_meter: self.aggregate_meter,
            cutover: self.demand_cutover,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            offset: time::macros::offset!(+05:30),
            sub_meters: MeterSelection::Range { first: 1, last: 11 },
            aggregate_meter: 12,
            generator_meters: vec![13, 14],
            demand_cutover: datetime!(2025-05-15 00:00:00 +05:30),
            max_sample_gap: DEFAULT_MAX_SAMPLE_GAP,
            demand_alert_threshold_kva: 596.0,
            demand_block: Duration::minutes(30),
            tariff: TariffSchedule::default(),
        }
    }
}

/// Non-fatal data-quality findings attached to a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyticsWarning {
    CounterReset(CounterReset),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub window: TimeWindow,
    pub consumption_kvah: f64,
    pub consumption_kwh: f64,
    pub demand: DemandSummary,
    pub tariff: TariffCost,
    pub zones: ZoneRanking,
    pub meter_wise_consumption: Vec<ZoneConsumption>,
    pub hourly_consumption: Vec<HourlyConsumption>,
    pub hourly_cost: Vec<HourlyCost>,
    pub warnings: Vec<AnalyticsWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandReport {
    pub window: TimeWindow,
    pub summary: DemandSummary,
    pub alert_threshold_kva: f64,
    pub alerts: Vec<DemandAlert>,
    pub blocks: Vec<DemandBlock>,
}

/// Latest electrical values reported by a meter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectricalSnapshot {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub avg_vln: Option<f64>,
    pub avg_current: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratorReport {
    pub meter_id: MeterId,
    pub window: TimeWindow,
    pub energy_kwh: f64,
    pub latest: Option<ElectricalSnapshot>,
    pub hourly_kwh: Vec<HourlyConsumption>,
    pub sessions: Vec<RunSession>,
    pub running_time: RunningTime,
    pub events: Vec<GeneratorEvent>,
    pub warnings: Vec<AnalyticsWarning>,
}

/// Entry point for report consumers. Owns the store handle and the
/// settings; every call is independent and safe to retry.
pub struct AnalyticsFacade<S> {
    store: S,
    settings: EngineSettings,
}

impl<S: ReadingStore> AnalyticsFacade<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn dashboard(&self, window: &TimeWindow) -> Result<DashboardReport, AnalyticsError> {
        let started = Instant::now();
        let settings = &self.settings;
        let topology = settings.demand_topology();
        let plan = topology.plan(window);
        let aggregate = MeterSelection::Single(settings.aggregate_meter);

        let (sub_rows, aggregate_rows, demand_rows) = tokio::try_join!(
            self.store.fetch_readings(&settings.sub_meters, window),
            self.store.fetch_readings(&aggregate, window),
            self.store.fetch_readings(&plan.meters, window)
        )?;

        let sub = ReadingStream::new(sub_rows.clone());
        let all = ReadingStream::new(sub_rows.into_iter().chain(aggregate_rows).collect());
        let demand = compute_demand(
            &ReadingStream::new(demand_rows),
            window,
            &topology,
            settings.offset,
        );

        let sub_consumption = meter_consumption(&sub, &settings.sub_meters, CounterKind::Apparent);
        let everything = MeterSelection::List(all.meter_ids());

        let report = DashboardReport {
            window: *window,
            consumption_kvah: total_consumption(&sub, &settings.sub_meters, CounterKind::Apparent),
            consumption_kwh: total_consumption(&sub, &settings.sub_meters, CounterKind::Active),
            demand,
            tariff: compute_tariff_cost(&sub, window, &settings.tariff, settings.offset),
            zones: rank_zones(&sub_consumption),
            meter_wise_consumption: meter_consumption(&all, &everything, CounterKind::Apparent),
            hourly_consumption: hourly_consumption(
                &sub,
                &settings.sub_meters,
                CounterKind::Apparent,
                settings.offset,
            ),
            hourly_cost: hourly_cost(&sub, window, &settings.tariff, settings.offset),
            warnings: counter_warnings(&all, &[CounterKind::Apparent, CounterKind::Active]),
        };

        record_duration("dashboard", started);
        tracing::info!(
            start = %window.start(),
            end = %window.end(),
            readings = all.len(),
            peak_kva = report.demand.peak,
            cost = report.tariff.total,
            "dashboard report computed"
        );
        Ok(report)
    }

    pub async fn demand(&self, window: &TimeWindow) -> Result<DemandReport, AnalyticsError> {
        let started = Instant::now();
        let settings = &self.settings;
        let topology = settings.demand_topology();
        let plan = topology.plan(window);

        let rows = self.store.fetch_readings(&plan.meters, window).await?;
        let summary = compute_demand(&ReadingStream::new(rows), window, &topology, settings.offset);
        let alerts = peaks_above(&summary.series, settings.demand_alert_threshold_kva);
        let blocks = block_peaks(&summary.series, window.start(), settings.demand_block);

        record_duration("demand", started);
        tracing::info!(
            mode = ?summary.mode,
            peak_kva = summary.peak,
            alerts = alerts.len(),
            "demand report computed"
        );

        Ok(DemandReport {
            window: *window,
            summary,
            alert_threshold_kva: settings.demand_alert_threshold_kva,
            alerts,
            blocks,
        })
    }

    pub async fn generator(
        &self,
        meter_id: MeterId,
        window: &TimeWindow,
    ) -> Result<GeneratorReport, AnalyticsError> {
        let started = Instant::now();
        let settings = &self.settings;
        if !settings.generator_meters.contains(&meter_id) {
            return Err(AnalyticsError::UnknownGenerator(meter_id));
        }

        let selection = MeterSelection::Single(meter_id);
        let stream = ReadingStream::new(self.store.fetch_readings(&selection, window).await?);
        let rows = stream.for_meter(meter_id);

        let sessions = detect_run_sessions(rows, settings.max_sample_gap);
        let running_time = RunningTime::from_sessions(&sessions);
        let events = session_events(&sessions);
        let energy = counter_delta(rows.iter().filter_map(|r| r.kwh)).unwrap_or(0.0);

        record_duration("generator", started);
        tracing::info!(
            meter_id,
            sessions = sessions.len(),
            running_minutes = running_time.minutes,
            "generator report computed"
        );

        Ok(GeneratorReport {
            meter_id,
            window: *window,
            energy_kwh: round_to(energy, 1),
            latest: rows.last().map(snapshot),
            hourly_kwh: hourly_consumption(
                &stream,
                &selection,
                CounterKind::Active,
                settings.offset,
            ),
            sessions,
            running_time,
            events,
            warnings: counter_warnings(&stream, &[CounterKind::Active]),
        })
    }
}

fn snapshot(reading: &MeterReading) -> ElectricalSnapshot {
    ElectricalSnapshot {
        ts: reading.ts,
        avg_vln: reading.avg_vln,
        avg_current: reading.avg_current,
    }
}

fn counter_warnings(stream: &ReadingStream, kinds: &[CounterKind]) -> Vec<AnalyticsWarning> {
    kinds
        .iter()
        .flat_map(|kind| detect_counter_resets(stream, *kind))
        .map(|reset| {
            tracing::warn!(
                meter_id = reset.meter_id,
                counter = ?reset.counter,
                at = %reset.at,
                before = reset.before,
                after = reset.after,
                "counter went backwards, treating the drop as a reset"
            );
            metrics::counter!("analytics_counter_resets_total").increment(1);
            AnalyticsWarning::CounterReset(reset)
        })
        .collect()
}

fn record_duration(report: &'static str, started: Instant) {
    metrics::histogram!("analytics_report_duration_seconds", "report" => report)
        .record(started.elapsed().as_secs_f64());
}
