//! Time-of-use tariff pricing of apparent energy (kVAh).

use std::collections::BTreeMap;

use meter_client::domain::{MeterId, TimeWindow};
use serde::Serialize;
use time::{macros::time, Date, OffsetDateTime, Time, UtcOffset};

use super::{counter_delta, local_hour, round_to, ReadingStream};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TariffError {
    #[error("tariff schedule has no bands")]
    Empty,
    #[error("tariff band '{label}' has invalid rate {rate}")]
    InvalidRate { label: String, rate: f64 },
    #[error("tariff band '{label}' is empty")]
    EmptyBand { label: String },
    #[error("tariff band '{label}' starts at {found}, expected {expected}")]
    Discontinuous {
        label: String,
        expected: Time,
        found: Time,
    },
    #[error("tariff band '{label}' follows a band that already runs to end of day")]
    PastEndOfDay { label: String },
    #[error("tariff schedule stops at {0} instead of covering the whole day")]
    Incomplete(Time),
}

/// One time-of-use band, `[start, end)` in facility-local time.
///
/// An `end` of midnight means end of day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TariffBand {
    pub label: String,
    pub start: Time,
    pub end: Time,
    pub rate_per_unit: f64,
}

impl TariffBand {
    pub fn new(label: impl Into<String>, start: Time, end: Time, rate_per_unit: f64) -> Self {
        Self {
            label: label.into(),
            start,
            end,
            rate_per_unit,
        }
    }

    fn runs_to_end_of_day(&self) -> bool {
        self.end == Time::MIDNIGHT
    }

    pub fn contains(&self, t: Time) -> bool {
        t >= self.start && (self.runs_to_end_of_day() || t < self.end)
    }

    pub fn duration_seconds(&self) -> i64 {
        let end = if self.runs_to_end_of_day() {
            SECONDS_PER_DAY
        } else {
            seconds_of_day(self.end)
        };
        end - seconds_of_day(self.start)
    }
}

fn seconds_of_day(t: Time) -> i64 {
    let (h, m, s) = t.as_hms();
    i64::from(h) * 3600 + i64::from(m) * 60 + i64::from(s)
}

/// Ordered bands that tile the whole day without gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TariffSchedule {
    bands: Vec<TariffBand>,
}

impl TariffSchedule {
    pub fn new(bands: Vec<TariffBand>) -> Result<Self, TariffError> {
        if bands.is_empty() {
            return Err(TariffError::Empty);
        }

        // `None` once a band has reached end of day.
        let mut expected = Some(Time::MIDNIGHT);
        for band in &bands {
            let Some(exp) = expected else {
                return Err(TariffError::PastEndOfDay {
                    label: band.label.clone(),
                });
            };
            if band.start != exp {
                return Err(TariffError::Discontinuous {
                    label: band.label.clone(),
                    expected: exp,
                    found: band.start,
                });
            }
            if !band.rate_per_unit.is_finite() || band.rate_per_unit <= 0.0 {
                return Err(TariffError::InvalidRate {
                    label: band.label.clone(),
                    rate: band.rate_per_unit,
                });
            }
            if band.runs_to_end_of_day() {
                expected = None;
            } else if band.end <= band.start {
                return Err(TariffError::EmptyBand {
                    label: band.label.clone(),
                });
            } else {
                expected = Some(band.end);
            }
        }

        match expected {
            Some(stop) => Err(TariffError::Incomplete(stop)),
            None => Ok(Self { bands }),
        }
    }

    pub fn bands(&self) -> &[TariffBand] {
        &self.bands
    }

    pub fn band_index(&self, t: Time) -> Option<usize> {
        self.bands.iter().position(|b| b.contains(t))
    }

    pub fn rate_at(&self, t: Time) -> Option<f64> {
        self.band_index(t).map(|i| self.bands[i].rate_per_unit)
    }
}

impl Default for TariffSchedule {
    /// The facility's utility schedule: peak overnight and evening, off-peak
    /// in the morning.
    fn default() -> Self {
        Self {
            bands: vec![
                TariffBand::new("00:00-03:00", Time::MIDNIGHT, time!(3:00), 8.165),
                TariffBand::new("03:00-05:00", time!(3:00), time!(5:00), 7.10),
                TariffBand::new("05:00-10:00", time!(5:00), time!(10:00), 6.035),
                TariffBand::new("10:00-19:00", time!(10:00), time!(19:00), 7.10),
                TariffBand::new("19:00-23:59", time!(19:00), Time::MIDNIGHT, 8.165),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandCost {
    pub label: String,
    pub rate: f64,
    pub consumption: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TariffCost {
    pub total: f64,
    pub breakdown: Vec<BandCost>,
}

/// Price kVAh consumption per meter, per local day, per band.
///
/// Each `(meter, day, band)` slice contributes `max - min` of its positive
/// kVAh samples. The grand total is rounded to two decimals once, after
/// summing.
pub fn compute_tariff_cost(
    readings: &ReadingStream,
    window: &TimeWindow,
    schedule: &TariffSchedule,
    offset: UtcOffset,
) -> TariffCost {
    let mut slices: BTreeMap<(MeterId, Date, usize), (f64, f64)> = BTreeMap::new();

    for (meter_id, rows) in readings.by_meter() {
        for r in rows.iter().filter(|r| window.contains(r.ts)) {
            let Some(kvah) = r.kvah.filter(|v| v.is_finite() && *v > 0.0) else {
                continue;
            };
            let local = r.ts.to_offset(offset);
            let Some(band) = schedule.band_index(local.time()) else {
                continue;
            };
            let (lo, hi) = slices
                .entry((meter_id, local.date(), band))
                .or_insert((kvah, kvah));
            *lo = lo.min(kvah);
            *hi = hi.max(kvah);
        }
    }

    let mut consumption = vec![0.0; schedule.bands().len()];
    for ((_, _, band), (lo, hi)) in slices {
        consumption[band] += hi - lo;
    }

    let mut total = 0.0;
    let breakdown = schedule
        .bands()
        .iter()
        .zip(consumption)
        .map(|(band, used)| {
            let cost = used * band.rate_per_unit;
            total += cost;
            BandCost {
                label: band.label.clone(),
                rate: band.rate_per_unit,
                consumption: round_to(used, 1),
                cost: round_to(cost, 2),
            }
        })
        .collect();

    TariffCost {
        total: round_to(total, 2),
        breakdown,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyCost {
    #[serde(with = "time::serde::rfc3339")]
    pub hour: OffsetDateTime,
    pub cost: f64,
}

/// Cost per local hour, each hour priced at the band its start falls in.
pub fn hourly_cost(
    readings: &ReadingStream,
    window: &TimeWindow,
    schedule: &TariffSchedule,
    offset: UtcOffset,
) -> Vec<HourlyCost> {
    let mut per_meter_hour: BTreeMap<(OffsetDateTime, MeterId), Vec<f64>> = BTreeMap::new();
    for (meter_id, rows) in readings.by_meter() {
        for r in rows.iter().filter(|r| window.contains(r.ts)) {
            if let Some(kvah) = r.kvah {
                per_meter_hour
                    .entry((local_hour(r.ts, offset), meter_id))
                    .or_default()
                    .push(kvah);
            }
        }
    }

    let mut per_hour: BTreeMap<OffsetDateTime, f64> = BTreeMap::new();
    for ((hour, _), values) in per_meter_hour {
        let used = round_to(counter_delta(values).unwrap_or(0.0), 1);
        let rate = schedule.rate_at(hour.time()).unwrap_or(0.0);
        *per_hour.entry(hour).or_insert(0.0) += round_to(used * rate, 2);
    }

    per_hour
        .into_iter()
        .map(|(hour, cost)| HourlyCost {
            hour,
            cost: round_to(cost, 1),
        })
        .collect()
}
