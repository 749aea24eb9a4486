use time::OffsetDateTime;

pub type MeterId = i32;

/// One sample from one energy meter.
///
/// `kwh` and `kvah` are cumulative registers; they only grow while the meter
/// is powered, and drop back when the meter is reset. `total_kva` is an
/// instantaneous sample.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeterReading {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub ts: OffsetDateTime,
    pub meter_id: MeterId,
    pub kwh: Option<f64>,
    pub kvah: Option<f64>,
    pub total_kva: Option<f64>,
    pub avg_vln: Option<f64>,
    pub avg_current: Option<f64>,
    pub power_factor: Option<f64>,
}

impl MeterReading {
    /// A reading carrying only the timestamp and meter id; the caller fills
    /// in whichever registers it has.
    pub fn new(meter_id: MeterId, ts: OffsetDateTime) -> Self {
        Self {
            ts,
            meter_id,
            kwh: None,
            kvah: None,
            total_kva: None,
            avg_vln: None,
            avg_current: None,
            power_factor: None,
        }
    }

    pub fn with_kwh(mut self, kwh: f64) -> Self {
        self.kwh = Some(kwh);
        self
    }

    pub fn with_kvah(mut self, kvah: f64) -> Self {
        self.kvah = Some(kvah);
        self
    }

    pub fn with_total_kva(mut self, kva: f64) -> Self {
        self.total_kva = Some(kva);
        self
    }
}

/// Which meters a query or computation should consult.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MeterSelection {
    Single(MeterId),
    /// Inclusive on both ends, like SQL `BETWEEN`.
    Range { first: MeterId, last: MeterId },
    List(Vec<MeterId>),
}

impl MeterSelection {
    pub fn contains(&self, meter_id: MeterId) -> bool {
        match self {
            Self::Single(id) => *id == meter_id,
            Self::Range { first, last } => (*first..=*last).contains(&meter_id),
            Self::List(ids) => ids.contains(&meter_id),
        }
    }

    /// Every id this selection names, in ascending order.
    pub fn ids(&self) -> Vec<MeterId> {
        match self {
            Self::Single(id) => vec![*id],
            Self::Range { first, last } => (*first..=*last).collect(),
            Self::List(ids) => {
                let mut ids = ids.clone();
                ids.sort_unstable();
                ids.dedup();
                ids
            }
        }
    }
}
