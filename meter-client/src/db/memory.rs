use crate::domain::{MeterReading, MeterSelection, TimeWindow};

use super::{ReadingStore, StoreError};

/// Store over readings already held in memory, e.g. loaded from a file.
#[derive(Debug, Clone, Default)]
pub struct MemoryReadingStore {
    readings: Vec<MeterReading>,
}

impl MemoryReadingStore {
    pub fn new(readings: Vec<MeterReading>) -> Self {
        Self { readings }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[async_trait::async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn fetch_readings(
        &self,
        meters: &MeterSelection,
        window: &TimeWindow,
    ) -> Result<Vec<MeterReading>, StoreError> {
        Ok(self
            .readings
            .iter()
            .filter(|r| meters.contains(r.meter_id) && window.contains(r.ts))
            .cloned()
            .collect())
    }
}
