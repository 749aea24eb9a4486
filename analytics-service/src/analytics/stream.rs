use meter_client::domain::{MeterId, MeterReading, MeterSelection};

/// Readings for one query window, sorted by meter then timestamp.
///
/// Stores are allowed to return rows in any order and with repeats, so
/// construction sorts and drops exact `(meter_id, ts)` duplicates. The first
/// row seen for a key wins.
#[derive(Debug, Clone, Default)]
pub struct ReadingStream {
    readings: Vec<MeterReading>,
}

impl ReadingStream {
    pub fn new(mut readings: Vec<MeterReading>) -> Self {
        readings.sort_by(|a, b| a.meter_id.cmp(&b.meter_id).then(a.ts.cmp(&b.ts)));
        readings.dedup_by(|later, earlier| {
            later.meter_id == earlier.meter_id && later.ts == earlier.ts
        });
        Self { readings }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn readings(&self) -> &[MeterReading] {
        &self.readings
    }

    /// Time-ordered readings of one meter; empty if the meter is absent.
    pub fn for_meter(&self, meter_id: MeterId) -> &[MeterReading] {
        let start = self.readings.partition_point(|r| r.meter_id < meter_id);
        let end = self.readings.partition_point(|r| r.meter_id <= meter_id);
        &self.readings[start..end]
    }

    /// Per-meter runs in ascending meter-id order.
    pub fn by_meter(&self) -> impl Iterator<Item = (MeterId, &[MeterReading])> + '_ {
        self.readings
            .chunk_by(|a, b| a.meter_id == b.meter_id)
            .map(|rows| (rows[0].meter_id, rows))
    }

    /// Like [`ReadingStream::by_meter`], restricted to a selection.
    pub fn selected<'a>(
        &'a self,
        selection: &'a MeterSelection,
    ) -> impl Iterator<Item = (MeterId, &'a [MeterReading])> + 'a {
        self.by_meter().filter(move |(id, _)| selection.contains(*id))
    }

    pub fn meter_ids(&self) -> Vec<MeterId> {
        self.by_meter().map(|(id, _)| id).collect()
    }
}

impl From<Vec<MeterReading>> for ReadingStream {
    fn from(readings: Vec<MeterReading>) -> Self {
        Self::new(readings)
    }
}
