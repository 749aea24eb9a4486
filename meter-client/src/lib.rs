pub mod db;
pub mod domain;

pub use db::{MemoryReadingStore, PgReadingStore, ReadingStore, StoreError};
pub use domain::{MeterId, MeterReading, MeterSelection, TimeWindow, WindowError};
