pub mod meter_reading;
pub mod time_window;

pub use meter_reading::{MeterId, MeterReading, MeterSelection};
pub use time_window::{TimeWindow, WindowError};
