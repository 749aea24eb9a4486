//! Argument helpers shared by the binaries.

use anyhow::{Context, Result};
use meter_client::domain::TimeWindow;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub fn parse_instant(name: &str, value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value.trim(), &Rfc3339)
        .with_context(|| format!("invalid {name} '{value}', expected RFC 3339"))
}

/// `[start, end)` from two RFC 3339 arguments.
pub fn parse_window(start: &str, end: &str) -> Result<TimeWindow> {
    let window = TimeWindow::new(parse_instant("start", start)?, parse_instant("end", end)?)?;
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_offset_timestamps() {
        let window = parse_window("2025-06-01T00:00:00+05:30", "2025-06-02T00:00:00+05:30").unwrap();
        assert_eq!(window.start(), datetime!(2025-06-01 00:00:00 +05:30));
        assert_eq!(window.end(), datetime!(2025-06-02 00:00:00 +05:30));
    }

    #[test]
    fn rejects_garbage_and_empty_windows() {
        assert!(parse_window("yesterday", "2025-06-02T00:00:00Z").is_err());
        assert!(parse_window("2025-06-02T00:00:00Z", "2025-06-01T00:00:00Z").is_err());
    }
}
