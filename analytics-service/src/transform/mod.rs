use crate::pipeline::{Envelope, PipelineError, Transform};
use meter_client::domain::MeterReading;
use time::macros::datetime;

fn check_non_negative(name: &str, value: Option<f64>) -> Result<(), PipelineError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(PipelineError::Transform(format!(
            "{name} must be a non-negative number, got {v}"
        ))),
        _ => Ok(()),
    }
}

/// Pure validation of a `MeterReading` record.
///
/// Rules:
/// - meter_id must be positive.
/// - kWh, kVAh and total kVA, when present, must be finite and non-negative.
/// - power factor, when present, must lie in [-1, 1].
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_meter_reading(
    env: Envelope<MeterReading>,
) -> Result<Envelope<MeterReading>, PipelineError> {
    let r = &env.payload;

    if r.meter_id <= 0 {
        return Err(PipelineError::Transform(format!(
            "meter_id must be positive, got {}",
            r.meter_id
        )));
    }

    check_non_negative("kwh", r.kwh)?;
    check_non_negative("kvah", r.kvah)?;
    check_non_negative("total_kva", r.total_kva)?;

    if let Some(pf) = r.power_factor {
        if !(-1.0..=1.0).contains(&pf) {
            return Err(PipelineError::Transform(format!(
                "power_factor out of range: {pf}"
            )));
        }
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if r.ts < min_ts || r.ts > max_ts {
        return Err(PipelineError::Transform("timestamp out of allowed range".to_string()));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct MeterReadingValidation;

#[async_trait::async_trait]
impl Transform<MeterReading, MeterReading> for MeterReadingValidation {
    async fn apply(
        &self,
        input: Envelope<MeterReading>,
    ) -> Result<Envelope<MeterReading>, PipelineError> {
        match validate_meter_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("reading_validation_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn envelope(reading: MeterReading) -> Envelope<MeterReading> {
        Envelope::now(reading)
    }

    #[test]
    fn accepts_valid_reading() {
        let mut reading = MeterReading::new(3, datetime!(2025-06-01 10:00:00 +05:30))
            .with_kwh(1.0)
            .with_kvah(1.2)
            .with_total_kva(40.0);
        reading.power_factor = Some(0.97);

        assert!(validate_meter_reading(envelope(reading)).is_ok());
    }

    #[test]
    fn unset_fields_are_fine() {
        let reading = MeterReading::new(3, datetime!(2025-06-01 10:00:00 +05:30));
        assert!(validate_meter_reading(envelope(reading)).is_ok());
    }

    #[test]
    fn rejects_negative_counter() {
        let reading = MeterReading::new(3, datetime!(2025-06-01 10:00:00 +05:30)).with_kvah(-0.1);
        let res = validate_meter_reading(envelope(reading));
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn rejects_non_finite_demand() {
        let reading =
            MeterReading::new(3, datetime!(2025-06-01 10:00:00 +05:30)).with_total_kva(f64::NAN);
        let res = validate_meter_reading(envelope(reading));
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn rejects_bad_power_factor_and_meter_id() {
        let mut reading = MeterReading::new(3, datetime!(2025-06-01 10:00:00 +05:30));
        reading.power_factor = Some(1.5);
        assert!(validate_meter_reading(envelope(reading)).is_err());

        let reading = MeterReading::new(0, datetime!(2025-06-01 10:00:00 +05:30));
        assert!(validate_meter_reading(envelope(reading)).is_err());
    }

    #[test]
    fn rejects_out_of_range_ts() {
        let reading = MeterReading::new(3, datetime!(1800-01-01 00:00:00 UTC)).with_kwh(1.0);
        let res = validate_meter_reading(envelope(reading));
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }
}
