use anyhow::Result;
use sqlx::PgPool;

use crate::domain::{MeterId, MeterReading, MeterSelection, TimeWindow};

const READING_COLUMNS: &str = r#"
            ts,
            meter_id,
            kwh,
            kvah,
            total_kva,
            avg_vln,
            avg_current,
            power_factor
"#;

/// Fetch a time-ordered reading stream for a single meter.
pub async fn meter_readings(
    pool: &PgPool,
    meter_id: MeterId,
    window: &TimeWindow,
) -> Result<Vec<MeterReading>> {
    let sql = format!(
        r#"
        SELECT {READING_COLUMNS}
        FROM meter_readings
        WHERE meter_id = $1
          AND ts >= $2
          AND ts <  $3
        ORDER BY ts
        "#
    );

    let rows = sqlx::query_as::<_, MeterReading>(&sql)
        .bind(meter_id)
        .bind(window.start())
        .bind(window.end())
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Fetch readings for a contiguous block of meters, ordered by meter then time.
pub async fn meter_range_readings(
    pool: &PgPool,
    first: MeterId,
    last: MeterId,
    window: &TimeWindow,
) -> Result<Vec<MeterReading>> {
    let sql = format!(
        r#"
        SELECT {READING_COLUMNS}
        FROM meter_readings
        WHERE meter_id BETWEEN $1 AND $2
          AND ts >= $3
          AND ts <  $4
        ORDER BY meter_id, ts
        "#
    );

    let rows = sqlx::query_as::<_, MeterReading>(&sql)
        .bind(first)
        .bind(last)
        .bind(window.start())
        .bind(window.end())
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Fetch readings for an arbitrary set of meters.
pub async fn meter_list_readings(
    pool: &PgPool,
    meter_ids: &[MeterId],
    window: &TimeWindow,
) -> Result<Vec<MeterReading>> {
    // A handful of generator/aggregate meters at most; ANY($1) keeps it to one
    // round trip without building the IN list by hand.
    let sql = format!(
        r#"
        SELECT {READING_COLUMNS}
        FROM meter_readings
        WHERE meter_id = ANY($1)
          AND ts >= $2
          AND ts <  $3
        ORDER BY meter_id, ts
        "#
    );

    let rows = sqlx::query_as::<_, MeterReading>(&sql)
        .bind(meter_ids)
        .bind(window.start())
        .bind(window.end())
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Dispatch a [`MeterSelection`] to the matching query.
pub async fn selection_readings(
    pool: &PgPool,
    selection: &MeterSelection,
    window: &TimeWindow,
) -> Result<Vec<MeterReading>> {
    match selection {
        MeterSelection::Single(id) => meter_readings(pool, *id, window).await,
        MeterSelection::Range { first, last } => {
            meter_range_readings(pool, *first, *last, window).await
        }
        MeterSelection::List(ids) => meter_list_readings(pool, ids, window).await,
    }
}
