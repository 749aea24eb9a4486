pub mod memory;
pub mod meter_reading_queries;

pub use memory::MemoryReadingStore;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::domain::{MeterReading, MeterSelection, TimeWindow};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("query failed: {0}")]
    Query(String),
}

/// Data-access seam for meter readings.
///
/// Implementations hand back rows for the selected meters inside the window.
/// Ordering is not guaranteed; consumers sort before they compute anything.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    async fn fetch_readings(
        &self,
        meters: &MeterSelection,
        window: &TimeWindow,
    ) -> Result<Vec<MeterReading>, StoreError>;
}

/// PostgreSQL-backed store. Owns its pool; open it once at startup and call
/// [`PgReadingStore::close`] on shutdown.
#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn fetch_readings(
        &self,
        meters: &MeterSelection,
        window: &TimeWindow,
    ) -> Result<Vec<MeterReading>, StoreError> {
        meter_reading_queries::selection_readings(&self.pool, meters, window)
            .await
            .map_err(|e| match e.downcast::<sqlx::Error>() {
                Ok(db) => StoreError::Database(db),
                Err(other) => StoreError::Query(other.to_string()),
            })
    }
}
