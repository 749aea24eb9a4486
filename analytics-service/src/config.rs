use serde::Deserialize;
use std::{fs, path::PathBuf};
use time::{macros::format_description, Duration, OffsetDateTime, Time, UtcOffset};

use crate::analytics::{
    sessions::DEFAULT_MAX_SAMPLE_GAP, EngineSettings, TariffBand, TariffError, TariffSchedule,
};
use meter_client::domain::{MeterId, MeterSelection};

const CONFIG_ENV: &str = "ANALYTICS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "analytics-config.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid facility utc_offset '{0}', expected e.g. +05:30")]
    InvalidOffset(String),
    #[error("invalid time of day '{value}' in tariff band '{label}', expected HH:MM")]
    InvalidTimeOfDay { label: String, value: String },
    #[error("sessions.max_sample_gap_secs must be positive")]
    InvalidSampleGap,
    #[error("demand.block_minutes must be positive")]
    InvalidBlock,
    #[error("facility.sub_meters must not include the aggregate meter {0}")]
    AggregateInSubMeters(MeterId),
    #[error("invalid tariff: {0}")]
    Tariff(#[from] TariffError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FacilityConfig {
    pub utc_offset: String,
    pub sub_meters: MeterSelection,
    pub aggregate_meter: MeterId,
    pub generator_meters: Vec<MeterId>,
    #[serde(with = "time::serde::rfc3339")]
    pub demand_cutover: OffsetDateTime,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            utc_offset: "+05:30".to_string(),
            sub_meters: engine.sub_meters,
            aggregate_meter: engine.aggregate_meter,
            generator_meters: engine.generator_meters,
            demand_cutover: engine.demand_cutover,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub max_sample_gap_secs: i64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sample_gap_secs: DEFAULT_MAX_SAMPLE_GAP.whole_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemandConfig {
    pub alert_threshold_kva: f64,
    pub block_minutes: i64,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            alert_threshold_kva: 596.0,
            block_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffBandConfig {
    pub label: String,
    /// `HH:MM`, facility-local.
    pub start: String,
    /// `HH:MM`; `24:00` means end of day.
    pub end: String,
    pub rate: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TariffConfig {
    /// Empty means the built-in schedule.
    #[serde(default)]
    pub bands: Vec<TariffBandConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub facility: FacilityConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub demand: DemandConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Read the file named by `ANALYTICS_CONFIG`, or `analytics-config.toml`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Like [`AppConfig::load`], but falls back to built-in defaults when no
    /// file exists at the resolved path.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = config_path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Validate and convert into the engine's reference data.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        let facility = &self.facility;

        let offset = UtcOffset::parse(
            facility.utc_offset.trim(),
            format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
        )
        .map_err(|_| ConfigError::InvalidOffset(facility.utc_offset.clone()))?;

        if facility.sub_meters.contains(facility.aggregate_meter) {
            return Err(ConfigError::AggregateInSubMeters(facility.aggregate_meter));
        }
        if self.sessions.max_sample_gap_secs <= 0 {
            return Err(ConfigError::InvalidSampleGap);
        }
        if self.demand.block_minutes <= 0 {
            return Err(ConfigError::InvalidBlock);
        }

        let tariff = if self.tariff.bands.is_empty() {
            TariffSchedule::default()
        } else {
            let bands = self
                .tariff
                .bands
                .iter()
                .map(|b| {
                    Ok(TariffBand::new(
                        b.label.clone(),
                        parse_time_of_day(&b.label, &b.start)?,
                        parse_time_of_day(&b.label, &b.end)?,
                        b.rate,
                    ))
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;
            TariffSchedule::new(bands)?
        };

        Ok(EngineSettings {
            offset,
            sub_meters: facility.sub_meters.clone(),
            aggregate_meter: facility.aggregate_meter,
            generator_meters: facility.generator_meters.clone(),
            demand_cutover: facility.demand_cutover,
            max_sample_gap: Duration::seconds(self.sessions.max_sample_gap_secs),
            demand_alert_threshold_kva: self.demand.alert_threshold_kva,
            demand_block: Duration::minutes(self.demand.block_minutes),
            tariff,
        })
    }
}

fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

fn parse_time_of_day(label: &str, value: &str) -> Result<Time, ConfigError> {
    let value = value.trim();
    if value == "24:00" {
        return Ok(Time::MIDNIGHT);
    }
    Time::parse(value, format_description!("[hour]:[minute]")).map_err(|_| {
        ConfigError::InvalidTimeOfDay {
            label: label.to_string(),
            value: value.to_string(),
        }
    })
}
