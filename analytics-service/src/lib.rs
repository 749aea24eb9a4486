pub mod analytics;
pub mod cli;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sources;
pub mod transform;

pub use analytics::{AnalyticsFacade, EngineSettings};
pub use pipeline::{Envelope, Pipeline};
