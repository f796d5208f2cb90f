//! Gera Worker
//!
//! Direction rate publication and the pipeline that feeds it.
//!
//! - Prices every enabled exchange rate between live payment systems
//! - Read surface over the latest published direction rates
//! - Payment system provisioning with automatic exchange rates
//! - Fetch, currency rate and direction rate stages run in order

pub mod config;
pub mod direction_rates;
pub mod error;
pub mod fault;
pub mod metrics;
pub mod pipeline;
pub mod provisioning;
pub mod repository;
pub mod seed;

#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use direction_rates::{DirectionRatesReport, DirectionRatesWorker};
pub use error::{WorkerError, WorkerResult};
pub use fault::{Fault, FaultTracker, LogFaultTracker, RecordingFaultTracker};
pub use metrics::{PipelineMetrics, SharedMetrics};
pub use pipeline::{Pipeline, PipelineReport};
pub use provisioning::{PaymentSystemProvisioner, ProvisionReport};
pub use repository::{DirectionRatesRepository, LatestRates};
pub use seed::{Seed, SeedReport};
