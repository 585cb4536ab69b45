//! Shared building blocks of the multi-runtime benchmark harness.
//!
//! Everything the probe, the reference variant and the harness CLI agree on
//! lives here: the data model, the HTTP/metrics contract, dataset formats,
//! descriptive statistics, configuration and logging setup.

pub mod config;
pub mod contract;
pub mod dataset;
pub mod logging;
pub mod stats;
pub mod types;

pub use config::{ConfigError, EnvError, EnvParser, VariantEndpoint, VariantRegistry};
pub use contract::{ContractViolation, check_envelope, extract_snapshot, validate_snapshot};
pub use dataset::{DatasetError, Ingested, InvocationCsvWriter};
pub use logging::{LogConfig, LogFormat, LoggingError, LoggingGuards, init_logging};
pub use stats::{DistributionStats, percentile_nearest_rank};
pub use types::{
    ApiEnvelope, FAILED_DURATION_MS, InvocationRecord, LoadSample, MemoryUsage, MetricsSnapshot,
    Operation, PlatformContext, RuntimeId,
};
