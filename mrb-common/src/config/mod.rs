//! Configuration for the benchmark harness.
//!
//! - `MRB_*` environment variable parsing with error collection
//! - The variants registry supplied by the deployment layer

pub mod env;
pub mod variants;

pub use env::{EnvError, EnvParser};
pub use variants::{DEFAULT_VARIANTS_FILE, VariantEndpoint, VariantRegistry};

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems. Commands exit non-zero on these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("variant with empty runtime_id in registry")]
    EmptyRuntimeId,

    #[error("duplicate runtime_id '{0}' in registry")]
    DuplicateRuntime(String),

    #[error("runtime '{0}' is not in the variants registry")]
    UnknownRuntime(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("{} invalid environment variable(s): {}", .0.len(), join_errors(.0))]
    Env(Vec<EnvError>),
}

fn join_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
