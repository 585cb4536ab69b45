//! Loading of the raw datasets for a comparison run.

use super::engine::{ComparisonReport, MalformedCounts, compare_with};
use mrb_common::dataset::{read_invocations_csv, read_load_samples};
use mrb_common::{DatasetError, Ingested, InvocationRecord, LoadSample, RuntimeId};
use std::path::Path;
use tracing::{info, warn};

/// Everything read from disk for one comparison.
#[derive(Debug, Clone, Default)]
pub struct ComparisonInputs {
    pub invocations: Ingested<InvocationRecord>,
    pub load: Ingested<LoadSample>,
}

impl ComparisonInputs {
    pub fn malformed(&self) -> MalformedCounts {
        MalformedCounts {
            invocations: self.invocations.malformed,
            load_samples: self.load.malformed,
        }
    }

    /// Build the report. Every id in `known` gets a row, data or not.
    pub fn compare(&self, known: &[RuntimeId]) -> ComparisonReport {
        compare_with(
            known,
            &self.invocations.rows,
            &self.load.rows,
            self.malformed(),
        )
    }
}

/// Read the cold-start CSV and the load samples (a JSON Lines file or a
/// directory of them). A missing input is skipped; a present but unreadable
/// one is an error.
pub fn ingest(
    invocations: Option<&Path>,
    load: Option<&Path>,
) -> Result<ComparisonInputs, DatasetError> {
    let mut inputs = ComparisonInputs::default();

    if let Some(path) = invocations {
        inputs.invocations = read_invocations_csv(path)?;
        info!(
            path = %path.display(),
            rows = inputs.invocations.rows.len(),
            malformed = inputs.invocations.malformed,
            "Loaded cold-start records"
        );
    }
    if let Some(path) = load {
        inputs.load = read_load_samples(path)?;
        info!(
            path = %path.display(),
            rows = inputs.load.rows.len(),
            malformed = inputs.load.malformed,
            "Loaded load samples"
        );
    }

    let malformed = inputs.malformed();
    if malformed.invocations + malformed.load_samples > 0 {
        warn!(
            invocations = malformed.invocations,
            load_samples = malformed.load_samples,
            "Skipped malformed input rows"
        );
    }
    Ok(inputs)
}
