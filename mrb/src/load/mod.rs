//! Staged load generation against a variant's HTTP surface.
//!
//! - [`scenario`] - ramp stages, thresholds, scenario files
//! - [`client`] - the virtual user request loop
//! - [`sink`] - append-only JSON Lines sample sink
//! - [`runner`] - the ramp controller
//! - [`evaluate`] - threshold verdict

pub mod client;
pub mod evaluate;
pub mod runner;
pub mod scenario;
pub mod sink;

pub use evaluate::{LoadRunSummary, ThresholdViolation, evaluate};
pub use runner::{LoadError, LoadGenerator, LoadRun};
pub use scenario::{LoadScenario, ScenarioError, Stage, Thresholds};

use mrb_common::RuntimeId;
use std::path::{Path, PathBuf};

/// Path of the JSON Lines sample file for `runtime_id` under `dir`.
pub fn samples_path(dir: &Path, runtime_id: &RuntimeId) -> PathBuf {
    dir.join(format!("load-test-{runtime_id}.jsonl"))
}

/// Path of the run summary written next to the samples.
pub fn summary_path(dir: &Path, runtime_id: &RuntimeId) -> PathBuf {
    dir.join(format!("load-test-{runtime_id}.summary.json"))
}

/// Write `summary` as pretty JSON to its conventional location under `dir`.
pub fn write_summary(dir: &Path, summary: &LoadRunSummary) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = summary_path(dir, &summary.runtime_id);
    let json = serde_json::to_string_pretty(summary).map_err(std::io::Error::other)?;
    std::fs::write(&path, json + "\n")?;
    Ok(path)
}
