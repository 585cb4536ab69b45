//! Comparison of cold-start and load datasets across variants.
//!
//! - [`ingest`] - read the raw datasets, counting malformed rows
//! - [`engine`] - pure aggregation into a [`ComparisonReport`]
//! - [`markdown`] - human-readable rendering

pub mod engine;
pub mod ingest;
pub mod markdown;

pub use engine::{
    ComparisonReport, DataWindow, DurationStats, InvocationCounts, KeyFindings, LoadStats,
    MalformedCounts, Measurement, OperationStats, RankEntry, VariantReport, compare, compare_with,
};
pub use ingest::{ComparisonInputs, ingest};
pub use markdown::render;

use std::path::{Path, PathBuf};
use tracing::info;

pub const MARKDOWN_REPORT: &str = "comparison-report.md";
pub const JSON_REPORT: &str = "comparison-report.json";

/// Files written by [`write_outputs`].
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub markdown: PathBuf,
    pub json: PathBuf,
}

/// Write the markdown and JSON forms of `report` into `out_dir`.
pub fn write_outputs(report: &ComparisonReport, out_dir: &Path) -> std::io::Result<ReportPaths> {
    std::fs::create_dir_all(out_dir)?;
    let paths = ReportPaths {
        markdown: out_dir.join(MARKDOWN_REPORT),
        json: out_dir.join(JSON_REPORT),
    };

    std::fs::write(&paths.markdown, render(report))?;
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&paths.json, json + "\n")?;

    info!(
        markdown = %paths.markdown.display(),
        json = %paths.json.display(),
        variants = report.variants.len(),
        "Wrote comparison report"
    );
    Ok(paths)
}
