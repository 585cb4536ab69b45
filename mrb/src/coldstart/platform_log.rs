//! Parsing of the platform execution log returned with a direct invocation.
//!
//! The log tail ends with a `REPORT` line such as:
//!
//! ```text
//! REPORT RequestId: 8f5c...  Duration: 12.31 ms  Billed Duration: 13 ms  Memory Size: 128 MB  Max Memory Used: 41 MB  Init Duration: 118.02 ms
//! ```
//!
//! `Init Duration` only appears when the invocation had to start a new
//! execution environment, which makes it the startup marker. Newer
//! platform versions also emit a separate `INIT_START` line.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static REPORT_FIELD: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"(Billed Duration|Init Duration|Restore Duration|Duration|Memory Size|Max Memory Used):\s*([0-9]+(?:\.[0-9]+)?)\s*(?:ms|MB)",
    )
});

fn report_field_regex() -> Option<&'static Regex> {
    match REPORT_FIELD.as_ref() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(error = %e, "REPORT field pattern failed to compile");
            None
        }
    }
}

/// Figures from the `REPORT` line of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlatformReport {
    pub duration_ms: Option<f64>,
    pub billed_duration_ms: Option<f64>,
    pub memory_size_mb: Option<f64>,
    pub max_memory_used_mb: Option<f64>,
    pub init_duration_ms: Option<f64>,
}

impl PlatformReport {
    /// Parse a single `REPORT` line. Returns `None` for any other line.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_start();
        if !line.starts_with("REPORT") {
            return None;
        }
        let re = report_field_regex()?;

        let mut report = Self::default();
        for caps in re.captures_iter(line) {
            let Ok(value) = caps[2].parse::<f64>() else {
                continue;
            };
            match &caps[1] {
                "Duration" => report.duration_ms = Some(value),
                "Billed Duration" => report.billed_duration_ms = Some(value),
                "Memory Size" => report.memory_size_mb = Some(value),
                "Max Memory Used" => report.max_memory_used_mb = Some(value),
                "Init Duration" => report.init_duration_ms = Some(value),
                _ => {}
            }
        }
        Some(report)
    }

    /// Billed duration, falling back to the raw duration.
    pub fn effective_duration_ms(&self) -> Option<f64> {
        self.billed_duration_ms.or(self.duration_ms)
    }
}

/// Decoded execution log of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformLog {
    text: String,
}

impl PlatformLog {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Decode the base64 log tail returned by the invoke API.
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        Ok(Self::new(String::from_utf8_lossy(&bytes)))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The last `REPORT` line in the log, if any.
    pub fn report(&self) -> Option<PlatformReport> {
        self.text.lines().rev().find_map(PlatformReport::parse_line)
    }

    /// Whether the log carries a literal startup marker.
    pub fn has_startup_marker(&self) -> bool {
        self.text.lines().any(|line| {
            let line = line.trim_start();
            line.starts_with("INIT_START")
                || (line.starts_with("REPORT") && line.contains("Init Duration:"))
        })
    }
}
