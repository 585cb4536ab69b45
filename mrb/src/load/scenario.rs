//! Load scenario: ramp stages, thresholds and per-request settings.
//!
//! Scenario files are TOML or JSON, chosen by extension. Every field is
//! optional and falls back to the default ramp `0 -> 10 -> 50 -> 100 -> 0`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported scenario format '{0}' (expected .toml or .json)")]
    UnsupportedFormat(String),

    #[error("invalid scenario: {0}")]
    Invalid(String),
}

/// Longest accepted stage: one week.
pub const MAX_STAGE_SECONDS: f64 = 7.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    #[serde(alias = "duration_seconds")]
    pub duration_seconds: f64,
    #[serde(alias = "target_concurrency")]
    pub target_concurrency: u32,
}

impl Stage {
    pub fn new(duration_seconds: f64, target_concurrency: u32) -> Self {
        Self {
            duration_seconds,
            target_concurrency,
        }
    }

    /// Stage length. Values a [`Duration`] cannot hold saturate; `validate`
    /// rejects them before a run.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_seconds).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    #[serde(alias = "p95_latency_ms")]
    pub p95_latency_ms: f64,
    #[serde(alias = "p99_latency_ms")]
    pub p99_latency_ms: f64,
    /// Fraction of failed requests, `0.0..=1.0`.
    #[serde(alias = "max_error_rate")]
    pub max_error_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            p95_latency_ms: 500.0,
            p99_latency_ms: 1000.0,
            max_error_rate: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadScenario {
    pub stages: Vec<Stage>,
    pub thresholds: Thresholds,
    #[serde(alias = "request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(alias = "think_time_ms")]
    pub think_time_ms: u64,
    #[serde(alias = "list_limit")]
    pub list_limit: u32,
}

impl Default for LoadScenario {
    fn default() -> Self {
        Self {
            stages: vec![
                Stage::new(30.0, 10),
                Stage::new(60.0, 50),
                Stage::new(120.0, 100),
                Stage::new(30.0, 0),
            ],
            thresholds: Thresholds::default(),
            request_timeout_ms: 10_000,
            think_time_ms: 1_000,
            list_limit: 10,
        }
    }
}

impl LoadScenario {
    /// Load and validate a scenario file.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();
        let parse_error = |message: String| ScenarioError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let scenario: Self = match extension.as_str() {
            "toml" => toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            other => return Err(ScenarioError::UnsupportedFormat(other.to_string())),
        };
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.stages.is_empty() {
            return Err(ScenarioError::Invalid("at least one stage is required".into()));
        }
        let mut total = Duration::ZERO;
        for (i, stage) in self.stages.iter().enumerate() {
            let invalid = || {
                ScenarioError::Invalid(format!(
                    "stage {} has invalid duration {}",
                    i + 1,
                    stage.duration_seconds
                ))
            };
            if stage.duration_seconds > MAX_STAGE_SECONDS {
                return Err(invalid());
            }
            let length = Duration::try_from_secs_f64(stage.duration_seconds).map_err(|_| invalid())?;
            total = total.checked_add(length).ok_or_else(|| {
                ScenarioError::Invalid("total scenario duration overflows".into())
            })?;
        }
        if self.request_timeout_ms == 0 {
            return Err(ScenarioError::Invalid("requestTimeoutMs must be > 0".into()));
        }
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.max_error_rate) {
            return Err(ScenarioError::Invalid(format!(
                "maxErrorRate must be within 0..=1, got {}",
                t.max_error_rate
            )));
        }
        if t.p95_latency_ms <= 0.0 || t.p99_latency_ms <= 0.0 {
            return Err(ScenarioError::Invalid("latency thresholds must be > 0".into()));
        }
        Ok(())
    }

    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .map(Stage::duration)
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn think_time(&self) -> Duration {
        Duration::from_millis(self.think_time_ms)
    }

    /// Target concurrency at `elapsed`, ramping linearly within each stage
    /// from the previous stage's target. `None` once all stages are over.
    pub fn concurrency_at(&self, elapsed: Duration) -> Option<u32> {
        let mut stage_start = Duration::ZERO;
        let mut previous = 0u32;
        for stage in &self.stages {
            let length = stage.duration();
            let stage_end = stage_start.saturating_add(length);
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / length.as_secs_f64();
                let from = f64::from(previous);
                let to = f64::from(stage.target_concurrency);
                return Some((from + (to - from) * progress).round() as u32);
            }
            stage_start = stage_end;
            previous = stage.target_concurrency;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_ramp_shape() {
        let scenario = LoadScenario::default();
        assert_eq!(scenario.total_duration(), Duration::from_secs(240));
        assert_eq!(scenario.concurrency_at(Duration::ZERO), Some(0));
        assert_eq!(scenario.concurrency_at(Duration::from_secs(15)), Some(5));
        assert_eq!(scenario.concurrency_at(Duration::from_secs(60)), Some(30));
        assert_eq!(scenario.concurrency_at(Duration::from_secs(150)), Some(75));
        assert_eq!(scenario.concurrency_at(Duration::from_secs(225)), Some(50));
        assert_eq!(scenario.concurrency_at(Duration::from_secs(240)), None);
    }

    #[test]
    fn test_zero_length_stage_is_skipped() {
        let scenario = LoadScenario {
            stages: vec![Stage::new(0.0, 50), Stage::new(10.0, 50)],
            ..Default::default()
        };
        assert_eq!(scenario.concurrency_at(Duration::ZERO), Some(50));
    }

    #[test]
    fn test_load_toml_with_snake_case() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
think_time_ms = 0

[[stages]]
duration_seconds = 5
target_concurrency = 0

[thresholds]
p95_latency_ms = 250
"#
        )
        .unwrap();

        let scenario = LoadScenario::load(file.path()).unwrap();
        assert_eq!(scenario.stages, vec![Stage::new(5.0, 0)]);
        assert_eq!(scenario.think_time_ms, 0);
        assert_eq!(scenario.thresholds.p95_latency_ms, 250.0);
        assert_eq!(scenario.thresholds.p99_latency_ms, 1000.0);
        assert_eq!(scenario.request_timeout_ms, 10_000);
    }

    #[test]
    fn test_load_json_camel_case() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"stages":[{{"durationSeconds":1,"targetConcurrency":2}}],"thresholds":{{"maxErrorRate":0.05}},"listLimit":5}}"#
        )
        .unwrap();

        let scenario = LoadScenario::load(file.path()).unwrap();
        assert_eq!(scenario.stages[0].target_concurrency, 2);
        assert_eq!(scenario.thresholds.max_error_rate, 0.05);
        assert_eq!(scenario.list_limit, 5);
    }

    #[test]
    fn test_invalid_scenarios_rejected() {
        let empty = LoadScenario {
            stages: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(empty.validate(), Err(ScenarioError::Invalid(_))));

        let mut bad_rate = LoadScenario::default();
        bad_rate.thresholds.max_error_rate = 1.5;
        assert!(matches!(bad_rate.validate(), Err(ScenarioError::Invalid(_))));

        let mut negative = LoadScenario::default();
        negative.stages[0].duration_seconds = -1.0;
        assert!(matches!(negative.validate(), Err(ScenarioError::Invalid(_))));

        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            LoadScenario::load(file.path()),
            Err(ScenarioError::UnsupportedFormat(ext)) if ext == "yaml"
        ));
    }

    #[test]
    fn test_huge_stage_duration_is_a_config_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"stages":[{{"durationSeconds":1e20,"targetConcurrency":1}}]}}"#
        )
        .unwrap();
        assert!(matches!(
            LoadScenario::load(file.path()),
            Err(ScenarioError::Invalid(_))
        ));

        // Unvalidated scenarios saturate instead of panicking.
        let scenario = LoadScenario {
            stages: vec![Stage::new(1e20, 1), Stage::new(1e20, 2)],
            ..Default::default()
        };
        assert_eq!(scenario.total_duration(), Duration::MAX);
        assert_eq!(scenario.concurrency_at(Duration::from_secs(10)), Some(0));
    }

    #[test]
    fn test_week_long_stage_accepted() {
        let scenario = LoadScenario {
            stages: vec![Stage::new(MAX_STAGE_SECONDS, 5)],
            ..Default::default()
        };
        assert!(scenario.validate().is_ok());
        assert_eq!(
            scenario.total_duration(),
            Duration::from_secs(7 * 24 * 3600)
        );
    }
}
