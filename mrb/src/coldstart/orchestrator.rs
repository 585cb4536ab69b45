//! Sequential cold-start measurement across variants.
//!
//! For each variant: sleep the idle window before iteration 1 and the short
//! warm interval before later iterations, invoke once, classify, append one
//! record. A failed invocation is recorded with the failure sentinel and the
//! loop moves on. Failures never trigger a retry and always count toward N.

use super::invoker::{InvocationOutcome, InvokeError, Invoker};
use super::signals::{Classifier, Observation};
use chrono::Utc;
use mrb_common::dataset::DatasetError;
use mrb_common::{
    ConfigError, DistributionStats, EnvParser, FAILED_DURATION_MS, InvocationCsvWriter,
    InvocationRecord, RuntimeId,
    VariantEndpoint, extract_snapshot,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Destination for records as they are produced.
pub trait RecordSink {
    fn append(&mut self, record: &InvocationRecord) -> Result<(), DatasetError>;
}

impl RecordSink for InvocationCsvWriter {
    fn append(&mut self, record: &InvocationRecord) -> Result<(), DatasetError> {
        InvocationCsvWriter::append(self, record)
    }
}

impl RecordSink for Vec<InvocationRecord> {
    fn append(&mut self, record: &InvocationRecord) -> Result<(), DatasetError> {
        self.push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ColdStartConfig {
    pub iterations: u32,
    pub idle: Duration,
    pub warm_interval: Duration,
    pub timeout: Duration,
}

impl Default for ColdStartConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            idle: Duration::from_secs(300),
            warm_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ColdStartConfig {
    /// Read `MRB_ITERATIONS`, `MRB_IDLE_SECONDS`, `MRB_WARM_INTERVAL_SECONDS`
    /// and `MRB_TIMEOUT_SECONDS`, falling back to the defaults for unset
    /// variables. Every invalid variable is reported at once.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut parser = EnvParser::new();
        let config = Self {
            iterations: parser.get_u32_range("ITERATIONS", defaults.iterations, 1, 10_000),
            idle: Duration::from_secs(parser.get_u64_range(
                "IDLE_SECONDS",
                defaults.idle.as_secs(),
                0,
                86_400,
            )),
            warm_interval: Duration::from_secs(parser.get_u64_range(
                "WARM_INTERVAL_SECONDS",
                defaults.warm_interval.as_secs(),
                0,
                3_600,
            )),
            timeout: Duration::from_secs(parser.get_u64_range(
                "TIMEOUT_SECONDS",
                defaults.timeout.as_secs(),
                1,
                900,
            )),
        };
        if parser.has_errors() {
            return Err(ConfigError::Env(parser.errors().to_vec()));
        }
        Ok(config)
    }
}

/// Per-variant outcome of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRunSummary {
    pub runtime_id: RuntimeId,
    /// Set when the variant was skipped or aborted before completing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    pub recorded: u32,
    pub failed: u32,
    /// `None` means no samples.
    pub cold: Option<DistributionStats>,
    pub warm: Option<DistributionStats>,
}

impl VariantRunSummary {
    fn skipped(runtime_id: RuntimeId, reason: impl Into<String>) -> Self {
        Self {
            runtime_id,
            skipped: Some(reason.into()),
            recorded: 0,
            failed: 0,
            cold: None,
            warm: None,
        }
    }

    fn from_records(runtime_id: RuntimeId, records: &[InvocationRecord]) -> Self {
        let measured = |cold: bool| {
            DistributionStats::from_values(
                records
                    .iter()
                    .filter(|r| r.cold_start_detected == cold && !r.is_failed())
                    .map(|r| r.billed_duration_ms),
            )
        };
        Self {
            runtime_id,
            skipped: None,
            recorded: records.len() as u32,
            failed: records.iter().filter(|r| r.is_failed()).count() as u32,
            cold: measured(true),
            warm: measured(false),
        }
    }
}

pub struct ColdStartOrchestrator<I> {
    invoker: I,
    classifier: Classifier,
    config: ColdStartConfig,
}

impl<I: Invoker> ColdStartOrchestrator<I> {
    pub fn new(invoker: I, config: ColdStartConfig) -> Self {
        Self {
            invoker,
            classifier: Classifier::standard(),
            config,
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Measure every variant in order, appending records to `sink`.
    pub async fn run<S: RecordSink>(
        &self,
        variants: &[&VariantEndpoint],
        sink: &mut S,
    ) -> Vec<VariantRunSummary> {
        let mut summaries = Vec::with_capacity(variants.len());
        for variant in variants {
            let summary = self.run_variant(variant, sink).await;
            info!(
                runtime_id = %summary.runtime_id,
                recorded = summary.recorded,
                failed = summary.failed,
                cold = summary.cold.map(|s| s.count).unwrap_or(0),
                warm = summary.warm.map(|s| s.count).unwrap_or(0),
                skipped = summary.skipped.as_deref().unwrap_or(""),
                "Variant measured"
            );
            summaries.push(summary);
        }
        summaries
    }

    async fn run_variant<S: RecordSink>(
        &self,
        variant: &VariantEndpoint,
        sink: &mut S,
    ) -> VariantRunSummary {
        let runtime_id = variant.runtime_id.clone();
        let Some(endpoint) = variant.invocation_endpoint() else {
            warn!(runtime_id = %runtime_id, "No invocation endpoint configured, skipping variant");
            return VariantRunSummary::skipped(runtime_id, "no invocation endpoint");
        };
        if let Err(e) = self.invoker.resolve(endpoint, self.config.timeout).await {
            warn!(runtime_id = %runtime_id, endpoint, error = %e, "Endpoint unresolvable, skipping variant");
            return VariantRunSummary::skipped(runtime_id, e.to_string());
        }

        let mut records = Vec::with_capacity(self.config.iterations as usize);
        for iteration in 1..=self.config.iterations {
            let wait = if iteration == 1 {
                self.config.idle
            } else {
                self.config.warm_interval
            };
            debug!(
                runtime_id = %runtime_id,
                iteration,
                wait = %humantime::format_duration(wait),
                "Waiting before invocation"
            );
            tokio::time::sleep(wait).await;

            let result = self.invoker.invoke(endpoint, self.config.timeout).await;
            let record = self.record_for(&runtime_id, iteration, result);
            if let Err(e) = sink.append(&record) {
                error!(runtime_id = %runtime_id, iteration, error = %e, "Failed to write record, aborting variant");
                let mut summary = VariantRunSummary::from_records(runtime_id, &records);
                summary.skipped = Some(format!("output error: {e}"));
                return summary;
            }
            records.push(record);
        }

        VariantRunSummary::from_records(runtime_id, &records)
    }

    fn record_for(
        &self,
        runtime_id: &RuntimeId,
        iteration: u32,
        result: Result<InvocationOutcome, InvokeError>,
    ) -> InvocationRecord {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(runtime_id = %runtime_id, iteration, error = %e, "Invocation failed");
                return InvocationRecord {
                    runtime_id: runtime_id.clone(),
                    iteration,
                    cold_start_detected: false,
                    billed_duration_ms: FAILED_DURATION_MS,
                    reported_memory_mb: 0.0,
                    timestamp: Utc::now(),
                };
            }
        };

        let snapshot = outcome.payload.as_ref().and_then(|payload| {
            extract_snapshot(payload)
                .inspect_err(|e| debug!(runtime_id = %runtime_id, iteration, error = %e, "No usable snapshot in payload"))
                .ok()
        });
        let classification = self.classifier.classify(&Observation {
            log: outcome.log.as_ref(),
            snapshot: snapshot.as_ref(),
        });
        let report = outcome.log.as_ref().and_then(|log| log.report());

        let billed_duration_ms = match (&outcome.function_error, report) {
            (Some(kind), _) => {
                warn!(runtime_id = %runtime_id, iteration, function_error = %kind, "Variant handler failed");
                FAILED_DURATION_MS
            }
            (None, Some(report)) => report
                .effective_duration_ms()
                .unwrap_or_else(|| outcome.wall_clock.as_secs_f64() * 1000.0),
            (None, None) => outcome.wall_clock.as_secs_f64() * 1000.0,
        };
        let reported_memory_mb = report
            .and_then(|r| r.max_memory_used_mb)
            .or_else(|| snapshot.as_ref().map(|s| s.memory.used_mb))
            .unwrap_or(0.0);

        info!(
            runtime_id = %runtime_id,
            iteration,
            cold = classification.cold,
            decided_by = ?classification.decided_by,
            duration_ms = billed_duration_ms,
            memory_mb = reported_memory_mb,
            "Invocation recorded"
        );

        InvocationRecord {
            runtime_id: runtime_id.clone(),
            iteration,
            cold_start_detected: classification.cold,
            billed_duration_ms,
            reported_memory_mb,
            timestamp: Utc::now(),
        }
    }
}


#[cfg(test)]
#[allow(unsafe_code)]
mod env_tests {
    use super::*;
    use mrb_common::EnvError;
    use serial_test::serial;

    const VARS: [&str; 4] = [
        "MRB_ITERATIONS",
        "MRB_IDLE_SECONDS",
        "MRB_WARM_INTERVAL_SECONDS",
        "MRB_TIMEOUT_SECONDS",
    ];

    fn set_env(key: &str, value: &str) {
        // SAFETY: env tests are serialized, no concurrent access to env vars
        unsafe { std::env::set_var(key, value) };
    }

    fn cleanup_env() {
        for var in VARS {
            // SAFETY: env tests are serialized, no concurrent access to env vars
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_when_unset() {
        cleanup_env();
        let config = ColdStartConfig::from_env().unwrap();
        assert_eq!(config.iterations, 10);
        assert_eq!(config.idle, Duration::from_secs(300));
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        set_env("MRB_ITERATIONS", "25");
        set_env("MRB_IDLE_SECONDS", " 600 ");
        let config = ColdStartConfig::from_env().unwrap();
        cleanup_env();
        assert_eq!(config.iterations, 25);
        assert_eq!(config.idle, Duration::from_secs(600));
        assert_eq!(config.warm_interval, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn test_from_env_reports_every_bad_variable() {
        set_env("MRB_ITERATIONS", "0");
        set_env("MRB_IDLE_SECONDS", "five minutes");
        set_env("MRB_TIMEOUT_SECONDS", "60");
        let err = ColdStartConfig::from_env().unwrap_err();
        cleanup_env();
        let ConfigError::Env(errors) = err else {
            panic!("expected env error, got {err:?}");
        };
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[0],
            EnvError::OutOfRange { var, .. } if var == "MRB_ITERATIONS"
        ));
        assert!(matches!(
            &errors[1],
            EnvError::InvalidValue { var, .. } if var == "MRB_IDLE_SECONDS"
        ));
    }
}
