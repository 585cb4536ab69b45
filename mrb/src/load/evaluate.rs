//! Threshold evaluation of a finished load run.

use super::scenario::Thresholds;
use mrb_common::stats::ratio;
use mrb_common::{DistributionStats, LoadSample, RuntimeId};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdViolation {
    pub metric: &'static str,
    pub observed: f64,
    pub limit: f64,
}

/// Verdict and headline numbers of one load run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRunSummary {
    pub runtime_id: RuntimeId,
    pub passed: bool,
    pub violations: Vec<ThresholdViolation>,
    pub thresholds: Thresholds,
    pub total_requests: usize,
    pub failed_requests: usize,
    pub error_rate: f64,
    /// `None` when the run produced no samples.
    pub latency: Option<DistributionStats>,
    pub duration_seconds: f64,
    pub requests_per_second: f64,
    /// Samples the sink could not write to disk.
    pub write_errors: usize,
}

/// Compare observed p95, p99 and error rate against `thresholds`.
pub fn evaluate(
    runtime_id: RuntimeId,
    samples: &[LoadSample],
    thresholds: &Thresholds,
    elapsed: Duration,
) -> LoadRunSummary {
    let total_requests = samples.len();
    let failed_requests = samples.iter().filter(|s| !s.success).count();
    let error_rate = ratio(failed_requests, total_requests);
    let latency = DistributionStats::from_values(samples.iter().map(|s| s.duration_ms));

    let mut violations = Vec::new();
    if let Some(stats) = latency {
        if stats.p95 > thresholds.p95_latency_ms {
            violations.push(ThresholdViolation {
                metric: "p95LatencyMs",
                observed: stats.p95,
                limit: thresholds.p95_latency_ms,
            });
        }
        if stats.p99 > thresholds.p99_latency_ms {
            violations.push(ThresholdViolation {
                metric: "p99LatencyMs",
                observed: stats.p99,
                limit: thresholds.p99_latency_ms,
            });
        }
    }
    if error_rate > thresholds.max_error_rate {
        violations.push(ThresholdViolation {
            metric: "maxErrorRate",
            observed: error_rate,
            limit: thresholds.max_error_rate,
        });
    }

    let duration_seconds = elapsed.as_secs_f64();
    let requests_per_second = if duration_seconds > 0.0 {
        total_requests as f64 / duration_seconds
    } else {
        0.0
    };

    let summary = LoadRunSummary {
        runtime_id,
        passed: violations.is_empty(),
        violations,
        thresholds: *thresholds,
        total_requests,
        failed_requests,
        error_rate,
        latency,
        duration_seconds,
        requests_per_second,
        write_errors: 0,
    };

    if summary.passed {
        info!(
            runtime_id = %summary.runtime_id,
            total = total_requests,
            failed = failed_requests,
            "Load run within thresholds"
        );
    } else {
        for v in &summary.violations {
            warn!(
                runtime_id = %summary.runtime_id,
                metric = v.metric,
                observed = v.observed,
                limit = v.limit,
                "Threshold violated"
            );
        }
    }
    summary
}
