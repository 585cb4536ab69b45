//! Pure aggregation of cold-start records and load samples into a report.
//!
//! The report is built only from its inputs: no wall-clock time, no hash
//! iteration order, statistics computed over sorted values. Identical inputs
//! therefore serialize to identical bytes.

use chrono::{DateTime, Utc};
use mrb_common::stats::ratio;
use mrb_common::{DistributionStats, InvocationRecord, LoadSample, Operation, RuntimeId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A statistic family that may have no data behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Measurement<T> {
    NoSamples,
    Measured(T),
}

impl<T> Measurement<T> {
    pub fn as_measured(&self) -> Option<&T> {
        match self {
            Self::Measured(value) => Some(value),
            Self::NoSamples => None,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, Self::Measured(_))
    }
}

impl<T> From<Option<T>> for Measurement<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NoSamples, Self::Measured)
    }
}

/// Duration statistics of one `(runtime, cold|warm)` group, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
    pub p99: f64,
    #[serde(rename = "avgMemoryMB")]
    pub avg_memory_mb: f64,
}

impl DurationStats {
    fn from_records<'a>(records: impl IntoIterator<Item = &'a InvocationRecord>) -> Option<Self> {
        let (durations, memory): (Vec<f64>, Vec<f64>) = records
            .into_iter()
            .map(|r| (r.billed_duration_ms, r.reported_memory_mb))
            .unzip();
        let stats = DistributionStats::from_values(durations)?;
        let avg_memory_mb = DistributionStats::from_values(memory).map_or(0.0, |m| m.mean);
        Some(Self {
            count: stats.count,
            mean: stats.mean,
            median: stats.median(),
            min: stats.min,
            max: stats.max,
            p95: stats.p95,
            p99: stats.p99,
            avg_memory_mb,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationCounts {
    pub total: usize,
    pub cold: usize,
    pub warm: usize,
    /// Rows carrying the failure sentinel. Excluded from cold and warm.
    pub failed: usize,
}

/// Request statistics of one `(runtime, operation)` group, or of all
/// operations of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub count: usize,
    pub failures: usize,
    pub success_rate: f64,
    pub error_rate: f64,
    pub latency: DistributionStats,
}

impl OperationStats {
    fn from_samples<'a>(samples: impl IntoIterator<Item = &'a LoadSample>) -> Option<Self> {
        let mut failures = 0;
        let mut latencies = Vec::new();
        for sample in samples {
            if !sample.success {
                failures += 1;
            }
            latencies.push(sample.duration_ms);
        }
        let latency = DistributionStats::from_values(latencies)?;
        let count = latency.count;
        Some(Self {
            count,
            failures,
            success_rate: ratio(count.saturating_sub(failures), count),
            error_rate: ratio(failures, count),
            latency,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStats {
    pub overall: OperationStats,
    pub operations: BTreeMap<Operation, OperationStats>,
    /// Samples per second over the span between first and last sample.
    pub throughput_rps: f64,
}

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantReport {
    pub runtime_id: RuntimeId,
    pub invocations: InvocationCounts,
    pub cold: Measurement<DurationStats>,
    pub warm: Measurement<DurationStats>,
    pub load: Measurement<LoadStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEntry {
    pub rank: usize,
    pub runtime_id: RuntimeId,
    pub mean_cold_start_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFindings {
    pub fastest_cold_start: Option<RuntimeId>,
    pub slowest_cold_start: Option<RuntimeId>,
    pub cold_start_difference_ms: Option<f64>,
    pub cold_start_difference_pct: Option<f64>,
    pub lowest_load_latency: Option<RuntimeId>,
    pub lowest_error_rate: Option<RuntimeId>,
}

/// Earliest and latest timestamp across both datasets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataWindow {
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

impl DataWindow {
    fn include(&mut self, ts: DateTime<Utc>) {
        self.first = Some(self.first.map_or(ts, |f| f.min(ts)));
        self.last = Some(self.last.map_or(ts, |l| l.max(ts)));
    }
}

/// Rows skipped during ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedCounts {
    pub invocations: usize,
    pub load_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub variants: Vec<VariantReport>,
    pub ranking: Vec<RankEntry>,
    pub key_findings: KeyFindings,
    pub data_window: DataWindow,
    pub malformed: MalformedCounts,
}

impl ComparisonReport {
    pub fn variant(&self, runtime_id: &str) -> Option<&VariantReport> {
        self.variants
            .iter()
            .find(|v| v.runtime_id.as_str() == runtime_id)
    }
}

/// Build a report from the given records and samples.
pub fn compare(records: &[InvocationRecord], samples: &[LoadSample]) -> ComparisonReport {
    compare_with(&[], records, samples, MalformedCounts::default())
}

/// Like [`compare`], but every id in `known` gets a row even without data,
/// and the ingest's malformed counts are carried into the report.
pub fn compare_with(
    known: &[RuntimeId],
    records: &[InvocationRecord],
    samples: &[LoadSample],
    malformed: MalformedCounts,
) -> ComparisonReport {
    let mut by_runtime_records: BTreeMap<&RuntimeId, Vec<&InvocationRecord>> = BTreeMap::new();
    let mut by_runtime_samples: BTreeMap<&RuntimeId, Vec<&LoadSample>> = BTreeMap::new();
    let mut data_window = DataWindow::default();

    for record in records {
        by_runtime_records
            .entry(&record.runtime_id)
            .or_default()
            .push(record);
        data_window.include(record.timestamp);
    }
    for sample in samples {
        by_runtime_samples
            .entry(&sample.runtime_id)
            .or_default()
            .push(sample);
        data_window.include(sample.timestamp);
    }

    let runtimes: BTreeSet<&RuntimeId> = known
        .iter()
        .chain(by_runtime_records.keys().copied())
        .chain(by_runtime_samples.keys().copied())
        .collect();

    let variants: Vec<VariantReport> = runtimes
        .into_iter()
        .map(|runtime_id| {
            let records = by_runtime_records
                .get(runtime_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let samples = by_runtime_samples
                .get(runtime_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            variant_report(runtime_id, records, samples)
        })
        .collect();

    let ranking = rank_by_cold_start(&variants);
    let key_findings = key_findings(&variants, &ranking);

    ComparisonReport {
        variants,
        ranking,
        key_findings,
        data_window,
        malformed,
    }
}

fn variant_report(
    runtime_id: &RuntimeId,
    records: &[&InvocationRecord],
    samples: &[&LoadSample],
) -> VariantReport {
    let valid = || records.iter().copied().filter(|r| !r.is_failed());
    let cold = DurationStats::from_records(valid().filter(|r| r.cold_start_detected));
    let warm = DurationStats::from_records(valid().filter(|r| !r.cold_start_detected));

    let failed = records.iter().filter(|r| r.is_failed()).count();
    let invocations = InvocationCounts {
        total: records.len(),
        cold: cold.map_or(0, |s| s.count),
        warm: warm.map_or(0, |s| s.count),
        failed,
    };

    VariantReport {
        runtime_id: runtime_id.clone(),
        invocations,
        cold: cold.into(),
        warm: warm.into(),
        load: load_stats(samples).into(),
    }
}

fn load_stats(samples: &[&LoadSample]) -> Option<LoadStats> {
    let overall = OperationStats::from_samples(samples.iter().copied())?;

    let mut grouped: BTreeMap<Operation, Vec<&LoadSample>> = BTreeMap::new();
    for sample in samples.iter().copied() {
        grouped.entry(sample.operation).or_default().push(sample);
    }
    let operations = grouped
        .into_iter()
        .filter_map(|(op, group)| OperationStats::from_samples(group).map(|s| (op, s)))
        .collect();

    let first = samples.iter().map(|s| s.timestamp).min();
    let last = samples.iter().map(|s| s.timestamp).max();
    let span_seconds = match (first, last) {
        (Some(first), Some(last)) => (last - first).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };
    let throughput_rps = if span_seconds > 0.0 {
        overall.count as f64 / span_seconds
    } else {
        0.0
    };

    Some(LoadStats {
        overall,
        operations,
        throughput_rps,
    })
}

/// Ascending mean cold-start duration. Ties are broken by runtime id.
fn rank_by_cold_start(variants: &[VariantReport]) -> Vec<RankEntry> {
    let mut measured: Vec<(&RuntimeId, f64)> = variants
        .iter()
        .filter_map(|v| v.cold.as_measured().map(|s| (&v.runtime_id, s.mean)))
        .collect();
    measured.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    measured
        .into_iter()
        .enumerate()
        .map(|(i, (runtime_id, mean))| RankEntry {
            rank: i + 1,
            runtime_id: runtime_id.clone(),
            mean_cold_start_ms: mean,
        })
        .collect()
}

fn key_findings(variants: &[VariantReport], ranking: &[RankEntry]) -> KeyFindings {
    let mut findings = KeyFindings::default();

    if let (Some(fastest), Some(slowest)) = (ranking.first(), ranking.last()) {
        let difference = slowest.mean_cold_start_ms - fastest.mean_cold_start_ms;
        findings.fastest_cold_start = Some(fastest.runtime_id.clone());
        findings.slowest_cold_start = Some(slowest.runtime_id.clone());
        findings.cold_start_difference_ms = Some(difference);
        findings.cold_start_difference_pct = (fastest.mean_cold_start_ms > 0.0)
            .then(|| difference / fastest.mean_cold_start_ms * 100.0);
    }

    let loaded: Vec<(&RuntimeId, &LoadStats)> = variants
        .iter()
        .filter_map(|v| v.load.as_measured().map(|l| (&v.runtime_id, l)))
        .collect();
    findings.lowest_load_latency = loaded
        .iter()
        .min_by(|a, b| {
            a.1.overall
                .latency
                .mean
                .total_cmp(&b.1.overall.latency.mean)
                .then_with(|| a.0.cmp(b.0))
        })
        .map(|(id, _)| (*id).clone());
    findings.lowest_error_rate = loaded
        .iter()
        .min_by(|a, b| {
            a.1.overall
                .error_rate
                .total_cmp(&b.1.overall.error_rate)
                .then_with(|| a.0.cmp(b.0))
        })
        .map(|(id, _)| (*id).clone());

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mrb_common::FAILED_DURATION_MS;

    fn ts(second: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + second, 0).unwrap()
    }

    fn record(runtime: &str, iteration: u32, cold: bool, duration: f64) -> InvocationRecord {
        InvocationRecord {
            runtime_id: RuntimeId::new(runtime),
            iteration,
            cold_start_detected: cold,
            billed_duration_ms: duration,
            reported_memory_mb: 64.0,
            timestamp: ts(i64::from(iteration)),
        }
    }

    fn sample(runtime: &str, op: Operation, duration: f64, success: bool, second: i64) -> LoadSample {
        LoadSample {
            runtime_id: RuntimeId::new(runtime),
            operation: op,
            status_code: if success { 200 } else { 500 },
            duration_ms: duration,
            success,
            timestamp: ts(second),
        }
    }

    #[test]
    fn test_cold_and_warm_counts() {
        let mut records: Vec<_> = (1..=4).map(|i| record("go", i, true, 300.0)).collect();
        records.extend((5..=10).map(|i| record("go", i, false, 5.0)));

        let report = compare(&records, &[]);
        let go = report.variant("go").unwrap();
        assert_eq!(go.invocations.cold, 4);
        assert_eq!(go.invocations.warm, 6);
        assert_eq!(go.cold.as_measured().unwrap().count, 4);
        assert_eq!(go.warm.as_measured().unwrap().count, 6);
    }

    #[test]
    fn test_failed_rows_excluded_from_stats() {
        let records = vec![
            record("java", 1, true, 900.0),
            record("java", 2, false, FAILED_DURATION_MS),
            record("java", 3, false, 12.0),
        ];
        let report = compare(&records, &[]);
        let java = report.variant("java").unwrap();
        assert_eq!(java.invocations.failed, 1);
        assert_eq!(java.invocations.total, 3);
        let warm = java.warm.as_measured().unwrap();
        assert_eq!(warm.count, 1);
        assert_eq!(warm.min, 12.0);
    }

    #[test]
    fn test_known_variant_without_data_gets_no_samples_row() {
        let records = vec![record("go", 1, true, 120.0)];
        let report = compare_with(
            &[RuntimeId::new("rust")],
            &records,
            &[],
            MalformedCounts::default(),
        );

        let rust = report.variant("rust").unwrap();
        assert_eq!(rust.cold, Measurement::NoSamples);
        assert_eq!(rust.load, Measurement::NoSamples);
        assert_eq!(report.ranking.len(), 1);

        let json = serde_json::to_value(&report).unwrap();
        let row = json["variants"]
            .as_array()
            .unwrap()
            .iter()
            .find(|v| v["runtimeId"] == "rust")
            .unwrap();
        assert_eq!(row["cold"]["status"], "no_samples");
        assert!(row["cold"].get("mean").is_none());
    }

    #[test]
    fn test_ranking_and_key_findings() {
        let records = vec![
            record("java", 1, true, 800.0),
            record("python", 1, true, 200.0),
            record("go", 1, true, 100.0),
        ];
        let samples = vec![
            sample("java", Operation::Health, 10.0, true, 0),
            sample("java", Operation::Health, 10.0, true, 2),
            sample("go", Operation::Health, 30.0, false, 0),
            sample("go", Operation::Health, 30.0, true, 1),
        ];
        let report = compare(&records, &samples);

        let order: Vec<_> = report.ranking.iter().map(|r| r.runtime_id.as_str()).collect();
        assert_eq!(order, vec!["go", "python", "java"]);

        let findings = &report.key_findings;
        assert_eq!(findings.fastest_cold_start.as_ref().unwrap().as_str(), "go");
        assert_eq!(findings.slowest_cold_start.as_ref().unwrap().as_str(), "java");
        assert_eq!(findings.cold_start_difference_ms, Some(700.0));
        assert_eq!(findings.cold_start_difference_pct, Some(700.0));
        assert_eq!(findings.lowest_load_latency.as_ref().unwrap().as_str(), "java");
        assert_eq!(findings.lowest_error_rate.as_ref().unwrap().as_str(), "java");

        let java_load = report.variant("java").unwrap().load.as_measured().unwrap();
        assert_eq!(java_load.throughput_rps, 1.0);
        assert_eq!(report.data_window.first, Some(ts(0)));
        assert_eq!(report.data_window.last, Some(ts(2)));
    }

    #[test]
    fn test_p95_tail_stays_near_body() {
        let mut samples: Vec<_> = (0..95)
            .map(|i| sample("python", Operation::Create, 30.0 + f64::from(i % 90), true, 0))
            .collect();
        samples.extend(
            [500.0, 600.0, 700.0, 800.0, 900.0]
                .into_iter()
                .map(|d| sample("python", Operation::Create, d, true, 1)),
        );

        let report = compare(&[], &samples);
        let load = report.variant("python").unwrap().load.as_measured().unwrap();
        let create = load.operations[&Operation::Create];
        assert!(create.latency.p95 <= 120.0);
        assert!(create.latency.p95 <= create.latency.max);
        assert_eq!(create.latency.max, 900.0);
    }

    #[test]
    fn test_input_order_does_not_change_report() {
        let records = vec![
            record("go", 1, true, 100.1),
            record("go", 2, false, 3.3),
            record("go", 3, false, 7.7),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let a = serde_json::to_string(&compare(&records, &[])).unwrap();
        let b = serde_json::to_string(&compare(&reversed, &[])).unwrap();
        assert_eq!(a, b);
    }
}
