//! Cold-start run to CSV to comparison report, with a scripted invoker.

mod common;

use common::init_test_logging;
use mrb::coldstart::{
    ColdStartConfig, ColdStartOrchestrator, InvocationOutcome, InvokeError, Invoker, PlatformLog,
};
use mrb::compare::{Measurement, ingest, render, write_outputs};
use mrb_common::{InvocationCsvWriter, RuntimeId, VariantEndpoint};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

const COLD_LOG: &str = "INIT_START Runtime Version: provided:al2023\n\
START RequestId: c1\n\
REPORT RequestId: c1\tDuration: 95.20 ms\tBilled Duration: 96 ms\tMemory Size: 128 MB\tMax Memory Used: 22 MB\tInit Duration: 41.07 ms\n";

const WARM_LOG: &str = "START RequestId: w1\n\
REPORT RequestId: w1\tDuration: 2.10 ms\tBilled Duration: 3 ms\tMemory Size: 128 MB\tMax Memory Used: 23 MB\n";

struct ScriptedInvoker {
    outcomes: Mutex<VecDeque<Result<InvocationOutcome, InvokeError>>>,
}

impl ScriptedInvoker {
    fn from_logs<'a>(logs: impl IntoIterator<Item = &'a str>) -> Self {
        let outcomes = logs
            .into_iter()
            .map(|log| {
                Ok(InvocationOutcome {
                    log: Some(PlatformLog::new(log)),
                    payload: None,
                    wall_clock: Duration::from_millis(150),
                    function_error: None,
                })
            })
            .collect();
        Self {
            outcomes: Mutex::new(outcomes),
        }
    }
}

impl Invoker for ScriptedInvoker {
    async fn resolve(&self, _endpoint: &str, _timeout: Duration) -> Result<(), InvokeError> {
        Ok(())
    }

    async fn invoke(
        &self,
        _endpoint: &str,
        timeout: Duration,
    ) -> Result<InvocationOutcome, InvokeError> {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(InvokeError::Timeout(timeout)))
    }
}

fn endpoint(runtime: &str) -> VariantEndpoint {
    VariantEndpoint {
        runtime_id: RuntimeId::new(runtime),
        invocation_endpoint: format!("bench-{runtime}"),
        http_base_url: String::new(),
    }
}

fn config(iterations: u32) -> ColdStartConfig {
    ColdStartConfig {
        iterations,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_four_cold_six_warm_reach_the_report() {
    init_test_logging();
    info!(test = "test_four_cold_six_warm_reach_the_report", phase = "setup");
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("results/cold-starts.csv");

    let mut logs = vec![COLD_LOG; 4];
    logs.extend([WARM_LOG; 6]);
    let orchestrator = ColdStartOrchestrator::new(ScriptedInvoker::from_logs(logs), config(10));
    let go = endpoint("go");

    info!(test = "test_four_cold_six_warm_reach_the_report", phase = "execute");
    let mut writer = InvocationCsvWriter::open(&csv).unwrap();
    let summaries = orchestrator.run(&[&go], &mut writer).await;
    drop(writer);

    let inputs = ingest(Some(&csv), None).unwrap();
    let report = inputs.compare(&[RuntimeId::new("go"), RuntimeId::new("java")]);

    info!(test = "test_four_cold_six_warm_reach_the_report", phase = "assert");
    assert_eq!(summaries[0].recorded, 10);
    assert_eq!(inputs.invocations.rows.len(), 10);
    assert_eq!(inputs.invocations.malformed, 0);

    let row = report.variant("go").unwrap();
    assert_eq!(row.invocations.cold, 4);
    assert_eq!(row.invocations.warm, 6);
    let cold = row.cold.as_measured().unwrap();
    assert_eq!(cold.mean, 96.0);
    assert_eq!(cold.avg_memory_mb, 22.0);

    let java = report.variant("java").unwrap();
    assert_eq!(java.cold, Measurement::NoSamples);
    assert!(render(&report).contains("| java | cold | 0 | no samples |"));
    info!(test = "test_four_cold_six_warm_reach_the_report", phase = "complete");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_recorded_as_failed_and_run_continues() {
    init_test_logging();
    info!(test = "test_timeout_recorded_as_failed_and_run_continues", phase = "setup");
    // Script only two outcomes; the third invocation times out.
    let orchestrator = ColdStartOrchestrator::new(
        ScriptedInvoker::from_logs([COLD_LOG, WARM_LOG]),
        config(3),
    );
    let python = endpoint("python");
    let mut records = Vec::new();

    info!(test = "test_timeout_recorded_as_failed_and_run_continues", phase = "execute");
    let summaries = orchestrator.run(&[&python], &mut records).await;

    info!(test = "test_timeout_recorded_as_failed_and_run_continues", phase = "assert");
    assert_eq!(records.len(), 3);
    assert!(records[2].is_failed());
    assert_eq!(summaries[0].failed, 1);
    assert_eq!(
        records.iter().map(|r| r.iteration).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    info!(test = "test_timeout_recorded_as_failed_and_run_continues", phase = "complete");
}

#[tokio::test(start_paused = true)]
async fn test_report_files_are_byte_identical_across_runs() {
    init_test_logging();
    info!(test = "test_report_files_are_byte_identical_across_runs", phase = "setup");
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("cold-starts.csv");
    let orchestrator = ColdStartOrchestrator::new(
        ScriptedInvoker::from_logs([COLD_LOG, WARM_LOG, WARM_LOG]),
        config(3),
    );
    let rust = endpoint("rust");
    let mut writer = InvocationCsvWriter::open(&csv).unwrap();
    orchestrator.run(&[&rust], &mut writer).await;
    drop(writer);

    info!(test = "test_report_files_are_byte_identical_across_runs", phase = "execute");
    let first = write_outputs(&ingest(Some(&csv), None).unwrap().compare(&[]), &dir.path().join("a")).unwrap();
    let second = write_outputs(&ingest(Some(&csv), None).unwrap().compare(&[]), &dir.path().join("b")).unwrap();

    info!(test = "test_report_files_are_byte_identical_across_runs", phase = "assert");
    assert_eq!(
        std::fs::read(&first.json).unwrap(),
        std::fs::read(&second.json).unwrap()
    );
    assert_eq!(
        std::fs::read(&first.markdown).unwrap(),
        std::fs::read(&second.markdown).unwrap()
    );
    info!(test = "test_report_files_are_byte_identical_across_runs", phase = "complete");
}

fn run_scripted(markers: &[bool]) -> Vec<mrb_common::InvocationRecord> {
    let logs: Vec<&str> = markers
        .iter()
        .map(|&cold| if cold { COLD_LOG } else { WARM_LOG })
        .collect();
    let orchestrator = ColdStartOrchestrator::new(
        ScriptedInvoker::from_logs(logs),
        config(markers.len() as u32),
    );
    let variant = endpoint("nodejs");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    let mut records = Vec::new();
    runtime.block_on(orchestrator.run(&[&variant], &mut records));
    records
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The record of iteration i is cold exactly when its log carried a marker.
    #[test]
    fn prop_cold_flag_follows_log_marker(markers in prop::collection::vec(any::<bool>(), 1..8)) {
        let records = run_scripted(&markers);
        prop_assert_eq!(records.len(), markers.len());
        for (i, (record, marker)) in records.iter().zip(&markers).enumerate() {
            prop_assert_eq!(record.iteration, i as u32 + 1);
            prop_assert_eq!(record.cold_start_detected, *marker);
        }
    }
}
