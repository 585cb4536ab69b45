//! Ramp controller: keeps the number of running virtual users at the
//! scenario's target concurrency until the last stage ends.

use super::client::{VirtualUser, VuSettings};
use super::evaluate::{LoadRunSummary, evaluate};
use super::scenario::{LoadScenario, ScenarioError};
use super::sink::{SinkReport, open_sink};
use mrb_common::RuntimeId;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Interval at which the controller re-evaluates target concurrency.
const CONTROL_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to open sample output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a run: verdict plus every sample collected.
#[derive(Debug)]
pub struct LoadRun {
    pub summary: LoadRunSummary,
    pub sink: SinkReport,
}

struct ActiveUser {
    stop: watch::Sender<bool>,
}

pub struct LoadGenerator {
    scenario: LoadScenario,
}

impl LoadGenerator {
    pub fn new(scenario: LoadScenario) -> Self {
        Self { scenario }
    }

    pub fn scenario(&self) -> &LoadScenario {
        &self.scenario
    }

    /// Run the scenario against `base_url`, streaming samples to `output`
    /// when given. Only setup failures are errors; request failures end up
    /// in the samples.
    pub async fn run(
        &self,
        runtime_id: RuntimeId,
        base_url: &str,
        output: Option<&Path>,
    ) -> Result<LoadRun, LoadError> {
        self.scenario.validate()?;
        let client = reqwest::Client::builder()
            .timeout(self.scenario.request_timeout())
            .build()?;
        let (sink, writer) = open_sink(output).await.map_err(|source| LoadError::Output {
            path: output.map(Path::to_path_buf).unwrap_or_default(),
            source,
        })?;
        let settings = VuSettings {
            runtime_id: runtime_id.clone(),
            base_url: base_url.to_string(),
            think_time: self.scenario.think_time(),
            list_limit: self.scenario.list_limit,
        };

        info!(
            runtime_id = %runtime_id,
            base_url,
            stages = self.scenario.stages.len(),
            total = %humantime::format_duration(self.scenario.total_duration()),
            "Starting load run"
        );

        let started = Instant::now();
        let mut active: Vec<ActiveUser> = Vec::new();
        let mut users = JoinSet::new();
        let mut next_vu_id = 0usize;
        let mut ticker = tokio::time::interval(CONTROL_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(target) = self.scenario.concurrency_at(started.elapsed()) else {
                break;
            };
            let target = target as usize;

            if active.len() != target {
                debug!(runtime_id = %runtime_id, from = active.len(), to = target, "Adjusting concurrency");
            }
            while active.len() < target {
                let (stop, stop_rx) = watch::channel(false);
                let user = VirtualUser::new(next_vu_id, client.clone(), settings.clone(), sink.clone());
                users.spawn(user.run(stop_rx));
                active.push(ActiveUser { stop });
                next_vu_id += 1;
            }
            while active.len() > target {
                if let Some(user) = active.pop() {
                    let _ = user.stop.send(true);
                }
            }
        }

        for user in active.drain(..) {
            let _ = user.stop.send(true);
        }
        // In-flight requests finish or hit the request timeout.
        while let Some(joined) = users.join_next().await {
            if let Err(e) = joined {
                warn!(runtime_id = %runtime_id, error = %e, "Virtual user task failed");
            }
        }
        let elapsed = started.elapsed();
        drop(sink);
        let sink_report = writer.finish().await;

        let mut summary = evaluate(
            runtime_id,
            &sink_report.samples,
            &self.scenario.thresholds,
            elapsed,
        );
        summary.write_errors = sink_report.write_errors;

        info!(
            runtime_id = %summary.runtime_id,
            virtual_users = next_vu_id,
            samples = summary.total_requests,
            elapsed = %humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64)),
            "Load run finished"
        );

        Ok(LoadRun {
            summary,
            sink: sink_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::scenario::Stage;

    #[tokio::test(start_paused = true)]
    async fn test_zero_concurrency_stage_produces_no_samples() {
        let scenario = LoadScenario {
            stages: vec![Stage::new(5.0, 0)],
            ..Default::default()
        };
        let generator = LoadGenerator::new(scenario);

        let started = Instant::now();
        let run = generator
            .run(RuntimeId::new("go"), "http://127.0.0.1:9", None)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(run.summary.total_requests, 0);
        assert!(run.sink.samples.is_empty());
        assert!(run.summary.passed);
    }

    #[tokio::test]
    async fn test_invalid_scenario_rejected_before_run() {
        let generator = LoadGenerator::new(LoadScenario {
            stages: vec![Stage::new(f64::INFINITY, 1)],
            ..Default::default()
        });
        let err = generator
            .run(RuntimeId::new("go"), "http://127.0.0.1:9", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Scenario(ScenarioError::Invalid(_))));
    }
}
