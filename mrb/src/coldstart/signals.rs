//! Cold/warm classification from independent signals.
//!
//! Extractors run in order. Each returns an optional [`Verdict`]; the first
//! authoritative verdict decides. Without one, the non-authoritative
//! verdicts are OR-ed. Disagreement is logged, never raised.
//!
//! The platform log is authoritative whenever it contains a `REPORT` line or
//! a startup marker: the platform itself knows whether it started a new
//! environment. The embedded snapshot's `coldStart` only backs it up when the
//! log is missing or truncated.

use super::platform_log::PlatformLog;
use mrb_common::MetricsSnapshot;
use tracing::debug;

/// What each signal extractor can look at for one invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Observation<'a> {
    pub log: Option<&'a PlatformLog>,
    pub snapshot: Option<&'a MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    PlatformLog,
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub cold: bool,
    pub authoritative: bool,
    pub source: SignalSource,
}

pub trait SignalExtractor: Send + Sync {
    fn extract(&self, observation: &Observation<'_>) -> Option<Verdict>;
}

/// Startup marker in the platform log.
#[derive(Debug, Default)]
pub struct LogMarkerSignal;

impl SignalExtractor for LogMarkerSignal {
    fn extract(&self, observation: &Observation<'_>) -> Option<Verdict> {
        let log = observation.log?;
        let marker = log.has_startup_marker();
        // A log without a REPORT line is truncated; only a marker is conclusive then.
        if !marker && log.report().is_none() {
            return None;
        }
        Some(Verdict {
            cold: marker,
            authoritative: true,
            source: SignalSource::PlatformLog,
        })
    }
}

/// `coldStart` field of the embedded snapshot.
#[derive(Debug, Default)]
pub struct SnapshotSignal;

impl SignalExtractor for SnapshotSignal {
    fn extract(&self, observation: &Observation<'_>) -> Option<Verdict> {
        observation.snapshot.map(|s| Verdict {
            cold: s.cold_start,
            authoritative: false,
            source: SignalSource::Snapshot,
        })
    }
}

/// Outcome of classifying one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub cold: bool,
    /// Signal that decided, `None` when no signal was available.
    pub decided_by: Option<SignalSource>,
    /// Whether any two signals disagreed.
    pub conflict: bool,
}

pub struct Classifier {
    extractors: Vec<Box<dyn SignalExtractor>>,
}

impl Classifier {
    pub fn new(extractors: Vec<Box<dyn SignalExtractor>>) -> Self {
        Self { extractors }
    }

    /// Log marker first, snapshot second.
    pub fn standard() -> Self {
        Self::new(vec![Box::new(LogMarkerSignal), Box::new(SnapshotSignal)])
    }

    pub fn classify(&self, observation: &Observation<'_>) -> Classification {
        let verdicts: Vec<Verdict> = self
            .extractors
            .iter()
            .filter_map(|e| e.extract(observation))
            .collect();

        let conflict = verdicts.windows(2).any(|w| w[0].cold != w[1].cold);

        let classification = match verdicts.iter().find(|v| v.authoritative) {
            Some(v) => Classification {
                cold: v.cold,
                decided_by: Some(v.source),
                conflict,
            },
            None => {
                let cold_vote = verdicts.iter().find(|v| v.cold);
                Classification {
                    cold: cold_vote.is_some(),
                    decided_by: cold_vote.or(verdicts.first()).map(|v| v.source),
                    conflict,
                }
            }
        };

        if conflict {
            debug!(
                cold = classification.cold,
                decided_by = ?classification.decided_by,
                "Cold-start signals disagree"
            );
        }
        classification
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::standard()
    }
}
