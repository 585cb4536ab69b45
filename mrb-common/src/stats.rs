//! Descriptive statistics over latency samples.
//!
//! Percentiles use the nearest-rank method: sort, then pick the value at
//! rank `ceil(p / 100 * n)` (1-based, clamped to `1..=n`). The result is
//! always an observed sample, so it can never exceed the maximum.

use serde::{Deserialize, Serialize};

/// Nearest-rank percentile of an ascending slice.
///
/// Returns `None` for an empty slice.
pub fn percentile_nearest_rank(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let pct = pct.clamp(0.0, 100.0);
    let rank = ((pct / 100.0) * n as f64).ceil() as usize;
    let rank = rank.clamp(1, n);
    Some(sorted[rank - 1])
}

/// Summary of a distribution of durations in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl DistributionStats {
    /// Compute statistics over the finite values of `values`.
    ///
    /// Returns `None` when no finite value remains, so callers can report
    /// "no samples" instead of a zero or NaN.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let pick = |pct| percentile_nearest_rank(&sorted, pct).unwrap_or(0.0);

        Some(Self {
            count,
            mean,
            min: sorted[0],
            max: sorted[count - 1],
            p50: pick(50.0),
            p90: pick(90.0),
            p95: pick(95.0),
            p99: pick(99.0),
        })
    }

    /// Median (nearest-rank p50).
    pub fn median(&self) -> f64 {
        self.p50
    }
}

/// Ratio of `part` to `whole`, 0 when `whole` is 0.
pub fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
