//! Process memory introspection via `/proc`.
//!
//! - `usedMB`: current resident set (`VmRSS`)
//! - `totalMB`: peak resident set (`VmHWM`)
//! - `maxMB`: platform memory limit, else cgroup limit, else `MemTotal`
//!
//! Values are clamped so that `used <= total <= max` always holds.

use mrb_common::MemoryUsage;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

const KB_PER_MB: f64 = 1024.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// cgroup v1 reports "unlimited" as a page-aligned value near `i64::MAX`.
const CGROUP_UNLIMITED_THRESHOLD: u64 = 1 << 60;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("missing field '{0}'")]
    MissingField(&'static str),
}

/// Resident-set figures from `/proc/self/status`, in kB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidentSet {
    pub rss_kb: u64,
    pub hwm_kb: u64,
}

impl ResidentSet {
    pub fn read_from_proc() -> Result<Self, MemoryError> {
        let content = std::fs::read_to_string("/proc/self/status").map_err(|source| {
            MemoryError::Read {
                path: "/proc/self/status",
                source,
            }
        })?;
        Self::parse(&content)
    }

    /// Parse `/proc/<pid>/status` content.
    pub fn parse(content: &str) -> Result<Self, MemoryError> {
        let fields = parse_kb_fields(content);
        let rss_kb = *fields
            .get("VmRSS")
            .ok_or(MemoryError::MissingField("VmRSS"))?;
        // Kernel threads and some sandboxes omit the high-water mark.
        let hwm_kb = fields.get("VmHWM").copied().unwrap_or(rss_kb);
        Ok(Self { rss_kb, hwm_kb })
    }
}

/// Parse `Key:   12345 kB` lines into a map of kB values.
fn parse_kb_fields(content: &str) -> HashMap<&str, u64> {
    content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let value = value.trim().trim_end_matches("kB").trim();
            value.parse::<u64>().ok().map(|kb| (key.trim(), kb))
        })
        .collect()
}

/// Parse a cgroup limit file (`memory.max` or `memory.limit_in_bytes`).
///
/// Returns `None` for "max" or an effectively unlimited value.
pub fn parse_cgroup_limit(content: &str) -> Option<u64> {
    let value = content.trim();
    if value == "max" {
        return None;
    }
    value
        .parse::<u64>()
        .ok()
        .filter(|bytes| *bytes > 0 && *bytes < CGROUP_UNLIMITED_THRESHOLD)
}

fn cgroup_limit_mb() -> Option<f64> {
    ["/sys/fs/cgroup/memory.max", "/sys/fs/cgroup/memory/memory.limit_in_bytes"]
        .iter()
        .find_map(|path| {
            let content = std::fs::read_to_string(path).ok()?;
            parse_cgroup_limit(&content)
        })
        .map(|bytes| bytes as f64 / BYTES_PER_MB)
}

fn physical_memory_mb() -> Option<f64> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_kb_fields(&content)
        .get("MemTotal")
        .map(|kb| *kb as f64 / KB_PER_MB)
}

/// Resolve the memory ceiling once per process.
///
/// `platform_limit_mb` is the managed environment's configured memory size.
pub fn memory_limit_mb(platform_limit_mb: Option<u64>) -> f64 {
    static LIMIT: OnceLock<f64> = OnceLock::new();
    *LIMIT.get_or_init(|| {
        let limit = platform_limit_mb
            .map(|mb| mb as f64)
            .or_else(cgroup_limit_mb)
            .or_else(physical_memory_mb)
            .unwrap_or(0.0);
        debug!(limit_mb = limit, "Resolved memory limit");
        limit
    })
}

/// Build a [`MemoryUsage`] from raw figures, enforcing `used <= total <= max`.
pub fn clamp_usage(used_mb: f64, total_mb: f64, max_mb: f64) -> MemoryUsage {
    let finite = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
    let used_mb = finite(used_mb);
    let total_mb = finite(total_mb).max(used_mb);
    let max_mb = finite(max_mb).max(total_mb);
    MemoryUsage {
        used_mb,
        total_mb,
        max_mb,
    }
}

/// Sample current memory usage. All zeros when `/proc` is unavailable.
pub fn sample(platform_limit_mb: Option<u64>) -> MemoryUsage {
    match ResidentSet::read_from_proc() {
        Ok(rs) => clamp_usage(
            rs.rss_kb as f64 / KB_PER_MB,
            rs.hwm_kb as f64 / KB_PER_MB,
            memory_limit_mb(platform_limit_mb),
        ),
        Err(e) => {
            debug!(error = %e, "Process memory unavailable");
            MemoryUsage::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const STATUS_SAMPLE: &str = "\
Name:\tbootstrap
State:\tS (sleeping)
VmPeak:\t  120344 kB
VmHWM:\t   24576 kB
VmRSS:\t   20480 kB
Threads:\t4
";

    #[test]
    fn test_parse_status() {
        let rs = ResidentSet::parse(STATUS_SAMPLE).unwrap();
        assert_eq!(rs.rss_kb, 20480);
        assert_eq!(rs.hwm_kb, 24576);
    }

    #[test]
    fn test_parse_status_without_hwm() {
        let rs = ResidentSet::parse("VmRSS:\t  1024 kB\n").unwrap();
        assert_eq!(rs.hwm_kb, 1024);
    }

    #[test]
    fn test_parse_status_missing_rss() {
        assert!(matches!(
            ResidentSet::parse("Name:\tinit\n"),
            Err(MemoryError::MissingField("VmRSS"))
        ));
    }

    #[test]
    fn test_parse_cgroup_limit() {
        assert_eq!(parse_cgroup_limit("max\n"), None);
        assert_eq!(parse_cgroup_limit("134217728\n"), Some(134_217_728));
        assert_eq!(parse_cgroup_limit("9223372036854771712"), None);
        assert_eq!(parse_cgroup_limit("garbage"), None);
    }

    #[test]
    fn test_clamp_raises_total_and_max() {
        let usage = clamp_usage(30.0, 20.0, 10.0);
        assert_eq!(usage.used_mb, 30.0);
        assert_eq!(usage.total_mb, 30.0);
        assert_eq!(usage.max_mb, 30.0);

        let usage = clamp_usage(f64::NAN, -1.0, 128.0);
        assert_eq!(usage, MemoryUsage { used_mb: 0.0, total_mb: 0.0, max_mb: 128.0 });
    }

    #[test]
    fn test_sample_respects_ordering() {
        let usage = sample(Some(128));
        assert!(usage.used_mb <= usage.total_mb);
        assert!(usage.total_mb <= usage.max_mb);
    }

    proptest! {
        #[test]
        fn prop_clamp_always_ordered(used in -10.0f64..1e6, total in -10.0f64..1e6, max in -10.0f64..1e6) {
            let usage = clamp_usage(used, total, max);
            prop_assert!(usage.used_mb >= 0.0);
            prop_assert!(usage.used_mb <= usage.total_mb);
            prop_assert!(usage.total_mb <= usage.max_mb);
        }
    }
}
