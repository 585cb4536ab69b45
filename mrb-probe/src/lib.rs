//! Metrics probe embedded in every benchmark variant.
//!
//! [`MetricsProbe::get_metrics`] computes a [`MetricsSnapshot`] on demand.
//! It only introspects the current process and never blocks on the network,
//! so it is safe to call on every request. Its single side effect is
//! clearing the process-wide cold-start flag on the first call.

pub mod memory;
pub mod platform;
pub mod runtime_context;

pub use runtime_context::{RuntimeContext, mark_process_start, process_context};

use mrb_common::{EnvParser, MetricsSnapshot, PlatformContext, RuntimeId};
use std::sync::LazyLock;
use tracing::debug;

/// Runtime id reported when `RUNTIME_NAME` is not set.
pub const DEFAULT_RUNTIME_ID: &str = "rust";

/// Runtime version string of this build.
pub const RUNTIME_VERSION: &str = concat!("rust/mrb-probe-", env!("CARGO_PKG_VERSION"));

/// Identity of the embedding variant. Fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct ProbeIdentity {
    pub runtime_id: RuntimeId,
    pub runtime_version: String,
    pub environment: String,
    pub platform: Option<PlatformContext>,
}

impl ProbeIdentity {
    /// Read `RUNTIME_NAME`, `ENVIRONMENT` and the platform context.
    pub fn from_env(default_runtime_id: &str) -> Self {
        let mut env = EnvParser::with_prefix("");
        Self {
            runtime_id: RuntimeId::new(env.get_string("RUNTIME_NAME", default_runtime_id)),
            runtime_version: RUNTIME_VERSION.to_string(),
            environment: env.get_string("ENVIRONMENT", "dev"),
            platform: platform::context_from_env(),
        }
    }

    pub fn new(runtime_id: impl Into<RuntimeId>) -> Self {
        Self {
            runtime_id: runtime_id.into(),
            runtime_version: RUNTIME_VERSION.to_string(),
            environment: "dev".to_string(),
            platform: None,
        }
    }

    #[must_use]
    pub fn with_runtime_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = version.into();
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: PlatformContext) -> Self {
        self.platform = Some(platform);
        self
    }
}

/// Computes snapshots against one [`RuntimeContext`].
#[derive(Debug, Clone)]
pub struct MetricsProbe<'a> {
    identity: ProbeIdentity,
    context: &'a RuntimeContext,
}

impl<'a> MetricsProbe<'a> {
    pub fn new(identity: ProbeIdentity, context: &'a RuntimeContext) -> Self {
        Self { identity, context }
    }

    pub fn identity(&self) -> &ProbeIdentity {
        &self.identity
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let cold_start = self.context.consume_cold_start_flag();
        let uptime_seconds = self.context.uptime().as_secs_f64();
        let platform_limit = self
            .identity
            .platform
            .as_ref()
            .and_then(|p| p.memory_limit_mb);
        let memory = memory::sample(platform_limit);

        if cold_start {
            debug!(
                runtime_id = %self.identity.runtime_id,
                uptime_seconds,
                "First snapshot of this process"
            );
        }

        MetricsSnapshot {
            runtime_id: self.identity.runtime_id.clone(),
            cold_start,
            uptime_seconds,
            memory,
            runtime_version: self.identity.runtime_version.clone(),
            environment: self.identity.environment.clone(),
            platform_context: self.identity.platform.clone(),
        }
    }
}

impl MetricsProbe<'static> {
    /// A probe bound to the process-wide context.
    pub fn for_process(identity: ProbeIdentity) -> Self {
        Self::new(identity, process_context())
    }
}

static PROCESS_PROBE: LazyLock<MetricsProbe<'static>> =
    LazyLock::new(|| MetricsProbe::for_process(ProbeIdentity::from_env(DEFAULT_RUNTIME_ID)));

/// Snapshot from the process-wide probe, configured from the environment.
pub fn get_metrics() -> MetricsSnapshot {
    PROCESS_PROBE.get_metrics()
}
