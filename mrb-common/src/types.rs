//! Data model shared by the probe, the drivers and the comparison engine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stable identifier of a deployed variant (e.g. `python`, `go`).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct RuntimeId(pub String);

impl RuntimeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuntimeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RuntimeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Memory figures reported by a variant, in megabytes.
///
/// Invariant: `used_mb <= total_mb <= max_mb`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryUsage {
    /// Memory currently in use by the process.
    #[serde(rename = "usedMB", alias = "used_mb")]
    pub used_mb: f64,
    /// Memory reserved by the process (peak resident set).
    #[serde(rename = "totalMB", alias = "total_mb")]
    pub total_mb: f64,
    /// Upper bound the process may use.
    #[serde(rename = "maxMB", alias = "max_mb")]
    pub max_mb: f64,
}

/// Identifiers of the managed execution environment.
///
/// Only present when the variant runs inside the serverless platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformContext {
    /// Function name.
    #[serde(alias = "function_name")]
    pub instance_id: String,
    /// Function version (e.g. `$LATEST`).
    #[serde(default, alias = "function_version")]
    pub instance_version: String,
    /// Log stream the current execution environment writes to.
    #[serde(default, alias = "log_stream")]
    pub log_stream_id: String,
    #[serde(
        default,
        rename = "memoryLimitMB",
        alias = "memory_limit_mb",
        skip_serializing_if = "Option::is_none"
    )]
    pub memory_limit_mb: Option<u64>,
    #[serde(default, alias = "log_group", skip_serializing_if = "Option::is_none")]
    pub log_group: Option<String>,
}

/// Runtime snapshot computed by a variant on every `/metrics` or `/health` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    #[serde(alias = "runtime", alias = "runtime_id")]
    pub runtime_id: RuntimeId,
    /// True only for the first snapshot of a process.
    #[serde(alias = "cold_start")]
    pub cold_start: bool,
    /// Seconds since the process-level init marker.
    #[serde(alias = "uptime_seconds")]
    pub uptime_seconds: f64,
    pub memory: MemoryUsage,
    #[serde(default, alias = "runtime_version")]
    pub runtime_version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(
        default,
        alias = "platform_context",
        alias = "lambda",
        skip_serializing_if = "Option::is_none"
    )]
    pub platform_context: Option<PlatformContext>,
}

fn default_environment() -> String {
    "dev".to_string()
}

/// Duration written for invocations that never produced a measurement.
pub const FAILED_DURATION_MS: f64 = -1.0;

/// One cold-start measurement. Append-only; never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRecord {
    pub runtime_id: RuntimeId,
    /// 1-based iteration within the variant's run.
    pub iteration: u32,
    pub cold_start_detected: bool,
    /// Billed duration, or [`FAILED_DURATION_MS`] when the invocation failed.
    pub billed_duration_ms: f64,
    pub reported_memory_mb: f64,
    pub timestamp: DateTime<Utc>,
}

impl InvocationRecord {
    /// Whether this row carries the failure sentinel instead of a duration.
    pub fn is_failed(&self) -> bool {
        self.billed_duration_ms < 0.0
    }
}

/// Request kinds issued by a virtual user, in loop order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Health,
    Create,
    Read,
    Update,
    List,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Health,
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::List,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::List => "list",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown operation '{s}'"))
    }
}

/// One completed request during a load run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSample {
    pub runtime_id: RuntimeId,
    pub operation: Operation,
    /// HTTP status, or 0 when no response was received (timeout, connection error).
    pub status_code: u16,
    pub duration_ms: f64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Response envelope returned by the CRUD routes of every variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Only set by list responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            count: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            count: None,
        }
    }

    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}
