//! Direct invocation of a deployed variant, bypassing the HTTP gateway.

use super::platform_log::PlatformLog;
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invocation failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("unexpected invoke output: {0}")]
    Output(String),

    #[error("endpoint '{endpoint}' cannot be resolved: {reason}")]
    Unresolvable { endpoint: String, reason: String },
}

/// Result of one completed invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationOutcome {
    pub log: Option<PlatformLog>,
    /// Response payload returned by the variant.
    pub payload: Option<Value>,
    /// Time measured by the caller around the whole invocation.
    pub wall_clock: Duration,
    /// Set when the variant's handler raised an error.
    pub function_error: Option<String>,
}

/// Invokes a variant's entry point directly.
pub trait Invoker: Send + Sync {
    /// Check that the endpoint exists before measuring it, waiting at most
    /// `timeout`.
    fn resolve(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), InvokeError>> + Send;

    /// Invoke once, waiting at most `timeout`.
    fn invoke(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<InvocationOutcome, InvokeError>> + Send;
}

/// HTTP-API-style event asking the variant for `/metrics`.
pub fn metrics_event() -> Value {
    json!({
        "version": "2.0",
        "routeKey": "GET /metrics",
        "rawPath": "/metrics",
        "rawQueryString": "",
        "headers": {"accept": "application/json"},
        "requestContext": {
            "http": {"method": "GET", "path": "/metrics", "protocol": "HTTP/1.1"}
        },
        "isBase64Encoded": false
    })
}

/// `aws lambda invoke` output printed to stdout.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InvokeResponse {
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    log_result: Option<String>,
    #[serde(default)]
    function_error: Option<String>,
}

/// Invoker backed by the AWS CLI.
#[derive(Debug, Clone)]
pub struct AwsCliInvoker {
    program: String,
    region: Option<String>,
    profile: Option<String>,
}

impl AwsCliInvoker {
    pub fn new() -> Self {
        Self {
            program: "aws".to_string(),
            region: None,
            profile: None,
        }
    }

    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(region) = &self.region {
            cmd.args(["--region", region.as_str()]);
        }
        if let Some(profile) = &self.profile {
            cmd.args(["--profile", profile.as_str()]);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> InvokeError {
        InvokeError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl Default for AwsCliInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl Invoker for AwsCliInvoker {
    async fn resolve(&self, endpoint: &str, timeout: Duration) -> Result<(), InvokeError> {
        let mut cmd = self.command();
        cmd.args([
            "lambda",
            "get-function-configuration",
            "--function-name",
            endpoint,
            "--output",
            "json",
        ]);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| InvokeError::Timeout(timeout))?
            .map_err(|e| self.spawn_error(e))?;
        if output.status.success() {
            debug!(endpoint, "Resolved invocation endpoint");
            Ok(())
        } else {
            Err(InvokeError::Unresolvable {
                endpoint: endpoint.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn invoke(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<InvocationOutcome, InvokeError> {
        let outfile = tempfile::NamedTempFile::new().map_err(|e| self.spawn_error(e))?;
        let event = metrics_event().to_string();

        let mut cmd = self.command();
        cmd.args([
            "lambda",
            "invoke",
            "--function-name",
            endpoint,
            "--log-type",
            "Tail",
            "--cli-binary-format",
            "raw-in-base64-out",
            "--payload",
            event.as_str(),
            "--output",
            "json",
        ]);
        cmd.arg(outfile.path());

        let started = Instant::now();
        let child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        // Dropping the future on timeout kills the child.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| InvokeError::Timeout(timeout))?
            .map_err(|e| self.spawn_error(e))?;
        let wall_clock = started.elapsed();

        if !output.status.success() {
            return Err(InvokeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let response: InvokeResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| InvokeError::Output(e.to_string()))?;

        let log = match response.log_result.as_deref() {
            Some(encoded) => match PlatformLog::from_base64(encoded) {
                Ok(log) => Some(log),
                Err(e) => {
                    warn!(endpoint, error = %e, "Discarding undecodable log tail");
                    None
                }
            },
            None => None,
        };

        let payload = match tokio::fs::read(outfile.path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            Err(e) => {
                warn!(endpoint, error = %e, "Failed to read invoke payload");
                None
            }
        };

        debug!(
            endpoint,
            status_code = ?response.status_code,
            wall_clock_ms = wall_clock.as_secs_f64() * 1000.0,
            "Invocation completed"
        );

        Ok(InvocationOutcome {
            log,
            payload,
            wall_clock,
            function_error: response.function_error,
        })
    }
}
