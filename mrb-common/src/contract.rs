//! The HTTP and metrics contract every variant must expose.
//!
//! The contract is a schema plus validation functions, not a shared base
//! type: variants in other runtimes only have to produce JSON that passes
//! [`validate_snapshot`] and [`check_envelope`]. The same checks back the
//! contract tests of the reference variant and the harness's reading of
//! embedded snapshots.

use crate::types::{ApiEnvelope, MetricsSnapshot};
use schemars::schema::RootSchema;
use schemars::schema_for;
use serde_json::Value;
use thiserror::Error;

/// Routes every variant serves, as `(method, path)`.
pub const CONTRACT_ROUTES: [(&str, &str); 7] = [
    ("GET", "/health"),
    ("GET", "/metrics"),
    ("POST", "/items"),
    ("GET", "/items"),
    ("GET", "/items/{id}"),
    ("PUT", "/items/{id}"),
    ("DELETE", "/items/{id}"),
];

/// Nesting depth searched by [`extract_snapshot`].
const MAX_SEARCH_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractViolation {
    #[error("runtimeId is empty")]
    EmptyRuntimeId,

    #[error("uptimeSeconds must be finite and non-negative, got {0}")]
    InvalidUptime(f64),

    #[error("memory values must be finite and non-negative: used={used} total={total} max={max}")]
    InvalidMemory { used: f64, total: f64, max: f64 },

    #[error("memory ordering violated: used={used} total={total} max={max}")]
    MemoryOrder { used: f64, total: f64, max: f64 },

    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("envelope field '{0}' is missing or has the wrong type")]
    EnvelopeField(&'static str),

    #[error("no metrics snapshot found in payload")]
    SnapshotMissing,

    #[error("malformed metrics snapshot: {0}")]
    SnapshotMalformed(String),
}

/// JSON Schema of the `/metrics` snapshot.
#[must_use]
pub fn metrics_snapshot_schema() -> RootSchema {
    schema_for!(MetricsSnapshot)
}

/// JSON Schema of the CRUD response envelope, with `data` left open.
#[must_use]
pub fn api_envelope_schema() -> RootSchema {
    schema_for!(ApiEnvelope<Value>)
}

/// Check the data-model invariants of a snapshot.
pub fn validate_snapshot(snapshot: &MetricsSnapshot) -> Result<(), ContractViolation> {
    if snapshot.runtime_id.as_str().trim().is_empty() {
        return Err(ContractViolation::EmptyRuntimeId);
    }
    if !snapshot.uptime_seconds.is_finite() || snapshot.uptime_seconds < 0.0 {
        return Err(ContractViolation::InvalidUptime(snapshot.uptime_seconds));
    }

    let m = &snapshot.memory;
    let (used, total, max) = (m.used_mb, m.total_mb, m.max_mb);
    if [used, total, max].iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(ContractViolation::InvalidMemory { used, total, max });
    }
    if used > total || total > max {
        return Err(ContractViolation::MemoryOrder { used, total, max });
    }
    Ok(())
}

/// Check the `{success, data, message}` shape of a CRUD response.
///
/// `success` must be a boolean. Failed responses must carry a string
/// `message`. `count`, when present, must be a non-negative integer.
pub fn check_envelope(value: &Value) -> Result<(), ContractViolation> {
    let obj = value.as_object().ok_or(ContractViolation::NotAnObject)?;
    let success = obj
        .get("success")
        .and_then(Value::as_bool)
        .ok_or(ContractViolation::EnvelopeField("success"))?;

    match obj.get("message") {
        None | Some(Value::Null) if success => {}
        Some(Value::String(_)) => {}
        _ => return Err(ContractViolation::EnvelopeField("message")),
    }
    if let Some(count) = obj.get("count")
        && !count.is_u64()
    {
        return Err(ContractViolation::EnvelopeField("count"));
    }
    Ok(())
}

/// Find and validate a snapshot embedded anywhere in a response payload.
///
/// Handles the bare snapshot, the `/metrics` envelope (`data`), the
/// `/health` body (`metrics`), and a gateway-style response whose `body`
/// is a JSON string.
pub fn extract_snapshot(payload: &Value) -> Result<MetricsSnapshot, ContractViolation> {
    let snapshot = find_snapshot(payload, 0).ok_or(ContractViolation::SnapshotMissing)??;
    validate_snapshot(&snapshot)?;
    Ok(snapshot)
}

fn looks_like_snapshot(obj: &serde_json::Map<String, Value>) -> bool {
    (obj.contains_key("coldStart") || obj.contains_key("cold_start")) && obj.contains_key("memory")
}

fn find_snapshot(
    value: &Value,
    depth: usize,
) -> Option<Result<MetricsSnapshot, ContractViolation>> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    match value {
        Value::Object(obj) if looks_like_snapshot(obj) => Some(
            serde_json::from_value(value.clone())
                .map_err(|e| ContractViolation::SnapshotMalformed(e.to_string())),
        ),
        Value::Object(obj) => ["data", "metrics", "body"]
            .iter()
            .filter_map(|key| obj.get(*key))
            .find_map(|nested| find_snapshot(nested, depth + 1)),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|parsed| find_snapshot(&parsed, depth + 1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryUsage, RuntimeId};
    use serde_json::json;

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            runtime_id: RuntimeId::new("rust"),
            cold_start: false,
            uptime_seconds: 3.5,
            memory: MemoryUsage {
                used_mb: 8.0,
                total_mb: 9.0,
                max_mb: 128.0,
            },
            runtime_version: String::new(),
            environment: "dev".to_string(),
            platform_context: None,
        }
    }

    #[test]
    fn test_valid_snapshot_passes() {
        assert_eq!(validate_snapshot(&snapshot()), Ok(()));
    }

    #[test]
    fn test_memory_order_violation() {
        let mut s = snapshot();
        s.memory.used_mb = 10.0;
        assert!(matches!(
            validate_snapshot(&s),
            Err(ContractViolation::MemoryOrder { .. })
        ));
    }

    #[test]
    fn test_negative_uptime_rejected() {
        let mut s = snapshot();
        s.uptime_seconds = -0.1;
        assert_eq!(
            validate_snapshot(&s),
            Err(ContractViolation::InvalidUptime(-0.1))
        );
    }

    #[test]
    fn test_extract_from_gateway_body_string() {
        let body = json!({"success": true, "data": snapshot()}).to_string();
        let payload = json!({"statusCode": 200, "body": body});
        let extracted = extract_snapshot(&payload).unwrap();
        assert_eq!(extracted, snapshot());
    }

    #[test]
    fn test_extract_from_health_payload() {
        let payload = json!({"status": "healthy", "runtime": "rust", "metrics": snapshot()});
        assert!(extract_snapshot(&payload).is_ok());
    }

    #[test]
    fn test_extract_missing_and_malformed() {
        assert_eq!(
            extract_snapshot(&json!({"status": "healthy"})),
            Err(ContractViolation::SnapshotMissing)
        );
        let malformed = json!({"data": {"coldStart": "yes", "memory": {}}});
        assert!(matches!(
            extract_snapshot(&malformed),
            Err(ContractViolation::SnapshotMalformed(_))
        ));
    }

    #[test]
    fn test_check_envelope() {
        assert!(check_envelope(&json!({"success": true, "data": {"id": "1"}})).is_ok());
        assert!(check_envelope(&json!({"success": false, "message": "Item not found"})).is_ok());
        assert_eq!(
            check_envelope(&json!({"success": false})),
            Err(ContractViolation::EnvelopeField("message"))
        );
        assert_eq!(
            check_envelope(&json!({"ok": true})),
            Err(ContractViolation::EnvelopeField("success"))
        );
        assert_eq!(
            check_envelope(&json!({"success": true, "count": -1})),
            Err(ContractViolation::EnvelopeField("count"))
        );
        assert_eq!(check_envelope(&json!([1])), Err(ContractViolation::NotAnObject));
    }

    #[test]
    fn test_schema_names_contract_fields() {
        let schema = serde_json::to_value(metrics_snapshot_schema()).unwrap();
        let props = &schema["properties"];
        for field in ["runtimeId", "coldStart", "uptimeSeconds", "memory"] {
            assert!(props.get(field).is_some(), "missing {field}");
        }
        let envelope = serde_json::to_value(api_envelope_schema()).unwrap();
        assert!(envelope["properties"].get("success").is_some());
    }
}
