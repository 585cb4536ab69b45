//! Managed execution environment detection.
//!
//! The platform exposes its identifiers through `AWS_LAMBDA_*` variables.
//! The context is present iff `AWS_LAMBDA_FUNCTION_NAME` is set.

use mrb_common::{EnvParser, PlatformContext};
use tracing::warn;

/// Read the platform context from the environment.
pub fn context_from_env() -> Option<PlatformContext> {
    let mut env = EnvParser::with_prefix("AWS_LAMBDA_");
    let instance_id = env.get_optional_string("FUNCTION_NAME")?;

    let memory_limit_mb = env
        .get_optional_string("FUNCTION_MEMORY_SIZE")
        .and_then(|raw| match raw.trim().parse::<u64>() {
            Ok(mb) => Some(mb),
            Err(_) => {
                warn!(value = %raw, "Ignoring non-numeric AWS_LAMBDA_FUNCTION_MEMORY_SIZE");
                None
            }
        });

    Some(PlatformContext {
        instance_id,
        instance_version: env.get_string("FUNCTION_VERSION", ""),
        log_stream_id: env.get_string("LOG_STREAM_NAME", ""),
        memory_limit_mb,
        log_group: env.get_optional_string("LOG_GROUP_NAME"),
    })
}
