//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for `MRB_*` environment variables that
//! collects every problem instead of stopping at the first one, so a
//! misconfigured run can be reported in a single pass.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
///
/// Invalid values fall back to the default and are recorded in
/// [`EnvParser::errors`].
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the `MRB_` prefix.
    pub fn new() -> Self {
        Self::with_prefix("MRB_")
    }

    /// Create a parser with a custom prefix (variants use an empty prefix
    /// to read platform variables such as `RUNTIME_NAME`).
    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get a string value with default. Empty values count as unset.
    pub fn get_string(&mut self, name: &str, default: &str) -> String {
        match env::var(self.var_name(name)) {
            Ok(value) if !value.trim().is_empty() => value,
            _ => default.to_string(),
        }
    }

    /// Get an optional string (None if not set or empty).
    pub fn get_optional_string(&mut self, name: &str) -> Option<String> {
        match env::var(self.var_name(name)) {
            Ok(value) if !value.trim().is_empty() => Some(value),
            _ => None,
        }
    }

    /// Get an optional path (None if not set or empty).
    pub fn get_optional_path(&mut self, name: &str) -> Option<PathBuf> {
        self.get_optional_string(name).map(PathBuf::from)
    }

    /// Get a u32 value with default and range validation.
    pub fn get_u32_range(&mut self, name: &str, default: u32, min: u32, max: u32) -> u32 {
        self.get_ranged(name, default, min, max, "unsigned 32-bit integer")
    }

    /// Get a u64 value with default and range validation.
    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> u64 {
        self.get_ranged(name, default, min, max, "unsigned 64-bit integer")
    }

    fn get_ranged<T>(&mut self, name: &str, default: T, min: T, max: T, expected: &str) -> T
    where
        T: std::str::FromStr + PartialOrd + ToString + Copy,
    {
        let var_name = self.var_name(name);
        let Ok(value) = env::var(&var_name) else {
            return default;
        };
        match value.trim().parse::<T>() {
            Ok(n) if n >= min && n <= max => n,
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                default
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: expected.to_string(),
                    value,
                });
                default
            }
        }
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> String {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let lower = value.trim().to_lowercase();
                match lower.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" | "off" => lower,
                    _ => {
                        self.errors.push(EnvError::InvalidLogLevel {
                            var: var_name,
                            value,
                        });
                        default.to_string()
                    }
                }
            }
            Err(_) => default.to_string(),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_env(key: &str, value: &str) {
        // SAFETY: env tests are serialized, no concurrent access to env vars
        unsafe { env::set_var(key, value) };
    }

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            // SAFETY: env tests are serialized, no concurrent access to env vars
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_get_u32_range_out_of_range() {
        set_env("MRB_TEST_ITER", "5000");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_u32_range("TEST_ITER", 10, 1, 1000), 10);
        assert!(matches!(
            parser.errors()[0],
            EnvError::OutOfRange { ref var, .. } if var == "MRB_TEST_ITER"
        ));
        cleanup_env(&["MRB_TEST_ITER"]);
    }

    #[test]
    #[serial]
    fn test_get_u64_range_invalid() {
        set_env("MRB_TEST_IDLE", "five minutes");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_u64_range("TEST_IDLE", 300, 0, 3600), 300);
        let errors = parser.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(!parser.has_errors());
        cleanup_env(&["MRB_TEST_IDLE"]);
    }

    #[test]
    #[serial]
    fn test_get_log_level() {
        set_env("MRB_TEST_LEVEL", "DEBUG");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_log_level("TEST_LEVEL", "info"), "debug");

        set_env("MRB_TEST_LEVEL", "loud");
        assert_eq!(parser.get_log_level("TEST_LEVEL", "info"), "info");
        assert!(parser.has_errors());
        cleanup_env(&["MRB_TEST_LEVEL"]);
    }

    #[test]
    #[serial]
    fn test_empty_string_counts_as_unset() {
        set_env("MRB_TEST_EMPTY", "  ");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_string("TEST_EMPTY", "fallback"), "fallback");
        assert_eq!(parser.get_optional_string("TEST_EMPTY"), None);
        cleanup_env(&["MRB_TEST_EMPTY"]);
    }

    #[test]
    #[serial]
    fn test_custom_prefix() {
        set_env("MRB_TEST_RUNTIME_NAME", "kotlin");
        let mut parser = EnvParser::with_prefix("MRB_TEST_");
        assert_eq!(parser.get_string("RUNTIME_NAME", "rust"), "kotlin");
        cleanup_env(&["MRB_TEST_RUNTIME_NAME"]);
    }
}
