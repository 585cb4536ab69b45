//! Registry of deployed variants supplied by the deployment layer.
//!
//! The file maps each runtime id to the direct invocation endpoint (function
//! name or ARN) and the HTTP base URL behind the gateway:
//!
//! ```toml
//! [[variants]]
//! runtime_id = "python"
//! invocation_endpoint = "bench-python"
//! http_base_url = "https://abc.execute-api.eu-central-1.amazonaws.com/python"
//! ```

use super::ConfigError;
use crate::types::RuntimeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Default registry file name, relative to the working directory.
pub const DEFAULT_VARIANTS_FILE: &str = "variants.toml";

/// Endpoints of one deployed variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantEndpoint {
    pub runtime_id: RuntimeId,
    /// Function name or ARN used for direct invocation.
    #[serde(default)]
    pub invocation_endpoint: String,
    /// Base URL of the variant's HTTP surface.
    #[serde(default)]
    pub http_base_url: String,
}

impl VariantEndpoint {
    /// The invocation endpoint, or `None` when the deployment layer left it blank.
    pub fn invocation_endpoint(&self) -> Option<&str> {
        let endpoint = self.invocation_endpoint.trim();
        (!endpoint.is_empty()).then_some(endpoint)
    }

    /// The HTTP base URL without a trailing slash, or `None` when blank.
    pub fn http_base_url(&self) -> Option<&str> {
        let url = self.http_base_url.trim().trim_end_matches('/');
        (!url.is_empty()).then_some(url)
    }
}

#[derive(Debug, Deserialize)]
struct VariantsFile {
    #[serde(default)]
    variants: Vec<VariantEndpoint>,
}

/// Validated set of variants with unique, non-empty runtime ids.
#[derive(Debug, Clone, Default)]
pub struct VariantRegistry {
    variants: Vec<VariantEndpoint>,
}

impl VariantRegistry {
    /// Build a registry, rejecting empty or duplicate runtime ids.
    ///
    /// Ids are stored trimmed so they match the ids read back from datasets.
    pub fn new(mut variants: Vec<VariantEndpoint>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for variant in &mut variants {
            let id = variant.runtime_id.as_str().trim().to_string();
            if id.is_empty() {
                return Err(ConfigError::EmptyRuntimeId);
            }
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateRuntime(id));
            }
            variant.runtime_id = RuntimeId::new(id);
        }
        Ok(Self { variants })
    }

    /// Load the registry from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        debug!(path = %path.display(), variants = registry.len(), "Loaded variants registry");
        Ok(registry)
    }

    /// Parse the registry from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: VariantsFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: Path::new("<inline>").to_path_buf(),
            message: e.to_string(),
        })?;
        Self::new(file.variants)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantEndpoint> {
        self.variants.iter()
    }

    pub fn get(&self, runtime_id: &str) -> Option<&VariantEndpoint> {
        self.variants
            .iter()
            .find(|v| v.runtime_id.as_str() == runtime_id)
    }

    /// Select variants by id, keeping registry order. An empty filter selects all.
    ///
    /// Naming an id the registry does not know is a configuration error.
    pub fn select(&self, filter: &[String]) -> Result<Vec<&VariantEndpoint>, ConfigError> {
        if filter.is_empty() {
            return Ok(self.variants.iter().collect());
        }
        for wanted in filter {
            if self.get(wanted).is_none() {
                return Err(ConfigError::UnknownRuntime(wanted.clone()));
            }
        }
        Ok(self
            .variants
            .iter()
            .filter(|v| filter.iter().any(|f| f == v.runtime_id.as_str()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[[variants]]
runtime_id = "python"
invocation_endpoint = "bench-python"
http_base_url = "https://api.example.com/python/"

[[variants]]
runtime_id = "go"
invocation_endpoint = ""
http_base_url = "https://api.example.com/go"
"#;

    #[test]
    fn test_parse_registry() {
        let registry = VariantRegistry::from_toml_str(SAMPLE).unwrap();
        assert_eq!(registry.len(), 2);

        let python = registry.get("python").unwrap();
        assert_eq!(python.invocation_endpoint(), Some("bench-python"));
        assert_eq!(python.http_base_url(), Some("https://api.example.com/python"));

        let go = registry.get("go").unwrap();
        assert_eq!(go.invocation_endpoint(), None);
    }

    #[test]
    fn test_duplicate_runtime_rejected() {
        let content = r#"
[[variants]]
runtime_id = "go"
[[variants]]
runtime_id = "go"
"#;
        let err = VariantRegistry::from_toml_str(content).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRuntime(ref id) if id == "go"));
    }

    #[test]
    fn test_runtime_ids_stored_trimmed() {
        let content = r#"
[[variants]]
runtime_id = " go "
invocation_endpoint = "bench-go"
[[variants]]
runtime_id = "go"
"#;
        assert!(matches!(
            VariantRegistry::from_toml_str(content),
            Err(ConfigError::DuplicateRuntime(ref id)) if id == "go"
        ));

        let registry =
            VariantRegistry::from_toml_str("[[variants]]\nruntime_id = \" go\"\n").unwrap();
        let go = registry.get("go").unwrap();
        assert_eq!(go.runtime_id, RuntimeId::new("go"));
        assert_eq!(registry.select(&["go".to_string()]).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_runtime_rejected() {
        let content = "[[variants]]\nruntime_id = \" \"\n";
        assert!(matches!(
            VariantRegistry::from_toml_str(content),
            Err(ConfigError::EmptyRuntimeId)
        ));
    }

    #[test]
    fn test_select_filters_in_registry_order() {
        let registry = VariantRegistry::from_toml_str(SAMPLE).unwrap();
        let all = registry.select(&[]).unwrap();
        assert_eq!(all.len(), 2);

        let only_go = registry.select(&["go".to_string()]).unwrap();
        assert_eq!(only_go.len(), 1);
        assert_eq!(only_go[0].runtime_id.as_str(), "go");

        let err = registry.select(&["ruby".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRuntime(ref id) if id == "ruby"));
    }

    #[test]
    fn test_load_from_file_reports_path_on_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "variants = 3").unwrap();

        let err = VariantRegistry::load(file.path()).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = VariantRegistry::load(Path::new("/nonexistent/variants.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
