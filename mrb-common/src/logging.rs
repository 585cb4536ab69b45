//! Tracing setup shared by every binary in the workspace.
//!
//! ```no_run
//! use mrb_common::{LogConfig, init_logging};
//!
//! let config = LogConfig::from_env("info").with_stderr();
//! let _guards = init_logging(&config).expect("logging");
//! ```

use crate::config::{EnvError, EnvParser};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Output format of the console layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("failed to open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Logging configuration, usually built from `MRB_LOG_*` variables.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    /// Write console output to stderr instead of stdout.
    pub stderr: bool,
    /// Problems found while reading the environment. Reported after init.
    pub warnings: Vec<EnvError>,
}

impl LogConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            file: None,
            stderr: false,
            warnings: Vec::new(),
        }
    }

    /// Read `MRB_LOG_LEVEL`, `MRB_LOG_FORMAT` and `MRB_LOG_FILE`.
    pub fn from_env(default_level: &str) -> Self {
        let mut parser = EnvParser::new();
        let level = parser.get_log_level("LOG_LEVEL", default_level);
        let raw_format = parser.get_string("LOG_FORMAT", "pretty");
        let file = parser.get_optional_path("LOG_FILE");
        let mut warnings = parser.take_errors();

        let format = raw_format.parse().unwrap_or_else(|_| {
            warnings.push(EnvError::InvalidValue {
                var: "MRB_LOG_FORMAT".to_string(),
                expected: "pretty|compact|json".to_string(),
                value: raw_format.clone(),
            });
            LogFormat::default()
        });

        Self {
            level,
            format,
            file,
            stderr: false,
            warnings,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// The `EnvFilter` directive for this config. `RUST_LOG` takes precedence.
    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| LoggingError::Filter {
            filter: self.level.clone(),
            message: e.to_string(),
        })
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

/// Keeps non-blocking writers alive. Dropping it flushes pending file output.
#[must_use = "dropping the guards stops file logging"]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(config: &LogConfig) -> BoxedLayer {
    let layer = fmt::layer().with_target(true);
    match (config.format, config.stderr) {
        (LogFormat::Pretty, true) => layer.with_writer(std::io::stderr).boxed(),
        (LogFormat::Pretty, false) => layer.boxed(),
        (LogFormat::Compact, true) => layer.compact().with_writer(std::io::stderr).boxed(),
        (LogFormat::Compact, false) => layer.compact().boxed(),
        (LogFormat::Json, true) => layer.json().with_writer(std::io::stderr).boxed(),
        (LogFormat::Json, false) => layer.json().boxed(),
    }
}

fn file_layer(path: &Path) -> Result<(BoxedLayer, WorkerGuard), LoggingError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| LoggingError::File {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::File {
            path: path.to_path_buf(),
            source,
        })?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(writer)
        .boxed();
    Ok((layer, guard))
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let filter = config.filter()?;

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config)];
    let mut file_guard = None;
    if let Some(path) = &config.file {
        let (layer, guard) = file_layer(path)?;
        layers.push(layer);
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    for warning in &config.warnings {
        tracing::warn!(%warning, "Ignoring invalid logging setting");
    }

    Ok(LoggingGuards { _file: file_guard })
}
