//! Pipeline configuration.
//!
//! Supports loading configuration from:
//! 1. Configuration files (YAML)
//! 2. Environment variables (with `QSHOT_` prefix)
//!
//! Configuration precedence (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file
//! 3. Default values

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use qshot_compile::{CompilationTarget, MAX_OPT_LEVEL, TargetSpec};
use qshot_exec::{AggregationPolicy, ExecutorConfig};
use qshot_profile::{DEFAULT_NUM_QUBITS, ExtractionPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub compile: CompileConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub attributes: AttributesConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Compiler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompileConfig {
    /// Target name: "helios" or "iqm"
    #[serde(default = "default_target")]
    pub target: String,

    /// Optimization level, 0-3
    #[serde(default = "default_opt_level")]
    pub opt_level: u8,
}

/// Shot execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    #[serde(default = "default_shots")]
    pub shots: u64,

    /// Batch seed; shot seeds are derived from it.
    #[serde(default)]
    pub seed: u64,

    /// Maximum shots running at once
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Grace period for in-flight shots after cancellation, in milliseconds
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributesConfig {
    /// Qubit count used when the entry point declares none
    #[serde(default = "default_num_qubits")]
    pub default_num_qubits: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregationConfig {
    /// Share of failed shots above which the batch is reported as failed
    #[serde(default = "default_max_failure_ratio")]
    pub max_failure_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Also produce labeled records. Never changes the result values.
    #[serde(default)]
    pub labeled: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "console" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_target() -> String {
    "helios".to_string()
}

fn default_opt_level() -> u8 {
    2
}

fn default_shots() -> u64 {
    5
}

fn default_workers() -> usize {
    4
}

fn default_cancel_grace_ms() -> u64 {
    1000
}

fn default_num_qubits() -> u32 {
    DEFAULT_NUM_QUBITS
}

fn default_max_failure_ratio() -> f64 {
    0.5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            opt_level: default_opt_level(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            shots: default_shots(),
            seed: 0,
            workers: default_workers(),
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

impl Default for AttributesConfig {
    fn default() -> Self {
        Self {
            default_num_qubits: default_num_qubits(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_failure_ratio: default_max_failure_ratio(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text. Missing sections take defaults.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml_ng::from_str(contents)?)
    }

    /// Defaults overridden by the `QSHOT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_env()
    }

    /// Load configuration with the following precedence:
    /// 1. Load from file if provided
    /// 2. Apply environment variable overrides
    /// 3. Validate the result
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.merge_env()?;
        config.validate()?;
        Ok(config)
    }

    fn merge_env(self) -> Result<Self, ConfigError> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    ///
    /// Only variables that are present override; a present variable that
    /// does not parse is an error rather than being ignored.
    pub fn merge_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Compile
        if let Some(v) = lookup("QSHOT_TARGET") {
            self.compile.target = v;
        }
        if let Some(v) = lookup("QSHOT_OPT_LEVEL") {
            self.compile.opt_level = parse_var("QSHOT_OPT_LEVEL", &v)?;
        }

        // Execution
        if let Some(v) = lookup("QSHOT_SHOTS") {
            self.execution.shots = parse_var("QSHOT_SHOTS", &v)?;
        }
        if let Some(v) = lookup("QSHOT_SEED") {
            self.execution.seed = parse_var("QSHOT_SEED", &v)?;
        }
        if let Some(v) = lookup("QSHOT_WORKERS") {
            self.execution.workers = parse_var("QSHOT_WORKERS", &v)?;
        }
        if let Some(v) = lookup("QSHOT_CANCEL_GRACE_MS") {
            self.execution.cancel_grace_ms = parse_var("QSHOT_CANCEL_GRACE_MS", &v)?;
        }

        if let Some(v) = lookup("QSHOT_DEFAULT_QUBITS") {
            self.attributes.default_num_qubits = parse_var("QSHOT_DEFAULT_QUBITS", &v)?;
        }
        if let Some(v) = lookup("QSHOT_MAX_FAILURE_RATIO") {
            self.aggregation.max_failure_ratio = parse_var("QSHOT_MAX_FAILURE_RATIO", &v)?;
        }
        if let Some(v) = lookup("QSHOT_LABELED_OUTPUT") {
            self.output.labeled = parse_var("QSHOT_LABELED_OUTPUT", &v)?;
        }

        // Logging
        if let Some(v) = lookup("QSHOT_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("QSHOT_LOG_FORMAT") {
            self.logging.format = v;
        }

        Ok(self)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if TargetSpec::lookup(&self.compile.target).is_none() {
            return Err(ConfigError::Invalid(format!(
                "Unknown compilation target: {}",
                self.compile.target
            )));
        }
        if self.compile.opt_level > MAX_OPT_LEVEL {
            return Err(ConfigError::Invalid(format!(
                "opt_level must be 0-{MAX_OPT_LEVEL}, got {}",
                self.compile.opt_level
            )));
        }

        if self.execution.shots == 0 {
            return Err(ConfigError::Invalid(
                "shots must be greater than 0".to_string(),
            ));
        }
        if self.execution.workers == 0 {
            return Err(ConfigError::Invalid(
                "workers must be greater than 0".to_string(),
            ));
        }
        if self.attributes.default_num_qubits == 0 {
            return Err(ConfigError::Invalid(
                "default_num_qubits must be greater than 0".to_string(),
            ));
        }

        let ratio = self.aggregation.max_failure_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::Invalid(format!(
                "max_failure_ratio must be within [0, 1], got {ratio}"
            )));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::Invalid(format!("Invalid log level: {other}")));
            }
        }
        match self.logging.format.as_str() {
            "console" | "json" => {}
            other => {
                return Err(ConfigError::Invalid(format!("Invalid log format: {other}")));
            }
        }

        Ok(())
    }

    /// The compiler target selector.
    pub fn compilation_target(&self) -> CompilationTarget {
        CompilationTarget {
            target: self.compile.target.clone(),
            opt_level: self.compile.opt_level,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            workers: self.execution.workers,
            cancel_grace: Duration::from_millis(self.execution.cancel_grace_ms),
        }
    }

    pub fn extraction_policy(&self) -> ExtractionPolicy {
        ExtractionPolicy {
            default_num_qubits: self.attributes.default_num_qubits,
        }
    }

    pub fn aggregation_policy(&self) -> AggregationPolicy {
        AggregationPolicy {
            max_failure_ratio: self.aggregation.max_failure_ratio,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| {
        ConfigError::Invalid(format!("{key}: cannot parse '{raw}'"))
    })
}

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Cannot read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
