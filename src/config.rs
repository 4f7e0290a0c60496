use config::{self, File};
use log::{debug, error, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::ProcConfig;
use crate::error::{Result, SamplerError};
use crate::reducer::ReducerMode;
use crate::sampler::{SamplerConfig, SamplerConfigBuilder};
use crate::sink::SinkKind;

/// Prefix of environment variables overriding file settings,
/// e.g. `RTSTAT__SAMPLER__INTERVAL_SECS=5`
pub const ENV_PREFIX: &str = "RTSTAT";

/// Logging level
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Sampler settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SamplerSettings {
    /// Name used in logs
    #[serde(default = "default_sampler_name")]
    pub name: String,
    /// Sampling interval in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Histogram reduction mode
    #[serde(default)]
    pub mode: ReducerMode,
    /// Namespace segment of reported names
    #[serde(default = "default_source")]
    pub source: String,
    /// Report the sampler's own counters
    #[serde(default)]
    pub report_self_metrics: bool,
}

fn default_sampler_name() -> String {
    "process".to_string()
}

/// Default sampling interval
fn default_interval_secs() -> u64 {
    10
}

fn default_source() -> String {
    "process".to_string()
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            name: default_sampler_name(),
            interval_secs: default_interval_secs(),
            mode: ReducerMode::default(),
            source: default_source(),
            report_self_metrics: false,
        }
    }
}

impl SamplerSettings {
    /// Convert into the runtime sampler configuration
    pub fn to_sampler_config(&self) -> SamplerConfig {
        SamplerConfigBuilder::new(self.name.clone())
            .interval(Duration::from_secs(self.interval_secs))
            .mode(self.mode)
            .source(self.source.clone())
            .report_self_metrics(self.report_self_metrics)
            .build()
    }
}

/// Sink settings
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct SinkSettings {
    #[serde(default)]
    pub kind: SinkKind,
    /// Output file for the JSON sink; standard output when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Agent configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct AgentConfig {
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub sampler: SamplerSettings,
    #[serde(default)]
    pub process: ProcConfig,
    #[serde(default)]
    pub sink: SinkSettings,
}

impl AgentConfig {
    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sampler.interval_secs == 0 {
            return Err(SamplerError::Config("sampler.interval_secs must be positive".to_string()).into());
        }
        if self.sampler.source.is_empty() {
            return Err(SamplerError::Config("sampler.source must not be empty".to_string()).into());
        }
        if self.process.page_size == 0 || self.process.clock_ticks == 0 {
            return Err(SamplerError::Config(
                "process.page_size and process.clock_ticks must be positive".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path; format chosen by extension
    File(PathBuf),
    /// Environment variables with a prefix
    Environment(String),
    /// TOML string
    Toml(String),
}

/// Pick the file format from a path's extension
fn file_format(path: &Path) -> Result<config::FileFormat> {
    let extension = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => {
            error!("Configuration file has no extension");
            return Err(SamplerError::Config(format!(
                "Configuration file has no extension: {}",
                path.display()
            ))
            .into());
        }
    };

    match extension.as_str() {
        "toml" => Ok(config::FileFormat::Toml),
        "json" => Ok(config::FileFormat::Json),
        "yaml" | "yml" => Ok(config::FileFormat::Yaml),
        format => {
            error!("Unsupported configuration format: {}", format);
            Err(SamplerError::Config(format!("Unsupported config format: {}", format)).into())
        }
    }
}

/// Configuration builder; later sources override earlier ones
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    sources: Vec<ConfigSource>,
}

impl ConfigBuilder {
    /// Create a new config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration file
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(ConfigSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Add environment variables
    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Environment(prefix.into()));
        self
    }

    /// Add TOML string
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<AgentConfig> {
        let mut builder = config::Config::builder();

        for source in self.sources {
            match source {
                ConfigSource::File(path) => {
                    if !path.exists() {
                        error!("Configuration file {} does not exist", path.display());
                        return Err(SamplerError::Config(format!(
                            "Configuration file not found: {}",
                            path.display()
                        ))
                        .into());
                    }
                    let format = file_format(&path)?;
                    debug!("Loading configuration from {}", path.display());
                    builder = builder
                        .add_source(File::from(path.as_path()).format(format).required(true));
                }
                ConfigSource::Environment(prefix) => {
                    debug!("Loading configuration from environment with prefix: {}", prefix);
                    builder = builder.add_source(
                        config::Environment::with_prefix(&prefix)
                            .separator("__")
                            .try_parsing(true),
                    );
                }
                ConfigSource::Toml(toml_str) => {
                    debug!("Loading configuration from TOML string");
                    builder = builder
                        .add_source(File::from_str(&toml_str, config::FileFormat::Toml));
                }
            }
        }

        let config = builder
            .build()
            .map_err(|e| SamplerError::Config(format!("Failed to build configuration: {}", e)))?;

        let result: AgentConfig = config
            .try_deserialize()
            .map_err(|e| SamplerError::Config(format!("Failed to deserialize configuration: {}", e)))?;

        if let Err(e) = result.validate() {
            warn!("Rejected configuration: {}", e);
            return Err(e);
        }

        debug!("Configuration loaded successfully: {:?}", result);
        Ok(result)
    }
}

/// Load agent configuration from a file, with environment overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AgentConfig> {
    ConfigBuilder::new()
        .add_file(path)
        .add_env(ENV_PREFIX)
        .build()
}
