use std::time::Duration;

use crate::reducer::ReducerMode;

/// Configuration for a sampler
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Name of the sampler, used in logs
    pub name: String,
    /// Time between sampling passes
    pub interval: Duration,
    /// How histograms are reduced
    pub mode: ReducerMode,
    /// Namespace segment: names are reported as `runtime.<source>.…`
    pub source: String,
    /// Also report the sampler's own drop and error counters
    pub report_self_metrics: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            name: "default_sampler".to_string(),
            interval: Duration::from_secs(10),
            mode: ReducerMode::default(),
            source: "process".to_string(),
            report_self_metrics: false,
        }
    }
}

/// Builder for sampler configuration
pub struct SamplerConfigBuilder {
    config: SamplerConfig,
}

impl SamplerConfigBuilder {
    /// Create a new sampler config builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: SamplerConfig {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Set the sampling interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the histogram reduction mode
    pub fn mode(mut self, mode: ReducerMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the namespace source segment
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.source = source.into();
        self
    }

    /// Enable or disable self metrics
    pub fn report_self_metrics(mut self, enabled: bool) -> Self {
        self.config.report_self_metrics = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> SamplerConfig {
        self.config
    }
}
