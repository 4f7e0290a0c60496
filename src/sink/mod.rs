//! Destinations for sampled values

mod json;
mod logging;
mod memory;

pub use self::json::JsonSink;
pub use self::logging::LogSink;
pub use self::memory::{MemorySink, Recorded};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::reducer::Emission;

/// Generic trait for metric sinks
///
/// Transport, batching and retrying belong to the sink. The sampler logs a
/// failed call and moves on to the next value.
#[async_trait]
pub trait MetricsSink: Send + Sync + 'static {
    /// Report a point-in-time value
    async fn gauge(&self, name: &str, value: f64) -> Result<()>;

    /// Report `weight` observations of `value`
    async fn distribution(&self, name: &str, value: f64, weight: f64) -> Result<()>;

    /// Flush anything buffered; called after every sampling pass
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Get a name for this sink
    fn name(&self) -> &str;

    /// Forward a reducer emission to the matching method
    async fn emit(&self, emission: &Emission) -> Result<()> {
        match emission {
            Emission::Gauge { name, value } => self.gauge(name, *value).await,
            Emission::Distribution {
                name,
                value,
                weight,
            } => self.distribution(name, *value, *weight).await,
        }
    }
}

/// Sink selection for the command line agent
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Write through the `log` facade
    #[default]
    Log,
    /// Write JSON lines
    Json,
}

impl std::str::FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(SinkKind::Log),
            "json" => Ok(SinkKind::Json),
            other => Err(format!("unknown sink: {}", other)),
        }
    }
}
