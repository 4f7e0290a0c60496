use async_trait::async_trait;
use log::{Level, log};

use super::MetricsSink;
use crate::error::Result;

/// A sink that writes every value through the `log` facade
pub struct LogSink {
    level: Level,
    name: String,
}

impl LogSink {
    /// Create a sink logging at info level
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            name: name.into(),
        }
    }

    /// Set the level values are logged at
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

#[async_trait]
impl MetricsSink for LogSink {
    async fn gauge(&self, name: &str, value: f64) -> Result<()> {
        log!(self.level, "gauge {} = {}", name, value);
        Ok(())
    }

    async fn distribution(&self, name: &str, value: f64, weight: f64) -> Result<()> {
        log!(self.level, "distribution {} = {} x{}", name, value, weight);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
