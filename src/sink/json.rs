use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::MetricsSink;
use crate::error::{Result, SamplerError};

#[derive(Debug, Serialize)]
struct Line<'a> {
    timestamp: DateTime<Utc>,
    host: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    weight: Option<f64>,
}

/// A sink writing one JSON object per value
pub struct JsonSink {
    writer: Mutex<Box<dyn Write + Send>>,
    host: String,
    name: String,
}

impl JsonSink {
    /// Create a sink writing to any writer
    pub fn new(name: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            writer: Mutex::new(writer),
            host,
            name: name.into(),
        }
    }

    /// Create a sink writing to standard output
    pub fn stdout(name: impl Into<String>) -> Self {
        Self::new(name, Box::new(io::stdout()))
    }

    /// Create a sink appending to a file
    pub fn file<P: AsRef<Path>>(name: impl Into<String>, path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(SamplerError::Io)?;
        Ok(Self::new(name, Box::new(io::BufWriter::new(file))))
    }

    /// Override the host name stamped on every line
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    fn write_line(&self, line: &Line<'_>) -> Result<()> {
        let encoded = serde_json::to_string(line)
            .map_err(|e| SamplerError::Sink(format!("Failed to encode {}: {}", line.name, e)))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SamplerError::Sink("Lock poisoned".to_string()))?;
        writeln!(writer, "{}", encoded).map_err(SamplerError::Io)?;
        Ok(())
    }
}

#[async_trait]
impl MetricsSink for JsonSink {
    async fn gauge(&self, name: &str, value: f64) -> Result<()> {
        self.write_line(&Line {
            timestamp: Utc::now(),
            host: &self.host,
            kind: "gauge",
            name,
            value,
            weight: None,
        })
    }

    async fn distribution(&self, name: &str, value: f64, weight: f64) -> Result<()> {
        self.write_line(&Line {
            timestamp: Utc::now(),
            host: &self.host,
            kind: "distribution",
            name,
            value,
            weight: Some(weight),
        })
    }

    async fn flush(&self) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SamplerError::Sink("Lock poisoned".to_string()))?;
        writer.flush().map_err(SamplerError::Io)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
