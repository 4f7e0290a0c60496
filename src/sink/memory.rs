use std::sync::RwLock;

use async_trait::async_trait;

use super::MetricsSink;
use crate::error::{Result, SamplerError};

/// A value received by a [`MemorySink`]
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Gauge { name: String, value: f64 },
    Distribution { name: String, value: f64, weight: f64 },
}

impl Recorded {
    pub fn name(&self) -> &str {
        match self {
            Recorded::Gauge { name, .. } | Recorded::Distribution { name, .. } => name,
        }
    }
}

/// A minimal in-memory sink for testing
pub struct MemorySink {
    data: RwLock<Vec<Recorded>>,
    flushes: RwLock<usize>,
    name: String,
}

impl MemorySink {
    /// Create a new memory sink
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            data: RwLock::new(Vec::new()),
            flushes: RwLock::new(0),
            name: name.into(),
        }
    }

    fn push(&self, value: Recorded) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| SamplerError::Sink("Lock poisoned".to_string()))?;
        data.push(value);
        Ok(())
    }

    /// Everything recorded so far, in arrival order
    pub fn recorded(&self) -> Result<Vec<Recorded>> {
        let data = self
            .data
            .read()
            .map_err(|_| SamplerError::Sink("Lock poisoned".to_string()))?;
        Ok(data.clone())
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Result<Vec<Recorded>> {
        let mut data = self
            .data
            .write()
            .map_err(|_| SamplerError::Sink("Lock poisoned".to_string()))?;
        Ok(std::mem::take(&mut *data))
    }

    /// The last gauge value recorded under `name`
    pub fn last_gauge(&self, name: &str) -> Result<Option<f64>> {
        Ok(self.recorded()?.iter().rev().find_map(|r| match r {
            Recorded::Gauge { name: n, value } if n == name => Some(*value),
            _ => None,
        }))
    }

    /// Number of completed flushes
    pub fn flushes(&self) -> Result<usize> {
        let flushes = self
            .flushes
            .read()
            .map_err(|_| SamplerError::Sink("Lock poisoned".to_string()))?;
        Ok(*flushes)
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn gauge(&self, name: &str, value: f64) -> Result<()> {
        self.push(Recorded::Gauge {
            name: name.to_string(),
            value,
        })
    }

    async fn distribution(&self, name: &str, value: f64, weight: f64) -> Result<()> {
        self.push(Recorded::Distribution {
            name: name.to_string(),
            value,
            weight,
        })
    }

    async fn flush(&self) -> Result<()> {
        let mut flushes = self
            .flushes
            .write()
            .map_err(|_| SamplerError::Sink("Lock poisoned".to_string()))?;
        *flushes += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
