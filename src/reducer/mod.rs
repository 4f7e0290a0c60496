//! Reduction of cumulative histograms into reportable values
//!
//! Two interchangeable strategies exist behind [`HistogramReducer`]:
//!
//! - [`SummaryReducer`] turns each snapshot into a set of gauges (average,
//!   min, median, p95, p99, max) with no memory of earlier snapshots.
//! - [`DeltaReducer`] remembers the previous snapshot of every histogram and
//!   emits the per-bucket difference as weighted distribution samples, so a
//!   backend can re-aggregate the true distribution over any time window.

mod delta;
mod summary;

pub use delta::{DeltaEvent, DeltaReducer};
pub use summary::{SummaryReducer, SummaryStats, average, percentile};

use crate::catalog::BucketedDistribution;
use crate::naming::MappedName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which histogram reduction strategy a sampler uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReducerMode {
    /// Point-in-time summary statistics as gauges
    Summary,
    /// Incremental weighted observations as distributions
    #[default]
    Delta,
}

impl fmt::Display for ReducerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerMode::Summary => write!(f, "summary"),
            ReducerMode::Delta => write!(f, "delta"),
        }
    }
}

impl std::str::FromStr for ReducerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "summary" => Ok(ReducerMode::Summary),
            "delta" => Ok(ReducerMode::Delta),
            other => Err(format!("unknown reducer mode: {}", other)),
        }
    }
}

/// A value ready to hand to a metrics sink
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Gauge { name: String, value: f64 },
    Distribution { name: String, value: f64, weight: f64 },
}

impl Emission {
    /// Metric name the value is reported under
    pub fn name(&self) -> &str {
        match self {
            Emission::Gauge { name, .. } | Emission::Distribution { name, .. } => name,
        }
    }
}

/// Trait for histogram reduction strategies
pub trait HistogramReducer: Send + 'static {
    /// Reduce one snapshot of the histogram reported under `name`
    fn reduce(&mut self, name: &MappedName, hist: &BucketedDistribution) -> Vec<Emission>;

    /// The strategy this reducer implements
    fn mode(&self) -> ReducerMode;
}

/// Build the reducer for a mode
pub fn reducer_for(mode: ReducerMode) -> Box<dyn HistogramReducer> {
    match mode {
        ReducerMode::Summary => Box::new(SummaryReducer),
        ReducerMode::Delta => Box::new(DeltaReducer::new()),
    }
}

/// Midpoint of a bucket, the value every observation in it is assumed to have
pub(crate) fn midpoint(lo: f64, hi: f64) -> f64 {
    (lo + hi) / 2.0
}
