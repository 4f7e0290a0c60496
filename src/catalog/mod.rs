//! Instrumentation catalogs and the sample data model

mod procfs;
mod registry;

pub use procfs::{ProcCatalog, ProcConfig};
pub use registry::{Counter, Gauge, Histogram, Registry};

use crate::error::{Result, SamplerError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of value an instrumentation point produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonic integer counter
    Counter,
    /// Floating point gauge
    Gauge,
    /// Cumulative bucketed histogram
    Histogram,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Histogram => write!(f, "histogram"),
        }
    }
}

/// Description of one instrumentation point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    /// Raw path, e.g. `/memory/resident:bytes`
    pub name: String,
    pub kind: MetricKind,
    /// Human readable description
    #[serde(default)]
    pub help: String,
}

impl Description {
    pub fn new(name: impl Into<String>, kind: MetricKind, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            help: help.into(),
        }
    }
}

/// A cumulative histogram: `counts[i]` observations fell in
/// `[boundaries[i], boundaries[i + 1])` since the histogram was created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketedDistribution {
    boundaries: Vec<f64>,
    counts: Vec<u64>,
}

impl BucketedDistribution {
    /// Create a distribution, validating its shape.
    ///
    /// Boundaries must be strictly ascending, non-NaN, and exactly one longer
    /// than counts. The first and last edge may be infinite.
    pub fn new(boundaries: Vec<f64>, counts: Vec<u64>) -> Result<Self> {
        validate_boundaries(&boundaries)?;
        if counts.len() + 1 != boundaries.len() {
            return Err(SamplerError::Histogram(format!(
                "expected {} counts for {} boundaries, got {}",
                boundaries.len() - 1,
                boundaries.len(),
                counts.len()
            ))
            .into());
        }
        Ok(Self { boundaries, counts })
    }

    /// Bucket edges, one more than there are buckets
    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Cumulative count of each bucket
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Iterate buckets as `(lower, upper, count)`
    pub fn buckets(&self) -> impl Iterator<Item = (f64, f64, u64)> + '_ {
        self.boundaries
            .windows(2)
            .zip(self.counts.iter())
            .map(|(edges, &count)| (edges[0], edges[1], count))
    }

    /// Iterate only buckets whose edges are both finite
    pub fn finite_buckets(&self) -> impl Iterator<Item = (f64, f64, u64)> + '_ {
        self.buckets()
            .filter(|(lo, hi, _)| lo.is_finite() && hi.is_finite())
    }

    /// Total observations across every bucket, infinite ones included.
    /// Saturates at `u64::MAX`.
    pub fn total_count(&self) -> u64 {
        self.counts.iter().fold(0u64, |acc, &n| acc.saturating_add(n))
    }

    /// True when both distributions use the same bucket edges
    pub fn same_layout(&self, other: &BucketedDistribution) -> bool {
        self.boundaries == other.boundaries
    }
}

/// Check that histogram edges are usable as bucket boundaries
pub(crate) fn validate_boundaries(boundaries: &[f64]) -> Result<()> {
    if boundaries.len() < 2 {
        return Err(SamplerError::Histogram(format!(
            "at least 2 boundaries required, got {}",
            boundaries.len()
        ))
        .into());
    }
    if boundaries.iter().any(|b| b.is_nan()) {
        return Err(SamplerError::Histogram("boundaries must not be NaN".to_string()).into());
    }
    if boundaries.windows(2).any(|w| w[0] >= w[1]) {
        return Err(
            SamplerError::Histogram("boundaries must be strictly ascending".to_string()).into(),
        );
    }
    Ok(())
}

/// The value read for one instrumentation point
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SampleValue {
    Counter(u64),
    Gauge(f64),
    Histogram(BucketedDistribution),
    /// A kind this library does not know how to report
    Unsupported(String),
    /// Not read, or the catalog could not produce a value
    #[default]
    Bad,
}

impl SampleValue {
    /// Short name of the value kind, for logs
    pub fn kind_name(&self) -> &str {
        match self {
            SampleValue::Counter(_) => "counter",
            SampleValue::Gauge(_) => "gauge",
            SampleValue::Histogram(_) => "histogram",
            SampleValue::Unsupported(kind) => kind,
            SampleValue::Bad => "bad",
        }
    }
}

/// One instrumentation reading
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricSample {
    pub name: String,
    pub value: SampleValue,
}

impl MetricSample {
    /// An unread sample slot for the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: SampleValue::Bad,
        }
    }
}

/// A source of instrumentation points.
///
/// `describe` enumerates what is available; `read` fills in the value of
/// every sample slot by name in one pass. Slots whose name the catalog does
/// not know are set to [`SampleValue::Bad`]. Both must be cheap enough to call
/// every few seconds.
pub trait MetricCatalog: Send + Sync + 'static {
    /// Enumerate the instrumentation points this catalog exposes
    fn describe(&self) -> Vec<Description>;

    /// Read the current value of every slot in `samples`
    fn read(&self, samples: &mut [MetricSample]) -> Result<()>;

    /// Get the catalog name
    fn name(&self) -> &str;

    /// Describe and read everything in one call
    fn snapshot(&self) -> Result<Vec<MetricSample>> {
        let mut samples: Vec<MetricSample> = self
            .describe()
            .into_iter()
            .map(|d| MetricSample::named(d.name))
            .collect();
        self.read(&mut samples)?;
        Ok(samples)
    }
}
