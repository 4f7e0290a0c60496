use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::debug;

use super::{
    BucketedDistribution, Description, MetricCatalog, MetricKind, MetricSample, SampleValue,
    validate_boundaries,
};
use crate::error::{Result, SamplerError};

/// A monotonically increasing counter handle
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    /// Increment by one
    pub fn inc(&self) {
        self.add(1);
    }

    /// Increment by `n`
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A floating point gauge handle
#[derive(Debug, Clone)]
pub struct Gauge(Arc<AtomicU64>);

impl Default for Gauge {
    fn default() -> Self {
        Self(Arc::new(AtomicU64::new(0f64.to_bits())))
    }
}

impl Gauge {
    /// Replace the current value
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Last value set, `0.0` initially
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct HistogramCell {
    boundaries: Vec<f64>,
    counts: Vec<AtomicU64>,
}

/// A cumulative histogram handle.
///
/// Counts are never reset. Overflow buckets at `-inf` and `+inf` are added
/// when the registered boundaries don't already include them, so every
/// non-NaN observation lands in some bucket.
#[derive(Debug, Clone)]
pub struct Histogram(Arc<HistogramCell>);

impl Histogram {
    fn new(mut boundaries: Vec<f64>) -> Result<Self> {
        validate_boundaries(&boundaries)?;
        if boundaries[0] != f64::NEG_INFINITY {
            boundaries.insert(0, f64::NEG_INFINITY);
        }
        if boundaries[boundaries.len() - 1] != f64::INFINITY {
            boundaries.push(f64::INFINITY);
        }
        let counts = (0..boundaries.len() - 1).map(|_| AtomicU64::new(0)).collect();
        Ok(Self(Arc::new(HistogramCell { boundaries, counts })))
    }

    /// Record one observation. NaN is ignored.
    pub fn observe(&self, value: f64) {
        self.observe_n(value, 1);
    }

    /// Record `n` observations of the same value
    pub fn observe_n(&self, value: f64, n: u64) {
        if value.is_nan() {
            return;
        }
        let cell = &self.0;
        let idx = cell
            .boundaries
            .partition_point(|edge| *edge <= value)
            .saturating_sub(1)
            .min(cell.counts.len() - 1);
        cell.counts[idx].fetch_add(n, Ordering::Relaxed);
    }

    /// Bucket edges including the overflow edges
    pub fn boundaries(&self) -> &[f64] {
        &self.0.boundaries
    }

    /// Copy the current counts into an owned distribution
    pub fn snapshot(&self) -> BucketedDistribution {
        BucketedDistribution {
            boundaries: self.0.boundaries.clone(),
            counts: self
                .0
                .counts
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
enum Cell {
    Counter(Counter),
    Gauge(Gauge),
    Histogram(Histogram),
}

impl Cell {
    fn kind(&self) -> MetricKind {
        match self {
            Cell::Counter(_) => MetricKind::Counter,
            Cell::Gauge(_) => MetricKind::Gauge,
            Cell::Histogram(_) => MetricKind::Histogram,
        }
    }

    fn value(&self) -> SampleValue {
        match self {
            Cell::Counter(c) => SampleValue::Counter(c.get()),
            Cell::Gauge(g) => SampleValue::Gauge(g.get()),
            Cell::Histogram(h) => SampleValue::Histogram(h.snapshot()),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<(Description, Cell)>,
    index: HashMap<String, usize>,
}

/// An in-process catalog of instrumentation points.
///
/// Application code registers metrics once and keeps the returned handles;
/// updates through a handle are lock-free. Registering an existing name with
/// the same kind returns the existing handle.
#[derive(Debug)]
pub struct Registry {
    name: String,
    inner: RwLock<Inner>,
}

impl Registry {
    /// Create an empty registry
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register or look up a counter
    pub fn counter(&self, name: &str, help: &str) -> Result<Counter> {
        match self.register(name, help, MetricKind::Counter, || {
            Ok(Cell::Counter(Counter::default()))
        })? {
            Cell::Counter(c) => Ok(c),
            other => Err(kind_conflict(name, other.kind(), MetricKind::Counter)),
        }
    }

    /// Register or look up a gauge
    pub fn gauge(&self, name: &str, help: &str) -> Result<Gauge> {
        match self.register(name, help, MetricKind::Gauge, || Ok(Cell::Gauge(Gauge::default())))? {
            Cell::Gauge(g) => Ok(g),
            other => Err(kind_conflict(name, other.kind(), MetricKind::Gauge)),
        }
    }

    /// Register or look up a histogram with the given bucket edges
    pub fn histogram(&self, name: &str, help: &str, boundaries: &[f64]) -> Result<Histogram> {
        let requested = boundaries.to_vec();
        let cell = self.register(name, help, MetricKind::Histogram, || {
            Histogram::new(requested.clone()).map(Cell::Histogram)
        })?;
        match cell {
            Cell::Histogram(h) => {
                let expected = Histogram::new(requested)?;
                if h.boundaries() != expected.boundaries() {
                    return Err(SamplerError::Catalog(format!(
                        "histogram {} already registered with different boundaries",
                        name
                    ))
                    .into());
                }
                Ok(h)
            }
            other => Err(kind_conflict(name, other.kind(), MetricKind::Histogram)),
        }
    }

    /// Number of registered instrumentation points
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register<F>(&self, name: &str, help: &str, kind: MetricKind, make: F) -> Result<Cell>
    where
        F: FnOnce() -> Result<Cell>,
    {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| SamplerError::Other("Lock poisoned".to_string()))?;

        if let Some(&idx) = inner.index.get(name) {
            return Ok(inner.entries[idx].1.clone());
        }

        let cell = make()?;
        debug!("Registered {} {} in {}", kind, name, self.name);
        let idx = inner.entries.len();
        inner.index.insert(name.to_string(), idx);
        inner.entries.push((Description::new(name, kind, help), cell.clone()));
        Ok(cell)
    }
}

fn kind_conflict(name: &str, existing: MetricKind, requested: MetricKind) -> anyhow::Error {
    SamplerError::Catalog(format!(
        "{} is registered as a {}, not a {}",
        name, existing, requested
    ))
    .into()
}

impl MetricCatalog for Registry {
    fn describe(&self) -> Vec<Description> {
        match self.inner.read() {
            Ok(inner) => inner.entries.iter().map(|(d, _)| d.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn read(&self, samples: &mut [MetricSample]) -> Result<()> {
        let inner = self
            .inner
            .read()
            .map_err(|_| SamplerError::Other("Lock poisoned".to_string()))?;

        for sample in samples.iter_mut() {
            sample.value = match inner.index.get(&sample.name) {
                Some(&idx) => inner.entries[idx].1.value(),
                None => SampleValue::Bad,
            };
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_and_gauge_values() {
        let registry = Registry::new("test");
        let requests = registry.counter("/http/requests:requests", "").unwrap();
        let load = registry.gauge("/cpu/load:ratio", "").unwrap();

        requests.inc();
        requests.add(4);
        load.set(0.75);

        let samples = registry.snapshot().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name, "/http/requests:requests");
        assert_eq!(samples[0].value, SampleValue::Counter(5));
        assert_eq!(samples[1].value, SampleValue::Gauge(0.75));
    }

    #[test]
    fn test_registering_twice_returns_same_handle() {
        let registry = Registry::new("test");
        let a = registry.counter("/a:things", "").unwrap();
        let b = registry.counter("/a:things", "").unwrap();
        a.inc();
        assert_eq!(b.get(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_kind_conflicts_are_rejected() {
        let registry = Registry::new("test");
        registry.counter("/a:things", "").unwrap();
        assert!(registry.gauge("/a:things", "").is_err());
        assert!(registry.histogram("/a:things", "", &[0.0, 1.0]).is_err());

        registry.histogram("/h:seconds", "", &[0.0, 1.0]).unwrap();
        assert!(registry.histogram("/h:seconds", "", &[0.0, 2.0]).is_err());
        assert!(registry.histogram("/h:seconds", "", &[0.0, 1.0]).is_ok());
    }

    #[test]
    fn test_histogram_bucketing() {
        let registry = Registry::new("test");
        let h = registry
            .histogram("/latency:seconds", "", &[1.0, 11.0, 21.0])
            .unwrap();
        assert_eq!(
            h.boundaries(),
            &[f64::NEG_INFINITY, 1.0, 11.0, 21.0, f64::INFINITY]
        );

        h.observe(-5.0);
        h.observe(1.0);
        h.observe(10.999);
        h.observe(11.0);
        h.observe(21.0);
        h.observe(f64::INFINITY);
        h.observe(f64::NAN);
        h.observe_n(15.0, 3);

        assert_eq!(h.snapshot().counts(), &[1, 2, 4, 2]);
    }

    #[test]
    fn test_invalid_histogram_boundaries() {
        let registry = Registry::new("test");
        assert!(registry.histogram("/h:seconds", "", &[1.0]).is_err());
        assert!(registry.histogram("/h:seconds", "", &[2.0, 1.0]).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_slot_reads_as_bad() {
        let registry = Registry::new("test");
        registry.counter("/a:things", "").unwrap();
        let mut samples = vec![MetricSample::named("/missing:things")];
        registry.read(&mut samples).unwrap();
        assert_eq!(samples[0].value, SampleValue::Bad);
    }
}
