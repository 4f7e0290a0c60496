//! The sampling loop
//!
//! A [`Sampler`] reads every instrumentation point of one catalog at a fixed
//! interval, maps the raw names, reduces histograms with the configured
//! strategy and forwards the results to a sink. Each sampler owns its
//! reducer state, so several samplers in one process never share anything
//! mutable.

mod config;

pub use self::config::{SamplerConfig, SamplerConfigBuilder};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::catalog::{MetricCatalog, MetricSample, SampleValue};
use crate::error::Result;
use crate::naming::NameMapper;
use crate::reducer::{Emission, HistogramReducer, reducer_for};
use crate::sink::MetricsSink;

/// What happened during one sampling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Instrumentation points read
    pub samples: usize,
    /// Gauges handed to the sink
    pub gauges: usize,
    /// Distribution events handed to the sink
    pub distributions: usize,
    /// Points skipped because their name could not be mapped
    pub dropped_names: usize,
    /// Points of a kind this library cannot report
    pub unsupported_kinds: usize,
    /// Points the catalog failed to produce a value for
    pub invalid: usize,
    /// Failed sink calls
    pub sink_errors: usize,
}

/// Counters accumulated over the lifetime of a sampler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub passes: u64,
    pub catalog_errors: u64,
    pub dropped_names: u64,
    pub unsupported_kinds: u64,
    pub invalid: u64,
    pub sink_errors: u64,
}

impl SamplerStats {
    fn record(&mut self, report: &PassReport) {
        self.passes += 1;
        self.dropped_names += report.dropped_names as u64;
        self.unsupported_kinds += report.unsupported_kinds as u64;
        self.invalid += report.invalid as u64;
        self.sink_errors += report.sink_errors as u64;
    }
}

/// Periodically samples a catalog into a sink
pub struct Sampler {
    config: SamplerConfig,
    catalog: Arc<dyn MetricCatalog>,
    sink: Arc<dyn MetricsSink>,
    mapper: NameMapper,
    reducer: Box<dyn HistogramReducer>,
    samples: Vec<MetricSample>,
    stats: SamplerStats,
    /// Names already logged as dropped, unsupported, invalid or non-finite
    warned: HashSet<String>,
}

impl Sampler {
    /// Create a sampler using the reducer selected by `config.mode`
    pub fn new(
        config: SamplerConfig,
        catalog: Arc<dyn MetricCatalog>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let reducer = reducer_for(config.mode);
        Self::with_reducer(config, catalog, sink, reducer)
    }

    /// Create a sampler with a custom histogram reducer
    pub fn with_reducer(
        config: SamplerConfig,
        catalog: Arc<dyn MetricCatalog>,
        sink: Arc<dyn MetricsSink>,
        reducer: Box<dyn HistogramReducer>,
    ) -> Self {
        Self {
            mapper: NameMapper::new(&config.source),
            config,
            catalog,
            sink,
            reducer,
            samples: Vec::new(),
            stats: SamplerStats::default(),
            warned: HashSet::new(),
        }
    }

    /// Get the sampler name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Rebuild the sample slots when the catalog's point set changed
    fn refresh_slots(&mut self) {
        let descriptions = self.catalog.describe();
        let unchanged = descriptions.len() == self.samples.len()
            && descriptions
                .iter()
                .zip(self.samples.iter())
                .all(|(d, s)| d.name == s.name);
        if unchanged {
            return;
        }

        debug!(
            "{}: catalog {} exposes {} instrumentation points",
            self.config.name,
            self.catalog.name(),
            descriptions.len()
        );
        self.samples = descriptions
            .into_iter()
            .map(|d| MetricSample::named(d.name))
            .collect();
    }

    /// Warn about `name` once per sampler lifetime
    fn first_time(&mut self, name: &str) -> bool {
        if self.warned.contains(name) {
            return false;
        }
        self.warned.insert(name.to_string());
        true
    }

    /// Turn the current sample slots into sink emissions
    fn reduce_samples(&mut self, report: &mut PassReport) -> Vec<Emission> {
        let samples = std::mem::take(&mut self.samples);
        let mut out = Vec::with_capacity(samples.len());

        for sample in &samples {
            let mapped = self.mapper.map(&sample.name);
            if mapped.is_empty() {
                report.dropped_names += 1;
                if self.first_time(&sample.name) {
                    debug!("{}: cannot map metric name {:?}, skipping", self.config.name, sample.name);
                }
                continue;
            }

            match &sample.value {
                SampleValue::Counter(value) => out.push(Emission::Gauge {
                    name: mapped.full(),
                    value: *value as f64,
                }),
                SampleValue::Gauge(value) if !value.is_finite() => {
                    if self.first_time(&sample.name) {
                        debug!(
                            "{}: gauge {} is {}, not reporting it",
                            self.config.name, sample.name, value
                        );
                    }
                }
                SampleValue::Gauge(value) => out.push(Emission::Gauge {
                    name: mapped.full(),
                    value: *value,
                }),
                SampleValue::Histogram(hist) => {
                    out.extend(self.reducer.reduce(&mapped, hist));
                }
                SampleValue::Unsupported(_) => {
                    report.unsupported_kinds += 1;
                    if self.first_time(&sample.name) {
                        warn!(
                            "{}: unexpected metric kind {} for {}, ignoring",
                            self.config.name,
                            sample.value.kind_name(),
                            sample.name
                        );
                    }
                }
                SampleValue::Bad => {
                    report.invalid += 1;
                    if self.first_time(&sample.name) {
                        error!(
                            "{}: catalog {} returned no value for {}",
                            self.config.name,
                            self.catalog.name(),
                            sample.name
                        );
                    }
                }
            }
        }

        self.samples = samples;
        out
    }

    fn self_metrics(&self) -> Vec<Emission> {
        let prefix = self.mapper.prefix();
        [
            ("dropped_names", self.stats.dropped_names),
            ("unsupported_kinds", self.stats.unsupported_kinds),
            ("invalid", self.stats.invalid),
            ("sink_errors", self.stats.sink_errors),
        ]
        .into_iter()
        .map(|(name, value)| Emission::Gauge {
            name: format!("{}sampler.{}", prefix, name),
            value: value as f64,
        })
        .collect()
    }

    /// Run a single sampling pass
    pub async fn sample_once(&mut self) -> Result<PassReport> {
        self.refresh_slots();
        if let Err(e) = self.catalog.read(&mut self.samples) {
            self.stats.catalog_errors += 1;
            return Err(e);
        }

        let mut report = PassReport {
            samples: self.samples.len(),
            ..Default::default()
        };
        let emissions = self.reduce_samples(&mut report);

        for emission in &emissions {
            match self.sink.emit(emission).await {
                Ok(()) => match emission {
                    Emission::Gauge { .. } => report.gauges += 1,
                    Emission::Distribution { .. } => report.distributions += 1,
                },
                Err(e) => {
                    report.sink_errors += 1;
                    error!(
                        "{}: sink {} failed for {}: {}",
                        self.config.name,
                        self.sink.name(),
                        emission.name(),
                        e
                    );
                }
            }
        }

        self.stats.record(&report);

        if self.config.report_self_metrics {
            for emission in self.self_metrics() {
                if let Err(e) = self.sink.emit(&emission).await {
                    self.stats.sink_errors += 1;
                    error!("{}: failed to report {}: {}", self.config.name, emission.name(), e);
                }
            }
        }

        if let Err(e) = self.sink.flush().await {
            self.stats.sink_errors += 1;
            error!("{}: failed to flush sink {}: {}", self.config.name, self.sink.name(), e);
        }

        debug!("{}: pass complete: {:?}", self.config.name, report);
        Ok(report)
    }

    /// Sample until `cancel` fires, returning the accumulated counters.
    ///
    /// The first pass runs immediately. Passes that would fall behind
    /// schedule are skipped rather than run back to back.
    pub async fn run(mut self, cancel: CancellationToken) -> SamplerStats {
        let period = self.config.interval.max(Duration::from_millis(1));
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Starting sampler {} on {} every {:?} ({} mode)",
            self.config.name,
            self.catalog.name(),
            period,
            self.reducer.mode()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sampler {} shutting down", self.config.name);
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sample_once().await {
                        error!("{}: error reading catalog {}: {}", self.config.name, self.catalog.name(), e);
                    }
                }
            }
        }

        self.stats
    }

    /// Spawn [`Sampler::run`] on the tokio runtime
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<SamplerStats> {
        tokio::spawn(self.run(cancel))
    }
}
