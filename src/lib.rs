//! A library for sampling in-process instrumentation into a metrics backend
//!
//! Counters and gauges are forwarded as they are. Cumulative bucketed
//! histograms are reduced either to summary statistics or to incremental
//! weighted observations, see [`reducer`].

pub mod catalog;
pub mod config;
pub mod error;
pub mod naming;
pub mod reducer;
pub mod sampler;
pub mod sink;
pub mod util;

pub use util::logging::init as init_logging;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::catalog::{
        BucketedDistribution, MetricCatalog, MetricSample, ProcCatalog, Registry, SampleValue,
    };
    pub use crate::error::{Result, SamplerError};
    pub use crate::naming::NameMapper;
    pub use crate::reducer::{DeltaReducer, HistogramReducer, ReducerMode, SummaryReducer};
    pub use crate::sampler::{Sampler, SamplerConfig, SamplerConfigBuilder};
    pub use crate::sink::{JsonSink, LogSink, MemorySink, MetricsSink};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
