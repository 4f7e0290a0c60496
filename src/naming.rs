//! Mapping of raw instrumentation paths to backend metric names.
//!
//! Instrumentation points are named like `/sched/latencies:seconds` or
//! `/gc/heap/allocs:bytes`. The path part becomes a dotted, namespaced metric
//! name and the unit part is kept verbatim, so `/sched/latencies:seconds`
//! with source `process` maps to `runtime.process.sched.latencies` and unit
//! `seconds`.

use regex::Regex;
use std::sync::LazyLock;

static RAW_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(/[^:]+):([^:*/]+(?:[*/][^:*/]+)*)$").expect("static metric name pattern")
});

/// A mapped metric name and its unit suffix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedName {
    pub name: String,
    pub unit: String,
}

impl MappedName {
    /// True when the raw name did not match the naming grammar
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// The name a plain value is reported under: `<name>.<unit>`
    pub fn full(&self) -> String {
        format!("{}.{}", self.name, self.unit)
    }

    /// The name a derived statistic is reported under: `<name>.<stat>.<unit>`
    pub fn with_stat(&self, stat: &str) -> String {
        format!("{}.{}.{}", self.name, stat, self.unit)
    }
}

/// Maps raw instrumentation paths into the `runtime.<source>.` namespace
#[derive(Debug, Clone)]
pub struct NameMapper {
    prefix: String,
}

impl NameMapper {
    /// Create a mapper for the given source segment
    pub fn new(source: &str) -> Self {
        Self {
            prefix: format!("runtime.{}.", source),
        }
    }

    /// The namespace every mapped name starts with
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Map a raw path. Unparsable input yields an empty name and unit.
    pub fn map(&self, raw: &str) -> MappedName {
        let Some(caps) = RAW_NAME.captures(raw) else {
            return MappedName::default();
        };

        let path = &caps[1][1..];
        MappedName {
            name: format!("{}{}", self.prefix, path.replace('/', ".")),
            unit: caps[2].to_string(),
        }
    }
}
