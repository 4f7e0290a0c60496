//! Process statistics read from `/proc/<pid>`
use std::fs;
use std::path::PathBuf;

use log::trace;
use serde::Deserialize;

use super::{Description, MetricCatalog, MetricKind, MetricSample, SampleValue};
use crate::error::{Result, SamplerError};

/// Configuration for the `/proc` catalog
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProcConfig {
    /// Process to sample; `None` samples the current process
    #[serde(default)]
    pub pid: Option<u32>,
    /// Mount point of procfs
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
    /// Page size used to convert page counts into bytes
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Clock ticks per second used to convert CPU times into seconds
    #[serde(default = "default_clock_ticks")]
    pub clock_ticks: u64,
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_page_size() -> u64 {
    4096
}

fn default_clock_ticks() -> u64 {
    100
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            pid: None,
            proc_root: default_proc_root(),
            page_size: default_page_size(),
            clock_ticks: default_clock_ticks(),
        }
    }
}

const CPU_USER: &str = "/cpu/user:cpu-seconds";
const CPU_SYSTEM: &str = "/cpu/system:cpu-seconds";
const MEM_VIRTUAL: &str = "/memory/virtual:bytes";
const MEM_RESIDENT: &str = "/memory/resident:bytes";
const MEM_SHARED: &str = "/memory/shared:bytes";
const FAULTS_MINOR: &str = "/memory/faults/minor:faults";
const FAULTS_MAJOR: &str = "/memory/faults/major:faults";
const THREADS: &str = "/sched/threads:threads";

/// Fields of `/proc/<pid>/stat` this catalog reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ProcStat {
    minflt: u64,
    majflt: u64,
    utime: u64,
    stime: u64,
    num_threads: u64,
    vsize: u64,
}

/// Fields of `/proc/<pid>/statm`, in pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ProcStatm {
    resident: u64,
    shared: u64,
}

/// Parse the content of `/proc/<pid>/stat`.
///
/// The command name in field 2 is parenthesised and may itself contain
/// spaces or parentheses, so fields are counted from the last `)`.
fn parse_stat(content: &str) -> Result<ProcStat> {
    let rest = content
        .rfind(')')
        .map(|pos| &content[pos + 1..])
        .ok_or_else(|| SamplerError::Catalog("stat: missing command name".to_string()))?;
    let fields: Vec<&str> = rest.split_whitespace().collect();

    // fields[0] is field 3 (state) of proc(5)
    let field = |n: usize| -> Result<u64> {
        fields
            .get(n - 3)
            .ok_or_else(|| SamplerError::Catalog(format!("stat: missing field {}", n)))?
            .parse::<u64>()
            .map_err(|e| SamplerError::Catalog(format!("stat: field {}: {}", n, e)).into())
    };

    Ok(ProcStat {
        minflt: field(10)?,
        majflt: field(12)?,
        utime: field(14)?,
        stime: field(15)?,
        num_threads: field(20)?,
        vsize: field(23)?,
    })
}

/// Parse the content of `/proc/<pid>/statm`
fn parse_statm(content: &str) -> Result<ProcStatm> {
    let fields: Vec<u64> = content
        .split_whitespace()
        .map(|f| f.parse::<u64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| SamplerError::Catalog(format!("statm: {}", e)))?;

    if fields.len() < 3 {
        return Err(SamplerError::Catalog(format!(
            "statm: expected at least 3 fields, got {}",
            fields.len()
        ))
        .into());
    }

    Ok(ProcStatm {
        resident: fields[1],
        shared: fields[2],
    })
}

/// A catalog of memory, CPU and scheduling statistics of one process
pub struct ProcCatalog {
    config: ProcConfig,
    dir: PathBuf,
    name: String,
}

impl ProcCatalog {
    /// Create a catalog for the process described by `config`
    pub fn new(config: ProcConfig) -> Self {
        let dir = match config.pid {
            Some(pid) => config.proc_root.join(pid.to_string()),
            None => config.proc_root.join("self"),
        };
        let name = match config.pid {
            Some(pid) => format!("proc:{}", pid),
            None => "proc:self".to_string(),
        };
        Self { config, dir, name }
    }

    fn read_file(&self, file: &str) -> Result<String> {
        let path = self.dir.join(file);
        fs::read_to_string(&path).map_err(|e| {
            SamplerError::Catalog(format!("failed to read {}: {}", path.display(), e)).into()
        })
    }

    fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        ticks as f64 / self.config.clock_ticks.max(1) as f64
    }
}

impl MetricCatalog for ProcCatalog {
    fn describe(&self) -> Vec<Description> {
        vec![
            Description::new(CPU_USER, MetricKind::Gauge, "CPU time spent in user mode"),
            Description::new(CPU_SYSTEM, MetricKind::Gauge, "CPU time spent in kernel mode"),
            Description::new(MEM_VIRTUAL, MetricKind::Counter, "Virtual memory size"),
            Description::new(MEM_RESIDENT, MetricKind::Counter, "Resident set size"),
            Description::new(MEM_SHARED, MetricKind::Counter, "Resident shared pages"),
            Description::new(FAULTS_MINOR, MetricKind::Counter, "Minor page faults"),
            Description::new(FAULTS_MAJOR, MetricKind::Counter, "Major page faults"),
            Description::new(THREADS, MetricKind::Counter, "Number of threads"),
        ]
    }

    fn read(&self, samples: &mut [MetricSample]) -> Result<()> {
        let stat = parse_stat(&self.read_file("stat")?)?;
        let statm = parse_statm(&self.read_file("statm")?)?;
        trace!("Read {:?} {:?} from {}", stat, statm, self.dir.display());

        let page = self.config.page_size;
        for sample in samples.iter_mut() {
            sample.value = match sample.name.as_str() {
                CPU_USER => SampleValue::Gauge(self.ticks_to_seconds(stat.utime)),
                CPU_SYSTEM => SampleValue::Gauge(self.ticks_to_seconds(stat.stime)),
                MEM_VIRTUAL => SampleValue::Counter(stat.vsize),
                MEM_RESIDENT => SampleValue::Counter(statm.resident.saturating_mul(page)),
                MEM_SHARED => SampleValue::Counter(statm.shared.saturating_mul(page)),
                FAULTS_MINOR => SampleValue::Counter(stat.minflt),
                FAULTS_MAJOR => SampleValue::Counter(stat.majflt),
                THREADS => SampleValue::Counter(stat.num_threads),
                _ => SampleValue::Bad,
            };
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
