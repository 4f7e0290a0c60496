// Samples the statistics of a process into a sink

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use rtstat::catalog::ProcCatalog;
use rtstat::config::{AgentConfig, ConfigBuilder, ENV_PREFIX, LogLevel};
use rtstat::reducer::ReducerMode;
use rtstat::sampler::Sampler;
use rtstat::sink::{JsonSink, LogSink, MetricsSink, SinkKind};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "rtstat", version, about = "Sample process statistics into a metrics sink")]
struct Args {
    /// Path to a configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process to sample; defaults to rtstat itself
    #[arg(short, long)]
    pid: Option<u32>,

    /// Interval between passes in seconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Histogram reduction mode (summary or delta)
    #[arg(short, long)]
    mode: Option<ReducerMode>,

    /// Sink to report to (log or json)
    #[arg(short, long)]
    sink: Option<SinkKind>,

    /// Output file for the json sink
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    /// Command line flags win over file and environment settings
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(pid) = self.pid {
            config.process.pid = Some(pid);
        }
        if let Some(interval) = self.interval {
            config.sampler.interval_secs = interval;
        }
        if let Some(mode) = self.mode {
            config.sampler.mode = mode;
        }
        if let Some(sink) = self.sink {
            config.sink.kind = sink;
        }
        if let Some(output) = &self.output {
            config.sink.path = Some(output.clone());
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
    }
}

fn load(args: &Args) -> Result<AgentConfig> {
    let mut builder = ConfigBuilder::new();
    if let Some(path) = &args.config {
        builder = builder.add_file(path);
    }
    let mut config = builder.add_env(ENV_PREFIX).build()?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn build_sink(config: &AgentConfig) -> Result<Arc<dyn MetricsSink>> {
    Ok(match (config.sink.kind, &config.sink.path) {
        (SinkKind::Log, _) => Arc::new(LogSink::new("log")),
        (SinkKind::Json, None) => Arc::new(JsonSink::stdout("json")),
        (SinkKind::Json, Some(path)) => Arc::new(
            JsonSink::file("json", path)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load(&args) {
        Ok(config) => {
            rtstat::init_logging(&config.log_level);
            config
        }
        Err(e) => {
            rtstat::init_logging(&LogLevel::Error);
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let catalog = Arc::new(ProcCatalog::new(config.process.clone()));
    let sink = build_sink(&config)?;
    let mut sampler = Sampler::new(config.sampler.to_sampler_config(), catalog, sink);

    if args.once {
        let report = sampler.sample_once().await?;
        info!("Sampled {} points: {:?}", report.samples, report);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let handle = sampler.spawn(cancel.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for interrupt")?;
    info!("Received interrupt signal, shutting down...");
    cancel.cancel();

    let stats = handle.await?;
    info!(
        "rtstat {} stopped after {} passes ({} catalog errors, {} sink errors)",
        rtstat::VERSION,
        stats.passes,
        stats.catalog_errors,
        stats.sink_errors
    );

    Ok(())
}
