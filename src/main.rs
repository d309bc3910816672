//! SampleFlow headless runner
//!
//! Loads an experiment, feeds numbers from stdin into one input buffer, lets
//! the analysis scheduler settle and prints the resulting buffers.

use anyhow::{bail, Context};
use clap::Parser;
use sampleflow_rs::{
    config::{EngineConfig, ExperimentDescriptor},
    pipeline::{AnalysisEvent, GraphBuilder},
    session::Experiment,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sampleflow")]
#[command(author, version, about = "Run an analysis experiment headless", long_about = None)]
struct Cli {
    /// Experiment descriptor (JSON or TOML)
    #[arg(value_name = "EXPERIMENT")]
    experiment: PathBuf,

    /// Engine configuration, overriding the one in the descriptor
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Buffer that receives the numbers read from stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Buffers to print after the run (default: all)
    #[arg(short, long)]
    print: Vec<String>,

    /// Save a state folder after the run
    #[arg(long)]
    save_state: bool,

    /// Directory for --save-state (default: the configured state directory)
    #[arg(long, requires = "save_state")]
    state_dir: Option<PathBuf>,

    /// Quiet period after which the run is considered settled
    #[arg(long, default_value = "250")]
    settle_ms: u64,
}

/// Install the global subscriber. The returned guard flushes the file log
/// on drop.
fn init_logging(config: &EngineConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sampleflow_rs=debug"));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sampleflow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

fn parse_line(line: &str) -> anyhow::Result<Vec<f64>> {
    line.split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("'{}' is not a number", token))
        })
        .collect()
}

/// Block until no scheduler event arrived for `quiet`.
fn settle(experiment: &Experiment, quiet: Duration) {
    while let Some(event) = experiment.bridge().recv_timeout(quiet) {
        if let AnalysisEvent::DidUpdate(report) = event {
            for (id, error) in &report.failed {
                tracing::debug!("{:?} in {:?}: {}", id, report.pass, error);
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let descriptor = ExperimentDescriptor::load(&cli.experiment)
        .with_context(|| format!("Failed to load {}", cli.experiment.display()))?;
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => descriptor.config.clone().unwrap_or_default(),
    };
    let _log_guard = init_logging(&config);

    tracing::info!("Starting experiment '{}'", descriptor.title);
    let mut experiment = Experiment::build(descriptor, config, &GraphBuilder::new())?;
    experiment.start()?;

    if let Some(name) = &cli.input {
        let Some(buffer) = experiment.get_buffer(name) else {
            bail!("Input buffer '{}' is not declared", name);
        };
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let values = parse_line(&line?)?;
            buffer.append_from_slice(&values);
        }
    }

    let quiet = Duration::from_millis(cli.settle_ms);
    settle(&experiment, quiet);
    experiment.stop();
    settle(&experiment, quiet);

    let names: Vec<String> = if cli.print.is_empty() {
        experiment.buffers().names().map(str::to_string).collect()
    } else {
        cli.print.clone()
    };
    for name in &names {
        let Some(buffer) = experiment.get_buffer(name) else {
            bail!("Buffer '{}' is not declared", name);
        };
        let values: Vec<String> = buffer.to_vec().iter().map(f64::to_string).collect();
        println!("{}: {}", name, values.join(" "));
    }

    if cli.save_state {
        let folder = experiment.save_state(cli.state_dir.as_deref())?;
        println!("State saved to {}", folder.display());
    }

    tracing::info!(
        "Experiment '{}' finished after {} passes",
        experiment.title(),
        experiment.passes_executed()
    );
    Ok(())
}
