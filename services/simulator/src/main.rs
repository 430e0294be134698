//! privpack-sim - differential-privacy budget scheduling simulator
//!
//! Runs one simulation from a TOML configuration and writes the JSON-lines
//! record stream to stdout or a file. Logs go to stderr.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use privpack_events::{JsonLinesSink, RecordSink};
use privpack_simulator::config::{SimConfig, TaskSource, LOG_LEVEL_ENV};
use privpack_simulator::Simulation;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod output;

/// Simulate privacy budget scheduling policies over arriving data blocks.
#[derive(Debug, Parser)]
#[command(name = "privpack-sim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Replay this JSON-lines trace instead of generating tasks.
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Write records to this file instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Override the configured seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = LOG_LEVEL_ENV)]
    log_level: Option<String>,

    /// Do not print the summary table.
    #[arg(long)]
    quiet: bool,
}

impl Cli {
    fn load_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => SimConfig::default(),
        }
        .with_env_overrides();

        if let Some(trace) = &self.trace {
            config.tasks.source = TaskSource::Trace;
            config.tasks.trace_path = Some(trace.clone());
        }
        if let Some(seed) = self.seed {
            config.global_seed = seed;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }

    fn sink(&self) -> Result<Box<dyn RecordSink>> {
        let sink: Box<dyn RecordSink> = match &self.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                Box::new(JsonLinesSink::new(BufWriter::new(file)))
            }
            None => Box::new(JsonLinesSink::new(BufWriter::new(io::stdout()))),
        };
        Ok(sink)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // Initialize tracing (prefer RUST_LOG, fallback to PRIVPACK_LOG_LEVEL / config)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
        .init();

    info!(
        config = ?cli.config,
        seed = config.global_seed,
        policy = ?config.scheduler.method,
        "Configuration loaded"
    );

    let mut simulation = match Simulation::new(config, cli.sink()?) {
        Ok(simulation) => simulation,
        Err(e) => {
            error!(error = %e, "Failed to set up simulation");
            output::print_error(&e);
            std::process::exit(2);
        }
    };

    match simulation.run() {
        Ok(summary) => {
            if !cli.quiet {
                output::print_summary(&summary);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Simulation failed");
            if let Some(summary) = simulation.summary().filter(|_| !cli.quiet) {
                output::print_summary(summary);
            }
            output::print_error(&e);
            std::process::exit(1);
        }
    }
}
