//! `avsim`: run a multi-node simulation model.

use avsim_model::{load_model, ModelError};
use avsim_runner::{Session, SessionError, SessionOptions, SessionReport};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "avsim")]
#[command(author, version, about = "Multi-node sensor network simulator", long_about = None)]
struct Cli {
    /// Simulation model (YAML).
    model: PathBuf,

    /// Run length in reference cycles (overrides the model).
    #[arg(long)]
    cycles: Option<u64>,

    /// Random seed (overrides the model).
    #[arg(long)]
    seed: Option<u64>,

    /// Reference cycles between rendezvous (overrides the model).
    #[arg(long)]
    period: Option<u64>,

    /// Warn when no rendezvous completes for this many seconds (0 disables).
    #[arg(long, default_value = "10")]
    watchdog_secs: f64,

    /// Log progress every this many rounds.
    #[arg(long)]
    progress_rounds: Option<u64>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Log filter, e.g. `debug` or `avsim_sync=trace` (default: RUST_LOG, then info).
    #[arg(long)]
    log_level: Option<String>,

    /// Serve Prometheus metrics on this address.
    #[cfg(feature = "prometheus")]
    #[arg(long)]
    metrics_addr: Option<std::net::SocketAddr>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid --watchdog-secs {value}: {source}")]
    Watchdog {
        value: f64,
        #[source]
        source: std::time::TryFromFloatSecsError,
    },

    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[cfg(feature = "prometheus")]
    #[error("failed to start metrics exporter: {0}")]
    Metrics(String),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    #[cfg(feature = "prometheus")]
    if let Some(addr) = cli.metrics_addr {
        avsim_metrics::install_prometheus(addr).map_err(|e| CliError::Metrics(e.to_string()))?;
        info!(%addr, "prometheus exporter listening");
    }

    let mut model = load_model(&cli.model)?;
    if let Some(cycles) = cli.cycles {
        model.simulation.cycles = cycles;
    }
    if let Some(seed) = cli.seed {
        model.simulation.seed = seed;
    }
    if let Some(period) = cli.period {
        model.simulation.sync_period = period;
    }
    info!(
        model = %cli.model.display(),
        nodes = model.nodes.len(),
        seed = model.simulation.seed,
        "model loaded"
    );

    let options = SessionOptions {
        watchdog: watchdog_timeout(cli.watchdog_secs)?,
        progress_every: cli.progress_rounds,
    };
    let session = Session::new(model, options)?;

    let stop = session.stop_handle();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, stopping the session");
        stop.stop();
    })?;

    let report = session.run()?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

/// `None` for a zero timeout, an error for negative, NaN or infinite values.
fn watchdog_timeout(secs: f64) -> Result<Option<Duration>, CliError> {
    if secs == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|source| CliError::Watchdog { value: secs, source })
}

fn print_summary(report: &SessionReport) {
    println!();
    println!("Simulation {}", if report.stopped { "stopped" } else { "complete" });
    println!("  Rounds:        {}", report.rounds);
    println!("  Global events: {}", report.global_events);
    println!(
        "  Wall time:     {:.3}s ({:.2}x real time)",
        report.wall_seconds,
        report.speed()
    );
    println!();
    println!(
        "  {:<16} {:<9} {:>12} {:>8} {:>8} {:>8} {:>8}",
        "node", "program", "cycles", "tx", "samples", "busy", "rx"
    );
    for node in &report.nodes {
        println!(
            "  {:<16} {:<9} {:>12} {:>8} {:>8} {:>8} {:>8}",
            node.name,
            node.program,
            node.cycles,
            node.radio.transmitted,
            node.radio.samples,
            node.radio.busy_samples,
            node.radio.received
        );
        if let Some(error) = &node.error {
            println!("    stopped: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_timeout_parsing() {
        assert!(watchdog_timeout(0.0).unwrap().is_none());
        assert_eq!(watchdog_timeout(2.5).unwrap(), Some(Duration::from_millis(2500)));
        assert!(matches!(watchdog_timeout(f64::INFINITY), Err(CliError::Watchdog { .. })));
        assert!(matches!(watchdog_timeout(f64::NAN), Err(CliError::Watchdog { .. })));
        assert!(matches!(watchdog_timeout(-1.0), Err(CliError::Watchdog { .. })));
    }
}
