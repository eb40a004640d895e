//! Coherence simulator CLI.
//!
//! This binary drives the reference hierarchy. It performs:
//! 1. **Run:** Load a configuration (or use the defaults), run an access trace
//!    to completion and print per-node statistics as text or JSON.
//! 2. **Config:** Print the default configuration as JSON, as a starting point
//!    for a custom one.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use cohsim_core::config::Config;
use cohsim_core::sim::{System, Trace};

#[derive(Parser, Debug)]
#[command(
    name = "cohsim",
    author,
    version,
    about = "Cycle-level MESI cache-coherence simulator",
    long_about = "Run a per-core access trace through private L1s, shared L2 banks and memory controllers.\n\nTrace lines are `<core> <R|W> <address>`; `#` starts a comment.\n\nExamples:\n  cohsim run --trace traces/pingpong.trace\n  cohsim run --trace t.trace --config big.json --json\n  cohsim config > default.json"
)]
struct Cli {
    /// Log protocol transitions and stalls (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a trace and print statistics.
    Run {
        /// Access trace to execute.
        #[arg(short, long)]
        trace: PathBuf,

        /// JSON configuration; defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the report as JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Override the configured cycle limit.
        #[arg(long)]
        max_cycles: Option<u64>,
    },

    /// Print the default configuration as JSON.
    Config,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "cohsim_core=debug,cohsim=debug"
    } else {
        "cohsim_core=info,cohsim=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    match cli.command {
        Commands::Run {
            trace,
            config,
            json,
            max_cycles,
        } => cmd_run(&trace, config.as_deref(), json, max_cycles),
        Commands::Config => cmd_config(),
    }
}

/// Loads the configuration and trace, runs the system and prints its report.
///
/// Exits with code 1 on a configuration, trace or coherence error, and with
/// code 2 if the cycle limit was reached before the system drained.
fn cmd_run(trace_path: &Path, config_path: Option<&Path>, json: bool, max_cycles: Option<u64>) {
    let mut config = match config_path {
        Some(path) => Config::from_file(path).unwrap_or_else(|e| {
            eprintln!("Error loading config {}: {e}", path.display());
            process::exit(1);
        }),
        None => Config::default(),
    };
    if let Some(limit) = max_cycles {
        config.max_cycles = limit;
    }

    let trace = Trace::from_file(trace_path).unwrap_or_else(|e| {
        eprintln!("Error reading trace {}: {e}", trace_path.display());
        process::exit(1);
    });
    info!(
        trace = %trace_path.display(),
        accesses = trace.len(),
        cores = config.topology.cores,
        "starting run"
    );

    let report = System::new(&config)
        .and_then(|mut system| {
            system.load(&trace)?;
            system.run()
        })
        .unwrap_or_else(|e| {
            error!(error = %e, "run aborted");
            eprintln!("\n[!] FATAL: {e}");
            process::exit(1);
        });

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                process::exit(1);
            }
        }
    } else {
        report.print();
    }

    if !report.drained {
        process::exit(2);
    }
}

/// Prints the default configuration.
fn cmd_config() {
    match serde_json::to_string_pretty(&Config::default()) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("Error serializing config: {e}");
            process::exit(1);
        }
    }
}
