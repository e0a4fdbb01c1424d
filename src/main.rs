//! Command-line interface for fabric-loadtest
//!
//! # Usage Examples
//!
//! ## Load run
//! ```bash
//! # Dry run against the simulated ledger
//! fabric-loadtest run --tx-count 1000 --workers 20
//!
//! # FabConnect, receipts polled every 5s
//! fabric-loadtest run --backend fabconnect \
//!   --fabconnect-url http://localhost:3000 \
//!   --tx-count 5000 --workers 50 --format table --output report.json
//!
//! # FabConnect, chaincode events in batches of 50
//! fabric-loadtest run --backend fabconnect --tracking events \
//!   --fabconnect-ws-url ws://localhost:3001/ws \
//!   --event-batch-size 50 -n 5000 -w 50
//! ```
//!
//! ## Ledger initialization
//! ```bash
//! fabric-loadtest init --backend fabconnect --chaincode asset_transfer
//! ```
//!
//! ## Reports
//! ```bash
//! fabric-loadtest report --input report.json --format json
//! ```
//!
//! Every run option can also come from the environment (`TX_COUNT`,
//! `WORKERS`, `CCNAME`, `CHANNEL`, `USER_ID`, `BACKEND`, `TRACKING`, ...)
//! or from a YAML profile passed with `--config`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use fabric_loadtest::{execute, RunOpts};
use loadtest_engine::{render, OutputFormat, Report, RunMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fabric-loadtest")]
#[command(about = "Concurrent transaction load driver for permissioned ledgers")]
#[command(long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit generated transactions and report their outcomes
    Run {
        /// Run the one-time ledger initialization instead
        #[arg(long, env = "INIT_CC")]
        init: bool,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// Submit the one-time InitLedger transaction
    Init {
        #[command(flatten)]
        opts: RunOpts,
    },

    /// Render a saved JSON report
    Report {
        /// Report file written with --output
        #[arg(long, value_name = "PATH")]
        input: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { init, opts } => {
            let mode = if init { RunMode::Init } else { RunMode::Load };
            run_and_print(&opts, mode).await
        }
        Commands::Init { opts } => run_and_print(&opts, RunMode::Init).await,
        Commands::Report { input, format } => {
            let report = Report::load(&input)
                .with_context(|| format!("Failed to read report from {input:?}"))?;
            print!("{}", render(&report, format)?);
            Ok(())
        }
    }
}

async fn run_and_print(opts: &RunOpts, mode: RunMode) -> anyhow::Result<()> {
    let report = execute(opts, mode).await?;
    print!("{}", render(&report, opts.format)?);
    Ok(())
}
