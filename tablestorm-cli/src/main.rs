use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anyhow::Context as _;
use tablestorm_cli::config::ProfileConfig;
use tablestorm_cli::driver::run_profile_with_cancel;
use tablestorm_core::CancelToken;
use tablestorm_engine::MemoryEngine;

/// tablestorm: table-handle churn stress harness
///
/// tablestorm drives synthetic load against a multi-table storage engine
/// from a TOML profile: a populate phase, a timed mixed workload spread
/// across many tables, an optional checkpoint thread, and a watchdog on the
/// engine's idle-handle sweep latency.
///
/// Example usage:
///   tablestorm run -P profiles/many-dhandle-stress.toml
///   tablestorm run -P profiles/smoke.toml --seed 42 --run-time 10s
///   tablestorm check -P profiles/many-dhandle-stress.toml
#[derive(Parser)]
#[command(name = "tablestorm")]
#[command(version, about = "Table-handle churn stress harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a stress profile against the in-memory reference engine
    Run {
        /// Path to the TOML profile
        #[arg(short = 'P', long, required = true)]
        profile: PathBuf,

        /// Override the profile's seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the main-phase duration (e.g. "30s", "15m")
        #[arg(long, value_parser = humantime::parse_duration)]
        run_time: Option<Duration>,

        /// Override the output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Parse and validate a profile without running it
    Check {
        /// Path to the TOML profile
        #[arg(short = 'P', long, required = true)]
        profile: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Check { profile } => {
            let config = ProfileConfig::from_file(&profile)?;
            println!("profile ok: {}", config.experiment.name);
            Ok(())
        }
        Commands::Run { profile, seed, run_time, output_dir } => {
            run(profile, seed, run_time, output_dir)
        }
    }
}

fn run(
    profile: PathBuf,
    seed: Option<u64>,
    run_time: Option<Duration>,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    tracing::info!("loading profile: {}", profile.display());
    let mut config = ProfileConfig::from_file(&profile)?;
    if let Some(seed) = seed {
        config.experiment.seed = Some(seed);
    }
    if let Some(run_time) = run_time {
        config.experiment.run_time = run_time;
    }
    if let Some(dir) = output_dir {
        config.output.dir = dir;
    }
    config.validate()?;

    tracing::info!(
        name = %config.experiment.name,
        tables = config.tables.count,
        thread_groups = config.threads.len(),
        run_time = ?config.experiment.run_time,
        seed = ?config.experiment.seed,
        "starting run"
    );
    if let Some(desc) = &config.experiment.description {
        tracing::info!("description: {desc}");
    }

    // Ctrl-C cancels cleanly: the current phase drains, writes its report,
    // and the partial figures are printed below.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            tracing::info!("interrupt received, stopping run");
            cancel.cancel();
        })
        .context("installing interrupt handler")?;
    }

    let report = run_profile_with_cancel(MemoryEngine::new(), &config, cancel)?;

    if let Some(populate) = &report.populate {
        println!(
            "populate: {} inserts in {:.2}s",
            populate.total_ops,
            populate.elapsed.as_secs_f64()
        );
    }
    let main = &report.main;
    println!(
        "main: {} ops in {:.2}s ({} idle-cycle warnings)",
        main.total_ops,
        main.elapsed.as_secs_f64(),
        main.idle_cycle_warnings
    );
    for s in main.summaries() {
        if s.ops == 0 {
            continue;
        }
        println!(
            "  {:<10} ops={} avg={}us p50={}us p95={}us p99={}us max={}us over_max={}",
            s.kind.name(),
            s.ops,
            s.avg_us,
            s.p50_us,
            s.p95_us,
            s.p99_us,
            s.max_us,
            s.over_max
        );
    }
    println!("latency report: {}", main.report_path.display());
    Ok(())
}
