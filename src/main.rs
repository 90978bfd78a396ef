//! taskdispatch - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskdispatch::util::config::{resolve_config, to_toml_string};
use taskdispatch::util::logger::{self, LogLevel};
use taskdispatch::{run_counter, DispatcherConfig, NAME, VERSION};

/// Multicore task dispatcher
#[derive(Parser, Debug)]
#[command(name = "taskdispatch")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the counter workload through a dispatcher
    Run {
        /// Worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Task pool slots
        #[arg(short, long)]
        slots: Option<usize>,

        /// Tasks to submit
        #[arg(short, long, default_value_t = 10_000)]
        tasks: usize,

        /// Config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn effective_config(
    path: Option<&PathBuf>,
    workers: Option<usize>,
    slots: Option<usize>,
) -> Result<DispatcherConfig> {
    let mut config = resolve_config(path.map(PathBuf::as_path)).context("Failed to load config")?;
    if let Some(workers) = workers {
        config.num_workers = workers;
    }
    if let Some(slots) = slots {
        config.pool_slots = slots;
        config.pool_bytes = None;
    }
    config.validate().context("Invalid dispatcher config")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level {
        Some(level) => level,
        None if args.verbose || cfg!(feature = "debug") => LogLevel::Debug,
        None => LogLevel::Warn,
    };
    logger::init_with_level(level);

    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match args.command {
        Commands::Run {
            workers,
            slots,
            tasks,
            config,
            json,
        } => {
            let config = effective_config(config.as_ref(), workers, slots)?;
            let report = run_counter(config, tasks).context("Counter workload failed")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to encode report")?
                );
            } else {
                println!("tasks:      {}", report.tasks);
                println!("counter:    {}", report.counter);
                println!("workers:    {}", report.workers);
                println!("capacity:   {}", report.capacity);
                println!("elapsed:    {:.3} ms", report.elapsed_ms);
                println!("peak queue: {}", report.stats.peak_queue_len);
                println!("mean exec:  {:.3} us", report.stats.mean_exec_time_us());
            }
            if !report.is_consistent() {
                anyhow::bail!(
                    "counter mismatch: {} tasks, counter {}",
                    report.tasks,
                    report.counter
                );
            }
        }
        Commands::Config { config } => {
            let config = effective_config(config.as_ref(), None, None)?;
            print!("{}", to_toml_string(&config).context("Failed to render config")?);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
