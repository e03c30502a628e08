use clap::{Parser, Subcommand, ValueEnum};
use cpl_baseline::{compare, extract, CaseConfig, ComparisonResult, OsFs};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Compare coupler-log throughput and memory usage against stored
/// performance baselines, or record new baselines from the latest run.
#[derive(Parser, Debug)]
#[command(name = "cpl-baseline", version, about)]
pub struct Cli {
    /// Case config file path [default: case.toml, if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run directory (overrides config)
    #[arg(long)]
    run_dir: Option<PathBuf>,

    /// Baseline root directory (overrides config)
    #[arg(long)]
    baseline_root: Option<PathBuf>,

    /// Baseline name (overrides config)
    #[arg(long)]
    baseline_name: Option<String>,

    /// Extra logging (log discovery, extraction details)
    #[arg(short, long)]
    verbose: bool,

    /// Only errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare the latest run against the stored baselines
    Compare {
        /// Which metric to compare
        #[arg(long, value_enum, default_value_t = Metric::All)]
        metric: Metric,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record baselines from the latest run
    Record,
    /// Print the metrics extracted from a coupler log
    Inspect {
        /// Coupler log path (plain, .gz or .zst)
        log: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Metric {
    Throughput,
    Memory,
    All,
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

const DEFAULT_CONFIG: &str = "case.toml";

/// Load the case config, then apply CLI overrides.
///
/// An explicit `--config` must exist; without one, `case.toml` is used when
/// present and built-in defaults otherwise.
fn load_case(cli: &Cli) -> Result<CaseConfig, cpl_baseline::ConfigError> {
    let default_path = PathBuf::from(DEFAULT_CONFIG);
    let mut case = match &cli.config {
        Some(path) => CaseConfig::load(path)?,
        None if default_path.exists() => CaseConfig::load(&default_path)?,
        None => {
            tracing::debug!("no case.toml found, using defaults");
            CaseConfig::default()
        }
    };

    if let Some(run_dir) = &cli.run_dir {
        case.case.run_dir = run_dir.clone();
    }
    if let Some(root) = &cli.baseline_root {
        case.baseline.root = root.clone();
    }
    if let Some(name) = &cli.baseline_name {
        case.baseline.name = name.clone();
    }
    Ok(case)
}

fn run_compare(case: &CaseConfig, metric: Metric, json: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let mut results: Vec<ComparisonResult> = Vec::new();
    if matches!(metric, Metric::Throughput | Metric::All) {
        results.push(compare::compare_throughput(&OsFs, case)?);
    }
    if matches!(metric, Metric::Memory | Metric::All) {
        results.push(compare::compare_memory(&OsFs, case)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            println!("{result}");
        }
    }

    Ok(results.iter().any(ComparisonResult::is_regression))
}

/// Exit status for a finished run: 0 on success, 1 when a comparison
/// exceeded its tolerance, 2 on error.
fn exit_status(outcome: &Result<bool, Box<dyn std::error::Error>>) -> u8 {
    match outcome {
        Ok(false) => 0,
        Ok(true) => 1,
        Err(_) => 2,
    }
}

/// Run the selected command. `Ok(true)` means a comparison regressed.
fn run(cli: &Cli) -> Result<bool, Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Compare { metric, json } => {
            let case = load_case(cli)?;
            let regressed = run_compare(&case, *metric, *json)?;
            if regressed {
                tracing::warn!("performance outside baseline tolerance");
                return Ok(true);
            }
        }
        Command::Record => {
            let case = load_case(cli)?;
            match compare::record_baselines(&OsFs, &case)? {
                Some(dir) => println!("baselines written to {}", dir.display()),
                None => println!("no coupler log found, nothing recorded"),
            }
        }
        Command::Inspect { log } => {
            if !log.is_file() {
                return Err(format!("no such log: {}", log.display()).into());
            }
            match extract::get_throughput(&OsFs, log) {
                Some(tput) => println!("throughput: {tput}"),
                None => println!("throughput: none"),
            }
            let samples = extract::get_mem_usage(&OsFs, log);
            println!("memory samples: {}", samples.len());
            for (date, mem) in samples {
                println!("  {date}\t{mem}");
            }
        }
    }
    Ok(false)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    tracing::debug!(?cli, "parsed CLI arguments");

    let outcome = run(&cli);
    if let Err(e) = &outcome {
        tracing::error!(error = %e, "cpl-baseline failed");
    }
    ExitCode::from(exit_status(&outcome))
}
