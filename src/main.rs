//! HMS - hospital appointment records over an embedded document store
//!
//! Runs catalog queries and pipelines against the seed appointments and
//! prints result documents as JSON lines.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use tracing::error;

use hms::catalog::{Catalog, EntryKind};
use hms::config::Config;
use hms::fixtures;
use hms::records::HospitalRecords;
use hms::telemetry;
use hms::Result;

/// HMS - hospital appointment records
///
/// Query the appointments collection through the named catalog.
#[derive(Parser, Debug)]
#[command(name = "hms")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", env = "HMS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// JSON seed file (overrides config file)
    #[arg(short = 's', long = "seed", value_name = "FILE", env = "HMS_SEED", global = true)]
    seed: Option<PathBuf>,

    /// Reference instant for $$NOW, RFC 3339 or YYYY-MM-DD (overrides config file)
    #[arg(long = "now", value_name = "DATE", env = "HMS_NOW", global = true)]
    now: Option<String>,

    /// Log level: trace, debug, info, warn, error (overrides config file)
    #[arg(
        short = 'l',
        long = "log-level",
        value_name = "LEVEL",
        env = "HMS_LOG_LEVEL",
        global = true
    )]
    log_level: Option<String>,

    /// Drop soft-deleted records from results
    #[arg(long = "exclude-deleted", action = ArgAction::SetTrue, global = true)]
    exclude_deleted: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List catalog entries
    List,

    /// Run one catalog entry
    Run {
        /// Entry ID, e.g. find-04 or agg-10
        id: String,
    },

    /// Run every catalog entry
    RunAll,

    /// Write the built-in seed appointments as JSON
    Seed {
        /// Output path
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: PathBuf,
    },
}

impl Cli {
    /// Apply CLI argument overrides to the configuration
    fn apply_to_config(&self, config: &mut Config) {
        if let Some(ref seed) = self.seed {
            config.seed.path = Some(seed.clone());
        }
        if let Some(ref now) = self.now {
            config.evaluation.reference_time = Some(now.clone());
        }
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
        if self.exclude_deleted {
            config.evaluation.exclude_deleted = true;
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    cli.apply_to_config(&mut config);
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init_logging(&config.logging) {
        eprintln!("{} {}", "error:".red().bold(), e);
        return ExitCode::FAILURE;
    }

    match execute(&cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn execute(command: &Commands, config: &Config) -> Result<()> {
    match command {
        Commands::List => cmd_list(config),
        Commands::Run { id } => cmd_run(config, std::slice::from_ref(id)),
        Commands::RunAll => {
            let ids: Vec<String> = Catalog::standard(config.catalog_settings())
                .entries()
                .iter()
                .map(|e| e.id.clone())
                .collect();
            cmd_run(config, &ids)
        }
        Commands::Seed { out } => {
            let appointments = fixtures::seed_appointments()?;
            fixtures::save_seed_file(out, &appointments)?;
            println!(
                "{} Wrote {} appointments to {}",
                "✓".green().bold(),
                appointments.len(),
                out.display()
            );
            Ok(())
        }
    }
}

fn cmd_list(config: &Config) -> Result<()> {
    let records = HospitalRecords::new(config)?;
    for entry in records.catalog().entries() {
        let kind = match entry.kind() {
            EntryKind::Find => entry.kind().to_string().cyan(),
            EntryKind::Aggregate => entry.kind().to_string().magenta(),
        };
        println!("{:<8} {:<10} {}", entry.id.bold(), kind, entry.intent);
    }
    Ok(())
}

fn cmd_run(config: &Config, ids: &[String]) -> Result<()> {
    let records = HospitalRecords::open(config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for id in ids {
        let cursor = records.run(id)?;
        if ids.len() > 1 {
            let entry = records.catalog().get(id)?;
            writeln!(out, "# {} {}", entry.id, entry.intent)?;
        }
        for doc in cursor {
            writeln!(out, "{}", serde_json::to_string(&doc)?)?;
        }
    }
    Ok(())
}
