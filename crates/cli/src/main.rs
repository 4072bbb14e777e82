// Roster CLI - merge character records from several sources into one table

mod exit_codes;
mod merge;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "roster")]
#[command(about = "Reconcile character records across sources and merge their attributes")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match and merge every configured source
    #[command(after_help = "\
Examples:
  roster run roster.toml
  roster run roster.toml --json
  roster run roster.toml --output merged.json --seed previous.json
  roster run roster.toml --strict")]
    Run {
        /// Path to the TOML config file
        config: PathBuf,

        /// Output the full result as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write JSON output to file (overrides [output].json)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Start from a previous JSON output (overrides [output].seed)
        #[arg(long)]
        seed: Option<PathBuf>,

        /// Exit 5 when any record stays unmatched or an orphan is dropped
        #[arg(long)]
        strict: bool,
    },

    /// Validate a config without running
    #[command(after_help = "\
Examples:
  roster validate roster.toml")]
    Validate {
        /// Path to the TOML config file
        config: PathBuf,
    },

    /// Print the canonical key of each name
    #[command(after_help = "\
Examples:
  roster normalize \"Mr. Game & Watch\" \"Rosalina & Luma\"")]
    Normalize {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn cmd_normalize(names: Vec<String>) -> Result<(), CliError> {
    for name in names {
        println!("{name} -> {}", roster_merge::normalize(&name));
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, json, output, seed, strict } => merge::cmd_run(config, json, output, seed, strict),
        Commands::Validate { config } => merge::cmd_validate(config),
        Commands::Normalize { names } => cmd_normalize(names),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
