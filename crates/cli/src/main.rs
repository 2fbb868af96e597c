// Datalyzer CLI - dataset reconciliation and duplicate detection

mod exit_codes;
mod logging;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use datalyzer_config::ConfigError;
use datalyzer_io::{ExportError, LoadError};
use datalyzer_recon::model::Dataset;
use datalyzer_recon::ReconError;

use exit_codes::{
    recon_exit_code, EXIT_CONFIG, EXIT_DIFFS, EXIT_EXPORT, EXIT_LOAD, EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "datalyzer")]
#[command(about = "Reconcile two datasets by key and report duplicates")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a configured reconciliation: load both sources, scan, diff, export
    #[command(after_help = "\
Examples:
  datalyzer run clientes.toml
  datalyzer run clientes.toml --output-dir /tmp/out --json
  datalyzer run clientes.toml --fail-on-diff -q
  datalyzer run                      # uses the default config path")]
    Run {
        /// Path to the TOML config (default: platform config dir)
        config: Option<PathBuf>,

        /// Write outputs here instead of the configured directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the run summary as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Exit 1 when any key is only on one side or differs
        #[arg(long)]
        fail_on_diff: bool,

        /// Run index build and duplicate scan on one thread
        #[arg(long)]
        sequential: bool,

        /// Only warnings and errors on stderr
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Parse and validate a config without loading any data
    #[command(after_help = "\
Examples:
  datalyzer validate clientes.toml")]
    Validate {
        /// Path to the TOML config (default: platform config dir)
        config: Option<PathBuf>,
    },

    /// Report records sharing a key within a single file
    #[command(after_help = "\
Examples:
  datalyzer duplicates clientes.csv --key 'ID Cliente'
  datalyzer duplicates pedidos.csv --key id,filial --output-dir out
  datalyzer duplicates export.txt --key cpf --separator '|' --encoding latin1")]
    Duplicates {
        /// CSV, TXT, TSV, JSON or spreadsheet file
        file: PathBuf,

        /// Key column(s), comma-separated or repeated
        #[arg(long, short = 'k', required = true, value_delimiter = ',')]
        key: Vec<String>,

        /// Label used in output file names (default: file stem)
        #[arg(long)]
        label: Option<String>,

        /// Field separator (default: sniffed)
        #[arg(long)]
        separator: Option<char>,

        /// First encoding to try when decoding text
        #[arg(long)]
        encoding: Option<String>,

        /// Worksheet for spreadsheet files (default: first)
        #[arg(long)]
        sheet: Option<String>,

        /// Write <label>_duplicates.csv/.json here
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the groups as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Exit 1 when any duplicate key is found
        #[arg(long)]
        fail_on_duplicates: bool,

        /// Only warnings and errors on stderr
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Reconcile two files by key without a config
    #[command(after_help = "\
Examples:
  datalyzer diff origem_a.csv origem_b.csv --key 'ID Cliente'
  datalyzer diff a.csv b.json --key id,filial --output-dir out
  datalyzer diff a.csv b.csv --key id --json --fail-on-diff")]
    Diff {
        /// Left (A) file
        left: PathBuf,

        /// Right (B) file
        right: PathBuf,

        /// Key column(s), comma-separated or repeated
        #[arg(long, short = 'k', required = true, value_delimiter = ',')]
        key: Vec<String>,

        /// Field separator for both files (default: sniffed per file)
        #[arg(long)]
        separator: Option<char>,

        /// First encoding to try for both files
        #[arg(long)]
        encoding: Option<String>,

        /// Write partition files and summary.json here
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the run summary as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Exit 1 when any key is only on one side or differs
        #[arg(long)]
        fail_on_diff: bool,

        /// Only warnings and errors on stderr
        #[arg(long, short = 'q')]
        quiet: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  datalyzer-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, output_dir, json, fail_on_diff, sequential, quiet } => {
            recon::cmd_run(config, output_dir, json, fail_on_diff, sequential, quiet)
        }
        Commands::Validate { config } => recon::cmd_validate(config),
        Commands::Duplicates {
            file,
            key,
            label,
            separator,
            encoding,
            sheet,
            output_dir,
            json,
            fail_on_duplicates,
            quiet,
        } => recon::cmd_duplicates(recon::DuplicatesArgs {
            file,
            key,
            label,
            separator,
            encoding,
            sheet,
            output_dir,
            json,
            fail_on_duplicates,
            quiet,
        }),
        Commands::Diff { left, right, key, separator, encoding, output_dir, json, fail_on_diff, quiet } => {
            recon::cmd_diff(recon::DiffArgs {
                left,
                right,
                key,
                separator,
                encoding,
                output_dir,
                json,
                fail_on_diff,
                quiet,
            })
        }
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

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    pub fn diffs(msg: impl Into<String>) -> Self {
        Self { code: EXIT_DIFFS, message: msg.into(), hint: None }
    }

    pub fn from_config(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::Read { .. } => Some("pass a config path: datalyzer run <config.toml>".to_string()),
            ConfigError::Parse(_) | ConfigError::Validation(_) => None,
        };
        Self { code: EXIT_CONFIG, message: err.to_string(), hint }
    }

    pub fn from_load(err: LoadError) -> Self {
        let code = match &err {
            LoadError::Schema(inner) => recon_exit_code(inner.kind()),
            _ => EXIT_LOAD,
        };
        let hint = match &err {
            LoadError::Decode { .. } => Some("set the source encoding (e.g. encoding = \"latin1\")".to_string()),
            LoadError::UnsafeWhere(_) => {
                Some("WHERE may not contain ';', '--', DROP, DELETE, INSERT or UPDATE".to_string())
            }
            LoadError::UnsupportedDriver(_) => Some("export the table to CSV or SQLite".to_string()),
            LoadError::Connect { .. } => {
                Some("check host, port and the password variable (default DATALYZER_DB_PASSWORD)".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    pub fn from_export(err: ExportError) -> Self {
        Self { code: EXIT_EXPORT, message: err.to_string(), hint: None }
    }

    /// Engine error. For missing key columns the hint lists what the
    /// offending dataset does have.
    pub fn from_recon(err: ReconError, datasets: &[&Dataset]) -> Self {
        let hint = match &err {
            ReconError::MissingKeyColumns { source, .. } => datasets
                .iter()
                .find(|d| d.label() == source.as_str())
                .map(|d| {
                    let cols: Vec<&str> = d.columns().iter().map(|c| c.as_str()).collect();
                    format!("'{}' has columns: {}", source, cols.join(", "))
                }),
            _ => None,
        };
        Self { code: recon_exit_code(err.kind()), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
