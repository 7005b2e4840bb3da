// sisxml CLI - reconcile emitted NF-e XML against the system's revenue ledger

mod exit_codes;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::LevelFilter;

use sisxml_io::ReportError;
use sisxml_recon::ReconError;

use exit_codes::{
    EXIT_ERROR, EXIT_INVALID_CONFIG, EXIT_NO_DATA, EXIT_REPORT_WRITE, EXIT_SUCCESS, EXIT_USAGE,
};
use run::Pass;

/// Command-line date format for `--from` / `--to`.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Parser)]
#[command(name = "sisxml")]
#[command(about = "Reconcile emitted NF-e invoices and the revenue ledger into one Excel report")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PeriodArgs {
    /// First issuance date included (DD/MM/YYYY)
    #[arg(long, value_name = "DD/MM/YYYY", value_parser = parse_date, requires = "to")]
    from: Option<NaiveDate>,

    /// Last issuance date included (DD/MM/YYYY)
    #[arg(long, value_name = "DD/MM/YYYY", value_parser = parse_date, requires = "from")]
    to: Option<NaiveDate>,
}

#[derive(Args)]
struct OutputArgs {
    /// Report path (default: [output] path, else <Downloads>/SISTEMA_X_XML.xlsx)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoices and ledger, one workbook
    #[command(after_help = "\
Examples:
  sisxml run fechamento.toml
  sisxml run fechamento.toml --from 01/10/2025 --to 31/10/2025
  sisxml run fechamento.toml --output out/outubro.xlsx --json")]
    Run {
        /// Path to the TOML config file
        config: PathBuf,
        #[command(flatten)]
        period: PeriodArgs,
        #[command(flatten)]
        out: OutputArgs,
    },

    /// Invoice dispositions only ("Notas Fiscais" sheet)
    #[command(after_help = "\
Examples:
  sisxml invoices fechamento.toml --from 01/10/2025 --to 31/10/2025")]
    Invoices {
        config: PathBuf,
        #[command(flatten)]
        period: PeriodArgs,
        #[command(flatten)]
        out: OutputArgs,
    },

    /// Ledger enrichment only ("Faturamento Bruto" sheet)
    Ledger {
        config: PathBuf,
        #[command(flatten)]
        out: OutputArgs,
    },

    /// Check a config file without running
    Validate { config: PathBuf },
}

fn parse_date(text: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
        .map_err(|e| format!("expected DD/MM/YYYY, got '{text}': {e}"))
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  sisxml-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, period, out } => {
            run::cmd_run(config, Pass::Both, period.from.zip(period.to), out.output, out.json)
        }
        Commands::Invoices { config, period, out } => {
            run::cmd_run(config, Pass::Invoices, period.from.zip(period.to), out.output, out.json)
        }
        Commands::Ledger { config, out } => {
            run::cmd_run(config, Pass::Ledger, None, out.output, out.json)
        }
        Commands::Validate { config } => run::cmd_validate(config),
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
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INVALID_CONFIG, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let message = err.to_string();
        match err {
            ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => {
                CliError::invalid_config(message)
            }
            ReconError::NoData(_) => CliError { code: EXIT_NO_DATA, message, hint: None }
                .with_hint("check the configured folders and the --from/--to period"),
            ReconError::MissingColumn { .. } => CliError::general(message)
                .with_hint("check the ledger delimiter and that the header is the first line read"),
            _ => CliError::general(message),
        }
    }
}

impl From<ReportError> for CliError {
    fn from(err: ReportError) -> Self {
        CliError { code: EXIT_REPORT_WRITE, message: err.to_string(), hint: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_brazilian_dates() {
        assert_eq!(parse_date("01/10/2025"), Ok(NaiveDate::from_ymd_opt(2025, 10, 1).unwrap()));
        assert!(parse_date("2025-10-01").is_err());
        assert!(parse_date("31/02/2025").is_err());
    }

    #[test]
    fn recon_errors_map_to_exit_codes() {
        assert_eq!(CliError::from(ReconError::NoData("x".into())).code, EXIT_NO_DATA);
        assert_eq!(CliError::from(ReconError::ConfigParse("x".into())).code, EXIT_INVALID_CONFIG);
        assert_eq!(CliError::from(ReportError::Empty).code, EXIT_REPORT_WRITE);
    }

    #[test]
    fn long_version_names_build() {
        let text = long_version();
        assert!(text.starts_with(env!("CARGO_PKG_VERSION")));
        assert!(text.contains(&format!("({})", env!("GIT_COMMIT_HASH"))));
        assert!(text.ends_with(env!("TARGET")));
        assert!(!env!("GIT_COMMIT_HASH").is_empty());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
