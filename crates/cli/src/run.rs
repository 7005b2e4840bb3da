//! `sisxml run | invoices | ledger | validate`

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::json;

use sisxml_io::csv::read_table;
use sisxml_io::{write_report, FsSource, SniffingDecoder};
use sisxml_recon::config::DEFAULT_REPORT_NAME;
use sisxml_recon::source::DirectoryListing;
use sisxml_recon::{
    run_invoices, run_ledger, EnrichedLedger, InvoiceConfig, InvoiceRun, LedgerConfig, Period,
    ReconError, RunConfig, Sources,
};

use crate::{CliError, DATE_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Invoices,
    Ledger,
    Both,
}

/// Read, parse and validate the config; relative paths resolve against the
/// config file's directory.
fn load_config(config_path: &Path) -> Result<RunConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        CliError::invalid_config(format!("cannot read config {}: {e}", config_path.display()))
    })?;
    let mut config = RunConfig::from_toml(&config_str)?;
    let base_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base_dir);
    Ok(config)
}

/// `--output`, else `[output] path`, else the user's download folder.
fn report_path(cli_output: Option<PathBuf>, config: &RunConfig) -> PathBuf {
    cli_output
        .or_else(|| config.output.path.clone())
        .unwrap_or_else(|| {
            dirs::download_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_REPORT_NAME)
        })
}

fn run_invoice_pass(config: &InvoiceConfig, period: Option<Period>) -> Result<InvoiceRun, ReconError> {
    let source = FsSource;
    let decoder = SniffingDecoder;
    run_invoices(config, period, Sources::new(&source, &decoder))
}

fn run_ledger_pass(config: &LedgerConfig) -> Result<EnrichedLedger, ReconError> {
    let delimiter = config.delimiter_byte();
    let primary = read_table(&config.primary, delimiter, 0, &SniffingDecoder);
    let cancellations = config
        .cancellations
        .as_ref()
        .map(|path| read_table(path, delimiter, config.cancellation_skip_lines, &SniffingDecoder));
    let history = config
        .history
        .as_ref()
        .map(|path| read_table(path, delimiter, 0, &SniffingDecoder));
    run_ledger(config, primary, cancellations, history)
}

pub fn cmd_run(
    config_path: PathBuf,
    pass: Pass,
    period: Option<(NaiveDate, NaiveDate)>,
    output: Option<PathBuf>,
    json_output: bool,
) -> Result<(), CliError> {
    let period = match period {
        Some((from, to)) => Some(Period::new(from, to).ok_or_else(|| {
            CliError::usage(format!(
                "--from {} is after --to {}",
                from.format(DATE_FORMAT),
                to.format(DATE_FORMAT)
            ))
        })?),
        None => None,
    };

    let config = load_config(&config_path)?;

    let want_invoices = matches!(pass, Pass::Invoices | Pass::Both);
    let want_ledger = matches!(pass, Pass::Ledger | Pass::Both);
    if pass == Pass::Invoices && config.invoices.is_none() {
        return Err(CliError::invalid_config("config has no [invoices] section"));
    }
    if pass == Pass::Ledger && config.ledger.is_none() {
        return Err(CliError::invalid_config("config has no [ledger] section"));
    }

    let invoices = match (&config.invoices, want_invoices) {
        (Some(cfg), true) => Some(run_invoice_pass(cfg, period)),
        _ => None,
    };
    let ledger = match (&config.ledger, want_ledger) {
        (Some(cfg), true) => Some(run_ledger_pass(cfg)),
        _ => None,
    };

    // A combined run tolerates a failed side; the report carries the other.
    let (invoices, ledger) = if pass == Pass::Both {
        let mut skipped = Vec::new();
        let invoices = settle(invoices, "invoices", &mut skipped);
        let ledger = settle(ledger, "ledger", &mut skipped);
        if invoices.is_none() && ledger.is_none() {
            let err = skipped
                .into_iter()
                .find(|e| !matches!(e, ReconError::NoData(_)))
                .unwrap_or_else(|| {
                    ReconError::NoData("neither invoices nor ledger produced data".into())
                });
            return Err(err.into());
        }
        (invoices, ledger)
    } else {
        (invoices.transpose()?, ledger.transpose()?)
    };

    let path = report_path(output, &config);
    let stats = write_report(&path, invoices.as_ref(), ledger.as_ref())?;

    print_human_summary(invoices.as_ref(), ledger.as_ref());
    eprintln!("wrote {} ({} sheet(s))", path.display(), stats.sheets);

    if json_output {
        let summary = json!({
            "report": path.display().to_string(),
            "period": period.map(|p| json!({
                "from": p.start.format(DATE_FORMAT).to_string(),
                "to": p.end.format(DATE_FORMAT).to_string(),
            })),
            "invoices": invoices.as_ref().map(|run| json!({
                "summary": run.summary,
                "total_amount": run.total_amount(),
                "entries": run.entries,
                "diagnostics": run.diagnostics,
            })),
            "ledger": ledger.as_ref().map(|l| json!({
                "summary": l.summary,
                "total_gross_revenue": l.total_gross_revenue(),
                "diagnostics": l.diagnostics,
            })),
        });
        let json_str = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    }

    Ok(())
}

/// None for a pass that was not run or failed in a combined run; failures
/// are noted on stderr and kept in `skipped`.
fn settle<T>(result: Option<Result<T, ReconError>>, what: &str, skipped: &mut Vec<ReconError>) -> Option<T> {
    match result? {
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!("{what}: skipped, {err}");
            log::debug!("{what} pass failed: {err:?}");
            skipped.push(err);
            None
        }
    }
}

fn print_human_summary(invoices: Option<&InvoiceRun>, ledger: Option<&EnrichedLedger>) {
    if let Some(run) = invoices {
        let s = &run.summary;
        eprintln!(
            "invoices: {} documents, {} in period, {} sales: {} included ({} with note), {} cancelled, {} dropped, {} malformed",
            s.documents, s.in_period, s.sales, s.included, s.kept_with_note, s.cancelled, s.dropped, s.malformed,
        );
        eprintln!("invoices: total {:.2}", run.total_amount());
        if !run.diagnostics.is_empty() {
            eprintln!("invoices: {} diagnostic(s), run with -v for details", run.diagnostics.len());
        }
    }
    if let Some(ledger) = ledger {
        let s = &ledger.summary;
        eprintln!(
            "ledger: {} rows read, {} negative price, {} cancelled, {} voided, {} weighted, {} out",
            s.rows_read, s.negative_price_dropped, s.cancelled_removed, s.voided_removed, s.weighted, s.rows_out,
        );
        eprintln!("ledger: gross revenue {:.2}", ledger.total_gross_revenue());
        for d in &ledger.diagnostics {
            eprintln!("ledger: {}: {}", d.subject, d.message);
        }
    }
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    if let Some(ref inv) = config.invoices {
        let locations = inv
            .xml_dirs
            .iter()
            .chain(&inv.event_dirs)
            .chain(&inv.rejection_dirs)
            .chain(inv.voiding_dirs());
        for dir in locations {
            if !FsSource.exists(dir) {
                eprintln!("warning: {} does not exist", dir.display());
            }
        }
        eprintln!(
            "invoices: {} xml, {} event, {} rejection location(s)",
            inv.xml_dirs.len(),
            inv.event_dirs.len(),
            inv.rejection_dirs.len()
        );
    }
    if let Some(ref ledger) = config.ledger {
        let files = std::iter::once(&ledger.primary)
            .chain(ledger.cancellations.as_ref())
            .chain(ledger.history.as_ref());
        for file in files {
            if !file.is_file() {
                eprintln!("warning: {} does not exist", file.display());
            }
        }
        eprintln!(
            "ledger: primary {}, delimiter '{}', codes void={} weight={}",
            ledger.primary.display(),
            ledger.delimiter,
            ledger.codes.void,
            ledger.codes.weight
        );
    }

    eprintln!("{}: ok", config_path.display());
    Ok(())
}
