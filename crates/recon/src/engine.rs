use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::{InvoiceConfig, LedgerConfig};
use crate::error::ReconError;
use crate::events::EventIndex;
use crate::extract::{sniff_issue_date, Extractor};
use crate::ledger::{enrich, load_cancellations, load_history, load_primary};
use crate::model::{
    Diagnostic, DiagnosticKind, Disposition, EnrichedLedger, InvoiceRun, InvoiceSummary, Period,
    ResolvedInvoice, Table,
};
use crate::resolve::DispositionResolver;
use crate::source::Sources;

const DOCUMENT_EXTENSION: &str = ".xml";

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

/// Extract, resolve and collect the reportable invoices.
///
/// The event index is complete before the first resolution. Entries come back
/// sorted by invoice number; documents sharing a number keep traversal order.
pub fn run_invoices(
    config: &InvoiceConfig,
    period: Option<Period>,
    sources: Sources<'_>,
) -> Result<InvoiceRun, ReconError> {
    let mut diagnostics = Vec::new();
    let mut summary = InvoiceSummary::default();

    let xml_dirs: Vec<&PathBuf> = config
        .xml_dirs
        .iter()
        .filter(|dir| {
            let exists = sources.documents.exists(dir);
            if !exists {
                diagnostics.push(missing(dir, "invoice location"));
            }
            exists
        })
        .collect();
    if xml_dirs.is_empty() {
        return Err(ReconError::NoData(
            "none of the configured invoice locations exist".into(),
        ));
    }

    let (index, index_diagnostics) =
        EventIndex::build(sources.documents, &config.event_dirs, &config.cancellation_extension);
    diagnostics.extend(index_diagnostics);
    summary.cancellation_artifacts = index.len();
    report_missing_logs(config, sources, &mut diagnostics);

    let extractor = Extractor::new(config.sale_marker.clone());
    let resolver = DispositionResolver::new(&index, sources, config);
    let mut entries = Vec::new();

    for dir in xml_dirs {
        let mut names = match sources.documents.list(dir) {
            Ok(names) => names,
            Err(err) => {
                diagnostics.push(Diagnostic::emit(
                    DiagnosticKind::LookupFailed,
                    dir.display().to_string(),
                    format!("invoice location skipped: {err}"),
                ));
                continue;
            }
        };
        names.retain(|name| name.to_lowercase().ends_with(DOCUMENT_EXTENSION));
        names.sort();
        summary.documents += names.len();

        for name in names {
            let subject = dir.join(&name).display().to_string();

            let sniffed = match period {
                Some(p) => match sniff(config, sources, dir, &name) {
                    Some(date) if !p.contains(date) => {
                        log::debug!("{subject}: issued {date}, outside period");
                        continue;
                    }
                    found => found,
                },
                None => None,
            };

            let text = match sources.read_text(dir, &name) {
                Ok(text) => text,
                Err(err) => {
                    summary.malformed += 1;
                    diagnostics.push(Diagnostic::emit(
                        DiagnosticKind::MalformedDocument,
                        subject,
                        err.to_string(),
                    ));
                    continue;
                }
            };

            let record = match extractor.extract_checked(&name, &text) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    if period.is_none() || sniffed.is_some() {
                        summary.in_period += 1;
                    }
                    log::debug!("{subject}: not a sale, skipped");
                    continue;
                }
                Err(err) => {
                    if period.is_none() || sniffed.is_some() {
                        summary.in_period += 1;
                    }
                    summary.malformed += 1;
                    diagnostics.push(Diagnostic::emit(
                        DiagnosticKind::MalformedDocument,
                        subject,
                        err.to_string(),
                    ));
                    continue;
                }
            };

            if let Some(p) = period {
                if sniffed.is_none() {
                    // prefix did not settle it; the full parse decides
                    match record.issued_at.date() {
                        Some(date) if p.contains(date) => {}
                        Some(_) => continue,
                        None => {
                            diagnostics.push(Diagnostic::emit(
                                DiagnosticKind::CoercionFallback,
                                subject,
                                format!(
                                    "issuance date '{}' undeterminable, excluded from period",
                                    record.issued_at
                                ),
                            ));
                            continue;
                        }
                    }
                }
            }
            summary.in_period += 1;

            if record.issued_at.is_fallback() {
                diagnostics.push(Diagnostic::emit(
                    DiagnosticKind::CoercionFallback,
                    subject.as_str(),
                    format!("issuance timestamp '{}' kept as text", record.issued_at),
                ));
            }
            summary.sales += 1;

            let resolution = resolver.resolve(&record);
            diagnostics.extend(resolution.diagnostics);
            match resolution.disposition {
                Disposition::Live => {
                    summary.included += 1;
                    entries.push(ResolvedInvoice { record, note: None });
                }
                Disposition::KeptWithNote(note) => {
                    summary.included += 1;
                    summary.kept_with_note += 1;
                    entries.push(ResolvedInvoice {
                        record,
                        note: Some(note),
                    });
                }
                Disposition::Cancelled => summary.cancelled += 1,
                Disposition::Dropped => summary.dropped += 1,
            }
        }
    }

    if summary.in_period == 0 {
        return Err(ReconError::NoData(match period {
            Some(p) => format!(
                "no invoice documents issued between {} and {}",
                p.start.format("%d/%m/%Y"),
                p.end.format("%d/%m/%Y")
            ),
            None => "no invoice documents found".into(),
        }));
    }

    if entries.is_empty() {
        return Err(ReconError::NoData(format!(
            "{} invoice document(s) read, none reportable",
            summary.in_period
        )));
    }

    entries.sort_by_key(|e| e.record.number);

    log::info!(
        "invoices: {} documents, {} in period, {} sales, {} included ({} with note), {} cancelled, {} dropped, {} malformed",
        summary.documents,
        summary.in_period,
        summary.sales,
        summary.included,
        summary.kept_with_note,
        summary.cancelled,
        summary.dropped,
        summary.malformed
    );

    Ok(InvoiceRun {
        entries,
        summary,
        diagnostics,
    })
}

fn sniff(config: &InvoiceConfig, sources: Sources<'_>, dir: &Path, name: &str) -> Option<chrono::NaiveDate> {
    let prefix = sources
        .documents
        .read_prefix(dir, name, config.date_prefix_bytes)
        .ok()?;
    sniff_issue_date(&sources.decoder.decode(&prefix))
}

/// Rejection and voiding locations that are absent. Event locations already
/// reported by the index build are not repeated.
fn report_missing_logs(config: &InvoiceConfig, sources: Sources<'_>, diagnostics: &mut Vec<Diagnostic>) {
    let mut seen: HashSet<&PathBuf> = config.event_dirs.iter().collect();
    for dir in config.rejection_dirs.iter().chain(config.voiding_dirs()) {
        if seen.insert(dir) && !sources.documents.exists(dir) {
            diagnostics.push(missing(dir, "log location"));
        }
    }
}

fn missing(dir: &Path, what: &str) -> Diagnostic {
    Diagnostic::emit(
        DiagnosticKind::MissingSource,
        dir.display().to_string(),
        format!("{what} not found, skipped"),
    )
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Enrich the primary ledger with whichever optional tables loaded.
///
/// `None` means the table is not configured; `Some(Err(_))` means it is
/// configured but could not be read, which is reported and tolerated.
pub fn run_ledger(
    config: &LedgerConfig,
    primary: Result<Table, ReconError>,
    cancellations: Option<Result<Table, ReconError>>,
    history: Option<Result<Table, ReconError>>,
) -> Result<EnrichedLedger, ReconError> {
    let primary = primary.map_err(|err| match err {
        ReconError::MissingSource(path) => {
            ReconError::NoData(format!("primary ledger {} not found", path.display()))
        }
        other => other,
    })?;
    if primary.rows.is_empty() {
        return Err(ReconError::NoData(format!("primary ledger {} has no rows", primary.name)));
    }
    let primary = load_primary(&primary, config.decimal)?;
    let columns = primary.columns.clone();
    let mut diagnostics = Vec::new();

    let cancelled = match cancellations {
        Some(Ok(table)) => Some(load_cancellations(&table)),
        Some(Err(err)) => {
            diagnostics.push(unavailable("cancellation list", &err));
            None
        }
        None => None,
    };

    let history = match history {
        Some(Ok(table)) => match load_history(&table) {
            Ok(rows) => Some(rows),
            Err(err) => {
                diagnostics.push(unavailable("history ledger", &err));
                None
            }
        },
        Some(Err(err)) => {
            diagnostics.push(unavailable("history ledger", &err));
            None
        }
        None => None,
    };
    if history.is_none() {
        log::info!("ledger: no history applied, every weight is 0");
    }

    let (rows, summary) = enrich(primary, cancelled.as_ref(), history.as_deref(), config.codes);

    Ok(EnrichedLedger {
        columns,
        rows,
        summary,
        diagnostics,
    })
}

fn unavailable(what: &str, err: &ReconError) -> Diagnostic {
    Diagnostic::emit(
        DiagnosticKind::EnrichmentUnavailable,
        what,
        format!("skipped: {err}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{LossyUtf8, MemorySource};
    use chrono::NaiveDate;

    fn doc(number: u32, issued: &str, kind: &str) -> Vec<u8> {
        format!(
            "<nfeProc><NFe><infNFe><ide><cNF>7</cNF><natOp>{kind}</natOp><nNF>{number}</nNF>\
             <dhEmi>{issued}</dhEmi></ide><total><ICMSTot><vNF>10,00</vNF></ICMSTot></total>\
             </infNFe></NFe></nfeProc>"
        )
        .into_bytes()
    }

    fn config() -> InvoiceConfig {
        let mut config = InvoiceConfig::new(vec![PathBuf::from("xml")]);
        config.event_dirs = vec![PathBuf::from("ev")];
        config.rejection_dirs = vec![PathBuf::from("rej")];
        config
    }

    fn october() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn entries_sorted_and_counted() {
        let source = MemorySource::new()
            .with_file("xml", "a.xml", doc(50, "2025-10-02T10:00:00-03:00", "VENDA"))
            .with_file("xml", "b.xml", doc(41, "2025-10-03T10:00:00-03:00", "VENDA"))
            .with_file("xml", "c.xml", doc(60, "2025-10-03T10:00:00-03:00", "DEVOLUCAO"))
            .with_file("xml", "d.xml", b"<broken>".to_vec())
            .with_file("xml", "notes.txt", b"".to_vec())
            .with_file("ev", "00000050.can", b"".to_vec())
            .with_dir("rej");
        let run = run_invoices(&config(), None, Sources::new(&source, &LossyUtf8)).unwrap();

        let numbers: Vec<i64> = run.entries.iter().map(|e| e.record.number).collect();
        assert_eq!(numbers, vec![41]);
        assert_eq!(run.summary.documents, 4);
        assert_eq!(run.summary.sales, 2);
        assert_eq!(run.summary.cancelled, 1);
        // "<broken>" lacks the sale marker, so it is simply out of scope
        assert_eq!(run.summary.malformed, 0);
    }

    #[test]
    fn period_filters_by_issuance_date() {
        let source = MemorySource::new()
            .with_file("xml", "a.xml", doc(1, "2025-09-30T23:59:59-03:00", "VENDA"))
            .with_file("xml", "b.xml", doc(2, "2025-10-01T00:00:00-03:00", "VENDA"))
            .with_file("xml", "c.xml", doc(3, "2025-10-31 23:00:00", "VENDA"))
            .with_file("xml", "d.xml", doc(4, "2025-11-01T00:00:00-03:00", "VENDA"))
            .with_dir("ev")
            .with_dir("rej");
        let run = run_invoices(&config(), Some(october()), Sources::new(&source, &LossyUtf8)).unwrap();
        let numbers: Vec<i64> = run.entries.iter().map(|e| e.record.number).collect();
        assert_eq!(numbers, vec![2, 3]);
        assert_eq!(run.summary.in_period, 2);
    }

    #[test]
    fn full_parse_decides_when_prefix_is_too_short() {
        let padded = |number: u32, issued: &str| {
            let body = String::from_utf8(doc(number, issued, "VENDA")).unwrap();
            body.replacen("<ide>", &format!("<infAdic>{}</infAdic><ide>", "x".repeat(200)), 1)
                .into_bytes()
        };
        let source = MemorySource::new()
            .with_file("xml", "a.xml", padded(1, "2025-10-05T10:00:00-03:00"))
            .with_file("xml", "b.xml", padded(2, "2025-11-05T10:00:00-03:00"))
            .with_dir("ev")
            .with_dir("rej");
        let mut config = config();
        config.date_prefix_bytes = 64;

        let run = run_invoices(&config, Some(october()), Sources::new(&source, &LossyUtf8)).unwrap();
        let numbers: Vec<i64> = run.entries.iter().map(|e| e.record.number).collect();
        assert_eq!(numbers, vec![1]);
        assert_eq!(run.summary.in_period, 1);
        assert!(run.diagnostics.iter().all(|d| d.kind != DiagnosticKind::CoercionFallback));
    }

    #[test]
    fn no_reportable_invoice_is_no_data() {
        let source = MemorySource::new()
            .with_file("xml", "a.xml", doc(1, "2025-10-02T10:00:00-03:00", "DEVOLUCAO"))
            .with_file("xml", "b.xml", doc(2, "2025-10-03T10:00:00-03:00", "VENDA"))
            .with_file("ev", "00000002.can", b"".to_vec())
            .with_dir("rej");
        let err = run_invoices(&config(), Some(october()), Sources::new(&source, &LossyUtf8)).unwrap_err();
        assert!(matches!(err, ReconError::NoData(_)));
        assert!(err.to_string().contains("none reportable"));
    }

    #[test]
    fn undeterminable_date_is_excluded_from_period_run() {
        let source = MemorySource::new()
            .with_file("xml", "a.xml", doc(1, "ontem", "VENDA"))
            .with_file("xml", "b.xml", doc(2, "2025-10-05T00:00:00-03:00", "VENDA"))
            .with_dir("ev")
            .with_dir("rej");
        let run = run_invoices(&config(), Some(october()), Sources::new(&source, &LossyUtf8)).unwrap();
        assert_eq!(run.entries.len(), 1);
        assert!(run
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::CoercionFallback && d.subject.ends_with("a.xml")));

        // without a period it is kept, text and all
        let run = run_invoices(&config(), None, Sources::new(&source, &LossyUtf8)).unwrap();
        assert_eq!(run.entries.len(), 2);
        assert_eq!(run.entries[0].formatted_issued_at(), "ontem");
    }

    #[test]
    fn nothing_in_period_is_no_data() {
        let source = MemorySource::new()
            .with_file("xml", "a.xml", doc(1, "2025-09-30T10:00:00-03:00", "VENDA"))
            .with_dir("ev")
            .with_dir("rej");
        let err = run_invoices(&config(), Some(october()), Sources::new(&source, &LossyUtf8)).unwrap_err();
        assert!(matches!(err, ReconError::NoData(_)));
    }

    #[test]
    fn missing_invoice_locations_is_no_data() {
        let source = MemorySource::new();
        let err = run_invoices(&config(), None, Sources::new(&source, &LossyUtf8)).unwrap_err();
        assert!(err.to_string().contains("invoice locations"));
    }

    #[test]
    fn missing_secondary_locations_are_diagnosed_once() {
        let source = MemorySource::new().with_file("xml", "a.xml", doc(1, "2025-10-01 10:00:00", "VENDA"));
        let run = run_invoices(&config(), None, Sources::new(&source, &LossyUtf8)).unwrap();
        let missing: Vec<&str> = run
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::MissingSource)
            .map(|d| d.subject.as_str())
            .collect();
        assert_eq!(missing, vec!["ev", "rej"]);
        assert_eq!(run.entries.len(), 1);
    }

    #[test]
    fn ledger_missing_primary_is_no_data() {
        let config = LedgerConfig::new(PathBuf::from("f.csv"));
        let err = run_ledger(&config, Err(ReconError::MissingSource("f.csv".into())), None, None)
            .unwrap_err();
        assert!(matches!(err, ReconError::NoData(_)));
    }

    #[test]
    fn ledger_header_only_is_no_data() {
        let config = LedgerConfig::new(PathBuf::from("f.csv"));
        let primary = Table {
            name: "f.csv".into(),
            headers: vec!["NF-E".into(), "PRECO VENDA".into()],
            rows: vec![],
        };
        let err = run_ledger(&config, Ok(primary), None, None).unwrap_err();
        assert!(matches!(err, ReconError::NoData(_)));
    }

    #[test]
    fn ledger_optional_tables_degrade() {
        let config = LedgerConfig::new(PathBuf::from("f.csv"));
        let primary = Table {
            name: "f.csv".into(),
            headers: vec!["NF-E".into(), "PRECO VENDA".into()],
            rows: vec![vec!["1".into(), "2,50".into()]],
        };
        let history = Table {
            name: "h.csv".into(),
            headers: vec!["X".into()],
            rows: vec![],
        };
        let ledger = run_ledger(
            &config,
            Ok(primary),
            Some(Err(ReconError::MissingSource("can.csv".into()))),
            Some(Ok(history)),
        )
        .unwrap();
        assert_eq!(ledger.rows.len(), 1);
        assert_eq!(ledger.rows[0].gross_revenue, 0.0);
        assert_eq!(ledger.diagnostics.len(), 2);
        assert!(ledger
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::EnrichmentUnavailable));
        assert!(!ledger.summary.history_applied);
    }
}
