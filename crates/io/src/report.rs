//! Excel report: "Notas Fiscais" and "Faturamento Bruto".
//!
//! Each sheet is a header row, the data rows wrapped in an Excel table, then a
//! bold TOTAL row. The workbook is built in memory and renamed into place so a
//! failed run never leaves a half-written file behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Table, TableColumn, TableStyle, Workbook, Worksheet, XlsxError};
use thiserror::Error;

use sisxml_recon::model::{CellValue, EnrichedLedger, InvoiceRun, GROSS_REVENUE_HEADER, WEIGHT_HEADER};

pub const INVOICE_SHEET: &str = "Notas Fiscais";
pub const LEDGER_SHEET: &str = "Faturamento Bruto";
const INVOICE_TABLE: &str = "TabelaNotasFiscais";
const LEDGER_TABLE: &str = "TabelaFaturamento";
const TOTAL_LABEL: &str = "TOTAL";

const INVOICE_HEADERS: [&str; 5] = ["CF", "Romaneio", "NF-E", "Valor XML", "DATA"];
const NOTE_HEADER: &str = "OBS";
const INVOICE_AMOUNT_COL: u16 = 3;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to build workbook: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("nothing to write: no invoice or ledger data")]
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStats {
    pub sheets: usize,
    pub invoice_rows: usize,
    pub ledger_rows: usize,
}

/// A cell as written: text or number, and its display width.
enum Cell<'a> {
    Text(&'a str),
    Number(f64),
}

impl Cell<'_> {
    fn width(&self) -> usize {
        match self {
            Cell::Text(s) => s.chars().count(),
            Cell::Number(n) => format!("{n}").len(),
        }
    }
}

/// Column widths: longest value (header included) plus two.
struct Widths(Vec<usize>);

impl Widths {
    fn new(headers: &[&str]) -> Self {
        Self(headers.iter().map(|h| h.chars().count()).collect())
    }

    fn observe(&mut self, col: usize, cell: &Cell<'_>) {
        if let Some(w) = self.0.get_mut(col) {
            *w = (*w).max(cell.width());
        }
    }

    fn apply(&self, sheet: &mut Worksheet) -> Result<(), XlsxError> {
        for (col, width) in self.0.iter().enumerate() {
            sheet.set_column_width(col as u16, (*width + 2) as f64)?;
        }
        Ok(())
    }
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, cell: &Cell<'_>) -> Result<(), XlsxError> {
    match cell {
        Cell::Text(s) => sheet.write_string(row, col, *s)?,
        Cell::Number(n) => sheet.write_number(row, col, *n)?,
    };
    Ok(())
}

fn write_headers(sheet: &mut Worksheet, headers: &[&str]) -> Result<(), XlsxError> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    Ok(())
}

/// Table over header + data rows; skipped when there are no data rows.
fn add_table(sheet: &mut Worksheet, name: &str, headers: &[&str], data_rows: usize) -> Result<(), XlsxError> {
    if data_rows == 0 {
        return Ok(());
    }
    let columns: Vec<TableColumn> = headers
        .iter()
        .map(|h| TableColumn::new().set_header(*h))
        .collect();
    let table = Table::new()
        .set_name(name)
        .set_style(TableStyle::Medium9)
        .set_columns(&columns);
    sheet.add_table(0, 0, data_rows as u32, (headers.len() - 1) as u16, &table)?;
    Ok(())
}

fn write_total(
    sheet: &mut Worksheet,
    row: u32,
    total_col: u16,
    total: f64,
    bold: &Format,
) -> Result<(), XlsxError> {
    sheet.write_string_with_format(row, 0, TOTAL_LABEL, bold)?;
    sheet.write_number_with_format(row, total_col, total, bold)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Sheets
// ---------------------------------------------------------------------------

fn invoice_sheet(workbook: &mut Workbook, run: &InvoiceRun, bold: &Format) -> Result<usize, XlsxError> {
    let with_notes = run.entries.iter().any(|e| e.note.is_some());
    let mut headers: Vec<&str> = INVOICE_HEADERS.to_vec();
    if with_notes {
        headers.push(NOTE_HEADER);
    }

    let sheet = workbook.add_worksheet().set_name(INVOICE_SHEET)?;
    write_headers(sheet, &headers)?;
    let mut widths = Widths::new(&headers);

    for (idx, entry) in run.entries.iter().enumerate() {
        let row = idx as u32 + 1;
        let issued = entry.formatted_issued_at();
        let mut cells = vec![
            Cell::Text(&entry.record.kind),
            Cell::Number(entry.record.control_code as f64),
            Cell::Number(entry.record.number as f64),
            Cell::Number(entry.record.amount),
            Cell::Text(&issued),
        ];
        if with_notes {
            cells.push(Cell::Text(entry.note.as_deref().unwrap_or_default()));
        }
        for (col, cell) in cells.iter().enumerate() {
            write_cell(sheet, row, col as u16, cell)?;
            widths.observe(col, cell);
        }
    }

    let total_row = run.entries.len() as u32 + 1;
    let total = run.total_amount();
    write_total(sheet, total_row, INVOICE_AMOUNT_COL, total, bold)?;
    widths.observe(0, &Cell::Text(TOTAL_LABEL));
    widths.observe(INVOICE_AMOUNT_COL as usize, &Cell::Number(total));

    add_table(sheet, INVOICE_TABLE, &headers, run.entries.len())?;
    widths.apply(sheet)?;
    Ok(run.entries.len())
}

fn ledger_sheet(workbook: &mut Workbook, ledger: &EnrichedLedger, bold: &Format) -> Result<usize, XlsxError> {
    let mut headers: Vec<&str> = ledger.columns.iter().map(|c| c.header()).collect();
    headers.push(WEIGHT_HEADER);
    headers.push(GROSS_REVENUE_HEADER);
    let weight_col = ledger.columns.len();
    let gross_col = weight_col + 1;

    let sheet = workbook.add_worksheet().set_name(LEDGER_SHEET)?;
    write_headers(sheet, &headers)?;
    let mut widths = Widths::new(&headers);

    for (idx, ledger_row) in ledger.rows.iter().enumerate() {
        let row = idx as u32 + 1;
        let mut cells: Vec<Cell<'_>> = ledger
            .columns
            .iter()
            .map(|&col| match ledger_row.cell(col) {
                CellValue::Text(s) => Cell::Text(s),
                CellValue::Number(n) => Cell::Number(n),
            })
            .collect();
        cells.push(Cell::Number(ledger_row.weight));
        cells.push(Cell::Number(ledger_row.gross_revenue));
        for (col, cell) in cells.iter().enumerate() {
            write_cell(sheet, row, col as u16, cell)?;
            widths.observe(col, cell);
        }
    }

    let total_row = ledger.rows.len() as u32 + 1;
    let total = ledger.total_gross_revenue();
    write_total(sheet, total_row, gross_col as u16, total, bold)?;
    widths.observe(0, &Cell::Text(TOTAL_LABEL));
    widths.observe(gross_col, &Cell::Number(total));

    add_table(sheet, LEDGER_TABLE, &headers, ledger.rows.len())?;
    widths.apply(sheet)?;
    Ok(ledger.rows.len())
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

/// Write whichever datasets are present; a sheet is omitted when its dataset
/// is absent.
pub fn write_report(
    path: &Path,
    invoices: Option<&InvoiceRun>,
    ledger: Option<&EnrichedLedger>,
) -> Result<ReportStats, ReportError> {
    if invoices.is_none() && ledger.is_none() {
        return Err(ReportError::Empty);
    }

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let mut stats = ReportStats::default();

    if let Some(run) = invoices {
        stats.invoice_rows = invoice_sheet(&mut workbook, run, &bold)?;
        stats.sheets += 1;
    }
    if let Some(ledger) = ledger {
        stats.ledger_rows = ledger_sheet(&mut workbook, ledger, &bold)?;
        stats.sheets += 1;
    }

    let buffer = workbook.save_to_buffer()?;
    persist_atomically(path, &buffer)?;

    log::info!(
        "report written to {} ({} invoice row(s), {} ledger row(s))",
        path.display(),
        stats.invoice_rows,
        stats.ledger_rows
    );
    Ok(stats)
}

/// Temp file in the destination directory, renamed over `path` on success.
fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
