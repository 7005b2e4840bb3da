//! Revenue-ledger enrichment: cancellation removal, history-driven voiding and
//! weights, gross revenue.

use std::collections::{HashMap, HashSet};

use crate::coerce::{coerce_decimal_auto, coerce_int, DecimalConvention};
use crate::config::HistoryCodes;
use crate::error::ReconError;
use crate::model::{HistoryRow, LedgerColumn, LedgerRow, LedgerSummary, Table, WEIGHT_HEADER};

const HISTORY_CONTROL: &str = "ROMANEIO";
const HISTORY_INVOICE: &str = "NOTA FISCAL";
const HISTORY_PRODUCT: &str = "PRODUTO";
const HISTORY_CODE: &str = "HISTORICO";

/// The primary ledger restricted to the known columns.
#[derive(Debug, Clone)]
pub struct PrimaryLedger {
    /// Known columns present in the input, in report order.
    pub columns: Vec<LedgerColumn>,
    pub rows: Vec<LedgerRow>,
    pub rows_read: usize,
    pub negative_price_dropped: usize,
}

/// Normalize headers, keep the known columns, coerce values, drop
/// negative-price rows.
///
/// Fails when none of the known columns is present or the price column is
/// missing.
pub fn load_primary(table: &Table, decimal: DecimalConvention) -> Result<PrimaryLedger, ReconError> {
    let present: Vec<(LedgerColumn, usize)> = LedgerColumn::ALL
        .iter()
        .filter_map(|&col| table.column(col.header()).map(|idx| (col, idx)))
        .collect();

    if present.is_empty() {
        return Err(ReconError::MissingColumn {
            table: table.name.clone(),
            column: LedgerColumn::ALL
                .iter()
                .map(|c| c.header())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }
    if !present.iter().any(|(col, _)| *col == LedgerColumn::UnitPrice) {
        return Err(ReconError::MissingColumn {
            table: table.name.clone(),
            column: LedgerColumn::UnitPrice.header().to_string(),
        });
    }

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut negative_price_dropped = 0;

    for raw in &table.rows {
        let mut row = LedgerRow::default();
        for &(col, idx) in &present {
            let text = raw.get(idx).map(|s| s.trim()).unwrap_or_default();
            match col {
                LedgerColumn::Store => row.store = text.to_string(),
                LedgerColumn::LegalEntity => row.legal_entity = text.to_string(),
                LedgerColumn::Group => row.group = text.to_string(),
                LedgerColumn::ControlCode => row.control_code = coerce_int(text),
                LedgerColumn::InvoiceNumber => row.invoice_number = coerce_int(text),
                LedgerColumn::Date => row.date = text.to_string(),
                LedgerColumn::Salesperson => row.salesperson = text.to_string(),
                LedgerColumn::ProductCode => row.product_code = coerce_int(text),
                LedgerColumn::ProductGroup => row.product_group = text.to_string(),
                LedgerColumn::Description => row.description = text.to_string(),
                LedgerColumn::UnitPrice => row.unit_price = decimal.coerce(text),
            }
        }
        if row.unit_price < 0.0 {
            negative_price_dropped += 1;
            continue;
        }
        rows.push(row);
    }

    Ok(PrimaryLedger {
        columns: present.into_iter().map(|(col, _)| col).collect(),
        rows,
        rows_read: table.rows.len(),
        negative_price_dropped,
    })
}

/// Invoice numbers from the first column; blank cells are ignored.
pub fn load_cancellations(table: &Table) -> HashSet<i64> {
    table
        .rows
        .iter()
        .filter_map(|row| row.first())
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
        .map(coerce_int)
        .collect()
}

/// History rows in read order. A missing weight column is tolerated; a missing
/// key or code column is not.
pub fn load_history(table: &Table) -> Result<Vec<HistoryRow>, ReconError> {
    let column = |name: &str| {
        table.column(name).ok_or_else(|| ReconError::MissingColumn {
            table: table.name.clone(),
            column: name.to_string(),
        })
    };
    let control = column(HISTORY_CONTROL)?;
    let invoice = column(HISTORY_INVOICE)?;
    let product = column(HISTORY_PRODUCT)?;
    let code = column(HISTORY_CODE)?;
    let weight = table.column(WEIGHT_HEADER);

    Ok(table
        .rows
        .iter()
        .map(|row| HistoryRow {
            control_code: coerce_int(cell(row, control)),
            invoice_number: coerce_int(cell(row, invoice)),
            product_code: coerce_int(cell(row, product)),
            code: parse_code(cell(row, code)),
            weight: weight.map(|idx| coerce_decimal_auto(cell(row, idx))),
        })
        .collect())
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.trim()).unwrap_or_default()
}

/// `"51"` → 51, `"51.0"` → 51, anything else → `None`.
fn parse_code(text: &str) -> Option<i64> {
    if let Ok(code) = text.parse::<i64>() {
        return Some(code);
    }
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.fract() == 0.0)
        .map(|v| v as i64)
}

/// Apply the cancellation list and the history ledger, then compute gross
/// revenue. Rows keep their read order.
pub fn enrich(
    primary: PrimaryLedger,
    cancellations: Option<&HashSet<i64>>,
    history: Option<&[HistoryRow]>,
    codes: HistoryCodes,
) -> (Vec<LedgerRow>, LedgerSummary) {
    let mut summary = LedgerSummary {
        rows_read: primary.rows_read,
        negative_price_dropped: primary.negative_price_dropped,
        cancellations_applied: cancellations.is_some(),
        history_applied: history.is_some(),
        ..LedgerSummary::default()
    };

    let mut rows = primary.rows;
    if let Some(cancelled) = cancellations {
        let before = rows.len();
        rows.retain(|row| !cancelled.contains(&row.invoice_number));
        summary.cancelled_removed = before - rows.len();
    }

    if let Some(history) = history {
        // first occurrence of each key wins
        let mut first: HashMap<(i64, i64, i64), &HistoryRow> = HashMap::with_capacity(history.len());
        for h in history {
            first.entry(h.key()).or_insert(h);
        }

        let mut voided = HashSet::new();
        for (idx, row) in rows.iter_mut().enumerate() {
            let Some(h) = first.get(&row.history_key()) else {
                continue;
            };
            match h.code {
                Some(code) if code == codes.void => {
                    voided.insert(idx);
                }
                Some(code) if code == codes.weight => {
                    if let Some(weight) = h.weight {
                        row.weight = weight;
                        summary.weighted += 1;
                    }
                }
                _ => {}
            }
        }

        summary.voided_removed = voided.len();
        rows = rows
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !voided.contains(idx))
            .map(|(_, row)| row)
            .collect();
    }

    for row in rows.iter_mut() {
        row.gross_revenue = row.unit_price * row.weight;
    }
    summary.rows_out = rows.len();

    log::info!(
        "ledger: {} read, {} negative, {} cancelled, {} voided, {} weighted, {} out",
        summary.rows_read,
        summary.negative_price_dropped,
        summary.cancelled_removed,
        summary.voided_removed,
        summary.weighted,
        summary.rows_out
    );
    (rows, summary)
}
