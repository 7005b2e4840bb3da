use chrono::NaiveDate;
use serde::Serialize;

use crate::timestamp::IssuedAt;

/// Width of the zero-padded invoice key used in artifact filenames.
pub const INVOICE_KEY_WIDTH: usize = 8;

/// Annotation for invoices kept because their cancellation was rejected.
pub const LATE_CANCELLATION_NOTE: &str = "Cancellation Intempestivo";

/// `43` → `"00000043"`.
pub fn invoice_key(number: i64) -> String {
    format!("{number:0width$}", width = INVOICE_KEY_WIDTH)
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

/// One in-scope (sale) invoice document, normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRecord {
    /// Transaction-type tag (`natOp`).
    pub kind: String,
    /// Internal control code (`cNF`, the romaneio).
    pub control_code: i64,
    /// Invoice number (`nNF`).
    pub number: i64,
    /// Declared amount (`vNF`).
    pub amount: f64,
    /// Issuance timestamp (`dhEmi`).
    pub issued_at: IssuedAt,
}

impl InvoiceRecord {
    pub fn key(&self) -> String {
        invoice_key(self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "disposition", content = "note")]
pub enum Disposition {
    Live,
    Cancelled,
    KeptWithNote(String),
    Dropped,
}

impl Disposition {
    /// LIVE and KEPT_WITH_NOTE reach the report; the rest are excluded.
    pub fn is_reported(&self) -> bool {
        matches!(self, Self::Live | Self::KeptWithNote(_))
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            Self::KeptWithNote(note) => Some(note),
            _ => None,
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::KeptWithNote(_) => write!(f, "kept_with_note"),
            Self::Dropped => write!(f, "dropped"),
        }
    }
}

/// The artifact and rule tag that decided a disposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evidence {
    pub artifact: String,
    pub rule: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub disposition: Disposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// A report-bound invoice: LIVE, or KEPT_WITH_NOTE with its note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedInvoice {
    pub record: InvoiceRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ResolvedInvoice {
    pub fn formatted_issued_at(&self) -> String {
        self.record.issued_at.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvoiceSummary {
    /// `.xml` documents listed across all invoice locations.
    pub documents: usize,
    pub in_period: usize,
    /// Documents that produced an `InvoiceRecord`.
    pub sales: usize,
    pub included: usize,
    pub kept_with_note: usize,
    pub cancelled: usize,
    pub dropped: usize,
    pub malformed: usize,
    /// Cancellation artifacts in the event index.
    pub cancellation_artifacts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRun {
    /// Sorted ascending by invoice number.
    pub entries: Vec<ResolvedInvoice>,
    pub summary: InvoiceSummary,
    pub diagnostics: Vec<Diagnostic>,
}

impl InvoiceRun {
    pub fn total_amount(&self) -> f64 {
        self.entries.iter().map(|e| e.record.amount).sum()
    }
}

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MalformedDocument,
    MissingSource,
    CoercionFallback,
    EnrichmentUnavailable,
    LookupFailed,
}

/// Non-fatal finding threaded back to the caller instead of aborting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    /// Build the diagnostic and emit it through `log` at warn level.
    pub fn emit(kind: DiagnosticKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        let diagnostic = Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        };
        log::warn!("{}: {}", diagnostic.subject, diagnostic.message);
        diagnostic
    }
}

// ---------------------------------------------------------------------------
// Tabular input
// ---------------------------------------------------------------------------

/// Rows read from a delimited file, headers included as read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Index of the column whose trimmed, upper-cased header is `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| normalize_header(h) == name)
    }
}

pub fn normalize_header(header: &str) -> String {
    header.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The primary ledger columns kept for the report, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LedgerColumn {
    Store,
    LegalEntity,
    Group,
    ControlCode,
    InvoiceNumber,
    Date,
    Salesperson,
    ProductCode,
    ProductGroup,
    Description,
    UnitPrice,
}

impl LedgerColumn {
    pub const ALL: [LedgerColumn; 11] = [
        Self::Store,
        Self::LegalEntity,
        Self::Group,
        Self::ControlCode,
        Self::InvoiceNumber,
        Self::Date,
        Self::Salesperson,
        Self::ProductCode,
        Self::ProductGroup,
        Self::Description,
        Self::UnitPrice,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Self::Store => "LOJA",
            Self::LegalEntity => "RAZAO",
            Self::Group => "GRUPO",
            Self::ControlCode => "ROMANEIO",
            Self::InvoiceNumber => "NF-E",
            Self::Date => "DATA",
            Self::Salesperson => "VENDEDOR",
            Self::ProductCode => "CODPRODUTO",
            Self::ProductGroup => "GRUPO PRODUTO",
            Self::Description => "DESCRICAO",
            Self::UnitPrice => "PRECO VENDA",
        }
    }
}

/// Header of the derived weight column.
pub const WEIGHT_HEADER: &str = "PESO";
/// Header of the derived gross-revenue column.
pub const GROSS_REVENUE_HEADER: &str = "FAT BRUTO";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerRow {
    pub store: String,
    pub legal_entity: String,
    pub group: String,
    pub control_code: i64,
    pub invoice_number: i64,
    pub date: String,
    pub salesperson: String,
    pub product_code: i64,
    pub product_group: String,
    pub description: String,
    pub unit_price: f64,
    pub weight: f64,
    pub gross_revenue: f64,
}

/// A report cell value for one ledger column.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue<'a> {
    Text(&'a str),
    Number(f64),
}

impl LedgerRow {
    pub fn cell(&self, column: LedgerColumn) -> CellValue<'_> {
        match column {
            LedgerColumn::Store => CellValue::Text(&self.store),
            LedgerColumn::LegalEntity => CellValue::Text(&self.legal_entity),
            LedgerColumn::Group => CellValue::Text(&self.group),
            LedgerColumn::ControlCode => CellValue::Number(self.control_code as f64),
            LedgerColumn::InvoiceNumber => CellValue::Number(self.invoice_number as f64),
            LedgerColumn::Date => CellValue::Text(&self.date),
            LedgerColumn::Salesperson => CellValue::Text(&self.salesperson),
            LedgerColumn::ProductCode => CellValue::Number(self.product_code as f64),
            LedgerColumn::ProductGroup => CellValue::Text(&self.product_group),
            LedgerColumn::Description => CellValue::Text(&self.description),
            LedgerColumn::UnitPrice => CellValue::Number(self.unit_price),
        }
    }

    /// Composite history lookup key.
    pub fn history_key(&self) -> (i64, i64, i64) {
        (self.control_code, self.invoice_number, self.product_code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub control_code: i64,
    pub invoice_number: i64,
    pub product_code: i64,
    /// Movement-history code; `None` when the cell is not numeric.
    pub code: Option<i64>,
    /// `None` when the history file has no weight column.
    pub weight: Option<f64>,
}

impl HistoryRow {
    pub fn key(&self) -> (i64, i64, i64) {
        (self.control_code, self.invoice_number, self.product_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub rows_read: usize,
    pub negative_price_dropped: usize,
    pub cancelled_removed: usize,
    pub voided_removed: usize,
    pub weighted: usize,
    pub rows_out: usize,
    pub cancellations_applied: bool,
    pub history_applied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedLedger {
    /// Primary columns present in the input, in report order.
    pub columns: Vec<LedgerColumn>,
    /// Surviving rows in original read order.
    pub rows: Vec<LedgerRow>,
    pub summary: LedgerSummary,
    pub diagnostics: Vec<Diagnostic>,
}

impl EnrichedLedger {
    pub fn total_gross_revenue(&self) -> f64 {
        self.rows.iter().map(|r| r.gross_revenue).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_key_is_zero_padded() {
        assert_eq!(invoice_key(43), "00000043");
        assert_eq!(invoice_key(123456789), "123456789");
    }

    #[test]
    fn only_live_and_kept_are_reported() {
        assert!(Disposition::Live.is_reported());
        assert!(Disposition::KeptWithNote(LATE_CANCELLATION_NOTE.into()).is_reported());
        assert!(!Disposition::Cancelled.is_reported());
        assert!(!Disposition::Dropped.is_reported());
    }

    #[test]
    fn period_is_inclusive() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 10, day).unwrap();
        let period = Period::new(d(1), d(31)).unwrap();
        assert!(period.contains(d(1)));
        assert!(period.contains(d(31)));
        assert!(Period::new(d(2), d(1)).is_none());
    }

    #[test]
    fn table_column_lookup_normalizes_headers() {
        let table = Table {
            name: "t".into(),
            headers: vec![" loja ".into(), "Preco Venda".into()],
            rows: vec![],
        };
        assert_eq!(table.column("LOJA"), Some(0));
        assert_eq!(table.column("PRECO VENDA"), Some(1));
        assert_eq!(table.column("NF-E"), None);
    }
}
