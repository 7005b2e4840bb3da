use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::coerce::DecimalConvention;
use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub invoices: Option<InvoiceConfig>,
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoiceConfig {
    /// Locations holding the emitted invoice XML documents.
    pub xml_dirs: Vec<PathBuf>,
    /// Locations holding cancellation-confirmation artifacts.
    #[serde(default)]
    pub event_dirs: Vec<PathBuf>,
    /// Locations holding clearinghouse rejection logs.
    #[serde(default)]
    pub rejection_dirs: Vec<PathBuf>,
    /// Locations holding voiding declarations. Defaults to `event_dirs`.
    #[serde(default)]
    pub voiding_dirs: Option<Vec<PathBuf>>,
    #[serde(default = "default_sale_marker")]
    pub sale_marker: String,
    #[serde(default = "default_cancellation_extension")]
    pub cancellation_extension: String,
    #[serde(default = "default_rejection_extension")]
    pub rejection_extension: String,
    #[serde(default = "default_voiding_extension")]
    pub voiding_extension: String,
    /// Bytes read when sniffing the issuance date ahead of a full parse.
    #[serde(default = "default_date_prefix_bytes")]
    pub date_prefix_bytes: usize,
}

fn default_sale_marker() -> String {
    "VENDA".into()
}

fn default_cancellation_extension() -> String {
    "can".into()
}

fn default_rejection_extension() -> String {
    "txt".into()
}

fn default_voiding_extension() -> String {
    "inu".into()
}

fn default_date_prefix_bytes() -> usize {
    8192
}

impl InvoiceConfig {
    /// Config with every optional field at its default.
    pub fn new(xml_dirs: Vec<PathBuf>) -> Self {
        Self {
            xml_dirs,
            event_dirs: Vec::new(),
            rejection_dirs: Vec::new(),
            voiding_dirs: None,
            sale_marker: default_sale_marker(),
            cancellation_extension: default_cancellation_extension(),
            rejection_extension: default_rejection_extension(),
            voiding_extension: default_voiding_extension(),
            date_prefix_bytes: default_date_prefix_bytes(),
        }
    }

    pub fn voiding_dirs(&self) -> &[PathBuf] {
        self.voiding_dirs.as_deref().unwrap_or(&self.event_dirs)
    }

    fn validate(&self) -> Result<(), ReconError> {
        if self.xml_dirs.is_empty() {
            return Err(ReconError::ConfigValidation(
                "[invoices] needs at least one entry in xml_dirs".into(),
            ));
        }
        if self.sale_marker.trim().is_empty() {
            return Err(ReconError::ConfigValidation("sale_marker must not be empty".into()));
        }
        for (field, ext) in [
            ("cancellation_extension", &self.cancellation_extension),
            ("rejection_extension", &self.rejection_extension),
            ("voiding_extension", &self.voiding_extension),
        ] {
            if ext.trim_start_matches('.').is_empty() {
                return Err(ReconError::ConfigValidation(format!("{field} must not be empty")));
            }
            if glob::Pattern::escape(ext) != *ext {
                return Err(ReconError::ConfigValidation(format!(
                    "{field} must not contain glob metacharacters, got '{ext}'"
                )));
            }
        }
        if self.date_prefix_bytes < 64 {
            return Err(ReconError::ConfigValidation(format!(
                "date_prefix_bytes must be at least 64, got {}",
                self.date_prefix_bytes
            )));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        for dir in self
            .xml_dirs
            .iter_mut()
            .chain(self.event_dirs.iter_mut())
            .chain(self.rejection_dirs.iter_mut())
        {
            *dir = base.join(&*dir);
        }
        if let Some(dirs) = self.voiding_dirs.as_mut() {
            for dir in dirs.iter_mut() {
                *dir = base.join(&*dir);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Primary revenue ledger (closing export).
    pub primary: PathBuf,
    /// Cancelled-invoice list; optional enrichment.
    #[serde(default)]
    pub cancellations: Option<PathBuf>,
    /// Historical movement ledger; optional enrichment.
    #[serde(default)]
    pub history: Option<PathBuf>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Decimal convention of the primary ledger's price column.
    #[serde(default)]
    pub decimal: DecimalConvention,
    /// Lines preceding the cancellation list's header line.
    #[serde(default = "default_cancellation_skip_lines")]
    pub cancellation_skip_lines: usize,
    #[serde(default)]
    pub codes: HistoryCodes,
}

fn default_delimiter() -> char {
    ';'
}

fn default_cancellation_skip_lines() -> usize {
    2
}

/// Movement-history codes the enricher acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryCodes {
    /// Ledger line was voided; drop it.
    #[serde(default = "default_void_code")]
    pub void: i64,
    /// Movement carries the weight to copy onto the ledger line.
    #[serde(default = "default_weight_code")]
    pub weight: i64,
}

fn default_void_code() -> i64 {
    68
}

fn default_weight_code() -> i64 {
    51
}

impl Default for HistoryCodes {
    fn default() -> Self {
        Self {
            void: default_void_code(),
            weight: default_weight_code(),
        }
    }
}

impl LedgerConfig {
    pub fn new(primary: PathBuf) -> Self {
        Self {
            primary,
            cancellations: None,
            history: None,
            delimiter: default_delimiter(),
            decimal: DecimalConvention::default(),
            cancellation_skip_lines: default_cancellation_skip_lines(),
            codes: HistoryCodes::default(),
        }
    }

    /// Delimiter as the single byte the CSV reader wants.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    fn validate(&self) -> Result<(), ReconError> {
        if !self.delimiter.is_ascii() || self.delimiter.is_ascii_alphanumeric() {
            return Err(ReconError::ConfigValidation(format!(
                "delimiter must be a single ASCII punctuation or whitespace character, got '{}'",
                self.delimiter
            )));
        }
        if self.codes.void == self.codes.weight {
            return Err(ReconError::ConfigValidation(format!(
                "void and weight history codes must differ, both are {}",
                self.codes.void
            )));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        self.primary = base.join(&self.primary);
        if let Some(p) = self.cancellations.as_mut() {
            *p = base.join(&*p);
        }
        if let Some(p) = self.history.as_mut() {
            *p = base.join(&*p);
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Report path; the CLI falls back to the user's download directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Report file name used when no path is configured.
pub const DEFAULT_REPORT_NAME: &str = "SISTEMA_X_XML.xlsx";

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RunConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: RunConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.invoices.is_none() && self.ledger.is_none() {
            return Err(ReconError::ConfigValidation(
                "at least one of [invoices] or [ledger] is required".into(),
            ));
        }
        if let Some(ref invoices) = self.invoices {
            invoices.validate()?;
        }
        if let Some(ref ledger) = self.ledger {
            ledger.validate()?;
        }
        Ok(())
    }

    /// Resolve every relative path against `base` (the config file's directory).
    /// Absolute paths are left alone.
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(ref mut invoices) = self.invoices {
            invoices.resolve_paths(base);
        }
        if let Some(ref mut ledger) = self.ledger {
            ledger.resolve_paths(base);
        }
        if let Some(ref mut path) = self.output.path {
            *path = base.join(&*path);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[invoices]
xml_dirs       = ["nfe/enviado", "nfe2/enviado"]
event_dirs     = ["nfe/eventos", "nfe2/eventos"]
rejection_dirs = ["nfe/recusado"]

[ledger]
primary = "excel/fechamento.csv"
cancellations = "arquivos/can.csv"
history = "excel/historico.csv"

[output]
path = "out/report.xlsx"
"#;

    #[test]
    fn parse_full_with_defaults() {
        let config = RunConfig::from_toml(FULL).unwrap();
        let inv = config.invoices.as_ref().unwrap();
        assert_eq!(inv.xml_dirs.len(), 2);
        assert_eq!(inv.sale_marker, "VENDA");
        assert_eq!(inv.cancellation_extension, "can");
        assert_eq!(inv.date_prefix_bytes, 8192);
        // voiding defaults to the event locations
        assert_eq!(inv.voiding_dirs(), inv.event_dirs.as_slice());

        let ledger = config.ledger.as_ref().unwrap();
        assert_eq!(ledger.delimiter, ';');
        assert_eq!(ledger.decimal, DecimalConvention::Comma);
        assert_eq!(ledger.cancellation_skip_lines, 2);
        assert_eq!(ledger.codes, HistoryCodes { void: 68, weight: 51 });
    }

    #[test]
    fn resolve_paths_against_base() {
        let mut config = RunConfig::from_toml(FULL).unwrap();
        config.resolve_paths(Path::new("/data"));
        let inv = config.invoices.unwrap();
        assert_eq!(inv.xml_dirs[0], PathBuf::from("/data/nfe/enviado"));
        assert_eq!(inv.rejection_dirs[0], PathBuf::from("/data/nfe/recusado"));
        let ledger = config.ledger.unwrap();
        assert_eq!(ledger.history.unwrap(), PathBuf::from("/data/excel/historico.csv"));
        assert_eq!(config.output.path.unwrap(), PathBuf::from("/data/out/report.xlsx"));
    }

    #[test]
    fn ledger_only_is_valid() {
        let config = RunConfig::from_toml(
            r#"
[ledger]
primary = "f.csv"
decimal = "auto"
[ledger.codes]
void = 70
"#,
        )
        .unwrap();
        assert!(config.invoices.is_none());
        let ledger = config.ledger.unwrap();
        assert_eq!(ledger.decimal, DecimalConvention::Auto);
        assert_eq!(ledger.codes.void, 70);
        assert_eq!(ledger.codes.weight, 51);
    }

    #[test]
    fn reject_empty_config() {
        let err = RunConfig::from_toml("").unwrap_err();
        assert!(err.to_string().contains("at least one of"));
    }

    #[test]
    fn reject_empty_xml_dirs() {
        let err = RunConfig::from_toml("[invoices]\nxml_dirs = []\n").unwrap_err();
        assert!(err.to_string().contains("xml_dirs"));
    }

    #[test]
    fn reject_equal_codes() {
        let err = RunConfig::from_toml(
            "[ledger]\nprimary = \"f.csv\"\n[ledger.codes]\nvoid = 51\nweight = 51\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn reject_alphanumeric_delimiter() {
        let err =
            RunConfig::from_toml("[ledger]\nprimary = \"f.csv\"\ndelimiter = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("delimiter"));
    }

    #[test]
    fn reject_glob_in_extension() {
        let err = RunConfig::from_toml(
            "[invoices]\nxml_dirs = [\"x\"]\nrejection_extension = \"t*t\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("glob"));
    }

    #[test]
    fn reject_unknown_field() {
        let err = RunConfig::from_toml("[invoices]\nxml_dirs = [\"x\"]\nxml_dir = \"y\"\n");
        assert!(err.is_err(), "typo in field name should fail deserialization");
    }
}
