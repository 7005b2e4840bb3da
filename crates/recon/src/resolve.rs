//! Disposition of one invoice against the event index and the on-disk logs.
//!
//! Priority, first match wins:
//!
//! 1. voiding declaration mentioning the number → `Dropped`
//! 2. confirmed cancellation in the event index
//!    - with a rejection log mentioning the number → `KeptWithNote`
//!    - otherwise → `Cancelled`
//! 3. → `Live`
//!
//! A log that cannot be read counts as "no match" for that invoice and is
//! recorded as a `LookupFailed` diagnostic on the resolution.

use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::config::InvoiceConfig;
use crate::events::EventIndex;
use crate::model::{
    Diagnostic, DiagnosticKind, Disposition, Evidence, InvoiceRecord, Resolution,
    LATE_CANCELLATION_NOTE,
};
use crate::rules::{RejectionRule, RuleSet, VoidingRule};
use crate::source::Sources;

const CANCELLATION_RULE: &str = "cancellation_confirmed";

pub struct DispositionResolver<'a> {
    index: &'a EventIndex,
    sources: Sources<'a>,
    cancellation_extension: String,
    rejection: LogSet,
    voiding: LogSet,
}

/// Existing locations of one log kind plus the extension its artifacts carry.
struct LogSet {
    locations: Vec<PathBuf>,
    extension: String,
}

impl LogSet {
    fn new(sources: &Sources<'_>, locations: &[PathBuf], extension: &str) -> Self {
        let locations = locations
            .iter()
            .filter(|location| {
                let exists = sources.documents.exists(location);
                if !exists {
                    log::debug!("log location {} not present, skipped", location.display());
                }
                exists
            })
            .cloned()
            .collect();
        Self {
            locations,
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    fn pattern_for(&self, key: &str) -> Result<Pattern, glob::PatternError> {
        Pattern::new(&format!("*{key}*.{}", Pattern::escape(&self.extension)))
    }
}

impl<'a> DispositionResolver<'a> {
    /// Borrowing the index means it is complete before the first resolution.
    pub fn new(index: &'a EventIndex, sources: Sources<'a>, config: &InvoiceConfig) -> Self {
        Self {
            index,
            rejection: LogSet::new(&sources, &config.rejection_dirs, &config.rejection_extension),
            voiding: LogSet::new(&sources, config.voiding_dirs(), &config.voiding_extension),
            cancellation_extension: config
                .cancellation_extension
                .trim_start_matches('.')
                .to_lowercase(),
            sources,
        }
    }

    pub fn resolve(&self, record: &InvoiceRecord) -> Resolution {
        let key = record.key();
        let mut diagnostics = Vec::new();

        if let Some(evidence) = self.search::<VoidingRule>(&self.voiding, &key, &mut diagnostics) {
            log::debug!("{key}: dropped ({} in {})", evidence.rule, evidence.artifact);
            return Resolution {
                disposition: Disposition::Dropped,
                evidence: Some(evidence),
                diagnostics,
            };
        }

        if self.index.contains_cancellation(record.number) {
            if let Some(evidence) =
                self.search::<RejectionRule>(&self.rejection, &key, &mut diagnostics)
            {
                log::debug!("{key}: cancellation rejected ({})", evidence.rule);
                return Resolution {
                    disposition: Disposition::KeptWithNote(LATE_CANCELLATION_NOTE.to_string()),
                    evidence: Some(evidence),
                    diagnostics,
                };
            }
            log::debug!("{key}: cancelled");
            return Resolution {
                disposition: Disposition::Cancelled,
                evidence: Some(Evidence {
                    artifact: format!("{key}.{}", self.cancellation_extension),
                    rule: CANCELLATION_RULE.to_string(),
                }),
                diagnostics,
            };
        }

        Resolution {
            disposition: Disposition::Live,
            evidence: None,
            diagnostics,
        }
    }

    /// First artifact (locations in order, names sorted) whose text hits a rule.
    fn search<R: RuleSet>(
        &self,
        logs: &LogSet,
        key: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<Evidence> {
        let pattern = match logs.pattern_for(key) {
            Ok(p) => p,
            Err(e) => {
                diagnostics.push(Diagnostic::emit(
                    DiagnosticKind::LookupFailed,
                    key,
                    format!("bad log pattern: {e}"),
                ));
                return None;
            }
        };

        for location in &logs.locations {
            let names = match self.sources.documents.matching(location, &pattern) {
                Ok(names) => names,
                Err(e) => {
                    diagnostics.push(lookup_failed(key, location, &e));
                    continue;
                }
            };
            for name in names {
                let text = match self.sources.read_text(location, &name) {
                    Ok(text) => text,
                    Err(e) => {
                        diagnostics.push(lookup_failed(key, location, &e));
                        continue;
                    }
                };
                if let Some(rule) = R::find_in(&text) {
                    return Some(Evidence {
                        artifact: location.join(&name).display().to_string(),
                        rule: rule.tag().to_string(),
                    });
                }
            }
        }
        None
    }
}

fn lookup_failed(key: &str, location: &Path, err: &dyn std::fmt::Display) -> Diagnostic {
    Diagnostic::emit(
        DiagnosticKind::LookupFailed,
        key,
        format!("log lookup in {} treated as no match: {err}", location.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconError;
    use crate::source::{DirectoryListing, DocumentSource, LossyUtf8, MemorySource};
    use crate::timestamp::IssuedAt;

    const LATE: &str = "501 : Rejeição: Pedido de Cancelamento intempestivo";

    fn record(number: i64) -> InvoiceRecord {
        InvoiceRecord {
            kind: "VENDA".into(),
            control_code: 1,
            number,
            amount: 10.0,
            issued_at: IssuedAt::parse("2025-10-01 10:00:00"),
        }
    }

    fn config() -> InvoiceConfig {
        let mut config = InvoiceConfig::new(vec![PathBuf::from("xml")]);
        config.event_dirs = vec![PathBuf::from("ev")];
        config.rejection_dirs = vec![PathBuf::from("rej")];
        config
    }

    fn resolve_with(source: &MemorySource, number: i64) -> Resolution {
        let config = config();
        let (index, _) = EventIndex::build(source, &config.event_dirs, &config.cancellation_extension);
        let resolver = DispositionResolver::new(&index, Sources::new(source, &LossyUtf8), &config);
        resolver.resolve(&record(number))
    }

    fn base() -> MemorySource {
        MemorySource::new().with_dir("ev").with_dir("rej")
    }

    #[test]
    fn nothing_on_file_is_live() {
        let r = resolve_with(&base(), 42);
        assert_eq!(r.disposition, Disposition::Live);
        assert!(r.evidence.is_none());
    }

    #[test]
    fn confirmed_cancellation_is_cancelled() {
        let source = base().with_file("ev", "00000044.can", b"".to_vec());
        let r = resolve_with(&source, 44);
        assert_eq!(r.disposition, Disposition::Cancelled);
        assert_eq!(r.evidence.unwrap().artifact, "00000044.can");
    }

    #[test]
    fn rejected_cancellation_is_kept_with_note() {
        let source = base()
            .with_file("ev", "00000043.can", b"".to_vec())
            .with_file("rej", "lote-00000043-ret.txt", LATE.as_bytes().to_vec());
        let r = resolve_with(&source, 43);
        assert_eq!(r.disposition, Disposition::KeptWithNote("Cancellation Intempestivo".into()));
        assert_eq!(r.evidence.unwrap().rule, "rejection_501");
    }

    #[test]
    fn rejection_without_cancellation_is_live() {
        let source = base().with_file("rej", "00000043.txt", LATE.as_bytes().to_vec());
        assert_eq!(resolve_with(&source, 43).disposition, Disposition::Live);
    }

    #[test]
    fn voiding_beats_everything() {
        let source = base()
            .with_file("ev", "00000044.can", b"".to_vec())
            .with_file("ev", "00000044.inu", b"NOTA NAO AUTORIZADA".to_vec())
            .with_file("rej", "00000044.txt", LATE.as_bytes().to_vec());
        let r = resolve_with(&source, 44);
        assert_eq!(r.disposition, Disposition::Dropped);
        assert_eq!(r.evidence.unwrap().rule, "voiding_not_authorized");
    }

    #[test]
    fn unrelated_log_text_does_not_match() {
        let source = base()
            .with_file("ev", "00000044.can", b"".to_vec())
            .with_file("rej", "00000044.txt", b"100 : Autorizado o uso da NF-e".to_vec());
        assert_eq!(resolve_with(&source, 44).disposition, Disposition::Cancelled);
    }

    /// Every read fails; listing works.
    struct Unreadable(MemorySource);

    impl DirectoryListing for Unreadable {
        fn list(&self, location: &Path) -> Result<Vec<String>, ReconError> {
            self.0.list(location)
        }
        fn exists(&self, location: &Path) -> bool {
            self.0.exists(location)
        }
    }

    impl DocumentSource for Unreadable {
        fn read(&self, location: &Path, name: &str) -> Result<Vec<u8>, ReconError> {
            Err(ReconError::io(
                location.join(name),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ))
        }
    }

    #[test]
    fn unreadable_log_is_no_match_with_diagnostic() {
        let source = Unreadable(
            base()
                .with_file("ev", "00000043.can", b"".to_vec())
                .with_file("rej", "00000043.txt", LATE.as_bytes().to_vec()),
        );
        let config = config();
        let (index, _) = EventIndex::build(&source, &config.event_dirs, "can");
        let resolver = DispositionResolver::new(&index, Sources::new(&source, &LossyUtf8), &config);
        let r = resolver.resolve(&record(43));
        assert_eq!(r.disposition, Disposition::Cancelled);
        assert_eq!(r.diagnostics.len(), 1);
        assert_eq!(r.diagnostics[0].kind, DiagnosticKind::LookupFailed);
    }

    #[test]
    fn resolving_twice_is_identical() {
        let source = base()
            .with_file("ev", "00000043.can", b"".to_vec())
            .with_file("rej", "00000043.txt", LATE.as_bytes().to_vec());
        assert_eq!(resolve_with(&source, 43), resolve_with(&source, 43));
    }
}
