use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::ReconError;
use crate::model::{invoice_key, Diagnostic, DiagnosticKind};
use crate::source::DirectoryListing;

/// Lower-cased names of every confirmed-cancellation artifact found at build
/// time. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct EventIndex {
    extension: String,
    keys: HashSet<String>,
}

impl EventIndex {
    /// Lists each location once. Unreadable locations are skipped with a
    /// diagnostic; whatever was found elsewhere is kept.
    pub fn build(
        listing: &(impl DirectoryListing + ?Sized),
        locations: &[PathBuf],
        extension: &str,
    ) -> (Self, Vec<Diagnostic>) {
        let extension = extension.trim_start_matches('.').to_lowercase();
        let suffix = format!(".{extension}");
        let mut keys = HashSet::new();
        let mut diagnostics = Vec::new();

        for location in locations {
            match listing.list(location) {
                Ok(names) => {
                    let before = keys.len();
                    keys.extend(
                        names
                            .into_iter()
                            .map(|name| name.to_lowercase())
                            .filter(|name| name.ends_with(&suffix)),
                    );
                    log::debug!(
                        "event index: {} cancellation artifact(s) in {}",
                        keys.len() - before,
                        location.display()
                    );
                }
                Err(err) => {
                    let kind = match err {
                        ReconError::MissingSource(_) => DiagnosticKind::MissingSource,
                        _ => DiagnosticKind::LookupFailed,
                    };
                    diagnostics.push(Diagnostic::emit(
                        kind,
                        location.display().to_string(),
                        format!("event location skipped: {err}"),
                    ));
                }
            }
        }

        (Self { extension, keys }, diagnostics)
    }

    /// Whether `{number:08}.{ext}` was seen in any event location.
    pub fn contains_cancellation(&self, number: i64) -> bool {
        self.keys
            .contains(&format!("{}.{}", invoice_key(number), self.extension))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
