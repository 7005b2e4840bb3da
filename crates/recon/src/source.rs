//! Interfaces the engine consumes from its collaborators.
//!
//! The engine never touches the filesystem directly. `sisxml-io` provides the
//! filesystem-backed implementations; [`MemorySource`] backs tests and dry runs.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::error::ReconError;

/// Lists file names (not contents) at a location.
pub trait DirectoryListing {
    /// `Err(ReconError::MissingSource)` when the location does not exist.
    fn list(&self, location: &Path) -> Result<Vec<String>, ReconError>;

    fn exists(&self, location: &Path) -> bool;
}

/// Reads raw artifact bytes.
pub trait DocumentSource: DirectoryListing {
    fn read(&self, location: &Path, name: &str) -> Result<Vec<u8>, ReconError>;

    /// At most `limit` leading bytes.
    fn read_prefix(&self, location: &Path, name: &str, limit: usize) -> Result<Vec<u8>, ReconError> {
        let mut bytes = self.read(location, name)?;
        bytes.truncate(limit);
        Ok(bytes)
    }

    /// Names at `location` matching a filename glob, sorted.
    fn matching(&self, location: &Path, pattern: &Pattern) -> Result<Vec<String>, ReconError> {
        let mut names: Vec<String> = self
            .list(location)?
            .into_iter()
            .filter(|name| pattern.matches(name))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Character-encoding detection; the engine only sees decoded text.
pub trait TextDecoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str>;
}

/// UTF-8 with replacement characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LossyUtf8;

impl TextDecoder for LossyUtf8 {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        String::from_utf8_lossy(bytes)
    }
}

/// The collaborators one run reads through.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub documents: &'a dyn DocumentSource,
    pub decoder: &'a dyn TextDecoder,
}

impl<'a> Sources<'a> {
    pub fn new(documents: &'a dyn DocumentSource, decoder: &'a dyn TextDecoder) -> Self {
        Self { documents, decoder }
    }

    pub fn read_text(&self, location: &Path, name: &str) -> Result<String, ReconError> {
        let bytes = self.documents.read(location, name)?;
        Ok(self.decoder.decode(&bytes).into_owned())
    }
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Directories of named byte blobs.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    dirs: BTreeMap<PathBuf, BTreeMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an (empty) location.
    pub fn with_dir(mut self, location: impl Into<PathBuf>) -> Self {
        self.dirs.entry(location.into()).or_default();
        self
    }

    pub fn with_file(
        mut self,
        location: impl Into<PathBuf>,
        name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.insert(location, name, bytes);
        self
    }

    pub fn insert(
        &mut self,
        location: impl Into<PathBuf>,
        name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) {
        self.dirs
            .entry(location.into())
            .or_default()
            .insert(name.into(), bytes.into());
    }
}

impl DirectoryListing for MemorySource {
    fn list(&self, location: &Path) -> Result<Vec<String>, ReconError> {
        self.dirs
            .get(location)
            .map(|files| files.keys().cloned().collect())
            .ok_or_else(|| ReconError::MissingSource(location.to_path_buf()))
    }

    fn exists(&self, location: &Path) -> bool {
        self.dirs.contains_key(location)
    }
}

impl DocumentSource for MemorySource {
    fn read(&self, location: &Path, name: &str) -> Result<Vec<u8>, ReconError> {
        self.dirs
            .get(location)
            .and_then(|files| files.get(name))
            .cloned()
            .ok_or_else(|| {
                ReconError::io(
                    location.join(name),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such artifact"),
                )
            })
    }
}
