use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (empty directory list, bad delimiter, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// A configured input location does not exist.
    #[error("source not found: {}", .0.display())]
    MissingSource(PathBuf),
    /// A location or artifact exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A document could not be parsed or lacks a required field.
    #[error("{name}: malformed document: {reason}")]
    MalformedDocument { name: String, reason: String },
    /// Required column(s) absent from a tabular input.
    #[error("{table}: missing column '{column}'")]
    MissingColumn { table: String, column: String },
    /// No usable input at all; the run produces no output.
    #[error("no data: {0}")]
    NoData(String),
}

impl ReconError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
