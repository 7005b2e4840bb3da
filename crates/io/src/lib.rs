//! `sisxml-io`: filesystem collaborators for the reconciliation engine.
//!
//! Reads invoice folders and delimited ledgers, detects text encodings, and
//! writes the Excel report.

pub mod csv;
pub mod encoding;
pub mod fs_source;
pub mod report;

pub use encoding::SniffingDecoder;
pub use fs_source::FsSource;
pub use report::{write_report, ReportError, ReportStats};
