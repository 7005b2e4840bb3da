//! `sisxml-recon`: invoice reconciliation engine.
//!
//! Decides which emitted invoices count as valid revenue (live, cancelled,
//! kept with a note, dropped) and enriches the revenue ledger with weights and
//! gross revenue. Pure engine crate: artifacts come in through the traits in
//! [`source`], nothing here touches the filesystem.

pub mod coerce;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod extract;
pub mod ledger;
pub mod model;
pub mod resolve;
pub mod rules;
pub mod source;
pub mod timestamp;

pub use config::{InvoiceConfig, LedgerConfig, RunConfig};
pub use engine::{run_invoices, run_ledger};
pub use error::ReconError;
pub use model::{EnrichedLedger, InvoiceRun, Period, ResolvedInvoice, Table};
pub use source::{DirectoryListing, DocumentSource, Sources, TextDecoder};
