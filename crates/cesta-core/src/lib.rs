//! Cesta Core Library
//!
//! Shared functionality for the Cesta supermarket receipt tool:
//! - Price sanitizing and receipt text parsing (structured PDF text and OCR)
//! - Rule-driven product categorization and store identification
//! - Text extraction through pluggable PDF and OCR collaborators
//! - Batch import with deduplication and a raw text archive
//! - Schema migration of stored collections
//! - Product identity reconciliation with fuzzy-match suggestions
//! - Spending reports and JSON/CSV export

pub mod categorize;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod import;
pub mod merge;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod reconcile;
pub mod reports;
pub mod sanitize;
pub mod state;
pub mod storage;
pub mod store;

pub use categorize::{CategoryMatch, Categorizer, MatchSource};
pub use config::Config;
pub use error::{Error, Result};
pub use export::ExportFormat;
pub use extract::{
    MockOcr, MockTextLayer, OcrEngine, PdftotextLayer, SourceKind, TesseractOcr, TextLayer,
};
pub use import::{CancellationToken, ImportFailure, ImportSummary, Importer};
pub use merge::{merge, MergeResult};
pub use migrate::{migrate, MigrationReport};
pub use models::{Category, Collection, Item, Store, Ticket, PARSER_VERSION};
pub use parser::{ReceiptParser, Rejection};
pub use reconcile::{ProductMapping, Suggestion};
pub use sanitize::sanitize_price;
pub use state::{AppState, ReplaceOutcome};
pub use storage::{FileStore, KeyValueStore, MemoryStore, RawTextArchive};
pub use store::StoreIdentifier;
