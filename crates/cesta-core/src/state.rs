//! Application state
//!
//! `AppState` owns everything that changes at runtime: the ticket collection
//! (with its product mapping), the raw text archive and the persistence
//! backend. Every mutation goes through it and ends with a snapshot save.
//!
//! Saves never fail an operation. When the backend rejects a write the
//! in-memory state stays authoritative and the caller gets the warning.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::{OcrEngine, TextLayer};
use crate::import::{CancellationToken, ImportSummary, Importer};
use crate::migrate::{migrate, migrate_with_report, MigrationReport};
use crate::models::{CategoryInfo, Collection, PARSER_VERSION};
use crate::parser::ReceiptParser;
use crate::reconcile::{ProductMapping, Suggestion};
use crate::storage::{KeyValueStore, RawTextArchive};

/// Result of asking to replace the collection
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceOutcome {
    /// Existing tickets would be lost; call again with confirmation
    NeedsConfirmation { existing: usize },
    Replaced { tickets: usize, warnings: Vec<String> },
}

pub struct AppState {
    config: Config,
    parser: Arc<ReceiptParser>,
    store: Arc<dyn KeyValueStore>,
    collection: Collection,
    raw_texts: RawTextArchive,
}

impl AppState {
    /// Load state from the store, migrating stale collections
    ///
    /// An unreadable raw text archive only costs migration fidelity and is
    /// logged. An unreadable collection is an error.
    pub fn open(config: Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let parser = Arc::new(ReceiptParser::new(&config)?);

        let raw_texts = store.load_raw_texts().unwrap_or_else(|e| {
            warn!("Ignoring unreadable raw text archive: {}", e);
            RawTextArchive::default()
        });

        let (collection, loaded) = match store.load_collection()? {
            Some(stored) => (stored, true),
            None => {
                let mut fresh = Collection::default();
                fresh.meta.parser_version = Some(PARSER_VERSION);
                (fresh, false)
            }
        };

        let (collection, migrated) = migrate(collection, Some(&raw_texts), &parser, today());

        let mut state = Self {
            config,
            parser,
            store,
            collection,
            raw_texts,
        };
        debug!(
            "Opened {} store: {} tickets, {} archived texts",
            state.store.name(),
            state.collection.tickets.len(),
            state.raw_texts.len()
        );

        if loaded && migrated {
            for warning in state.save() {
                warn!("{}", warning);
            }
        }
        Ok(state)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn parser(&self) -> &ReceiptParser {
        &self.parser
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn raw_texts(&self) -> &RawTextArchive {
        &self.raw_texts
    }

    pub fn mapping(&self) -> &ProductMapping {
        &self.collection.product_mapping
    }

    /// Build an importer sharing this state's parser
    pub fn importer(&self, ocr: Arc<dyn OcrEngine>, text_layer: Arc<dyn TextLayer>) -> Importer {
        Importer::new(self.parser.clone(), ocr, text_layer, &self.config)
    }

    /// Import files into the collection, then save
    ///
    /// Returns the batch summary and any save warnings.
    pub async fn import_files<F>(
        &mut self,
        importer: &Importer,
        files: &[PathBuf],
        cancel: &CancellationToken,
        progress: F,
    ) -> (ImportSummary, Vec<String>)
    where
        F: FnMut(usize, usize, &str),
    {
        let summary = importer
            .run(
                files,
                &mut self.collection,
                &mut self.raw_texts,
                cancel,
                progress,
            )
            .await;
        let warnings = self.save();
        (summary, warnings)
    }

    /// Replace the whole collection with the contents of a collection file
    ///
    /// Refuses to discard existing tickets unless `confirmed`. A file that does
    /// not parse or holds no tickets aborts this operation only.
    pub fn replace_with_json(&mut self, content: &str, confirmed: bool) -> Result<ReplaceOutcome> {
        let incoming = Collection::from_json(content)?;
        if incoming.tickets.is_empty() {
            return Err(Error::InvalidData(
                "Collection file contains no tickets".to_string(),
            ));
        }

        if !self.collection.tickets.is_empty() && !confirmed {
            return Ok(ReplaceOutcome::NeedsConfirmation {
                existing: self.collection.tickets.len(),
            });
        }

        // Archived texts belong to the tickets being replaced
        let (incoming, _) = migrate(incoming, None, &self.parser, today());
        info!(
            "Replacing {} tickets with {} from file",
            self.collection.tickets.len(),
            incoming.tickets.len()
        );
        self.collection = incoming;
        let warnings = self.save();
        Ok(ReplaceOutcome::Replaced {
            tickets: self.collection.tickets.len(),
            warnings,
        })
    }

    /// Re-run migration regardless of the stored parser version
    pub fn force_migration(&mut self) -> (MigrationReport, Vec<String>) {
        let mut collection = std::mem::take(&mut self.collection);
        collection.meta.parser_version = None;
        let (collection, report) =
            migrate_with_report(collection, Some(&self.raw_texts), &self.parser, today());
        self.collection = collection;
        let warnings = self.save();
        (report.unwrap_or_default(), warnings)
    }

    /// Link (or with `None`, unlink) a raw product name, then save
    pub fn link(&mut self, raw: &str, canonical: Option<&str>) -> Vec<String> {
        self.collection.product_mapping.link(raw, canonical);
        self.save()
    }

    /// Rename a product group, then save
    pub fn rename_group(&mut self, old: &str, new: &str) -> Result<Vec<String>> {
        if !self.collection.product_mapping.rename_group(old, new) {
            return Err(Error::NotFound(format!("Product group '{}'", old)));
        }
        Ok(self.save())
    }

    /// Group a suggested pair, then save. Returns the canonical name used.
    pub fn accept_suggestion(&mut self, a: &str, b: &str) -> (String, Vec<String>) {
        let canonical = self.collection.product_mapping.accept_suggestion(a, b);
        (canonical, self.save())
    }

    /// Likely duplicates among product names not yet grouped
    pub fn suggestions(&self) -> Vec<Suggestion> {
        let mapping = &self.collection.product_mapping;
        let pool = mapping.unmapped(&self.collection.distinct_item_names());
        mapping.suggest(&pool, &self.config.reconcile)
    }

    /// Snapshot the collection and the archive
    ///
    /// Returns one warning per failed write.
    pub fn save(&mut self) -> Vec<String> {
        self.collection.touch(today());
        self.collection.categories = self
            .config
            .categories
            .iter()
            .map(|c| {
                (
                    c.key.as_str().to_string(),
                    CategoryInfo {
                        name: c.name.clone(),
                        color: c.color.clone(),
                    },
                )
            })
            .collect();

        let mut warnings = Vec::new();
        if let Err(e) = self.store.save_collection(&self.collection) {
            warn!("Collection kept in memory only: {}", e);
            warnings.push(format!("Could not save collection: {}", e));
        }
        if let Err(e) = self.store.save_raw_texts(&self.raw_texts) {
            warn!("Raw texts kept in memory only: {}", e);
            warnings.push(format!("Could not save raw texts: {}", e));
        }
        warnings
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
