//! Batch import of receipt files
//!
//! Files are processed one at a time. Each file goes through extraction (PDF
//! text layer, OCR, or a plain read) and then the matching parser. Anything
//! that goes wrong with a file is recorded as a failure for that file and the
//! batch moves on.
//!
//! After the batch, the parsed tickets are sorted by date and merged into the
//! collection, and the raw text of every newly added ticket is archived for
//! future migrations. A new ticket whose id is already taken (a reused invoice
//! number, say) gets a `-2`, `-3`... suffix so its archived text stays its own.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::{rebuild_lines, OcrEngine, SourceKind, TextLayer, LINE_TOLERANCE};
use crate::merge::{merge, DedupKey};
use crate::models::{Collection, Ticket};
use crate::parser::ReceiptParser;
use crate::storage::RawTextArchive;

/// Cooperative cancellation flag, checked between files
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A ticket parsed from a file, with the text it was parsed from
#[derive(Debug, Clone)]
pub struct ParsedReceipt {
    pub ticket: Ticket,
    /// `None` for tickets loaded from a collection file
    pub raw_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportFailure {
    pub file: String,
    pub error: String,
}

/// Outcome of a batch
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    /// Files attempted
    pub files: usize,
    pub added: usize,
    pub duplicates: usize,
    pub failures: Vec<ImportFailure>,
    /// Stopped early by the cancellation token
    pub cancelled: bool,
}

impl ImportSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn message(&self) -> String {
        format!(
            "{} new tickets added, {} duplicates ignored, {} files failed",
            self.added,
            self.duplicates,
            self.failed()
        )
    }
}

impl std::fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Import pipeline over pluggable extractors
pub struct Importer {
    parser: Arc<ReceiptParser>,
    ocr: Arc<dyn OcrEngine>,
    text_layer: Arc<dyn TextLayer>,
    language: String,
    timeout: Duration,
    today: Option<NaiveDate>,
}

impl Importer {
    pub fn new(
        parser: Arc<ReceiptParser>,
        ocr: Arc<dyn OcrEngine>,
        text_layer: Arc<dyn TextLayer>,
        config: &Config,
    ) -> Self {
        Self {
            parser,
            ocr,
            text_layer,
            language: config.ocr.language.clone(),
            timeout: config.import.timeout,
            today: None,
        }
    }

    /// Limit for each external extraction call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fix the reference date used to sanitize OCR dates
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| Error::Timeout(self.timeout.as_secs()))?
    }

    /// Extract and parse one file
    pub async fn parse_file(&self, path: &Path) -> Result<Vec<ParsedReceipt>> {
        let kind = SourceKind::from_path(path).ok_or_else(|| {
            Error::Import(format!("Unsupported file type: {}", path.display()))
        })?;
        let bytes = tokio::fs::read(path).await?;
        debug!("Read {} ({} bytes, {})", path.display(), bytes.len(), kind);

        match kind {
            SourceKind::Pdf => {
                let pages = self.bounded(self.text_layer.extract(&bytes)).await?;
                let text = rebuild_lines(&pages, LINE_TOLERANCE);
                let ticket = self
                    .parser
                    .parse_single(&text)
                    .map_err(|reason| Error::Import(format!("No receipt found: {}", reason)))?;
                Ok(vec![ParsedReceipt {
                    ticket,
                    raw_text: Some(text),
                }])
            }
            SourceKind::Image => {
                let text = self
                    .bounded(self.ocr.recognize(&bytes, &self.language))
                    .await?;
                let ticket = self
                    .parser
                    .parse_image_text(&text, self.today())
                    .map_err(|reason| Error::Import(format!("No receipt found: {}", reason)))?;
                Ok(vec![ParsedReceipt {
                    ticket,
                    raw_text: Some(text),
                }])
            }
            SourceKind::Text => {
                let text = String::from_utf8_lossy(&bytes);
                let parsed: Vec<ParsedReceipt> = self
                    .parser
                    .parse_multi_chunks(&text)
                    .into_iter()
                    .map(|(ticket, chunk)| ParsedReceipt {
                        ticket,
                        raw_text: Some(chunk.to_string()),
                    })
                    .collect();
                if parsed.is_empty() {
                    return Err(Error::Import("No receipts found in text".to_string()));
                }
                Ok(parsed)
            }
            SourceKind::Collection => {
                let collection = Collection::from_json(&String::from_utf8_lossy(&bytes))?;
                Ok(collection
                    .tickets
                    .into_iter()
                    .map(|ticket| ParsedReceipt {
                        ticket,
                        raw_text: None,
                    })
                    .collect())
            }
        }
    }

    /// Import a batch of files into a collection
    ///
    /// `progress` is called after every file with `(current, total, file name)`.
    pub async fn run<F>(
        &self,
        files: &[PathBuf],
        collection: &mut Collection,
        archive: &mut RawTextArchive,
        cancel: &CancellationToken,
        mut progress: F,
    ) -> ImportSummary
    where
        F: FnMut(usize, usize, &str),
    {
        let mut summary = ImportSummary::default();
        let mut parsed = Vec::new();

        for (idx, path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Import cancelled after {} of {} files", idx, files.len());
                summary.cancelled = true;
                break;
            }

            let name = file_label(path);
            summary.files += 1;
            match self.parse_file(path).await {
                Ok(receipts) => {
                    debug!("{}: {} tickets", name, receipts.len());
                    parsed.extend(receipts);
                }
                Err(e) => {
                    warn!("Failed to import {}: {}", name, e);
                    summary.failures.push(ImportFailure {
                        file: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
            progress(idx + 1, files.len(), &name);
        }

        parsed.sort_by(|a, b| {
            a.ticket
                .date
                .cmp(&b.ticket.date)
                .then_with(|| a.ticket.time.cmp(&b.ticket.time))
        });

        // Archive the text of tickets the merge will accept
        let mut keys: HashSet<DedupKey> = collection.tickets.iter().map(DedupKey::of).collect();
        let mut taken: HashSet<String> = collection.tickets.iter().map(|t| t.id.clone()).collect();
        taken.extend(archive.iter().map(|(id, _)| id.to_string()));

        let mut incoming = Vec::with_capacity(parsed.len());
        for mut receipt in parsed {
            if keys.insert(DedupKey::of(&receipt.ticket)) {
                let id = unique_id(&receipt.ticket.id, &taken);
                if id != receipt.ticket.id {
                    debug!("Ticket id {} already in use, stored as {}", receipt.ticket.id, id);
                    receipt.ticket.id = id;
                }
                taken.insert(receipt.ticket.id.clone());
                if let Some(text) = receipt.raw_text {
                    archive.insert(receipt.ticket.id.clone(), text);
                }
            }
            incoming.push(receipt.ticket);
        }

        let merged = merge(std::mem::take(&mut collection.tickets), incoming);
        collection.tickets = merged.tickets;
        collection.touch(self.today());
        summary.added = merged.added;
        summary.duplicates = merged.duplicates;

        info!("Import finished: {}", summary.message());
        summary
    }
}

/// `id`, or the first free `id-N` with N from 2
fn unique_id(id: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(id) {
        return id.to_string();
    }
    (2..)
        .map(|n| format!("{}-{}", id, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| id.to_string())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{MockOcr, MockTextLayer};
    use tempfile::TempDir;

    const PDF_TEXT: &str = "MERCADONA, S.A.\nC/ LOS VASCOS 17\n20/03/2024 09:15\nFACTURA SIMPLIFICADA: 1234-567-890\nDescripción P. Unit Importe\n2 LECHE ENTERA 1,20 2,40\n1 PECHUGA POLLO 5,30\nTOTAL (€) 7,70";

    fn importer(ocr: MockOcr, layer: MockTextLayer) -> Importer {
        let config = Config::embedded().unwrap();
        let parser = Arc::new(ReceiptParser::new(&config).unwrap());
        Importer::new(parser, Arc::new(ocr), Arc::new(layer), &config)
            .with_today(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_pdf_file_parsed_and_archived() {
        let dir = TempDir::new().unwrap();
        let pdf = write(&dir, "ticket.pdf", PDF_TEXT);
        let imp = importer(MockOcr::echo(), MockTextLayer::echo());

        let mut collection = Collection::default();
        let mut archive = RawTextArchive::new();
        let summary = imp
            .run(&[pdf], &mut collection, &mut archive, &CancellationToken::new(), |_, _, _| {})
            .await;

        assert_eq!(summary.added, 1);
        assert_eq!(collection.tickets[0].id, "1234-567-890");
        assert_eq!(collection.meta.total_tickets, 1);
        assert!(archive.get("1234-567-890").unwrap().contains("LECHE ENTERA"));
    }

    #[tokio::test]
    async fn test_reimport_counts_duplicates() {
        let dir = TempDir::new().unwrap();
        let pdf = write(&dir, "ticket.pdf", PDF_TEXT);
        let imp = importer(MockOcr::echo(), MockTextLayer::echo());

        let mut collection = Collection::default();
        let mut archive = RawTextArchive::new();
        let token = CancellationToken::new();
        imp.run(&[pdf.clone()], &mut collection, &mut archive, &token, |_, _, _| {})
            .await;
        let summary = imp
            .run(&[pdf], &mut collection, &mut archive, &token, |_, _, _| {})
            .await;

        assert_eq!(summary.added, 0);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(collection.tickets.len(), 1);
        assert_eq!(summary.message(), "0 new tickets added, 1 duplicates ignored, 0 files failed");
    }

    #[tokio::test]
    async fn test_failures_are_per_file() {
        let dir = TempDir::new().unwrap();
        let image = write(&dir, "photo.jpg", "irrelevant");
        let unsupported = write(&dir, "notes.doc", "x");
        let pdf = write(&dir, "ticket.pdf", PDF_TEXT);
        let imp = importer(MockOcr::failing("engine crashed"), MockTextLayer::echo());

        let mut collection = Collection::default();
        let mut archive = RawTextArchive::new();
        let mut seen = Vec::new();
        let summary = imp
            .run(
                &[image, unsupported, pdf],
                &mut collection,
                &mut archive,
                &CancellationToken::new(),
                |current, total, name| seen.push((current, total, name.to_string())),
            )
            .await;

        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.failures[0].file, "photo.jpg");
        assert!(summary.failures[0].error.contains("engine crashed"));
        assert_eq!(
            seen,
            vec![
                (1, 3, "photo.jpg".to_string()),
                (2, 3, "notes.doc".to_string()),
                (3, 3, "ticket.pdf".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_hanging_engine_times_out() {
        let dir = TempDir::new().unwrap();
        let image = write(&dir, "photo.png", "x");
        let imp = importer(MockOcr::hanging(), MockTextLayer::echo())
            .with_timeout(Duration::from_millis(20));

        let mut collection = Collection::default();
        let mut archive = RawTextArchive::new();
        let summary = imp
            .run(&[image], &mut collection, &mut archive, &CancellationToken::new(), |_, _, _| {})
            .await;

        assert_eq!(summary.failed(), 1);
        assert!(summary.failures[0].error.starts_with("Timed out"));
    }

    #[tokio::test]
    async fn test_cancellation_between_files() {
        let dir = TempDir::new().unwrap();
        let first = write(&dir, "a.pdf", PDF_TEXT);
        let second = write(&dir, "b.pdf", PDF_TEXT);
        let layer = Arc::new(MockTextLayer::echo());
        let config = Config::embedded().unwrap();
        let parser = Arc::new(ReceiptParser::new(&config).unwrap());
        let imp = Importer::new(parser, Arc::new(MockOcr::echo()), layer.clone(), &config);

        let token = CancellationToken::new();
        let canceller = token.clone();
        let mut collection = Collection::default();
        let mut archive = RawTextArchive::new();
        let summary = imp
            .run(&[first, second], &mut collection, &mut archive, &token, |_, _, _| {
                canceller.cancel()
            })
            .await;

        assert!(summary.cancelled);
        assert_eq!(summary.files, 1);
        assert_eq!(layer.calls(), 1);
        assert_eq!(collection.tickets.len(), 1);
    }

    #[tokio::test]
    async fn test_ocr_image_uses_ocr_layout() {
        let dir = TempDir::new().unwrap();
        let image = write(
            &dir,
            "lidl.jpg",
            "LIDL\n12/05/2024 18:42\nPLATANO 1,78 A\nAGUA MINERAL 0,45 B\nTOTAL 2,23",
        );
        let imp = importer(MockOcr::echo(), MockTextLayer::echo());

        let mut collection = Collection::default();
        let mut archive = RawTextArchive::new();
        let summary = imp
            .run(&[image], &mut collection, &mut archive, &CancellationToken::new(), |_, _, _| {})
            .await;

        assert_eq!(summary.added, 1);
        let ticket = &collection.tickets[0];
        assert_eq!(ticket.store.name, "Lidl");
        assert_eq!(ticket.total, 2.23);
        assert!(archive.contains(&ticket.id));
    }

    #[tokio::test]
    async fn test_collection_file_merges_without_archive() {
        let dir = TempDir::new().unwrap();
        let json = write(
            &dir,
            "export.json",
            r#"[{"id":"x","date":"05/01/2024","total":1.5,"items":[{"name":"PAN","price":1.5}]}]"#,
        );
        let imp = importer(MockOcr::echo(), MockTextLayer::echo());

        let mut collection = Collection::default();
        let mut archive = RawTextArchive::new();
        let summary = imp
            .run(&[json], &mut collection, &mut archive, &CancellationToken::new(), |_, _, _| {})
            .await;

        assert_eq!(summary.added, 1);
        assert_eq!(collection.tickets[0].date.to_string(), "2024-01-05");
        assert!(archive.is_empty());
    }

    #[tokio::test]
    async fn test_reused_invoice_number_keeps_both_receipts() {
        let dir = TempDir::new().unwrap();
        let march = write(&dir, "march.pdf", PDF_TEXT);
        let april = write(
            &dir,
            "april.pdf",
            &PDF_TEXT
                .replace("20/03/2024", "18/04/2024")
                .replace("1 PECHUGA POLLO 5,30", "1 PECHUGA POLLO 6,10")
                .replace("7,70", "8,50"),
        );
        let imp = importer(MockOcr::echo(), MockTextLayer::echo());

        let mut collection = Collection::default();
        let mut archive = RawTextArchive::new();
        let token = CancellationToken::new();
        imp.run(&[march], &mut collection, &mut archive, &token, |_, _, _| {})
            .await;
        let summary = imp
            .run(&[april], &mut collection, &mut archive, &token, |_, _, _| {})
            .await;

        assert_eq!(summary.added, 1);
        assert_eq!(collection.tickets.len(), 2);
        assert_eq!(collection.tickets[0].id, "1234-567-890-2");
        assert_eq!(collection.tickets[1].id, "1234-567-890");
        assert_eq!(archive.len(), 2);
        assert!(archive.get("1234-567-890-2").unwrap().contains("18/04/2024"));

        // A forced rebuild from the archive still has both
        collection.meta.parser_version = Some(1);
        let (migrated, _) = crate::migrate::migrate(collection, Some(&archive), &imp.parser, imp.today());
        assert_eq!(migrated.tickets.len(), 2);
        assert!(migrated.tickets.iter().any(|t| t.total == 7.7));
        assert!(migrated.tickets.iter().any(|t| t.total == 8.5));
    }

    #[test]
    fn test_unique_id_suffixes() {
        let taken: HashSet<String> = ["a", "a-2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unique_id("b", &taken), "b");
        assert_eq!(unique_id("a", &taken), "a-3");
    }

    #[tokio::test]
    async fn test_text_dump_without_receipts_fails() {
        let dir = TempDir::new().unwrap();
        let txt = write(&dir, "dump.txt", "nothing to see here");
        let imp = importer(MockOcr::echo(), MockTextLayer::echo());
        let err = imp.parse_file(&txt).await.unwrap_err();
        assert!(matches!(err, Error::Import(_)));
    }
}
