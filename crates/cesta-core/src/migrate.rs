//! Upgrading stored collections to the current parser version
//!
//! A collection written by an older parser is rebuilt from the raw text
//! archive when one exists. Tickets that cannot be rebuilt (no archived text,
//! or the text no longer parses) are kept and only re-categorized, so a
//! migration never loses history. Without any archive the whole collection
//! takes the re-categorize path.
//!
//! The product mapping is user data and is carried forward untouched.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::merge::{merge, DedupKey};
use crate::models::{Collection, Ticket, PARSER_VERSION};
use crate::parser::ReceiptParser;
use crate::storage::RawTextArchive;

/// What a migration did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Tickets rebuilt from archived text
    pub reparsed: usize,
    /// Tickets kept from the stored collection and re-categorized
    pub recategorized: usize,
    /// Archived texts that no longer produce a ticket
    pub unparseable: usize,
}

/// Bring a stored collection up to the current parser version
///
/// Returns the collection and whether anything was migrated. A collection that
/// is already current is returned as-is. `today` anchors date sanitizing for
/// archived OCR text.
pub fn migrate(
    collection: Collection,
    archive: Option<&RawTextArchive>,
    parser: &ReceiptParser,
    today: NaiveDate,
) -> (Collection, bool) {
    let (collection, report) = migrate_with_report(collection, archive, parser, today);
    (collection, report.is_some())
}

/// Like `migrate`, with details of the work done (`None` when already current)
pub fn migrate_with_report(
    mut collection: Collection,
    archive: Option<&RawTextArchive>,
    parser: &ReceiptParser,
    today: NaiveDate,
) -> (Collection, Option<MigrationReport>) {
    if collection.is_current() {
        return (collection, None);
    }

    let from = collection
        .meta
        .parser_version
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unversioned".to_string());

    let stored = std::mem::take(&mut collection.tickets);
    let mut report = MigrationReport::default();

    let tickets = match archive.filter(|a| !a.is_empty()) {
        Some(archive) => {
            let reparsed = reparse_archive(archive, parser, today, &mut report);
            let replaced = match_rebuilt(&stored, &reparsed);

            let kept: Vec<Ticket> = stored
                .into_iter()
                .zip(replaced)
                .filter(|(_, replaced)| !replaced)
                .map(|(t, _)| recategorize(t, parser))
                .collect();
            report.recategorized = kept.len();
            report.reparsed = reparsed.len();

            merge(reparsed, kept).tickets
        }
        None => {
            report.recategorized = stored.len();
            stored.into_iter().map(|t| recategorize(t, parser)).collect()
        }
    };

    collection.tickets = tickets;
    collection.meta.parser_version = Some(PARSER_VERSION);
    collection.meta.total_tickets = collection.tickets.len();

    info!(
        "Migrated collection from parser version {} to {}: {} re-parsed, {} re-categorized",
        from, PARSER_VERSION, report.reparsed, report.recategorized
    );
    if report.unparseable > 0 {
        warn!(
            "{} archived receipts could not be re-parsed and were kept as stored",
            report.unparseable
        );
    }

    (collection, Some(report))
}

fn reparse_archive(
    archive: &RawTextArchive,
    parser: &ReceiptParser,
    today: NaiveDate,
    report: &mut MigrationReport,
) -> Vec<Ticket> {
    let mut tickets = Vec::with_capacity(archive.len());
    for (id, text) in archive.iter() {
        match parser.parse_image_text(text, today) {
            Ok(mut ticket) => {
                // Archive keys are stable even when the id was synthesized
                ticket.id = id.to_string();
                tickets.push(ticket);
            }
            Err(reason) => {
                debug!("Archived receipt {} no longer parses: {}", id, reason);
                report.unparseable += 1;
            }
        }
    }
    tickets
}

/// Mark the stored tickets that a rebuilt ticket stands in for
///
/// Each rebuilt ticket replaces at most one stored ticket. A stored ticket with
/// the same id and the same date, total and item count wins; otherwise the
/// first stored ticket with that id does. Stored tickets sharing an id beyond
/// that are kept.
fn match_rebuilt(stored: &[Ticket], rebuilt: &[Ticket]) -> Vec<bool> {
    let mut unmatched: HashMap<&str, DedupKey> = rebuilt
        .iter()
        .map(|t| (t.id.as_str(), DedupKey::of(t)))
        .collect();
    let mut replaced = vec![false; stored.len()];

    for (slot, ticket) in replaced.iter_mut().zip(stored) {
        if unmatched.get(ticket.id.as_str()) == Some(&DedupKey::of(ticket)) {
            unmatched.remove(ticket.id.as_str());
            *slot = true;
        }
    }
    for (slot, ticket) in replaced.iter_mut().zip(stored) {
        if !*slot && unmatched.remove(ticket.id.as_str()).is_some() {
            *slot = true;
        }
    }
    replaced
}

fn recategorize(mut ticket: Ticket, parser: &ReceiptParser) -> Ticket {
    for item in &mut ticket.items {
        item.category = parser.categorizer().categorize(&item.name);
    }
    ticket
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{Category, Item, Store};

    fn parser() -> ReceiptParser {
        ReceiptParser::new(&Config::embedded().unwrap()).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn stale_ticket(id: &str, name: &str) -> Ticket {
        Ticket {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            time: "10:00".to_string(),
            total: 2.0,
            store: Store::new("Mercadona"),
            items: vec![Item {
                name: name.to_string(),
                category: Category::Other,
                quantity: 1,
                unit_price: 2.0,
                price: 2.0,
                weight: None,
            }],
            total_synthesized: false,
        }
    }

    const ARCHIVED: &str = "20/03/2024 09:15\nFACTURA SIMPLIFICADA: 1234-567-890\nDescripción\n2 LECHE ENTERA 1,20 2,40\nTOTAL 2,40";

    #[test]
    fn test_current_passes_through() {
        let mut collection = Collection::default();
        collection.meta.parser_version = Some(PARSER_VERSION);
        collection.tickets.push(stale_ticket("a", "LECHE"));
        let (out, migrated) = migrate(collection.clone(), None, &parser(), today());
        assert!(!migrated);
        assert_eq!(out, collection);
    }

    #[test]
    fn test_partial_migration_recategorizes() {
        let mut collection = Collection::default();
        collection.tickets.push(stale_ticket("a", "PIZZA JAMON"));
        let (out, migrated) = migrate(collection, None, &parser(), today());
        assert!(migrated);
        assert_eq!(out.tickets[0].items[0].category, Category::Frozen);
        assert_eq!(out.meta.parser_version, Some(PARSER_VERSION));
    }

    #[test]
    fn test_full_migration_reparses_and_keeps_orphans() {
        let mut collection = Collection::default();
        collection.meta.parser_version = Some(1);
        collection.tickets.push(stale_ticket("1234-567-890", "LECHE"));
        collection.tickets.push(stale_ticket("orphan", "SARDINAS"));
        collection.product_mapping.link("LECHE ENTERA", Some("Leche"));

        let mut archive = RawTextArchive::new();
        archive.insert("1234-567-890", ARCHIVED);

        let mapping_before = serde_json::to_string(&collection.product_mapping).unwrap();
        let (out, report) =
            migrate_with_report(collection, Some(&archive), &parser(), today());
        let report = report.unwrap();
        assert_eq!(report.reparsed, 1);
        assert_eq!(report.recategorized, 1);

        assert_eq!(out.tickets.len(), 2);
        let rebuilt = out.tickets.iter().find(|t| t.id == "1234-567-890").unwrap();
        assert_eq!(rebuilt.items[0].category, Category::Dairy);
        assert_eq!(rebuilt.total, 2.4);
        let orphan = out.tickets.iter().find(|t| t.id == "orphan").unwrap();
        assert_eq!(orphan.items[0].category, Category::Pantry);

        let mapping_after = serde_json::to_string(&out.product_mapping).unwrap();
        assert_eq!(mapping_before, mapping_after);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let mut collection = Collection::default();
        collection.tickets.push(stale_ticket("orphan", "SARDINAS"));
        let mut archive = RawTextArchive::new();
        archive.insert("1234-567-890", ARCHIVED);

        let p = parser();
        let (once, _) = migrate(collection, Some(&archive), &p, today());
        let (twice, migrated) = migrate(once.clone(), Some(&archive), &p, today());
        assert!(!migrated);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_shared_id_replaces_only_the_matching_ticket() {
        let mut collection = Collection::default();
        let mut first = stale_ticket("1234-567-890", "LECHE ENTERA");
        first.date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        first.total = 2.4;
        let mut second = stale_ticket("1234-567-890", "PAN BARRA");
        second.date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        second.total = 0.6;
        collection.tickets.push(second);
        collection.tickets.push(first);

        let mut archive = RawTextArchive::new();
        archive.insert("1234-567-890", ARCHIVED);

        let (out, report) = migrate_with_report(collection, Some(&archive), &parser(), today());
        let report = report.unwrap();
        assert_eq!(report.reparsed, 1);
        assert_eq!(report.recategorized, 1);
        assert_eq!(out.tickets.len(), 2);
        assert!(out.tickets.iter().any(|t| t.total == 0.6 && t.items[0].name == "PAN BARRA"));
        assert!(out.tickets.iter().any(|t| t.total == 2.4 && t.items[0].name == "LECHE ENTERA"));
    }

    #[test]
    fn test_unparseable_archive_keeps_stored_ticket() {
        let mut collection = Collection::default();
        collection.tickets.push(stale_ticket("x", "AGUA"));
        let mut archive = RawTextArchive::new();
        archive.insert("x", "unreadable");

        let (out, report) = migrate_with_report(collection, Some(&archive), &parser(), today());
        assert_eq!(report.unwrap().unparseable, 1);
        assert_eq!(out.tickets.len(), 1);
        assert_eq!(out.tickets[0].id, "x");
    }
}
