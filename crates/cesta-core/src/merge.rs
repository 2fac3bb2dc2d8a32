//! Ticket deduplication
//!
//! Two tickets are considered the same purchase when they share date, total
//! (to the cent) and item count. This is an approximation: two genuinely
//! different visits with identical totals and basket sizes on the same day
//! collapse into one.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::models::Ticket;

/// Identity used for deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub date: NaiveDate,
    pub total_cents: i64,
    pub item_count: usize,
}

impl DedupKey {
    pub fn of(ticket: &Ticket) -> Self {
        Self {
            date: ticket.date,
            total_cents: (ticket.total * 100.0).round() as i64,
            item_count: ticket.items.len(),
        }
    }
}

/// Outcome of a merge
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    /// Merged tickets, newest first
    pub tickets: Vec<Ticket>,
    /// Incoming tickets that were new
    pub added: usize,
    /// Incoming tickets dropped as duplicates
    pub duplicates: usize,
}

/// Merge incoming tickets into an existing list
///
/// Existing tickets always win. Incoming tickets that duplicate each other
/// collapse to the first one seen.
pub fn merge(existing: Vec<Ticket>, incoming: Vec<Ticket>) -> MergeResult {
    let mut seen: HashSet<DedupKey> = HashSet::with_capacity(existing.len() + incoming.len());
    let mut tickets = Vec::with_capacity(existing.len() + incoming.len());

    for ticket in existing {
        if seen.insert(DedupKey::of(&ticket)) {
            tickets.push(ticket);
        }
    }

    let mut added = 0;
    let mut duplicates = 0;
    for ticket in incoming {
        if seen.insert(DedupKey::of(&ticket)) {
            tickets.push(ticket);
            added += 1;
        } else {
            duplicates += 1;
        }
    }

    sort_newest_first(&mut tickets);
    MergeResult {
        tickets,
        added,
        duplicates,
    }
}

/// Sort by date then time, newest first
pub fn sort_newest_first(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.time.cmp(&a.time)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Item, Store};

    fn ticket(id: &str, date: (i32, u32, u32), total: f64, items: usize) -> Ticket {
        Ticket {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            time: "10:00".to_string(),
            total,
            store: Store::new("Mercadona"),
            items: (0..items)
                .map(|i| Item {
                    name: format!("ITEM {}", i),
                    category: Category::Other,
                    quantity: 1,
                    unit_price: 1.0,
                    price: 1.0,
                    weight: None,
                })
                .collect(),
            total_synthesized: false,
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![
            ticket("a", (2024, 1, 2), 10.0, 2),
            ticket("b", (2024, 1, 3), 5.5, 1),
        ];
        let once = merge(Vec::new(), batch.clone());
        let twice = merge(once.tickets.clone(), batch);
        assert_eq!(once.tickets, twice.tickets);
        assert_eq!(twice.added, 0);
        assert_eq!(twice.duplicates, 2);
    }

    #[test]
    fn test_existing_wins() {
        let existing = vec![ticket("old", (2024, 1, 2), 10.0, 2)];
        let incoming = vec![ticket("new", (2024, 1, 2), 10.0, 2)];
        let result = merge(existing, incoming);
        assert_eq!(result.tickets.len(), 1);
        assert_eq!(result.tickets[0].id, "old");
    }

    #[test]
    fn test_incoming_duplicates_collapse() {
        let incoming = vec![
            ticket("x", (2024, 1, 2), 3.0, 1),
            ticket("y", (2024, 1, 2), 3.0, 1),
        ];
        let result = merge(Vec::new(), incoming);
        assert_eq!(result.added, 1);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.tickets[0].id, "x");
    }

    #[test]
    fn test_total_compared_to_the_cent() {
        let incoming = vec![
            ticket("x", (2024, 1, 2), 3.001, 1),
            ticket("y", (2024, 1, 2), 3.0, 1),
            ticket("z", (2024, 1, 2), 3.01, 1),
        ];
        let result = merge(Vec::new(), incoming);
        assert_eq!(result.added, 2);
    }

    #[test]
    fn test_sorted_newest_first_regardless_of_input_order() {
        let a = ticket("a", (2024, 1, 1), 1.0, 1);
        let b = ticket("b", (2024, 3, 1), 2.0, 1);
        let c = ticket("c", (2024, 2, 1), 3.0, 1);
        let forward = merge(Vec::new(), vec![a.clone(), b.clone(), c.clone()]);
        let backward = merge(Vec::new(), vec![c, b, a]);
        let ids: Vec<_> = forward.tickets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(forward.tickets, backward.tickets);
    }
}
