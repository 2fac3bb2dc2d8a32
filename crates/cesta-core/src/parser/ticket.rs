//! Structured receipt text (native PDF text layer)
//!
//! Two entry points share the body parser:
//! - `parse_multi` for text dumps holding many receipts separated by a run of
//!   `=` characters. A chunk needs date, invoice number and total.
//! - `parse_single` for the text of one file. Date and total are required, the
//!   invoice number is optional.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{ReceiptParser, Rejection};
use crate::models::Ticket;
use crate::sanitize::{parse_amount, round2};

static TICKET_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"={10,}").expect("valid regex"));

static DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2})/(\d{2})/(\d{4})\s+(\d{2}:\d{2})").expect("valid regex")
});

static INVOICE_STRICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)FACTURA\s+SIMPLIFICADA:\s*(\S+)").expect("valid regex")
});

static INVOICE_LOOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)FACTURA\s*SIMPLIFICADA[:\s]*(\d+-\d+-\d+)").expect("valid regex")
});

static TOTAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*TOTAL\s*(?:\(\s*€\s*\)|€)?\s*:?\s*(\d{1,5}(?:[.,]\d{1,2})?)")
        .expect("valid regex")
});

/// Chunks starting with this are file banners, not receipts
const BANNER_PREFIX: &str = "📄";

/// Date and time printed on the receipt, as a local calendar date
fn find_date_time(text: &str) -> Option<(NaiveDate, String)> {
    DATE_TIME.captures_iter(text).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some((date, caps[4].to_string()))
    })
}

fn find_total(text: &str) -> Option<f64> {
    TOTAL
        .captures(text)
        .and_then(|caps| parse_amount(&caps[1]))
        .map(round2)
}

/// Fallback id for receipts without an invoice number
fn synthesize_id(text: &str) -> String {
    let now = Utc::now();
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("PDF-{}-{}", now.timestamp_millis(), &digest[..9])
}

/// Sort by date then time, oldest first
pub(crate) fn sort_ascending(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.time.cmp(&b.time)));
}

impl ReceiptParser {
    /// Parse a text dump holding any number of receipts
    ///
    /// Chunks missing an anchor are noise between receipts and are dropped.
    /// Repeated invoice numbers keep the first occurrence.
    pub fn parse_multi(&self, text: &str) -> Vec<Ticket> {
        self.parse_multi_chunks(text)
            .into_iter()
            .map(|(ticket, _)| ticket)
            .collect()
    }

    /// Like `parse_multi`, also returning the chunk each ticket came from
    pub fn parse_multi_chunks<'a>(&self, text: &'a str) -> Vec<(Ticket, &'a str)> {
        let mut seen = HashSet::new();
        let mut parsed = Vec::new();

        for chunk in TICKET_SEPARATOR.split(text) {
            let chunk = chunk.trim();
            if chunk.is_empty() || chunk.starts_with(BANNER_PREFIX) {
                continue;
            }
            match self.parse_multi_chunk(chunk) {
                Ok(ticket) => {
                    if seen.insert(ticket.id.clone()) {
                        parsed.push((ticket, chunk));
                    } else {
                        debug!("Skipping repeated receipt {}", ticket.id);
                    }
                }
                Err(reason) => debug!("Skipping chunk: {}", reason),
            }
        }

        parsed.sort_by(|(a, _), (b, _)| a.date.cmp(&b.date).then_with(|| a.time.cmp(&b.time)));
        parsed
    }

    fn parse_multi_chunk(&self, chunk: &str) -> std::result::Result<Ticket, Rejection> {
        let (date, time) = find_date_time(chunk).ok_or(Rejection::MissingDate)?;
        let id = INVOICE_STRICT
            .captures(chunk)
            .map(|c| c[1].to_string())
            .ok_or(Rejection::MissingInvoice)?;
        let total = find_total(chunk).ok_or(Rejection::MissingTotal)?;

        let lines: Vec<&str> = chunk.lines().collect();
        let header = &lines[..lines.len().min(self.parser.multi_ticket_header_lines)];

        Ok(Ticket {
            id,
            date,
            time,
            total,
            store: self.stores.identify(header),
            items: self.parse_body(&lines),
            total_synthesized: false,
        })
    }

    /// Parse the text of a single receipt file
    pub fn parse_single(&self, text: &str) -> std::result::Result<Ticket, Rejection> {
        let (date, time) = find_date_time(text).ok_or(Rejection::MissingDate)?;
        let total = find_total(text).ok_or(Rejection::MissingTotal)?;

        let lines: Vec<&str> = text.lines().collect();
        let items = self.parse_body(&lines);
        if items.is_empty() {
            return Err(Rejection::NoItems);
        }

        let id = INVOICE_LOOSE
            .captures(text)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| synthesize_id(text));
        let header = &lines[..lines.len().min(self.parser.single_receipt_header_lines)];

        Ok(Ticket {
            id,
            date,
            time,
            total,
            store: self.stores.identify(header),
            items,
            total_synthesized: false,
        })
    }

    /// Parse many single-receipt texts, deduplicating by id
    pub fn parse_single_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Ticket> {
        let mut seen = HashSet::new();
        let mut tickets: Vec<Ticket> = texts
            .iter()
            .filter_map(|t| self.parse_single(t.as_ref()).ok())
            .filter(|t| seen.insert(t.id.clone()))
            .collect();
        sort_ascending(&mut tickets);
        tickets
    }
}
