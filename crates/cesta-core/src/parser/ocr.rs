//! OCR receipt layout
//!
//! OCR output from photographed receipts has no reliable column structure.
//! Each body line is read as `<name> <amount> [tax letter]`, dates go through a
//! sanitizer that rejects implausible values, and a missing total is rebuilt
//! from the items (flagged on the ticket).

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{ReceiptParser, Rejection};
use crate::models::{Item, Store, Ticket};
use crate::sanitize::{round2, sanitize_token, SanitizeLimits};

static OCR_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s+(-?\d+[.,]\d{2})\s*([A-Z])?$").expect("valid regex")
});

static MULTIPLIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*[xX×*]\s*(\d+[.,]\d{2})").expect("valid regex")
});

static TOTAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:TOTAL|T0TAL|A\s+PAGAR|IMPORTE)\b").expect("valid regex")
});

static TRAILING_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+[.,]\d{2})\D*$").expect("valid regex"));

static AMOUNT_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+[.,]\d{2})\s*(?:€|EUR)?\s*$").expect("valid regex")
});

static DMY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4}|\d{2})\b").expect("valid regex")
});

static YMD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})[/.\-](\d{1,2})[/.\-](\d{1,2})\b").expect("valid regex")
});

static TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("valid regex"));

static HAS_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}{2,}").expect("valid regex"));

fn plausible(date: NaiveDate, today: NaiveDate) -> bool {
    date.year() >= 2000 && date <= today + Duration::days(1)
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + year } else { year })
}

/// First plausible date in OCR text
///
/// Accepts `d/m/yyyy`, `d/m/yy` and `yyyy-m-d` (any of `/ . -`). Dates before
/// 2000 or more than a day after `today` are skipped as OCR damage. Returns
/// `None` when nothing plausible is found.
pub fn find_plausible_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let mut candidates: Vec<(usize, NaiveDate)> = Vec::new();

    for caps in YMD.captures_iter(text) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or_default();
        let parsed = (|| {
            let year: i32 = caps[1].parse().ok()?;
            NaiveDate::from_ymd_opt(year, caps[2].parse().ok()?, caps[3].parse().ok()?)
        })();
        if let Some(date) = parsed {
            candidates.push((start, date));
        }
    }
    for caps in DMY.captures_iter(text) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or_default();
        let parsed = (|| {
            let year = expand_year(&caps[3])?;
            NaiveDate::from_ymd_opt(year, caps[2].parse().ok()?, caps[1].parse().ok()?)
        })();
        if let Some(date) = parsed {
            candidates.push((start, date));
        }
    }

    candidates.sort_by_key(|(pos, _)| *pos);
    candidates
        .into_iter()
        .map(|(_, date)| date)
        .find(|date| plausible(*date, today))
}

/// Date from OCR text, falling back to `today`
pub fn sanitize_date(text: &str, today: NaiveDate) -> NaiveDate {
    find_plausible_date(text, today).unwrap_or_else(|| {
        debug!("No plausible date in OCR text, using {}", today);
        today
    })
}

fn find_time(text: &str) -> Option<String> {
    TIME.captures_iter(text).find_map(|caps| {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        (hour < 24 && minute < 60).then(|| format!("{:02}:{:02}", hour, minute))
    })
}

/// Deterministic id from store and date plus a digest of the receipt body
///
/// The digest covers time, every item line and the total, so two receipts
/// that differ in any of them never share an id.
pub fn ocr_ticket_id(
    store: &str,
    date: NaiveDate,
    time: &str,
    items: &[Item],
    total: f64,
) -> String {
    let cents = |amount: f64| (amount * 100.0).round() as i64;

    let mut hasher = Sha256::new();
    hasher.update(time.as_bytes());
    for item in items {
        hasher.update(b"\n");
        hasher.update(item.name.as_bytes());
        hasher.update(format!("|{}|{}", item.quantity, cents(item.price)).as_bytes());
    }
    hasher.update(format!("\n{}", cents(total)).as_bytes());
    let digest = hex::encode(hasher.finalize());

    let store_key = store.split_whitespace().collect::<Vec<_>>().join("-");
    format!(
        "{}-{}-{}",
        store_key.to_uppercase(),
        date.format("%Y%m%d"),
        &digest[..12]
    )
}

impl ReceiptParser {
    /// Parse OCR text with the loose trailing-amount layout
    ///
    /// `today` anchors the date sanitizer.
    pub fn parse_ocr(&self, text: &str, today: NaiveDate) -> std::result::Result<Ticket, Rejection> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();

        let mut items: Vec<Item> = Vec::new();
        let mut total: Option<f64> = None;

        let mut idx = 0;
        while idx < lines.len() {
            let line = lines[idx];
            idx += 1;
            if line.is_empty() {
                continue;
            }

            if TOTAL_LINE.is_match(line) {
                let same_line = TRAILING_AMOUNT.captures(line).map(|c| c[1].to_string());
                let next_line = lines
                    .get(idx)
                    .and_then(|next| AMOUNT_ONLY.captures(next))
                    .map(|c| c[1].to_string());
                if let Some(raw) = same_line.or(next_line) {
                    let value = sanitize_token(&raw, SanitizeLimits::for_totals());
                    if value > 0.0 {
                        total = Some(value);
                        break;
                    }
                }
                continue;
            }

            if let Some(caps) = MULTIPLIER.captures(line) {
                if let Some(last) = items.last_mut() {
                    let quantity: u32 = caps[1].parse().unwrap_or(1);
                    let unit = sanitize_token(&caps[2], SanitizeLimits::default());
                    if quantity > 0 && unit > 0.0 {
                        last.quantity = quantity;
                        last.unit_price = unit;
                    }
                }
                continue;
            }

            if self.lines.is_denied(line) {
                continue;
            }

            let Some(caps) = OCR_ITEM.captures(line) else {
                continue;
            };
            let name = super::line::clean_name(&caps[1]);
            if !HAS_LETTER.is_match(&name) {
                continue;
            }
            let price = sanitize_token(&caps[2], SanitizeLimits::default());
            if price <= 0.0 {
                debug!("Dropping OCR item '{}' without a usable price", name);
                continue;
            }

            items.push(Item {
                category: self.categorizer.categorize(&name),
                name,
                quantity: 1,
                unit_price: price,
                price,
                weight: None,
            });
        }

        if items.is_empty() {
            return Err(Rejection::NoItems);
        }

        let date = sanitize_date(text, today);
        let time = find_time(text).unwrap_or_else(|| self.ocr.default_time.clone());

        let header = &lines[..lines.len().min(self.parser.single_receipt_header_lines)];
        let store = self
            .stores
            .identify_known(header)
            .unwrap_or_else(|| Store::new(self.ocr.default_store.clone()));

        let (total, total_synthesized) = match total {
            Some(t) => (t, false),
            None => (round2(items.iter().map(|i| i.price).sum()), true),
        };

        Ok(Ticket {
            id: ocr_ticket_id(&store.name, date, &time, &items, total),
            date,
            time,
            total,
            store,
            items,
            total_synthesized,
        })
    }

    /// Parse text from an image: structured layout first, OCR layout second
    pub fn parse_image_text(
        &self,
        text: &str,
        today: NaiveDate,
    ) -> std::result::Result<Ticket, Rejection> {
        match self.parse_single(text) {
            Ok(ticket) => Ok(ticket),
            Err(first) => {
                debug!("Structured parse failed ({}), trying OCR layout", first);
                self.parse_ocr(text, today)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::Category;

    fn parser() -> ReceiptParser {
        ReceiptParser::new(&Config::embedded().unwrap()).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_sanitizer_formats() {
        let today = day(2024, 6, 1);
        assert_eq!(sanitize_date("Fecha 15/03/2024", today), day(2024, 3, 15));
        assert_eq!(sanitize_date("15.03.24 12:01", today), day(2024, 3, 15));
        assert_eq!(sanitize_date("2024-03-15", today), day(2024, 3, 15));
        assert_eq!(sanitize_date("1/2/2024", today), day(2024, 2, 1));
    }

    #[test]
    fn test_date_sanitizer_rejects_implausible() {
        let today = day(2024, 6, 1);
        // OCR turned 2024 into 1024, then a plausible one follows
        assert_eq!(
            sanitize_date("15/03/1024 ... 16/03/2024", today),
            day(2024, 3, 16)
        );
        // Future beyond tomorrow
        assert_eq!(sanitize_date("15/03/2030", today), today);
        // Tomorrow is tolerated
        assert_eq!(sanitize_date("02/06/2024", today), day(2024, 6, 2));
        assert_eq!(sanitize_date("no date here", today), today);
    }

    #[test]
    fn test_ocr_layout_with_total() {
        let text = "LIDL\nC/ MAYOR 1\n12/04/2024 18:42\nLECHE SEMI 0,89 A\nPLATANO 1,78 B\n2 x 0,89\nTOTAL 2,67\nTARJETA 2,67";
        let ticket = parser().parse_ocr(text, day(2024, 6, 1)).unwrap();
        assert_eq!(ticket.date, day(2024, 4, 12));
        assert_eq!(ticket.time, "18:42");
        assert_eq!(ticket.store.name, "Lidl");
        assert_eq!(ticket.items.len(), 2);
        assert_eq!(ticket.items[0].category, Category::Dairy);
        assert_eq!(ticket.items[1].quantity, 2);
        assert_eq!(ticket.items[1].unit_price, 0.89);
        assert_eq!(ticket.total, 2.67);
        assert!(!ticket.total_synthesized);
        assert!(ticket.id.starts_with("LIDL-20240412-"));
    }

    #[test]
    fn test_ocr_synthesizes_missing_total() {
        let text = "SUPER\nPAN BARRA 0,60\nQUESO FRESCO 2,15\n";
        let today = day(2024, 6, 1);
        let ticket = parser().parse_ocr(text, today).unwrap();
        assert_eq!(ticket.total, 2.75);
        assert!(ticket.total_synthesized);
        assert_eq!(ticket.date, today);
        assert_eq!(ticket.time, "12:00");
    }

    #[test]
    fn test_ocr_total_on_next_line_and_sanitized() {
        let text = "PAN BARRA 0,60\nA PAGAR\n4567\n";
        let ticket = parser().parse_ocr(text, day(2024, 6, 1)).unwrap();
        // "4567" has no decimals so the next-line form does not apply
        assert!(ticket.total_synthesized);

        let text = "PAN BARRA 0,60\nA PAGAR\n0,60 €\n";
        let ticket = parser().parse_ocr(text, day(2024, 6, 1)).unwrap();
        assert_eq!(ticket.total, 0.6);
        assert!(!ticket.total_synthesized);
    }

    #[test]
    fn test_ocr_keeps_whole_euro_prices() {
        let text = "JAMON 60,00\nTOTAL 60,00";
        let ticket = parser().parse_ocr(text, day(2024, 6, 1)).unwrap();
        assert_eq!(ticket.items[0].price, 60.0);
        assert_eq!(ticket.total, 60.0);
        assert!(!ticket.total_synthesized);
    }

    #[test]
    fn test_ocr_drops_zero_and_negative_prices() {
        let text = "DESCUENTO -0,50\nBOLSA 0,00\nAGUA 0,35\nTOTAL 0,35";
        let ticket = parser().parse_ocr(text, day(2024, 6, 1)).unwrap();
        assert_eq!(ticket.items.len(), 1);
        assert_eq!(ticket.items[0].name, "AGUA");
    }

    #[test]
    fn test_ocr_id_is_deterministic() {
        let text = "PAN BARRA 0,60\n10/05/2024";
        let a = parser().parse_ocr(text, day(2024, 6, 1)).unwrap();
        let b = parser().parse_ocr(text, day(2024, 6, 1)).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_ocr_id_covers_time_prices_and_total() {
        let today = day(2024, 6, 1);
        let morning = parser()
            .parse_ocr("LIDL\n10/05/2024 10:00\nPAN BARRA 0,60\nTOTAL 0,60", today)
            .unwrap();
        let evening = parser()
            .parse_ocr("LIDL\n10/05/2024 19:00\nPAN BARRA 1,20\nTOTAL 1,20", today)
            .unwrap();
        assert!(morning.id.starts_with("LIDL-20240510-"));
        assert!(evening.id.starts_with("LIDL-20240510-"));
        assert_ne!(morning.id, evening.id);

        // Same basket at another time of day
        let later = parser()
            .parse_ocr("LIDL\n10/05/2024 19:00\nPAN BARRA 0,60\nTOTAL 0,60", today)
            .unwrap();
        assert_ne!(morning.id, later.id);
    }

    #[test]
    fn test_ocr_without_items_rejected() {
        assert_eq!(
            parser().parse_ocr("TOTAL 3,00", day(2024, 6, 1)).unwrap_err(),
            Rejection::NoItems
        );
    }

    #[test]
    fn test_image_text_prefers_structured_layout() {
        let text = "GALAPAGAR\n02/01/2024 18:00\nFACTURA SIMPLIFICADA: 9999-000-111\nDescripción P. Unit Importe\n1 AGUA 0,60\nTOTAL (€) 0,60";
        let ticket = parser().parse_image_text(text, day(2024, 6, 1)).unwrap();
        assert_eq!(ticket.id, "9999-000-111");

        let ticket = parser()
            .parse_image_text("PAN BARRA 0,60", day(2024, 6, 1))
            .unwrap();
        assert!(ticket.total_synthesized);
    }
}
