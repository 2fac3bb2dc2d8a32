//! Receipt text parsing
//!
//! - `line` - item line strategies and weighed-product continuations
//! - `ticket` - multi-ticket text dumps and single receipts (PDF text)
//! - `ocr` - noisier OCR layout with date sanitizing and total recovery
//!
//! All entry points are synchronous and pure given their inputs. A receipt that
//! lacks the minimum anchors yields a `Rejection`, never an error.

pub mod line;
pub mod ocr;
pub mod ticket;

use std::sync::LazyLock;

use regex::Regex;

use crate::categorize::Categorizer;
use crate::config::{Config, OcrConfig, ParserConfig};
use crate::error::Result;
use crate::models::Item;
use crate::store::StoreIdentifier;

pub use line::{LineParse, LineParser, ParsedLine, WeightLine};
pub use ocr::sanitize_date;

/// Items section starts after the column header ("Descripción ... Importe")
static ITEMS_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)descripci[oó]n").expect("valid regex"));

/// Items section ends at the TOTAL line
static ITEMS_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^TOTAL\b").expect("valid regex"));

/// Why a piece of text produced no ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingDate,
    MissingInvoice,
    MissingTotal,
    NoItems,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingDate => "missing date/time",
            Self::MissingInvoice => "missing invoice number",
            Self::MissingTotal => "missing total",
            Self::NoItems => "no items found",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsing front end shared by every receipt layout
pub struct ReceiptParser {
    categorizer: Categorizer,
    stores: StoreIdentifier,
    lines: LineParser,
    parser: ParserConfig,
    ocr: OcrConfig,
}

impl ReceiptParser {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            categorizer: Categorizer::new(config)?,
            stores: StoreIdentifier::new(config),
            lines: LineParser::new(&config.parser)?,
            parser: config.parser.clone(),
            ocr: config.ocr.clone(),
        })
    }

    pub fn categorizer(&self) -> &Categorizer {
        &self.categorizer
    }

    pub fn stores(&self) -> &StoreIdentifier {
        &self.stores
    }

    /// Build an item, assigning its category
    fn make_item(&self, parsed: ParsedLine) -> Item {
        Item {
            category: self.categorizer.categorize(&parsed.name),
            name: parsed.name,
            quantity: parsed.quantity,
            unit_price: parsed.unit_price,
            price: parsed.line_price,
            weight: None,
        }
    }

    /// Parse the items section of one receipt
    ///
    /// Without a column header the whole text up to TOTAL is scanned; only
    /// lines shaped like items survive the strategies anyway.
    fn parse_body(&self, lines: &[&str]) -> Vec<Item> {
        let start = lines
            .iter()
            .position(|l| ITEMS_HEADER.is_match(l))
            .map(|idx| idx + 1)
            .unwrap_or(0);

        let mut items: Vec<Item> = Vec::new();
        for raw in &lines[start..] {
            let line = raw.trim();
            if ITEMS_END.is_match(line) {
                break;
            }
            match self.lines.parse(line) {
                LineParse::Item(parsed) => items.push(self.make_item(parsed)),
                LineParse::Weight(weight) => {
                    if let Some(last) = items.last_mut() {
                        last.price = weight.final_price;
                        last.weight = Some(weight.weight);
                    }
                }
                LineParse::Skipped | LineParse::NoMatch => {}
            }
        }
        items
    }
}
