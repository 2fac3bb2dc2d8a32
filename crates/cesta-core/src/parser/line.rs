//! Single receipt body line parsing
//!
//! Each strategy is a function from a trimmed line to `Option<ParsedLine>`,
//! tried in order until one matches:
//!
//! 1. Full form: `2 LECHE ENTERA 1,20 2,40`
//! 2. Collapsed form: `1 LECHE ENTERA1,20` (price glued to the name)
//! 3. Single amount: `1 PECHUGA POLLO 5,30`
//!
//! Weighed products print a second line (`0,450 kg 3,50 €/kg 1,58`) that
//! revises the previous item instead of creating a new one.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::ParserConfig;
use crate::error::Result;
use crate::sanitize::{parse_amount, round2};

/// Amount token: 1-4 integer digits, comma or dot, 2 decimals
const AMOUNT: &str = r"\d{1,4}[,.]\d{2}";

static FULL_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(\d{{1,3}})\s+(.+?)\s+({AMOUNT})\s+({AMOUNT})$")).expect("valid regex")
});

static COLLAPSED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(\d{{1,3}})\s+(.*?[^\d\s,.])({AMOUNT})(?:\s+({AMOUNT}))?$"
    ))
    .expect("valid regex")
});

static COLLAPSED_AMOUNTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(\d{{1,3}})\s+(.+?)\s+({AMOUNT})({AMOUNT})$")).expect("valid regex")
});

static SINGLE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(\d{{1,3}})\s+(.+?)\s+({AMOUNT})$")).expect("valid regex")
});

static WEIGHT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+[,.]\d+)\s*kg\s*(\d+[,.]\d+)\s*€?\s*/\s*kg\s*(\d+[,.]\d+)$")
        .expect("valid regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Fields recovered from an item line
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub quantity: u32,
    pub name: String,
    pub unit_price: f64,
    pub line_price: f64,
}

/// A weighed-product continuation line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightLine {
    pub weight: f64,
    pub price_per_kg: f64,
    pub final_price: f64,
}

/// Outcome of parsing one body line
#[derive(Debug, Clone, PartialEq)]
pub enum LineParse {
    Item(ParsedLine),
    Weight(WeightLine),
    /// Deny-listed or priced at zero
    Skipped,
    NoMatch,
}

type Strategy = fn(&str) -> Option<ParsedLine>;

const STRATEGIES: &[Strategy] = &[full_form, collapsed_form, single_amount_form];

/// Parses item lines, with the configured deny-lists applied
#[derive(Debug, Clone)]
pub struct LineParser {
    deny_words: Option<Regex>,
    deny_prefixes: Vec<String>,
}

impl LineParser {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let deny_words = if config.skip_keywords.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = config
                .skip_keywords
                .iter()
                .map(|w| word_pattern(w))
                .collect();
            Some(Regex::new(&format!("(?i)(?:{})", alternatives.join("|")))?)
        };

        Ok(Self {
            deny_words,
            deny_prefixes: config.skip_prefixes.clone(),
        })
    }

    /// True for payment, tax and fee lines that are never products
    pub fn is_denied(&self, line: &str) -> bool {
        let upper = line.trim().to_uppercase();
        if self.deny_prefixes.iter().any(|p| upper.starts_with(p.as_str())) {
            return true;
        }
        self.deny_words
            .as_ref()
            .is_some_and(|re| re.is_match(&upper))
    }

    pub fn parse(&self, line: &str) -> LineParse {
        let line = line.trim();
        if line.is_empty() || self.is_denied(line) {
            return LineParse::Skipped;
        }

        if let Some(weight) = parse_weight_line(line) {
            return LineParse::Weight(weight);
        }

        for strategy in STRATEGIES {
            if let Some(parsed) = strategy(line) {
                // A later form may split the line differently
                if parsed.name.chars().count() < 2 {
                    continue;
                }
                if parsed.line_price <= 0.0 {
                    return LineParse::Skipped;
                }
                return LineParse::Item(parsed);
            }
        }

        LineParse::NoMatch
    }
}

/// Whole-word pattern for a deny keyword
fn word_pattern(word: &str) -> String {
    let escaped = regex::escape(word);
    let start = if word.starts_with(char::is_alphanumeric) {
        r"\b"
    } else {
        ""
    };
    let end = if word.ends_with(char::is_alphanumeric) {
        r"\b"
    } else {
        ""
    };
    format!("{start}{escaped}{end}")
}

/// Collapse whitespace and strip quote artifacts left by extraction
pub fn clean_name(raw: &str) -> String {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ");
    collapsed
        .trim_matches(|c| matches!(c, '`' | '\'' | '"'))
        .trim()
        .to_string()
}

pub fn parse_weight_line(line: &str) -> Option<WeightLine> {
    let caps = WEIGHT_LINE.captures(line.trim())?;
    Some(WeightLine {
        weight: parse_amount(&caps[1])?,
        price_per_kg: parse_amount(&caps[2])?,
        final_price: round2(parse_amount(&caps[3])?),
    })
}

fn build(qty: &str, name: &str, first: &str, second: Option<&str>) -> Option<ParsedLine> {
    let raw_qty: u32 = qty.parse().ok()?;
    let first = parse_amount(first)?;

    let (unit_price, line_price) = match second {
        Some(second) => (first, parse_amount(second)?),
        None if raw_qty > 0 => (first / f64::from(raw_qty), first),
        None => (first, first),
    };

    Some(ParsedLine {
        quantity: raw_qty.max(1),
        name: clean_name(name),
        unit_price: round2(unit_price),
        line_price: round2(line_price),
    })
}

fn full_form(line: &str) -> Option<ParsedLine> {
    let caps = FULL_FORM.captures(line)?;
    build(&caps[1], &caps[2], &caps[3], Some(&caps[4]))
}

fn collapsed_form(line: &str) -> Option<ParsedLine> {
    if let Some(caps) = COLLAPSED_NAME.captures(line) {
        return build(
            &caps[1],
            &caps[2],
            &caps[3],
            caps.get(4).map(|m| m.as_str()),
        );
    }
    let caps = COLLAPSED_AMOUNTS.captures(line)?;
    build(&caps[1], &caps[2], &caps[3], Some(&caps[4]))
}

fn single_amount_form(line: &str) -> Option<ParsedLine> {
    let caps = SINGLE_AMOUNT.captures(line)?;
    build(&caps[1], &caps[2], &caps[3], None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> LineParser {
        LineParser::new(&ParserConfig::default()).unwrap()
    }

    fn item(result: LineParse) -> ParsedLine {
        match result {
            LineParse::Item(p) => p,
            other => panic!("expected item, got {:?}", other),
        }
    }

    #[test]
    fn test_full_form() {
        let p = item(parser().parse("2 LECHE ENTERA 1,20 2,40"));
        assert_eq!(p.quantity, 2);
        assert_eq!(p.name, "LECHE ENTERA");
        assert_eq!(p.unit_price, 1.2);
        assert_eq!(p.line_price, 2.4);
    }

    #[test]
    fn test_single_amount_divides_by_quantity() {
        let p = item(parser().parse("3 TOMATE 1,50"));
        assert_eq!(p.quantity, 3);
        assert_eq!(p.unit_price, 0.5);
        assert_eq!(p.line_price, 1.5);

        let p = item(parser().parse("1 PECHUGA POLLO 5,30"));
        assert_eq!(p.name, "PECHUGA POLLO");
        assert_eq!(p.unit_price, 5.3);
    }

    #[test]
    fn test_zero_quantity_keeps_amount_as_unit_price() {
        let p = item(parser().parse("0 BOLSA 0,15"));
        assert_eq!(p.unit_price, 0.15);
        assert_eq!(p.line_price, 0.15);
        assert_eq!(p.quantity, 1);
    }

    #[test]
    fn test_collapsed_forms() {
        let p = item(parser().parse("1 PAN DE MOLDE1,25"));
        assert_eq!(p.name, "PAN DE MOLDE");
        assert_eq!(p.line_price, 1.25);

        let p = item(parser().parse("2 YOGUR GRIEGO1,10 2,20"));
        assert_eq!(p.name, "YOGUR GRIEGO");
        assert_eq!(p.unit_price, 1.1);
        assert_eq!(p.line_price, 2.2);

        let p = item(parser().parse("2 YOGUR GRIEGO 1,102,20"));
        assert_eq!(p.unit_price, 1.1);
        assert_eq!(p.line_price, 2.2);
    }

    #[test]
    fn test_weight_line() {
        let result = parser().parse("0,450 kg 3,50 €/kg 1,58");
        assert_eq!(
            result,
            LineParse::Weight(WeightLine {
                weight: 0.45,
                price_per_kg: 3.5,
                final_price: 1.58,
            })
        );
    }

    #[test]
    fn test_deny_list() {
        let p = parser();
        assert_eq!(p.parse("TARJETA BANCARIA 45,67"), LineParse::Skipped);
        assert_eq!(p.parse("1 IVA 21% 0,50"), LineParse::Skipped);
        assert_eq!(p.parse("TOTAL (€) 45,67"), LineParse::Skipped);
        assert_eq!(p.parse("1 PARKING 0,00"), LineParse::Skipped);
        // Whole words only
        let olive = item(p.parse("1 ACEITE OLIVA 4,50"));
        assert_eq!(olive.name, "ACEITE OLIVA");
    }

    #[test]
    fn test_non_positive_price_skipped() {
        assert_eq!(parser().parse("1 REGALO 0,00"), LineParse::Skipped);
    }

    #[test]
    fn test_no_match() {
        let p = parser();
        assert_eq!(p.parse("MERCADONA, S.A."), LineParse::NoMatch);
        assert_eq!(p.parse("1 X 1,00"), LineParse::NoMatch);
        assert_eq!(p.parse(""), LineParse::Skipped);
    }

    #[test]
    fn test_short_name_falls_through_to_next_form() {
        // The two-amount form reads the name as "X"; the one-amount form does not
        let p = item(parser().parse("1 X 2,40 3,00"));
        assert_eq!(p.name, "X 2,40");
        assert_eq!(p.line_price, 3.0);
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("  `QUESO   FRESCO'  "), "QUESO FRESCO");
        assert_eq!(clean_name("\"AGUA\""), "AGUA");
    }
}
