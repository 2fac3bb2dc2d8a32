//! Domain models for Cesta

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::reconcile::ProductMapping;
use crate::sanitize::round2;

/// Bumped whenever parsing or categorization changes in a way that should
/// trigger a migration of stored data
pub const PARSER_VERSION: u32 = 3;

pub const DEFAULT_CURRENCY: &str = "EUR";

/// Fixed product categories
///
/// Keys are the stable identifiers written to disk. `Other` is the catch-all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Proteins,
    Dairy,
    Produce,
    Beverages,
    Frozen,
    Pantry,
    SweetsSnacks,
    HygieneCleaning,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proteins => "proteinas",
            Self::Dairy => "lacteos",
            Self::Produce => "frutas_verduras",
            Self::Beverages => "bebidas",
            Self::Frozen => "congelados",
            Self::Pantry => "despensa",
            Self::SweetsSnacks => "dulces_snacks",
            Self::HygieneCleaning => "higiene_limpieza",
            Self::Other => "otros",
        }
    }

    /// All categories in their default declaration order
    pub fn all() -> &'static [Category] {
        &[
            Self::Proteins,
            Self::Dairy,
            Self::Produce,
            Self::Beverages,
            Self::Frozen,
            Self::Pantry,
            Self::SweetsSnacks,
            Self::HygieneCleaning,
            Self::Other,
        ]
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, Self::Other)
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "proteinas" => Ok(Self::Proteins),
            "lacteos" => Ok(Self::Dairy),
            "frutas_verduras" => Ok(Self::Produce),
            "bebidas" => Ok(Self::Beverages),
            "congelados" => Ok(Self::Frozen),
            "despensa" => Ok(Self::Pantry),
            "dulces_snacks" => Ok(Self::SweetsSnacks),
            "higiene_limpieza" => Ok(Self::HygieneCleaning),
            "otros" => Ok(Self::Other),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// Unknown keys from older data land in the catch-all instead of failing the load
impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// How a priority rule pattern is matched against a product name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Case-insensitive substring match (supports | for OR)
    #[default]
    Contains,
    /// Regular expression match
    Regex,
    /// Exact string match (case-insensitive)
    Exact,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Regex => "regex",
            Self::Exact => "exact",
        }
    }
}

impl std::str::FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(Self::Contains),
            "regex" => Ok(Self::Regex),
            "exact" => Ok(Self::Exact),
            _ => Err(format!("Unknown pattern type: {}", s)),
        }
    }
}

/// A resolved store identity
///
/// Written to disk as the bare name. Older files that stored `{name, city}`
/// objects are still accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoreRepr", into = "String")]
pub struct Store {
    pub name: String,
    pub city: Option<String>,
}

impl Store {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            city: None,
        }
    }

    pub fn with_city(name: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            city: Some(city.into()),
        }
    }
}

impl std::fmt::Display for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<Store> for String {
    fn from(store: Store) -> Self {
        store.name
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoreRepr {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        city: Option<String>,
    },
}

impl From<StoreRepr> for Store {
    fn from(repr: StoreRepr) -> Self {
        match repr {
            StoreRepr::Name(name) => Store { name, city: None },
            StoreRepr::Detailed { name, city } => Store {
                name,
                city: city.filter(|c| !c.is_empty()),
            },
        }
    }
}

fn default_quantity() -> u32 {
    1
}

/// One product line on a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Name as printed, before reconciliation
    pub name: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub unit_price: f64,
    /// Line total. For weighed products, the amount actually charged.
    pub price: f64,
    /// Kilograms, only for weighed products
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// One parsed receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    /// Calendar date as printed on the receipt, no timezone attached
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    pub total: f64,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub items: Vec<Item>,
    /// Set when no total could be read and it was computed from the items
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub total_synthesized: bool,
}

impl Ticket {
    /// Sum of line prices
    pub fn items_total(&self) -> f64 {
        round2(self.items.iter().map(|i| i.price).sum())
    }

    /// Printed total minus the sum of line prices
    pub fn total_discrepancy(&self) -> f64 {
        round2(self.total - self.items_total())
    }
}

/// Display metadata for a category in the persisted collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    pub last_updated: NaiveDate,
    pub total_tickets: usize,
    pub currency: String,
    /// Absent in files written before versioning existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser_version: Option<u32>,
}

impl Default for CollectionMeta {
    fn default() -> Self {
        Self {
            last_updated: NaiveDate::default(),
            total_tickets: 0,
            currency: DEFAULT_CURRENCY.to_string(),
            parser_version: None,
        }
    }
}

/// The persisted ticket collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(default)]
    pub meta: CollectionMeta,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryInfo>,
    #[serde(default)]
    pub product_mapping: ProductMapping,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
}

impl Collection {
    /// Parse a collection file, repairing legacy date shapes first
    ///
    /// A bare JSON array of tickets is accepted as well.
    pub fn from_json(content: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(content)?;
        if value.is_array() {
            value = serde_json::json!({ "tickets": value });
        }
        if !value.is_object() {
            return Err(Error::InvalidData(
                "Collection must be a JSON object or array of tickets".to_string(),
            ));
        }

        let fixed = normalize_legacy_dates(&mut value);
        if fixed > 0 {
            debug!("Corrected {} legacy DD/MM/YYYY ticket dates", fixed);
        }

        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Refresh the meta block after the ticket list changed
    pub fn touch(&mut self, today: NaiveDate) {
        self.meta.last_updated = today;
        self.meta.total_tickets = self.tickets.len();
        if self.meta.currency.is_empty() {
            self.meta.currency = DEFAULT_CURRENCY.to_string();
        }
    }

    pub fn is_current(&self) -> bool {
        self.meta.parser_version == Some(PARSER_VERSION)
    }

    /// Distinct raw item names across all tickets, sorted
    pub fn distinct_item_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tickets
            .iter()
            .flat_map(|t| t.items.iter().map(|i| i.name.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

static LEGACY_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("valid regex"));

/// Rewrite `DD/MM/YYYY` ticket dates to `YYYY-MM-DD` in place
///
/// Returns the number of dates corrected.
pub fn normalize_legacy_dates(value: &mut Value) -> usize {
    let Some(tickets) = value.get_mut("tickets").and_then(Value::as_array_mut) else {
        return 0;
    };

    let mut fixed = 0;
    for ticket in tickets {
        let Some(date) = ticket.get_mut("date") else {
            continue;
        };
        let Some(raw) = date.as_str() else {
            continue;
        };
        if let Some(caps) = LEGACY_DATE.captures(raw) {
            let iso = format!("{}-{:0>2}-{:0>2}", &caps[3], &caps[2], &caps[1]);
            *date = Value::String(iso);
            fixed += 1;
        }
    }
    fixed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_keys() {
        for cat in Category::all() {
            assert_eq!(cat.as_str().parse::<Category>().unwrap(), *cat);
        }
        assert!("unknown".parse::<Category>().is_err());
    }

    #[test]
    fn test_unknown_category_deserializes_to_catch_all() {
        let cat: Category = serde_json::from_str("\"mascotas\"").unwrap();
        assert_eq!(cat, Category::Other);
    }

    #[test]
    fn test_store_accepts_string_and_object() {
        let a: Store = serde_json::from_str("\"Mercadona\"").unwrap();
        assert_eq!(a, Store::new("Mercadona"));

        let b: Store =
            serde_json::from_str(r#"{"name": "Mercadona Pozuelo", "city": "POZUELO"}"#).unwrap();
        assert_eq!(b.name, "Mercadona Pozuelo");
        assert_eq!(b.city.as_deref(), Some("POZUELO"));

        assert_eq!(serde_json::to_string(&b).unwrap(), "\"Mercadona Pozuelo\"");
    }

    #[test]
    fn test_ticket_serializes_camel_case_and_iso_date() {
        let ticket = Ticket {
            id: "1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            time: "10:30".to_string(),
            total: 2.5,
            store: Store::new("Mercadona"),
            items: vec![Item {
                name: "PAN".to_string(),
                category: Category::Pantry,
                quantity: 2,
                unit_price: 1.25,
                price: 2.5,
                weight: None,
            }],
            total_synthesized: false,
        };
        let json = serde_json::to_value(&ticket).unwrap();
        assert_eq!(json["date"], "2024-01-15");
        assert_eq!(json["items"][0]["unitPrice"], 1.25);
        assert!(json.get("totalSynthesized").is_none());
        assert!(json["items"][0].get("weight").is_none());
    }

    #[test]
    fn test_legacy_dates_are_corrected() {
        let content = r#"{"tickets": [
            {"id": "a", "date": "15/01/2024", "total": 1.0, "store": "X", "items": []},
            {"id": "b", "date": "2024-02-01", "total": 2.0, "store": "X", "items": []}
        ]}"#;
        let collection = Collection::from_json(content).unwrap();
        assert_eq!(
            collection.tickets[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(
            collection.tickets[1].date,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
    }

    #[test]
    fn test_bare_ticket_array_is_accepted() {
        let content = r#"[{"id": "a", "date": "2024-01-15", "total": 1.0, "store": "X"}]"#;
        let collection = Collection::from_json(content).unwrap();
        assert_eq!(collection.tickets.len(), 1);
        assert!(collection.meta.parser_version.is_none());
        assert!(collection.product_mapping.is_empty());
    }

    #[test]
    fn test_items_total_and_discrepancy() {
        let ticket = Ticket {
            id: "1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            time: String::new(),
            total: 3.0,
            store: Store::default(),
            items: vec![
                Item {
                    name: "A".to_string(),
                    category: Category::Other,
                    quantity: 1,
                    unit_price: 1.1,
                    price: 1.1,
                    weight: None,
                },
                Item {
                    name: "B".to_string(),
                    category: Category::Other,
                    quantity: 1,
                    unit_price: 1.7,
                    price: 1.7,
                    weight: None,
                },
            ],
            total_synthesized: false,
        };
        assert_eq!(ticket.items_total(), 2.8);
        assert_eq!(ticket.total_discrepancy(), 0.2);
    }
}
