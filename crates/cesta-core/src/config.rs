//! Rule and settings configuration
//!
//! Categories, priority rules, the store table and parser deny-lists are data,
//! tuned over time against real receipts. They live in TOML rather than code.
//!
//! ## Configuration Resolution
//!
//! 1. An explicit path (`--config`), which must exist
//! 2. The override in the data dir (`<data_dir>/config/cesta.toml`)
//! 3. Embedded defaults (compiled into binary)
//!
//! An override replaces the defaults entirely; sections it omits fall back to
//! built-in values, except categories which must always be listed.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Category, PatternType};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/cesta.toml");

/// A category with its display metadata and keyword list
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryConfig {
    pub key: Category,
    pub name: String,
    pub color: String,
    /// Upper-cased substrings, checked in order
    pub keywords: Vec<String>,
}

/// Pattern -> category override evaluated before keyword matching
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityRule {
    pub pattern: String,
    pub pattern_type: PatternType,
    pub category: Category,
}

/// One row of the store lookup table
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRule {
    /// Any of these (upper-cased) substrings selects the store
    pub keywords: Vec<String>,
    /// A line containing any of these never selects the store
    pub exclude: Vec<String>,
    pub name: String,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParserConfig {
    pub skip_keywords: Vec<String>,
    pub skip_prefixes: Vec<String>,
    pub multi_ticket_header_lines: usize,
    pub single_receipt_header_lines: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            skip_keywords: ["TARJETA", "IVA", "BASE", "CUOTA", "ENTREGA", "PARKING"]
                .into_iter()
                .map(String::from)
                .collect(),
            skip_prefixes: ["TOTAL", "N.C:", "AID:", "ARC:", "VERIFICADO", "IMPORTE:"]
                .into_iter()
                .map(String::from)
                .collect(),
            multi_ticket_header_lines: 10,
            single_receipt_header_lines: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrConfig {
    pub default_store: String,
    pub language: String,
    pub default_time: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            default_store: "Lidl".to_string(),
            language: "spa".to_string(),
            default_time: "12:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileConfig {
    /// Pairs must score strictly above this (0-100)
    pub similarity_threshold: f64,
    /// Upper bound on the suggestion pool
    pub max_pool_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 65.0,
            max_pool_size: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    /// Limit for each external OCR / PDF call
    pub timeout: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Declaration order is the keyword scan order
    pub categories: Vec<CategoryConfig>,
    pub priority_rules: Vec<PriorityRule>,
    pub stores: Vec<StoreRule>,
    pub default_store: String,
    pub parser: ParserConfig,
    pub ocr: OcrConfig,
    pub reconcile: ReconcileConfig,
    pub import: ImportConfig,
    /// Where this config was read from, `None` for embedded defaults
    pub source: Option<PathBuf>,
}

impl Config {
    /// The configuration compiled into the binary
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }

    /// Resolve configuration for a data directory
    pub fn load(data_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        let override_path = override_config_path(data_dir);
        if override_path.exists() {
            return Self::from_file(&override_path);
        }

        debug!("Using embedded default config");
        Self::embedded()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config = parse_config(&content)?;
        debug!("Loaded config from {}", path.display());
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Metadata for a category key
    pub fn category(&self, key: Category) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.key == key)
    }

    /// Display name for a category, falling back to its key
    pub fn category_name(&self, key: Category) -> String {
        self.category(key)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| key.as_str().to_string())
    }
}

/// Config override path inside a data directory
pub fn override_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config").join("cesta.toml")
}

/// Environment variable naming the data directory
pub const DATA_DIR_ENV: &str = "CESTA_DATA_DIR";

/// Default data directory (`~/.local/share/cesta` on Linux)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cesta")
}

/// Data directory: explicit path, then `CESTA_DATA_DIR`, then the default
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default_data_dir(),
    }
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    categories: Vec<RawCategory>,
    #[serde(default)]
    priority_rules: Vec<RawPriorityRule>,
    #[serde(default)]
    stores: Vec<RawStore>,
    store_defaults: Option<RawStoreDefaults>,
    parser: Option<RawParser>,
    ocr: Option<RawOcr>,
    reconcile: Option<RawReconcile>,
    import: Option<RawImport>,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    key: String,
    name: String,
    color: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawPriorityRule {
    pattern: String,
    pattern_type: Option<String>,
    category: String,
}

#[derive(Debug, Deserialize)]
struct RawStore {
    keywords: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    name: String,
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStoreDefaults {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawParser {
    skip_keywords: Option<Vec<String>>,
    skip_prefixes: Option<Vec<String>>,
    multi_ticket_header_lines: Option<usize>,
    single_receipt_header_lines: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawOcr {
    default_store: Option<String>,
    language: Option<String>,
    default_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReconcile {
    similarity_threshold: Option<f64>,
    max_pool_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawImport {
    timeout_secs: Option<u64>,
}

fn parse_category_key(key: &str) -> Result<Category> {
    key.parse::<Category>().map_err(Error::Config)
}

fn upper_all(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.to_uppercase())
        .filter(|v| !v.trim().is_empty())
        .collect()
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    if raw.categories.is_empty() {
        return Err(Error::Config("No categories configured".to_string()));
    }

    let mut seen = HashSet::new();
    let mut categories = Vec::with_capacity(raw.categories.len());
    for cat in raw.categories {
        let key = parse_category_key(&cat.key)?;
        if !seen.insert(key) {
            return Err(Error::Config(format!("Duplicate category: {}", cat.key)));
        }
        if key.is_catch_all() && !cat.keywords.is_empty() {
            return Err(Error::Config(format!(
                "Catch-all category '{}' must not have keywords",
                cat.key
            )));
        }
        categories.push(CategoryConfig {
            key,
            name: cat.name,
            color: cat.color.unwrap_or_else(|| "#7f8c8d".to_string()),
            keywords: upper_all(cat.keywords),
        });
    }
    if !seen.contains(&Category::Other) {
        return Err(Error::Config(
            "The catch-all category 'otros' must be configured".to_string(),
        ));
    }

    let mut priority_rules = Vec::with_capacity(raw.priority_rules.len());
    for rule in raw.priority_rules {
        let pattern_type = match rule.pattern_type {
            Some(t) => t.parse::<PatternType>().map_err(Error::Config)?,
            None => PatternType::Contains,
        };
        if pattern_type == PatternType::Regex {
            Regex::new(&rule.pattern).map_err(|e| {
                Error::Config(format!("Invalid rule regex '{}': {}", rule.pattern, e))
            })?;
        }
        priority_rules.push(PriorityRule {
            pattern: rule.pattern,
            pattern_type,
            category: parse_category_key(&rule.category)?,
        });
    }

    let stores = raw
        .stores
        .into_iter()
        .map(|s| StoreRule {
            keywords: upper_all(s.keywords),
            exclude: upper_all(s.exclude),
            name: s.name,
            city: s.city.filter(|c| !c.is_empty()),
        })
        .collect();

    let default_store = raw
        .store_defaults
        .and_then(|d| d.name)
        .unwrap_or_else(|| "Mercadona".to_string());

    let mut parser = ParserConfig::default();
    if let Some(p) = raw.parser {
        if let Some(words) = p.skip_keywords {
            parser.skip_keywords = upper_all(words);
        }
        if let Some(prefixes) = p.skip_prefixes {
            parser.skip_prefixes = upper_all(prefixes);
        }
        if let Some(n) = p.multi_ticket_header_lines {
            parser.multi_ticket_header_lines = n;
        }
        if let Some(n) = p.single_receipt_header_lines {
            parser.single_receipt_header_lines = n;
        }
    }

    let mut ocr = OcrConfig::default();
    if let Some(o) = raw.ocr {
        if let Some(store) = o.default_store {
            ocr.default_store = store;
        }
        if let Some(lang) = o.language {
            ocr.language = lang;
        }
        if let Some(time) = o.default_time {
            ocr.default_time = time;
        }
    }

    let mut reconcile = ReconcileConfig::default();
    if let Some(r) = raw.reconcile {
        if let Some(threshold) = r.similarity_threshold {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(Error::Config(format!(
                    "similarity_threshold must be within 0-100, got {}",
                    threshold
                )));
            }
            reconcile.similarity_threshold = threshold;
        }
        if let Some(max) = r.max_pool_size {
            reconcile.max_pool_size = max;
        }
    }

    let mut import = ImportConfig::default();
    if let Some(i) = raw.import {
        if let Some(secs) = i.timeout_secs {
            import.timeout = Duration::from_secs(secs);
        }
    }

    Ok(Config {
        categories,
        priority_rules,
        stores,
        default_store,
        parser,
        ocr,
        reconcile,
        import,
        source: None,
    })
}
