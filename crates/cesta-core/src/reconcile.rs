//! Product identity reconciliation
//!
//! The same product shows up under several spellings across receipts (OCR
//! noise, layout changes, abbreviations). `ProductMapping` groups those raw
//! aliases under a canonical display name chosen by the user.
//!
//! The forward map (canonical -> aliases) is the source of truth and the only
//! part that is persisted. The reverse index (alias key -> canonical) is
//! rebuilt wholesale after every mutation so `normalize` stays a hash lookup.
//! Catalogs are bounded by one household's purchases, so a full rebuild is
//! cheap; an incremental index would keep the same external contract.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ReconcileConfig;

/// Lookup key for an alias: trimmed and lowercased
pub fn alias_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Canonical display name -> raw aliases
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "MappingRepr", into = "BTreeMap<String, Vec<String>>")]
pub struct ProductMapping {
    groups: BTreeMap<String, Vec<String>>,
    reverse: HashMap<String, String>,
}

/// On-disk shapes: the grouped form, or the older flat alias -> canonical map
#[derive(Deserialize)]
#[serde(untagged)]
enum MappingRepr {
    Grouped(BTreeMap<String, Vec<String>>),
    Legacy(BTreeMap<String, String>),
}

impl From<MappingRepr> for ProductMapping {
    fn from(repr: MappingRepr) -> Self {
        match repr {
            MappingRepr::Grouped(groups) => ProductMapping::from_groups(groups),
            MappingRepr::Legacy(flat) => {
                let mut mapping = ProductMapping::default();
                for (alias, canonical) in flat {
                    mapping.insert_alias(&alias, &canonical);
                }
                mapping.prune_empty();
                mapping.rebuild_index();
                mapping
            }
        }
    }
}

impl From<ProductMapping> for BTreeMap<String, Vec<String>> {
    fn from(mapping: ProductMapping) -> Self {
        mapping.groups
    }
}

/// A pair of names that probably refer to the same product
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub a: String,
    pub b: String,
    /// Similarity, 0-100
    pub score: f64,
}

impl ProductMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a grouped map, enforcing one group per alias
    ///
    /// When an alias appears in several groups the first group (in name
    /// order) keeps it.
    pub fn from_groups(groups: BTreeMap<String, Vec<String>>) -> Self {
        let mut mapping = ProductMapping::default();
        let mut claimed = HashSet::new();
        for (canonical, aliases) in groups {
            let canonical = canonical.trim().to_string();
            if canonical.is_empty() {
                continue;
            }
            let mut kept = Vec::with_capacity(aliases.len());
            for alias in aliases {
                let alias = alias.trim().to_string();
                if !alias.is_empty() && claimed.insert(alias_key(&alias)) {
                    kept.push(alias);
                }
            }
            if !kept.is_empty() {
                mapping.groups.insert(canonical, kept);
            }
        }
        mapping.rebuild_index();
        mapping
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of canonical groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn aliases(&self, canonical: &str) -> Option<&[String]> {
        self.groups.get(canonical).map(Vec::as_slice)
    }

    /// Canonical name for a raw name, if it is grouped
    pub fn canonical_for(&self, raw: &str) -> Option<&str> {
        self.reverse.get(&alias_key(raw)).map(String::as_str)
    }

    /// Canonical name for a raw name, or the raw name itself
    pub fn normalize<'a>(&'a self, raw: &'a str) -> &'a str {
        self.canonical_for(raw).unwrap_or(raw)
    }

    /// Move `raw` into `canonical`'s group, or unlink it when `None`
    ///
    /// The alias is first removed from every group (emptied groups are
    /// deleted), then added to the target. Blank names are ignored.
    pub fn link(&mut self, raw: &str, canonical: Option<&str>) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }

        self.remove_alias(raw);
        if let Some(canonical) = canonical.map(str::trim).filter(|c| !c.is_empty()) {
            self.insert_alias(raw, canonical);
        }
        self.prune_empty();
        self.rebuild_index();
    }

    pub fn unlink(&mut self, raw: &str) {
        self.link(raw, None);
    }

    /// Rename a group, merging into an existing group of the new name
    ///
    /// Returns false if `old` does not exist.
    pub fn rename_group(&mut self, old: &str, new: &str) -> bool {
        let new = new.trim();
        if new.is_empty() {
            return false;
        }
        let Some(aliases) = self.groups.remove(old) else {
            return false;
        };
        for alias in aliases {
            self.insert_alias(&alias, new);
        }
        self.rebuild_index();
        true
    }

    /// Group two suggested names under the shorter of the two
    ///
    /// Returns the canonical name used.
    pub fn accept_suggestion(&mut self, a: &str, b: &str) -> String {
        let canonical = if a.trim().chars().count() <= b.trim().chars().count() {
            a.trim().to_string()
        } else {
            b.trim().to_string()
        };
        self.link(a, Some(&canonical));
        self.link(b, Some(&canonical));
        canonical
    }

    /// Names not yet part of any group, deduplicated by alias key and sorted
    pub fn unmapped<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut result: Vec<String> = names
            .iter()
            .map(|n| n.as_ref().trim())
            .filter(|n| !n.is_empty())
            .filter(|n| {
                !self.reverse.contains_key(&alias_key(n)) && !self.groups.contains_key(*n)
            })
            .filter(|n| seen.insert(alias_key(n)))
            .map(str::to_string)
            .collect();
        result.sort();
        result
    }

    /// Likely duplicate pairs within `pool`, best first
    ///
    /// All pairs are compared, so cost is quadratic in the pool size times the
    /// cost of one edit distance. The pool is truncated to
    /// `config.max_pool_size` to keep that bounded.
    pub fn suggest<S: AsRef<str>>(&self, pool: &[S], config: &ReconcileConfig) -> Vec<Suggestion> {
        let mut names: Vec<&str> = pool.iter().map(|n| n.as_ref().trim()).collect();
        if names.len() > config.max_pool_size {
            warn!(
                "Suggestion pool of {} names truncated to {}",
                names.len(),
                config.max_pool_size
            );
            names.truncate(config.max_pool_size);
        }

        let mut suggestions = Vec::new();
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let (a, b) = (names[i], names[j]);
                if a.is_empty() || b.is_empty() || alias_key(a) == alias_key(b) {
                    continue;
                }
                let score = similarity(a, b);
                if score > config.similarity_threshold {
                    suggestions.push(Suggestion {
                        a: a.to_string(),
                        b: b.to_string(),
                        score,
                    });
                }
            }
        }

        suggestions.sort_by(|x, y| {
            y.score
                .total_cmp(&x.score)
                .then_with(|| x.a.cmp(&y.a))
                .then_with(|| x.b.cmp(&y.b))
        });
        suggestions
    }

    fn insert_alias(&mut self, raw: &str, canonical: &str) {
        let raw = raw.trim();
        let canonical = canonical.trim();
        if raw.is_empty() || canonical.is_empty() {
            return;
        }
        let key = alias_key(raw);
        let group = self.groups.entry(canonical.to_string()).or_default();
        if !group.iter().any(|a| alias_key(a) == key) {
            group.push(raw.to_string());
        }
    }

    fn remove_alias(&mut self, raw: &str) {
        let key = alias_key(raw);
        for aliases in self.groups.values_mut() {
            aliases.retain(|a| alias_key(a) != key);
        }
    }

    fn prune_empty(&mut self) {
        self.groups.retain(|_, aliases| !aliases.is_empty());
    }

    fn rebuild_index(&mut self) {
        self.reverse.clear();
        for (canonical, aliases) in &self.groups {
            for alias in aliases {
                self.reverse.insert(alias_key(alias), canonical.clone());
            }
        }
    }
}

/// Case and whitespace insensitive similarity, 0-100
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let b = b.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 100.0;
    }
    let distance = strsim::levenshtein(&a, &b);
    (longest - distance) as f64 / longest as f64 * 100.0
}
