//! Store identification from receipt header lines

use crate::config::{Config, StoreRule};
use crate::models::Store;

/// Ordered store lookup table
#[derive(Debug, Clone)]
pub struct StoreIdentifier {
    rules: Vec<StoreRule>,
    default_name: String,
}

impl StoreIdentifier {
    pub fn new(config: &Config) -> Self {
        Self {
            rules: config.stores.clone(),
            default_name: config.default_store.clone(),
        }
    }

    /// Resolve the store from the first lines of a receipt
    ///
    /// Lines are scanned top to bottom and each line is checked against the
    /// table in order, so the earliest header line that names a location wins.
    pub fn identify<S: AsRef<str>>(&self, header_lines: &[S]) -> Store {
        self.identify_known(header_lines)
            .unwrap_or_else(|| self.default_store())
    }

    /// Like `identify`, but `None` when no table entry matches
    pub fn identify_known<S: AsRef<str>>(&self, header_lines: &[S]) -> Option<Store> {
        for line in header_lines {
            let upper = line.as_ref().to_uppercase();
            for rule in &self.rules {
                if rule.exclude.iter().any(|e| upper.contains(e.as_str())) {
                    continue;
                }
                if rule.keywords.iter().any(|k| upper.contains(k.as_str())) {
                    return Some(Store {
                        name: rule.name.clone(),
                        city: rule.city.clone(),
                    });
                }
            }
        }
        None
    }

    pub fn default_store(&self) -> Store {
        Store::new(self.default_name.clone())
    }
}
