//! Product categorization engine
//!
//! Classification is two-staged:
//! 1. Priority rules, in order. These exist for compound names where a plain
//!    keyword scan picks the wrong bucket ("QUESO RALLADO PIZZA" is frozen,
//!    not dairy).
//! 2. Category keyword lists, in declaration order, skipping the catch-all.
//!
//! Anything left over lands in the catch-all. Categorizing never fails.

use regex::Regex;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::models::{Category, PatternType};

/// Why a name ended up in its category
#[derive(Debug, Clone, PartialEq)]
pub enum MatchSource {
    /// Matched the priority rule at this index
    Rule { index: usize, pattern: String },
    /// Matched a category keyword
    Keyword(String),
    /// Nothing matched
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMatch {
    pub category: Category,
    pub source: MatchSource,
}

enum Matcher {
    /// Upper-cased alternatives, any one matching is enough
    Contains(Vec<String>),
    Regex(Regex),
    Exact(String),
}

impl Matcher {
    fn build(pattern: &str, pattern_type: PatternType) -> Result<Self> {
        Ok(match pattern_type {
            PatternType::Contains => Matcher::Contains(
                pattern
                    .split('|')
                    .map(|p| p.to_uppercase())
                    .filter(|p| !p.is_empty())
                    .collect(),
            ),
            PatternType::Regex => Matcher::Regex(Regex::new(pattern)?),
            PatternType::Exact => Matcher::Exact(pattern.trim().to_uppercase()),
        })
    }

    fn matches(&self, name: &str, name_upper: &str) -> bool {
        match self {
            Matcher::Contains(parts) => parts.iter().any(|p| name_upper.contains(p.as_str())),
            Matcher::Regex(re) => re.is_match(name) || re.is_match(name_upper),
            Matcher::Exact(expected) => name_upper.trim() == expected,
        }
    }
}

struct CompiledRule {
    pattern: String,
    matcher: Matcher,
    category: Category,
}

/// Compiled rule set, built once per configuration
pub struct Categorizer {
    rules: Vec<CompiledRule>,
    keywords: Vec<(Category, Vec<String>)>,
}

impl Categorizer {
    pub fn new(config: &Config) -> Result<Self> {
        let mut rules = Vec::with_capacity(config.priority_rules.len());
        for rule in &config.priority_rules {
            rules.push(CompiledRule {
                pattern: rule.pattern.clone(),
                matcher: Matcher::build(&rule.pattern, rule.pattern_type)?,
                category: rule.category,
            });
        }

        let keywords = config
            .categories
            .iter()
            .filter(|c| !c.key.is_catch_all())
            .map(|c| (c.key, c.keywords.clone()))
            .collect();

        Ok(Self { rules, keywords })
    }

    /// Category for a product name
    pub fn categorize(&self, name: &str) -> Category {
        self.explain(name).category
    }

    /// Category plus the rule or keyword that decided it
    pub fn explain(&self, name: &str) -> CategoryMatch {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return CategoryMatch {
                category: Category::Other,
                source: MatchSource::Fallback,
            };
        }
        let upper = trimmed.to_uppercase();

        for (index, rule) in self.rules.iter().enumerate() {
            if rule.matcher.matches(trimmed, &upper) {
                return CategoryMatch {
                    category: rule.category,
                    source: MatchSource::Rule {
                        index,
                        pattern: rule.pattern.clone(),
                    },
                };
            }
        }

        for (category, words) in &self.keywords {
            if let Some(word) = words.iter().find(|w| upper.contains(w.as_str())) {
                return CategoryMatch {
                    category: *category,
                    source: MatchSource::Keyword(word.clone()),
                };
            }
        }

        debug!("No category match for '{}'", trimmed);
        CategoryMatch {
            category: Category::Other,
            source: MatchSource::Fallback,
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
