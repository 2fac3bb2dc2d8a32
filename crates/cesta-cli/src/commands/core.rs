//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_state` - Shared utility to load config and stored state
//! - `cmd_categorize` - Explain the category of a product name
//! - `cmd_migrate` - Re-parse stored receipts

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cesta_core::categorize::MatchSource;
use cesta_core::{AppState, Categorizer, Config, FileStore};

use super::print_warnings;

/// Load config for a data directory
pub fn load_config(data_dir: &Path, config: Option<&Path>) -> Result<Config> {
    Config::load(data_dir, config).context("Failed to load config")
}

/// Open stored state, migrating it if it was written by an older parser
pub fn open_state(data_dir: &Path, config: Option<&Path>) -> Result<AppState> {
    let config = load_config(data_dir, config)?;
    let store = FileStore::new(data_dir)
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;
    AppState::open(config, Arc::new(store)).context("Failed to load stored tickets")
}

pub fn cmd_categorize(data_dir: &Path, config: Option<&Path>, name: &str) -> Result<()> {
    let config = load_config(data_dir, config)?;
    let categorizer = Categorizer::new(&config).context("Invalid category rules")?;
    let found = categorizer.explain(name);

    println!(
        "🏷️  {} → {} ({})",
        name,
        config.category_name(found.category),
        found.category
    );
    match found.source {
        MatchSource::Rule { index, pattern } => {
            println!("   Matched priority rule #{}: {}", index + 1, pattern)
        }
        MatchSource::Keyword(keyword) => println!("   Matched keyword: {}", keyword),
        MatchSource::Fallback => println!("   No rule or keyword matched"),
    }
    Ok(())
}

pub fn cmd_migrate(data_dir: &Path, config: Option<&Path>) -> Result<()> {
    println!("🔄 Re-parsing stored receipts...");

    let mut state = open_state(data_dir, config)?;
    let (report, warnings) = state.force_migration();

    println!("   Re-parsed from raw text: {}", report.reparsed);
    println!("   Re-categorized:          {}", report.recategorized);
    if report.unparseable > 0 {
        println!("   ⚠️  Unparseable raw texts: {}", report.unparseable);
    }
    print_warnings(&warnings);
    println!(
        "✅ {} tickets at parser version {}",
        state.collection().tickets.len(),
        cesta_core::PARSER_VERSION
    );
    Ok(())
}
