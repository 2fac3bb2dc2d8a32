//! Product group command implementations

use anyhow::Result;
use cesta_core::AppState;

use super::{print_warnings, truncate};

pub fn cmd_products_list(state: &AppState) -> Result<()> {
    let mapping = state.mapping();
    if mapping.is_empty() {
        println!("No product groups yet. Try: cesta products suggest");
        return Ok(());
    }

    println!();
    println!("📦 Product Groups ({})", mapping.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for (canonical, aliases) in mapping.groups() {
        println!("   {}", canonical);
        for alias in aliases {
            println!("      ← {}", alias);
        }
    }
    println!();
    Ok(())
}

pub fn cmd_products_unmapped(state: &AppState) -> Result<()> {
    let unmapped = state
        .mapping()
        .unmapped(&state.collection().distinct_item_names());

    if unmapped.is_empty() {
        println!("✅ Every product name belongs to a group");
        return Ok(());
    }

    println!();
    println!("❓ Ungrouped product names ({})", unmapped.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for name in &unmapped {
        println!("   {}", name);
    }
    println!();
    Ok(())
}

pub fn cmd_products_link(state: &mut AppState, raw: &str, canonical: &str) -> Result<()> {
    let warnings = state.link(raw, Some(canonical));
    print_warnings(&warnings);
    println!("✅ Linked '{}' → '{}'", raw, canonical);
    Ok(())
}

pub fn cmd_products_unlink(state: &mut AppState, raw: &str) -> Result<()> {
    let Some(canonical) = state.mapping().canonical_for(raw).map(str::to_string) else {
        println!("'{}' is not in any group", raw);
        return Ok(());
    };
    let warnings = state.link(raw, None);
    print_warnings(&warnings);
    println!("✅ Removed '{}' from '{}'", raw, canonical);
    Ok(())
}

pub fn cmd_products_rename(state: &mut AppState, old_name: &str, new_name: &str) -> Result<()> {
    let warnings = state.rename_group(old_name, new_name)?;
    print_warnings(&warnings);
    println!("✅ Renamed group '{}' → '{}'", old_name, new_name);
    Ok(())
}

pub fn cmd_products_suggest(state: &AppState, limit: usize) -> Result<()> {
    let suggestions = state.suggestions();
    if suggestions.is_empty() {
        println!("No likely duplicates found.");
        return Ok(());
    }

    println!();
    println!("🔗 Possible duplicates ({})", suggestions.len());
    println!("   {:>5} │ {:30} │ {:30}", "Score", "Name", "Name");
    println!("   ──────┼────────────────────────────────┼───────────────────────────────");
    for s in suggestions.iter().take(limit) {
        println!(
            "   {:>5.1} │ {:30} │ {:30}",
            s.score,
            truncate(&s.a, 30),
            truncate(&s.b, 30)
        );
    }
    if suggestions.len() > limit {
        println!("   ... and {} more", suggestions.len() - limit);
    }
    println!();
    println!("Group a pair with: cesta products accept \"<name>\" \"<name>\"");
    Ok(())
}

pub fn cmd_products_accept(state: &mut AppState, a: &str, b: &str) -> Result<()> {
    let (canonical, warnings) = state.accept_suggestion(a, b);
    print_warnings(&warnings);
    println!("✅ Grouped '{}' and '{}' as '{}'", a, b, canonical);
    Ok(())
}
