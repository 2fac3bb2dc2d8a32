//! Status-related command implementations (status, tickets)

use std::path::Path;

use anyhow::Result;
use cesta_core::config::override_config_path;
use cesta_core::{PdftotextLayer, TesseractOcr, PARSER_VERSION};

use super::{open_state, truncate};

pub async fn cmd_status(data_dir: &Path, config: Option<&Path>) -> Result<()> {
    println!();
    println!("📊 Cesta Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Data directory: {}", data_dir.display());

    match open_state(data_dir, config) {
        Ok(state) => {
            match &state.config().source {
                Some(path) => println!("   Rules: {}", path.display()),
                None => println!(
                    "   Rules: built-in (override at {})",
                    override_config_path(data_dir).display()
                ),
            }

            let collection = state.collection();
            let items: usize = collection.tickets.iter().map(|t| t.items.len()).sum();
            println!();
            println!("   Tickets: {}", collection.tickets.len());
            println!("   Items: {}", items);
            println!("   Archived receipt texts: {}", state.raw_texts().len());
            println!("   Product groups: {}", state.mapping().len());
            match collection.meta.parser_version {
                Some(v) if v == PARSER_VERSION => println!("   Parser version: {}", v),
                Some(v) => println!("   ⚠️  Parser version: {} (current {})", v, PARSER_VERSION),
                None => println!("   Parser version: unknown (current {})", PARSER_VERSION),
            }
            if let (Some(newest), Some(oldest)) =
                (collection.tickets.first(), collection.tickets.last())
            {
                println!("   Range: {} to {}", oldest.date, newest.date);
            }
        }
        Err(e) => {
            println!();
            println!("   ❌ Error loading data: {:#}", e);
        }
    }

    println!();
    let tesseract = TesseractOcr::default();
    let pdftotext = PdftotextLayer::default();
    for (name, available) in [
        ("tesseract", tesseract.is_available().await),
        ("pdftotext", pdftotext.is_available().await),
    ] {
        if available {
            println!("   ✅ {} available", name);
        } else {
            println!("   ❌ {} not found", name);
        }
    }

    println!();
    Ok(())
}

pub fn cmd_tickets(data_dir: &Path, config: Option<&Path>, limit: usize) -> Result<()> {
    let state = open_state(data_dir, config)?;
    let tickets = &state.collection().tickets;

    if tickets.is_empty() {
        println!("No tickets yet. Import some with: cesta import <files>");
        return Ok(());
    }

    println!();
    println!(
        "   {:10} │ {:5} │ {:24} │ {:>9} │ {:>5}",
        "Date", "Time", "Store", "Total", "Items"
    );
    println!("   ───────────┼───────┼──────────────────────────┼───────────┼──────");
    for ticket in tickets.iter().take(limit) {
        let marker = if ticket.total_synthesized { "*" } else { " " };
        println!(
            "   {:10} │ {:5} │ {:24} │ {:>8.2}{} │ {:>5}",
            ticket.date.to_string(),
            ticket.time,
            truncate(&ticket.store.to_string(), 24),
            ticket.total,
            marker,
            ticket.items.len()
        );
    }
    if tickets.len() > limit {
        println!("   ... and {} more", tickets.len() - limit);
    }
    if tickets.iter().take(limit).any(|t| t.total_synthesized) {
        println!();
        println!("   * total computed from items");
    }
    println!();
    Ok(())
}
