//! Import/export command implementations

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use cesta_core::export::export;
use cesta_core::{CancellationToken, ExportFormat, PdftotextLayer, ReplaceOutcome, TesseractOcr};

use super::{open_state, print_warnings};

pub async fn cmd_import(
    data_dir: &Path,
    config: Option<&Path>,
    files: &[PathBuf],
    tesseract: &str,
    pdftotext: &str,
) -> Result<()> {
    let mut state = open_state(data_dir, config)?;
    let importer = state.importer(
        Arc::new(TesseractOcr::new(tesseract)),
        Arc::new(PdftotextLayer::new(pdftotext)),
    );

    println!("📥 Importing {} file(s)...", files.len());

    // Ctrl-C stops after the file in progress
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let (summary, warnings) = state
        .import_files(&importer, files, &cancel, |done, total, file| {
            println!("   [{}/{}] {}", done, total, file);
            tracing::debug!("Finished {} ({} of {})", file, done, total);
        })
        .await;
    watcher.abort();

    println!();
    if summary.cancelled {
        println!("⚠️  Import cancelled after {} file(s)", summary.files);
    }
    for failure in &summary.failures {
        println!("   ❌ {}: {}", failure.file, failure.error);
    }
    print_warnings(&warnings);
    println!("✅ {}", summary);
    println!("   Tickets stored: {}", state.collection().tickets.len());

    Ok(())
}

/// Ask for confirmation on stdin
fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

pub fn cmd_load(data_dir: &Path, config: Option<&Path>, file: &Path, yes: bool) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    tracing::debug!("Read {} bytes from {}", content.len(), file.display());
    let mut state = open_state(data_dir, config)?;

    let mut outcome = state
        .replace_with_json(&content, yes)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    if let ReplaceOutcome::NeedsConfirmation { existing } = outcome {
        println!(
            "⚠️  This will replace {} stored ticket(s) with the contents of {}",
            existing,
            file.display()
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
        outcome = state.replace_with_json(&content, true)?;
    }

    if let ReplaceOutcome::Replaced { tickets, warnings } = outcome {
        print_warnings(&warnings);
        println!("✅ Loaded {} tickets from {}", tickets, file.display());
    }
    Ok(())
}

pub fn cmd_export(
    data_dir: &Path,
    config: Option<&Path>,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let format: ExportFormat = format.parse().map_err(anyhow::Error::msg)?;
    let state = open_state(data_dir, config)?;
    let content = export(state.collection(), format)?;

    match output {
        Some(path) => {
            fs::write(path, content.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "✅ Exported {} tickets as {} to {}",
                state.collection().tickets.len(),
                format,
                path.display()
            );
        }
        None => print!("{}", content),
    }
    Ok(())
}
