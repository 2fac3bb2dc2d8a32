//! Export of the ticket collection
//!
//! Supports:
//! - Full collection JSON (the same shape that `load` accepts)
//! - A flattened CSV summary, one row per ticket

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::Collection;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(format!("Unknown export format: {}", s)),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One CSV summary row
#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    date: String,
    store: &'a str,
    total: String,
    items: String,
}

pub fn export(collection: &Collection, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => export_json(collection),
        ExportFormat::Csv => export_csv(collection),
    }
}

pub fn export_json(collection: &Collection) -> Result<String> {
    collection.to_json_pretty()
}

/// `date,store,total,items` with item names joined by `; `
pub fn export_csv(collection: &Collection) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for ticket in &collection.tickets {
        writer.serialize(SummaryRow {
            date: ticket.date.format("%Y-%m-%d").to_string(),
            store: &ticket.store.name,
            total: format!("{:.2}", ticket.total),
            items: ticket
                .items
                .iter()
                .map(|i| i.name.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        })?;
    }
    if collection.tickets.is_empty() {
        writer.write_record(["date", "store", "total", "items"])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidData(format!("CSV is not UTF-8: {}", e)))
}
