//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cesta - Track what your groceries really cost
#[derive(Parser)]
#[command(name = "cesta")]
#[command(about = "Local supermarket receipt parser and spending tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Data directory
    ///
    /// Defaults to $CESTA_DATA_DIR, then the platform data directory
    /// (~/.local/share/cesta on Linux).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Rules/settings file (defaults to <data-dir>/config/cesta.toml, then built-in rules)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import receipts (PDF, images, .txt dumps, exported .json), skipping duplicates
    Import {
        /// Files to import
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// tesseract executable used for images
        #[arg(long, default_value = "tesseract")]
        tesseract: String,

        /// pdftotext executable used for PDFs
        #[arg(long, default_value = "pdftotext")]
        pdftotext: String,
    },

    /// Replace all stored tickets with a collection file
    Load {
        /// Collection JSON file
        file: PathBuf,

        /// Replace existing data without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Re-parse stored receipts with the current parser and rules
    Migrate,

    /// Show data directory, counts and tool availability
    Status,

    /// List recent tickets
    Tickets {
        /// Number of tickets to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Manage product name groups (list, link, unlink, rename, suggest, accept)
    Products {
        #[command(subcommand)]
        action: Option<ProductsAction>,
    },

    /// Show which category a product name gets and why
    Categorize {
        /// Product name as printed on a receipt
        name: String,
    },

    /// Generate spending reports
    Report {
        #[command(subcommand)]
        report: ReportType,
    },

    /// Export the collection
    Export {
        /// Output format: json, csv
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ProductsAction {
    /// List product groups and their aliases
    List,

    /// List product names not in any group
    Unmapped,

    /// Add a product name to a group (created if needed)
    Link {
        /// Name as printed on receipts
        raw: String,
        /// Group (canonical) name
        canonical: String,
    },

    /// Remove a product name from its group
    Unlink {
        /// Name as printed on receipts
        raw: String,
    },

    /// Rename a group, merging into an existing group of that name
    Rename {
        /// Current group name
        old_name: String,
        /// New group name
        new_name: String,
    },

    /// Suggest names that look like the same product
    Suggest {
        /// Number of suggestions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Group two names under the shorter one
    Accept {
        /// First name
        a: String,
        /// Second name
        b: String,
    },
}

#[derive(Subcommand)]
pub enum ReportType {
    /// Spending by category
    Categories {
        /// Only tickets from this year
        #[arg(long)]
        year: Option<i32>,

        /// Only tickets from this store
        #[arg(long)]
        store: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Spending per month
    Monthly {
        /// Only tickets from this year
        #[arg(long)]
        year: Option<i32>,

        /// Only tickets from this store
        #[arg(long)]
        store: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Price history per product (grouped names are combined)
    Prices {
        /// Only this product (group or raw name)
        product: Option<String>,

        /// Only tickets from this year
        #[arg(long)]
        year: Option<i32>,

        /// Only tickets from this store
        #[arg(long)]
        store: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Products with the largest price change between first and last purchase
    Changes {
        /// Number of products to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only tickets from this year
        #[arg(long)]
        year: Option<i32>,

        /// Only tickets from this store
        #[arg(long)]
        store: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// This month's spending against a monthly budget
    Budget {
        /// Monthly budget (defaults to average monthly spend, rounded up to 50)
        #[arg(long)]
        amount: Option<f64>,

        /// Only tickets from this store
        #[arg(long)]
        store: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
