//! Cesta CLI - Supermarket receipt tracker
//!
//! Usage:
//!   cesta import tickets/*.pdf        Import receipts (PDF, images, text dumps)
//!   cesta products suggest            Find names that are the same product
//!   cesta report categories           Spending by category
//!   cesta export --format csv         One row per ticket

mod cli;
mod commands;


use anyhow::Result;
use cesta_core::config::resolve_data_dir;
use cesta_core::reports::ReportFilter;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let data_dir = resolve_data_dir(cli.data_dir.as_deref());
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Import {
            files,
            tesseract,
            pdftotext,
        } => commands::cmd_import(&data_dir, config, &files, &tesseract, &pdftotext).await,
        Commands::Load { file, yes } => commands::cmd_load(&data_dir, config, &file, yes),
        Commands::Migrate => commands::cmd_migrate(&data_dir, config),
        Commands::Status => commands::cmd_status(&data_dir, config).await,
        Commands::Tickets { limit } => commands::cmd_tickets(&data_dir, config, limit),
        Commands::Products { action } => {
            let mut state = commands::open_state(&data_dir, config)?;
            match action {
                None | Some(ProductsAction::List) => commands::cmd_products_list(&state),
                Some(ProductsAction::Unmapped) => commands::cmd_products_unmapped(&state),
                Some(ProductsAction::Link { raw, canonical }) => {
                    commands::cmd_products_link(&mut state, &raw, &canonical)
                }
                Some(ProductsAction::Unlink { raw }) => {
                    commands::cmd_products_unlink(&mut state, &raw)
                }
                Some(ProductsAction::Rename { old_name, new_name }) => {
                    commands::cmd_products_rename(&mut state, &old_name, &new_name)
                }
                Some(ProductsAction::Suggest { limit }) => {
                    commands::cmd_products_suggest(&state, limit)
                }
                Some(ProductsAction::Accept { a, b }) => {
                    commands::cmd_products_accept(&mut state, &a, &b)
                }
            }
        }
        Commands::Categorize { name } => commands::cmd_categorize(&data_dir, config, &name),
        Commands::Report { report } => {
            let state = commands::open_state(&data_dir, config)?;
            match report {
                ReportType::Categories { year, store, json } => {
                    let filter = ReportFilter::new().year(year).store(store.as_deref());
                    commands::cmd_report_categories(&state, &filter, json)
                }
                ReportType::Monthly { year, store, json } => {
                    let filter = ReportFilter::new().year(year).store(store.as_deref());
                    commands::cmd_report_monthly(&state, &filter, json)
                }
                ReportType::Prices {
                    product,
                    year,
                    store,
                    json,
                } => {
                    let filter = ReportFilter::new().year(year).store(store.as_deref());
                    commands::cmd_report_prices(&state, product.as_deref(), &filter, json)
                }
                ReportType::Changes {
                    limit,
                    year,
                    store,
                    json,
                } => {
                    let filter = ReportFilter::new().year(year).store(store.as_deref());
                    commands::cmd_report_changes(&state, &filter, limit, json)
                }
                ReportType::Budget {
                    amount,
                    store,
                    json,
                } => {
                    let filter = ReportFilter::new().store(store.as_deref());
                    commands::cmd_report_budget(&state, amount, &filter, json)
                }
            }
        }
        Commands::Export { format, output } => {
            commands::cmd_export(&data_dir, config, &format, output.as_deref())
        }
    }
}
