//! Report command implementations

use anyhow::{Context, Result};
use cesta_core::reports::{
    budget_progress, category_totals, monthly_totals, price_changes, price_history,
    product_price_history, BudgetStatus, ReportFilter,
};
use cesta_core::AppState;
use chrono::Local;

use super::truncate;

/// Describe the active filter for report headers
fn filter_label(filter: &ReportFilter) -> Option<String> {
    let parts: Vec<String> = filter
        .year
        .map(|y| y.to_string())
        .into_iter()
        .chain(filter.store.map(str::to_string))
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn print_filter(filter: &ReportFilter) {
    if let Some(label) = filter_label(filter) {
        println!("   Filter: {}", label);
    }
}

pub fn cmd_report_categories(state: &AppState, filter: &ReportFilter, json: bool) -> Result<()> {
    let report = category_totals(state.collection(), state.config(), filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let total: f64 = report.iter().map(|c| c.amount).sum();

    println!();
    println!("📊 Spending by Category");
    println!("   ─────────────────────────────────────────────────────────────");
    print_filter(filter);
    if total == 0.0 {
        println!("   No spending found.");
        return Ok(());
    }
    println!("   Total: {:.2} {}", total, state.collection().meta.currency);
    println!();
    println!(
        "   {:24} │ {:>10} │ {:>6} │ {:>5}",
        "Category", "Amount", "%", "Items"
    );
    println!("   ─────────────────────────┼────────────┼────────┼───────");
    for cat in report.iter().filter(|c| c.item_count > 0) {
        println!(
            "   {:24} │ {:>10.2} │ {:>5.1}% │ {:>5}",
            truncate(&cat.name, 24),
            cat.amount,
            cat.percentage,
            cat.item_count
        );
    }
    println!();
    Ok(())
}

pub fn cmd_report_monthly(state: &AppState, filter: &ReportFilter, json: bool) -> Result<()> {
    let report = monthly_totals(state.collection(), filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("📈 Monthly Spending");
    println!("   ─────────────────────────────────────────────────────────────");
    print_filter(filter);
    if report.is_empty() {
        println!("   No spending data found.");
        return Ok(());
    }

    println!("   {:12} │ {:>10} │ {:>7}", "Month", "Amount", "Tickets");
    println!("   ─────────────┼────────────┼─────────");
    for point in &report {
        println!(
            "   {:12} │ {:>10.2} │ {:>7}",
            point.period, point.amount, point.ticket_count
        );
    }

    let avg = report.iter().map(|p| p.amount).sum::<f64>() / report.len() as f64;
    println!("   ─────────────┼────────────┼─────────");
    println!("   {:12} │ {:>10.2} │", "Average", avg);
    println!();
    Ok(())
}

pub fn cmd_report_prices(
    state: &AppState,
    product: Option<&str>,
    filter: &ReportFilter,
    json: bool,
) -> Result<()> {
    let histories = match product {
        Some(name) => vec![product_price_history(state.collection(), name, filter)
            .with_context(|| format!("No purchases of '{}' found", name))?],
        None => price_history(state.collection(), filter),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&histories)?);
        return Ok(());
    }

    println!();
    println!("💶 Price History");
    println!("   ─────────────────────────────────────────────────────────────");
    print_filter(filter);
    if histories.is_empty() {
        println!("   No purchases found.");
        return Ok(());
    }

    if product.is_some() {
        for history in &histories {
            println!("   {}", history.product);
            for point in &history.points {
                println!(
                    "      {}  {:20} {:>8.2}",
                    point.date,
                    truncate(&point.store, 20),
                    point.unit_price
                );
            }
        }
    } else {
        println!(
            "   {:30} │ {:>5} │ {:>7} │ {:>7} │ {:>7}",
            "Product", "Seen", "Min", "Max", "Latest"
        );
        println!("   ───────────────────────────────┼───────┼─────────┼─────────┼────────");
        for history in &histories {
            println!(
                "   {:30} │ {:>5} │ {:>7.2} │ {:>7.2} │ {:>7.2}",
                truncate(&history.product, 30),
                history.points.len(),
                history.min().unwrap_or_default(),
                history.max().unwrap_or_default(),
                history.latest().map(|p| p.unit_price).unwrap_or_default()
            );
        }
    }
    println!();
    Ok(())
}

pub fn cmd_report_changes(
    state: &AppState,
    filter: &ReportFilter,
    limit: usize,
    json: bool,
) -> Result<()> {
    let changes = price_changes(state.collection(), filter);

    if json {
        let shown: Vec<_> = changes.iter().take(limit).collect();
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    println!();
    println!("📉 Price Changes");
    println!("   ─────────────────────────────────────────────────────────────");
    print_filter(filter);
    if changes.is_empty() {
        println!("   No price changes found.");
        return Ok(());
    }

    println!(
        "   {:30} │ {:>7} │ {:>7} │ {:>8}",
        "Product", "First", "Latest", "Change"
    );
    println!("   ───────────────────────────────┼─────────┼─────────┼─────────");
    for change in changes.iter().take(limit) {
        let arrow = if change.change_percent > 0.0 { "↑" } else { "↓" };
        println!(
            "   {:30} │ {:>7.2} │ {:>7.2} │ {} {:>+5.1}%",
            truncate(&change.product, 30),
            change.first_price,
            change.last_price,
            arrow,
            change.change_percent
        );
    }
    if changes.len() > limit {
        println!("   ... and {} more", changes.len() - limit);
    }
    println!();
    Ok(())
}

pub fn cmd_report_budget(
    state: &AppState,
    amount: Option<f64>,
    filter: &ReportFilter,
    json: bool,
) -> Result<()> {
    if let Some(amount) = amount {
        anyhow::ensure!(
            amount.is_finite() && amount >= 0.0,
            "Budget must be a positive amount, got {}",
            amount
        );
    }
    let progress = budget_progress(
        state.collection(),
        amount,
        Local::now().date_naive(),
        filter,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&progress)?);
        return Ok(());
    }

    let currency = &state.collection().meta.currency;
    println!();
    println!("🎯 Budget for {}", progress.month);
    println!("   ─────────────────────────────────────────────────────────────");
    print_filter(filter);
    let source = if progress.suggested {
        " (from average monthly spend)"
    } else {
        ""
    };
    println!("   Budget:    {:>10.2} {}{}", progress.budget, currency, source);
    println!("   Spent:     {:>10.2} {}", progress.spent, currency);
    println!("   Remaining: {:>10.2} {}", progress.remaining, currency);
    println!("   Average:   {:>10.2} {} per month", progress.average_monthly, currency);
    println!();
    match progress.status {
        BudgetStatus::OnTrack => println!("   ✅ {:.1}% used", progress.percentage),
        BudgetStatus::Warning => println!("   ⚠️  {:.1}% used", progress.percentage),
        BudgetStatus::Over => println!("   ❌ {:.1}% used, over budget", progress.percentage),
    }
    println!();
    Ok(())
}
