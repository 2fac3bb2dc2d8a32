//! Spending aggregation over the collection
//!
//! Product-level reports group items by canonical name through the product
//! mapping, so aliases of the same product are counted together. Every report
//! takes a `ReportFilter` that narrows the tickets by year and store first.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::config::Config;
use crate::models::{Category, Collection, Item, Ticket};
use crate::sanitize::round2;

/// Price changes smaller than this percentage are not reported
pub const MIN_PRICE_CHANGE_PERCENT: f64 = 0.5;

/// Budget suggestions are rounded up to a multiple of this
const BUDGET_STEP: f64 = 50.0;

/// Usage above this percentage of the budget is a warning
const BUDGET_WARNING_PERCENT: f64 = 80.0;

/// Ticket selection shared by all reports
///
/// The default filter selects every ticket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportFilter<'query> {
    pub year: Option<i32>,
    /// Store display name, compared case-insensitively
    pub store: Option<&'query str>,
}

impl<'query> ReportFilter<'query> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only tickets dated in this calendar year
    pub fn year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }

    /// Only tickets from this store
    pub fn store(mut self, store: Option<&'query str>) -> Self {
        self.store = store.map(str::trim).filter(|s| !s.is_empty());
        self
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        if self.year.is_some_and(|year| ticket.date.year() != year) {
            return false;
        }
        if let Some(store) = self.store {
            if !ticket.store.name.eq_ignore_ascii_case(store) {
                return false;
            }
        }
        true
    }

    /// Tickets of `collection` this filter selects, in collection order
    pub fn tickets<'c>(&self, collection: &'c Collection) -> Vec<&'c Ticket> {
        collection.tickets.iter().filter(|t| self.matches(t)).collect()
    }
}

/// Spending in one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpending {
    pub category: Category,
    pub name: String,
    pub amount: f64,
    pub percentage: f64,
    pub item_count: usize,
}

/// Spending in one calendar month (`YYYY-MM`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendDataPoint {
    pub period: String,
    pub amount: f64,
    pub ticket_count: usize,
}

/// One observed price of a product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub store: String,
    pub unit_price: f64,
}

/// Price history of one canonical product, oldest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPriceHistory {
    pub product: String,
    pub points: Vec<PricePoint>,
}

impl ProductPriceHistory {
    pub fn min(&self) -> Option<f64> {
        self.points.iter().map(|p| p.unit_price).reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.points.iter().map(|p| p.unit_price).reduce(f64::max)
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Average unit price per month (`YYYY-MM`), oldest first
    pub fn monthly_averages(&self) -> Vec<(String, f64)> {
        let mut months: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for point in &self.points {
            let entry = months
                .entry(point.date.format("%Y-%m").to_string())
                .or_default();
            entry.0 += point.unit_price;
            entry.1 += 1;
        }
        months
            .into_iter()
            .map(|(month, (sum, count))| (month, round2(sum / count as f64)))
            .collect()
    }

    /// Change between the first and last month the product was bought
    ///
    /// `None` when it was only bought in one month or the first price is zero.
    pub fn change(&self) -> Option<PriceChange> {
        let averages = self.monthly_averages();
        let (first_month, first_price) = averages.first()?.clone();
        let (last_month, last_price) = averages.last()?.clone();
        if averages.len() < 2 || first_price <= 0.0 {
            return None;
        }
        Some(PriceChange {
            product: self.product.clone(),
            first_month,
            first_price,
            last_month,
            last_price,
            change: round2(last_price - first_price),
            change_percent: round2((last_price - first_price) / first_price * 100.0),
        })
    }
}

/// Price movement of one product between its first and last month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChange {
    pub product: String,
    pub first_month: String,
    pub first_price: f64,
    pub last_month: String,
    pub last_price: f64,
    pub change: f64,
    pub change_percent: f64,
}

/// How spending compares to the budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    OnTrack,
    Warning,
    Over,
}

/// Spending in the current month against a monthly budget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetProgress {
    /// `YYYY-MM`
    pub month: String,
    pub budget: f64,
    /// True when the budget was derived from past spending
    pub suggested: bool,
    pub spent: f64,
    /// Negative once over budget
    pub remaining: f64,
    pub percentage: f64,
    pub average_monthly: f64,
    pub status: BudgetStatus,
}

/// Spending per category, largest first
///
/// Every configured category is listed, including those with no spending.
pub fn category_totals(
    collection: &Collection,
    config: &Config,
    filter: &ReportFilter,
) -> Vec<CategorySpending> {
    let mut sums: BTreeMap<Category, (f64, usize)> = BTreeMap::new();
    for item in filter.tickets(collection).into_iter().flat_map(|t| &t.items) {
        let entry = sums.entry(item.category).or_default();
        entry.0 += item.price;
        entry.1 += 1;
    }
    let grand_total: f64 = sums.values().map(|(amount, _)| amount).sum();

    let mut report: Vec<CategorySpending> = Category::all()
        .iter()
        .map(|&category| {
            let (amount, item_count) = sums.get(&category).copied().unwrap_or_default();
            CategorySpending {
                category,
                name: config.category_name(category),
                amount: round2(amount),
                percentage: if grand_total > 0.0 {
                    round2(amount / grand_total * 100.0)
                } else {
                    0.0
                },
                item_count,
            }
        })
        .collect();

    report.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    report
}

/// Ticket totals per month, oldest first
pub fn monthly_totals(collection: &Collection, filter: &ReportFilter) -> Vec<TrendDataPoint> {
    let mut months: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for ticket in filter.tickets(collection) {
        let entry = months
            .entry(ticket.date.format("%Y-%m").to_string())
            .or_default();
        entry.0 += ticket.total;
        entry.1 += 1;
    }

    months
        .into_iter()
        .map(|(period, (amount, ticket_count))| TrendDataPoint {
            period,
            amount: round2(amount),
            ticket_count,
        })
        .collect()
}

fn unit_price(item: &Item) -> f64 {
    if item.unit_price > 0.0 {
        item.unit_price
    } else if item.quantity > 0 {
        round2(item.price / f64::from(item.quantity))
    } else {
        item.price
    }
}

/// Price history per canonical product, sorted by product name
pub fn price_history(collection: &Collection, filter: &ReportFilter) -> Vec<ProductPriceHistory> {
    let mapping = &collection.product_mapping;
    let mut products: BTreeMap<String, Vec<PricePoint>> = BTreeMap::new();

    for ticket in filter.tickets(collection) {
        for item in &ticket.items {
            products
                .entry(mapping.normalize(&item.name).to_string())
                .or_default()
                .push(PricePoint {
                    date: ticket.date,
                    store: ticket.store.name.clone(),
                    unit_price: unit_price(item),
                });
        }
    }

    products
        .into_iter()
        .map(|(product, mut points)| {
            points.sort_by(|a, b| a.date.cmp(&b.date));
            ProductPriceHistory { product, points }
        })
        .collect()
}

/// Price history of one product, looked up by canonical or raw name
pub fn product_price_history(
    collection: &Collection,
    name: &str,
    filter: &ReportFilter,
) -> Option<ProductPriceHistory> {
    let canonical = collection.product_mapping.normalize(name.trim());
    price_history(collection, filter)
        .into_iter()
        .find(|h| h.product.eq_ignore_ascii_case(canonical))
}

/// Products whose price moved by at least `MIN_PRICE_CHANGE_PERCENT`,
/// largest movement first
pub fn price_changes(collection: &Collection, filter: &ReportFilter) -> Vec<PriceChange> {
    let mut changes: Vec<PriceChange> = price_history(collection, filter)
        .iter()
        .filter_map(ProductPriceHistory::change)
        .filter(|c| c.change_percent.abs() >= MIN_PRICE_CHANGE_PERCENT)
        .collect();
    changes.sort_by(|a, b| {
        b.change_percent
            .abs()
            .total_cmp(&a.change_percent.abs())
            .then_with(|| a.product.cmp(&b.product))
    });
    changes
}

/// Spending in the month of `today` against `budget`
///
/// Without a budget, the average monthly spend rounded up to the next 50 is
/// used. Months without tickets do not count toward the average.
pub fn budget_progress(
    collection: &Collection,
    budget: Option<f64>,
    today: NaiveDate,
    filter: &ReportFilter,
) -> BudgetProgress {
    let month = today.format("%Y-%m").to_string();
    let monthly = monthly_totals(collection, filter);

    let spent = monthly
        .iter()
        .find(|p| p.period == month)
        .map(|p| p.amount)
        .unwrap_or(0.0);
    let average_monthly = if monthly.is_empty() {
        0.0
    } else {
        round2(monthly.iter().map(|p| p.amount).sum::<f64>() / monthly.len() as f64)
    };

    let budget = budget.filter(|b| b.is_finite() && *b >= 0.0);
    let suggested = budget.is_none();
    let budget = budget.unwrap_or_else(|| (average_monthly / BUDGET_STEP).ceil() * BUDGET_STEP);
    let percentage = if budget > 0.0 {
        round2(spent / budget * 100.0)
    } else {
        0.0
    };
    let status = if percentage > 100.0 {
        BudgetStatus::Over
    } else if percentage > BUDGET_WARNING_PERCENT {
        BudgetStatus::Warning
    } else {
        BudgetStatus::OnTrack
    };

    BudgetProgress {
        month,
        budget,
        suggested,
        spent,
        remaining: round2(budget - spent),
        percentage,
        average_monthly,
        status,
    }
}
