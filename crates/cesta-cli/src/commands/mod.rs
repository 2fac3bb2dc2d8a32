//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (open_state) plus categorize and migrate
//! - `import` - Receipt import, collection load and export
//! - `products` - Product name groups and merge suggestions
//! - `reports` - Spending and price reports
//! - `status` - Status overview and ticket listing

pub mod core;
pub mod import;
pub mod products;
pub mod reports;
pub mod status;

// Re-export command functions for main.rs
pub use core::*;
pub use import::*;
pub use products::*;
pub use reports::*;
pub use status::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Report save warnings after a mutating command
pub(crate) fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        tracing::warn!("{}", warning);
    }
}
