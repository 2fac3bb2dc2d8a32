//! Price and quantity sanitizing
//!
//! OCR output regularly loses the decimal point ("1,45" read as "145") or
//! mixes separators. These helpers turn raw tokens into 2-dp currency values.
//! A result of `0.0` means "could not determine a price".

/// Magnitude thresholds used by the correction heuristic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SanitizeLimits {
    /// Integers above this are assumed to have lost their decimal point
    pub integer_ceiling: f64,
    /// Values above this are considered implausible
    pub implausible: f64,
    /// A corrected value must land under this
    pub plausible: f64,
}

impl Default for SanitizeLimits {
    /// Limits for a single grocery line
    fn default() -> Self {
        Self {
            integer_ceiling: 50.0,
            implausible: 200.0,
            plausible: 20.0,
        }
    }
}

impl SanitizeLimits {
    /// Looser limits for whole-receipt totals
    pub fn for_totals() -> Self {
        Self {
            integer_ceiling: 1000.0,
            implausible: 2000.0,
            plausible: 500.0,
        }
    }

    /// These limits for a token that still shows its decimal separator
    ///
    /// Only a bare integer can have lost its decimal point, so the integer
    /// rule is switched off. The implausible-magnitude rule still applies.
    pub fn with_separator(self) -> Self {
        Self {
            integer_ceiling: f64::INFINITY,
            ..self
        }
    }
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sanitize a single-item price with the default limits
pub fn sanitize_price(value: f64) -> f64 {
    sanitize_with(value, SanitizeLimits::default())
}

/// Sanitize a value with explicit limits
///
/// The correction is repeated until it no longer changes the value, so
/// sanitizing an already sanitized value is a no-op.
pub fn sanitize_with(value: f64, limits: SanitizeLimits) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 0.0;
    }

    let mut current = round2(value);
    loop {
        if current <= 0.0 {
            return 0.0;
        }
        let next = round2(correct_magnitude(current, limits));
        if next == current {
            return current;
        }
        current = next;
    }
}

fn correct_magnitude(value: f64, limits: SanitizeLimits) -> f64 {
    if value > limits.integer_ceiling && value.fract() == 0.0 {
        return value / 100.0;
    }
    if value > limits.implausible {
        for divisor in [100.0, 1000.0] {
            let candidate = value / divisor;
            if candidate < limits.plausible {
                return candidate;
            }
        }
    }
    value
}

/// Parse a raw amount token without magnitude correction
///
/// Whitespace and currency symbols are stripped. When both `,` and `.`
/// appear, the last one is the decimal separator.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match cleaned.rfind([',', '.']) {
        Some(idx) => {
            let (int_part, frac_part) = cleaned.split_at(idx);
            let int_part: String = int_part.chars().filter(|c| *c != ',' && *c != '.').collect();
            format!("{}.{}", int_part, &frac_part[1..])
        }
        None => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse and sanitize a raw token with the given limits, `0.0` when unusable
pub fn sanitize_token(raw: &str, limits: SanitizeLimits) -> f64 {
    let Some(value) = parse_amount(raw) else {
        return 0.0;
    };
    let limits = if raw.contains([',', '.']) {
        limits.with_separator()
    } else {
        limits
    };
    sanitize_with(value, limits)
}

/// Parse and sanitize a raw price token, `0.0` when unusable
pub fn sanitize_amount(raw: &str) -> f64 {
    sanitize_token(raw, SanitizeLimits::default())
}
