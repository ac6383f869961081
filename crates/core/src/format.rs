//! Human-readable rendering of metric values.

use crate::metric::{Metric, MetricKind};

/// Placeholder for a value that could not be computed.
pub const UNAVAILABLE: &str = "N/A";

/// Currency values are reported in units of 亿 (10^8) USD.
pub const CURRENCY_DIVISOR: f64 = 100_000_000.0;

/// Inserts thousands separators into the integer part of a decimal string.
fn with_thousands_separators(formatted: &str) -> String {
    let (sign, digits) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (integer, fraction) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, ch) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match fraction {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

/// Format a USD amount as e.g. "1,234.57 亿 USD".
pub fn format_currency(value: Option<f64>) -> String {
    match value {
        Some(v) => format!(
            "{} 亿 USD",
            with_thousands_separators(&format!("{:.2}", v / CURRENCY_DIVISOR))
        ),
        None => UNAVAILABLE.to_string(),
    }
}

/// Format a ratio as a percentage, e.g. 0.25 -> "25.00%".
pub fn format_share(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v * 100.0),
        None => UNAVAILABLE.to_string(),
    }
}

/// Format a metric value according to its kind.
pub fn format_metric(metric: Metric, value: Option<f64>) -> String {
    match metric.kind() {
        MetricKind::Currency => format_currency(value),
        MetricKind::Share => format_share(value),
    }
}

/// Join symbols for display, "none" when empty.
pub fn format_symbol_list<S: AsRef<str>>(symbols: &[S]) -> String {
    if symbols.is_empty() {
        return "none".to_string();
    }
    symbols
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}
