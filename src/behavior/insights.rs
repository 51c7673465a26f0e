//! Learning statistics to insight strings
//!
//! The scoring service may attach opaque learning statistics to a response.
//! Each key becomes at most one human-readable line: entries whose count is
//! zero are skipped and rates are rendered as rounded percentages.

use serde_json::{Map, Value};

const COUNT_FIELDS: &[&str] = &["count", "total", "sent", "samples"];

/// Convert learning statistics into display lines, in the order the keys arrived
pub fn learning_insights(stats: &Map<String, Value>) -> Vec<String> {
    stats
        .iter()
        .filter_map(|(key, value)| insight_for(key, value))
        .collect()
}

/// Same as [`learning_insights`], for a value that may not be an object
pub fn insights_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Object(stats) => learning_insights(stats),
        _ => Vec::new(),
    }
}

fn insight_for(key: &str, value: &Value) -> Option<String> {
    let label = humanize(key);
    match value {
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| format!("{label}: {text}"))
        }
        Value::Number(n) => {
            let n = n.as_f64()?;
            if n == 0.0 {
                return None;
            }
            if is_rate_key(key) {
                Some(format!("{label}: {}%", percent(n)))
            } else {
                Some(format!("{label}: {}", format_count(n)))
            }
        }
        Value::Object(fields) => {
            let count = COUNT_FIELDS
                .iter()
                .find_map(|f| fields.get(*f).and_then(Value::as_f64))?;
            if count == 0.0 {
                return None;
            }
            let rate = fields
                .iter()
                .find(|(k, v)| is_rate_key(k) && v.is_number())
                .and_then(|(k, v)| v.as_f64().map(|r| (k, r)));

            Some(match rate {
                Some((rate_key, rate)) => format!(
                    "{label}: {} ({}% {})",
                    format_count(count),
                    percent(rate),
                    humanize(rate_key).to_lowercase()
                ),
                None => format!("{label}: {}", format_count(count)),
            })
        }
        _ => None,
    }
}

fn is_rate_key(key: &str) -> bool {
    key == "rate" || key.ends_with("_rate")
}

/// Rates at or below 1.0 are fractions; larger values are already percents
fn percent(rate: f64) -> i64 {
    let pct = if rate.abs() <= 1.0 { rate * 100.0 } else { rate };
    pct.round() as i64
}

fn format_count(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{n:.1}")
    }
}

/// `pricing_page_visitors` -> `Pricing page visitors`
fn humanize(key: &str) -> String {
    let spaced = key.replace(['_', '-'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
