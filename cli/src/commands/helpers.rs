use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};

use hearth_core::models::ALL_DAYS;

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// "Every day", or the short weekday names in order.
pub(crate) fn format_days(days: &[u8]) -> String {
    if days == ALL_DAYS.as_slice() {
        return "Every day".to_string();
    }
    if days.is_empty() {
        return "-".to_string();
    }
    days.iter()
        .filter_map(|&d| DAY_NAMES.get(usize::from(d)))
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn format_quantity(quantity: Option<f64>, unit: Option<&str>) -> String {
    let amount = quantity.map(|q| {
        if q.fract() == 0.0 {
            format!("{q:.0}")
        } else {
            format!("{q:.2}")
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string()
        }
    });
    match (amount, unit) {
        (Some(a), Some(u)) => format!("{a} {u}"),
        (Some(a), None) => a,
        (None, Some(u)) => u.to_string(),
        (None, None) => String::new(),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
