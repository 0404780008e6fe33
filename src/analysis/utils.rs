//! Utility functions for common operations

use crate::analysis::types::ListingStatus;
use chrono::{NaiveDate, NaiveDateTime};

/// Average month length used for every month/day conversion
pub const DAYS_PER_MONTH: f64 = 30.44;

/// Month length used by the compounded (log-price) trend
pub const DAYS_PER_MONTH_EXACT: f64 = 30.4375;

// Two-digit years must be tried first: %Y happily reads "23" as year 23.
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

/// Parse a sale date in any of the formats MLS exports use (month-first)
pub fn parse_sale_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Parse a number with currency symbols and thousands separators removed
pub fn parse_number(raw: &str) -> Option<f64> {
    let clean = raw.replace(['$', ','], "");
    let clean = clean.trim();
    if clean.is_empty() {
        return None;
    }

    clean.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a strictly positive number (prices, areas)
pub fn parse_positive(raw: &str) -> Option<f64> {
    parse_number(raw).filter(|v| *v > 0.0)
}

/// Lowercase with everything but letters and digits removed
pub fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Collapse the many status spellings in MLS exports
pub fn normalize_status(raw: &str) -> Option<ListingStatus> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    let lower = value.to_lowercase();
    let status = match lower.as_str() {
        "a" | "active" | "act" => ListingStatus::Active,
        "p" | "pend" | "pending" | "u" | "under contract" | "under-contract" | "uc" => {
            ListingStatus::Pending
        }
        "c" | "closed" | "sold" | "s" => ListingStatus::Closed,
        "subject" => ListingStatus::Subject,
        _ => ListingStatus::Other(title_case(value)),
    };

    Some(status)
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Non-empty trimmed text or None
pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Days between two dates expressed in average months
pub fn days_to_months(days: i64) -> f64 {
    days as f64 / DAYS_PER_MONTH
}
