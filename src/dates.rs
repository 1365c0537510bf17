use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})[/-](\d{1,2})[/-](\d{4})").unwrap());
static ABBREVIATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})([A-Za-z]{3})['’](\d{2})").unwrap());

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Normalize a free-text deadline to `YYYY-MM-DD`.
///
/// Recognizes `D/M/YYYY` (or `D-M-YYYY`) and `D Mon' YY`. Anything else,
/// including impossible calendar dates, comes back unchanged.
pub fn normalize_date(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    match parse_numeric(&compact).or_else(|| parse_abbreviated(&compact)) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => text.to_string(),
    }
}

fn parse_numeric(s: &str) -> Option<NaiveDate> {
    let caps = NUMERIC_RE.captures(s)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_abbreviated(s: &str) -> Option<NaiveDate> {
    let caps = ABBREVIATED_RE.captures(s)?;
    let day: u32 = caps[1].parse().ok()?;
    let month_name = caps[2].to_lowercase();
    let month = MONTHS.iter().position(|m| *m == month_name)? as u32 + 1;
    let yy: i32 = caps[3].parse().ok()?;
    let year = if yy < 50 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year, month, day)
}
