//! Relative time phrases ("3 days ago") to absolute timestamps.
//!
//! Months are 30 days and years are 365 days. Both functions take the
//! reference instant explicitly and never read the clock.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static RELATIVE_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\s+(second|minute|hour|day|week|month|year)s?\s+ago\b")
        .expect("RELATIVE_PHRASE is a compile-time constant")
});

const EDITED_MARKER: &str = "(edited)";

fn unit_seconds(unit: &str) -> Option<i64> {
    let seconds = match unit {
        "second" => 1,
        "minute" => 60,
        "hour" => 60 * 60,
        "day" => 24 * 60 * 60,
        "week" => 7 * 24 * 60 * 60,
        "month" => 30 * 24 * 60 * 60,
        "year" => 365 * 24 * 60 * 60,
        _ => return None,
    };
    Some(seconds)
}

/// Strict form: `None` when the phrase is not understood or the amount is
/// too large to subtract from `reference`.
pub fn parse_relative(phrase: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let cleaned = phrase.to_lowercase().replace(EDITED_MARKER, "");
    let cleaned = cleaned.trim();

    if cleaned == "just now" || cleaned == "moments ago" {
        return Some(reference);
    }

    let captures = RELATIVE_PHRASE.captures(cleaned)?;
    let amount: i64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = unit_seconds(captures.get(2)?.as_str())?;

    let offset = Duration::try_seconds(amount.checked_mul(unit)?)?;
    reference.checked_sub_signed(offset)
}

/// Lenient form: falls back to `reference` and emits a warning instead of
/// failing, so one odd timestamp never aborts a discovery pass.
pub fn normalize(phrase: &str, reference: DateTime<Utc>) -> DateTime<Utc> {
    match parse_relative(phrase, reference) {
        Some(instant) => instant,
        None => {
            warn!(phrase = %phrase, "Could not parse relative time, using reference instant");
            reference
        }
    }
}
