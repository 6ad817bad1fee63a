//! Tolerant parsing of the Date header.
//!
//! Clients produce a surprising range of date formats. The strict RFC 2822
//! form is tried first, then the common variants seen in the wild; anything
//! unparseable falls back to the current wall clock so a message always
//! carries a usable timestamp.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

const DATE_SENT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lenient formats tried after RFC 2822 fails. Zone-less forms are taken as
/// local time.
const FALLBACK_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses a Date header value into the sink's canonical timestamp string.
pub fn parse_date_header(value: &str) -> String {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Local::now().format(DATE_SENT_FORMAT).to_string();
    }

    // Some agents append a parenthesized zone name, e.g. "(UTC)".
    let cleaned = match trimmed.find('(') {
        Some(position) => trimmed[..position].trim(),
        None => trimmed,
    };

    if let Ok(parsed) = DateTime::parse_from_rfc2822(cleaned) {
        return parsed.format(DATE_SENT_FORMAT).to_string();
    }

    for format in FALLBACK_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(cleaned, format) {
            return parsed.format(DATE_SENT_FORMAT).to_string();
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(cleaned, format) {
            if let Some(local) = Local.from_local_datetime(&parsed).single() {
                return local.format(DATE_SENT_FORMAT).to_string();
            }
        }
    }

    debug!("Unparseable Date header '{}', using current time", trimmed);
    Local::now().format(DATE_SENT_FORMAT).to_string()
}

/// Current time in the canonical timestamp format.
pub fn now_string() -> String {
    Local::now().format(DATE_SENT_FORMAT).to_string()
}

/// Current UTC instant, for created/updated bookkeeping on the mail model.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
