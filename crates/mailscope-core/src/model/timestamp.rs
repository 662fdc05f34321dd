//! Received-time parsing.
//!
//! Backends report times in whatever format they like. Naive values (no
//! offset) are read as UTC; anything unparseable yields `None`, which
//! orders before every real time (i.e. "oldest").

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Formats carrying an explicit offset.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f %z"];

/// Formats without an offset. Two-digit years are tried before four-digit
/// ones, since `%Y` would otherwise accept `24` as the year 24.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M",
];

/// Parses a backend-supplied timestamp.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(raw, fmt) {
            return Some(t.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Memo of parsed timestamps, keyed by the raw string.
///
/// The same raw value shows up on many messages (and on every re-insertion
/// of a message), so each distinct string is parsed once.
#[derive(Debug, Default)]
pub struct TimestampMemo {
    parsed: HashMap<String, Option<DateTime<Utc>>>,
}

impl TimestampMemo {
    /// Creates an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the parsed value of `raw`, parsing it on first sight.
    pub fn parse(&mut self, raw: &str) -> Option<DateTime<Utc>> {
        if let Some(parsed) = self.parsed.get(raw) {
            return *parsed;
        }
        let parsed = parse_timestamp(raw);
        self.parsed.insert(raw.to_string(), parsed);
        parsed
    }

    /// Number of distinct raw strings seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parsed.len()
    }

    /// Returns true if nothing has been parsed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty()
    }
}
