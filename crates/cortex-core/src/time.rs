//! UTC timestamp helpers.
//!
//! Every timestamp Cortex persists is RFC 3339 in UTC, so lexicographic
//! comparison of the stored strings equals chronological comparison. Both
//! storage tiers rely on this.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time as an RFC 3339 string with `Z` suffix.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Format an explicit instant the way `now_iso` does.
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Accepts any RFC 3339 offset and converts to
/// UTC; returns `None` on malformed input so callers can degrade instead
/// of failing.
pub fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
