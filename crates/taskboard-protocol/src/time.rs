use chrono::{DateTime, Local, NaiveDateTime, Utc};

/// Column format of `timestap`, written in UTC.
const STORE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `getMessages` hands rows back as `DD:MM:YYYY HH:MM`.
const RESOLVER_FORMAT: &str = "%d:%m:%Y %H:%M";

/// `YYYY-MM-DD HH:MM:SS` in UTC, as the CRUD store expects for `timestap`.
pub fn store_timestamp(at: DateTime<Utc>) -> String {
    at.format(STORE_FORMAT).to_string()
}

/// Parse any timestamp a chat payload may carry.
///
/// Accepts RFC 3339, the store format and the resolver's output format, the
/// last two read as UTC. Bare times of day (what a browser client puts in
/// `time`) have no date and yield `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    [STORE_FORMAT, RESOLVER_FORMAT]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Wall-clock time of day shown next to a message.
pub fn display_time(at: DateTime<Local>) -> String {
    at.format("%-I:%M:%S %p").to_string()
}
