//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a timestamp from CSV or API text.
///
/// Accepts RFC 3339 and the `YYYY-MM-DD HH:MM:SS[.f][+offset]` form that
/// spreadsheet exports tend to produce. Naive values are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_timestamp("2019-05-21T16:40:00+00:00").unwrap();
        assert_eq!(dt.year(), 2019);
        assert_eq!(dt.hour(), 16);
    }

    #[test]
    fn test_parse_offset_converted_to_utc() {
        let dt = parse_timestamp("2019-05-21 12:40:00-04:00").unwrap();
        assert_eq!(dt.hour(), 16);
    }

    #[test]
    fn test_parse_naive_as_utc() {
        let dt = parse_timestamp("2019-05-21 16:40:00.123").unwrap();
        assert_eq!(dt.minute(), 40);
    }

    #[test]
    fn test_parse_rejects_blank_and_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("   ").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
