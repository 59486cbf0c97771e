//! Field-level parsing for event CSV rows.
//!
//! Timestamps and coordinates arrive as free-form strings from the event
//! export; these helpers turn them into typed values or `None`.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Returns the trimmed value, or `None` for a missing or blank cell.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parses an event timestamp.
///
/// Accepts RFC 3339 (`2024-01-15T14:30:00Z`), ISO 8601 without offset, or
/// the SQL-style `2024-01-15 14:30:00`. Timestamps without an offset are
/// taken as UTC.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Parses a decimal degree value.
#[must_use]
pub fn parse_degrees(s: &str) -> Option<f64> {
    s.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sql_style_timestamp() {
        let dt = parse_timestamp("2024-01-15 14:30:00").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let dt = parse_timestamp("2024-01-15T09:30:00-05:00").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn parses_fractional_seconds() {
        let dt = parse_timestamp("2024-01-15T14:30:00.250").unwrap();
        assert_eq!(dt.timestamp(), 1_705_329_000);
    }

    #[test]
    fn rejects_invalid_timestamp() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2024-13-01 00:00:00").is_none());
    }

    #[test]
    fn blank_cells_are_none() {
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" 02720 ")), Some("02720"));
    }

    #[test]
    fn parses_degrees() {
        assert!((parse_degrees("-71.155").unwrap() - -71.155).abs() < f64::EPSILON);
        assert!(parse_degrees("north").is_none());
    }
}
