// ABOUTME: Timestamp helpers for the fixed second-precision UTC format used on disk.
// ABOUTME: All generated timestamps share the `Z` suffix so lexical comparison orders them.

use chrono::{DateTime, Duration, Utc};

/// Format used for every generated timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Current UTC time in the stored format.
pub fn utc_now() -> String {
    format_timestamp(Utc::now())
}

pub fn is_rfc3339(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
}

/// Cleanup cutoff for a day threshold measured back from `now`.
/// A threshold of zero means "no threshold" and yields `None`.
pub fn cutoff_days_before(now: DateTime<Utc>, days: u32) -> Option<String> {
    if days == 0 {
        return None;
    }
    Some(format_timestamp(now - Duration::days(i64::from(days))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_with_z_suffix() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_timestamp(at), "2026-03-04T05:06:07Z");
    }

    #[test]
    fn generated_timestamps_are_rfc3339() {
        assert!(is_rfc3339(&utc_now()));
        assert!(is_rfc3339("2026-01-01T00:00:00+02:00"));
        assert!(!is_rfc3339("2026-01-01"));
        assert!(!is_rfc3339(""));
    }

    #[test]
    fn cutoff_subtracts_days() {
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
        assert_eq!(
            cutoff_days_before(now, 3).as_deref(),
            Some("2026-01-07T12:00:00Z")
        );
        assert_eq!(cutoff_days_before(now, 0), None);
    }
}
