//! Payload date strings.
//!
//! Dates travel as local wall-clock strings in [`DATE_FORMAT`]. The
//! format has minute precision, so a parsed value is the original
//! truncated to the minute.

use chrono::{Local, NaiveDateTime};

use crate::constants::DATE_FORMAT;

pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(DATE_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// Parse a payload date, substituting the current time when the string
/// does not conform to [`DATE_FORMAT`].
pub fn parse_timestamp_or_now(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap_or_else(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn test_format() {
        let ts = NaiveDate::from_ymd_opt(2025, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 42)
            .unwrap();
        assert_eq!(format_timestamp(&ts), "07/03/2025 at 09:05");
    }

    #[test]
    fn test_parse_truncates_to_minute() {
        let ts = now();
        let parsed = parse_timestamp(&format_timestamp(&ts)).unwrap();
        assert_eq!(parsed, ts.with_second(0).unwrap().with_nanosecond(0).unwrap());
    }

    #[test]
    fn test_garbage_falls_back_to_now() {
        assert!(parse_timestamp("yesterday-ish").is_none());
        assert!(parse_timestamp("2025-03-07T09:05:00").is_none());

        let before = now() - chrono::Duration::seconds(1);
        let fallback = parse_timestamp_or_now("not a date");
        assert!(fallback >= before);
    }
}
