//! Date and timestamp parsing for text values.
//!
//! Configured formats are tried first, in order. With format detection enabled,
//! text none of them accepts is inspected for its separator and part widths.
//! Detection also settles day/month order when the middle part cannot be a
//! month.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::DateFormatConfig;

/// Parse a date with the configured formats, then a detected one
#[must_use]
pub fn parse_date_string(s: &str, config: &DateFormatConfig) -> Option<NaiveDate> {
    let configured = config
        .date_formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok());
    if configured.is_some() || !config.enable_format_detection {
        return configured;
    }
    detect_date_format(s).and_then(|format| NaiveDate::parse_from_str(s, format).ok())
}

/// Parse a timestamp.
///
/// After the configured formats, detection accepts RFC 3339 text with an offset
/// (normalised to UTC). A bare date is read as midnight.
#[must_use]
pub fn parse_timestamp_string(s: &str, config: &DateFormatConfig) -> Option<NaiveDateTime> {
    config
        .timestamp_formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            config
                .enable_format_detection
                .then(|| DateTime::parse_from_rfc3339(s).ok())
                .flatten()
                .map(|ts| ts.naive_utc())
        })
        .or_else(|| parse_date_string(s, config).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

#[derive(Clone, Copy)]
enum PartOrder {
    YearFirst,
    DayFirst,
    MonthFirst,
}

/// Guess a date format from the shape of the text.
///
/// Recognises compact `YYYYMMDD` and three numeric parts joined by one of
/// `-`, `/` or `.`, with the four-digit year either first or last. A year-last
/// date reads day first unless the middle part is above 12.
#[must_use]
pub fn detect_date_format(s: &str) -> Option<&'static str> {
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return Some("%Y%m%d");
    }

    let sep = s.chars().find(|c| matches!(c, '-' | '/' | '.'))?;
    let mut parts = s.split(sep);
    let (Some(first), Some(middle), Some(last), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let numeric = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !(numeric(first) && numeric(middle) && numeric(last)) {
        return None;
    }

    let order = if first.len() == 4 {
        PartOrder::YearFirst
    } else if last.len() == 4 {
        if middle.parse::<u32>().is_ok_and(|m| m > 12) {
            PartOrder::MonthFirst
        } else {
            PartOrder::DayFirst
        }
    } else {
        return None;
    };

    match (order, sep) {
        (PartOrder::YearFirst, '-') => Some("%Y-%m-%d"),
        (PartOrder::YearFirst, '/') => Some("%Y/%m/%d"),
        (PartOrder::YearFirst, '.') => Some("%Y.%m.%d"),
        (PartOrder::DayFirst, '-') => Some("%d-%m-%Y"),
        (PartOrder::DayFirst, '/') => Some("%d/%m/%Y"),
        (PartOrder::DayFirst, '.') => Some("%d.%m.%Y"),
        (PartOrder::MonthFirst, '-') => Some("%m-%d-%Y"),
        (PartOrder::MonthFirst, '/') => Some("%m/%d/%Y"),
        (PartOrder::MonthFirst, '.') => Some("%m.%d.%Y"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_formats() -> DateFormatConfig {
        DateFormatConfig {
            date_formats: Vec::new(),
            timestamp_formats: Vec::new(),
            enable_format_detection: true,
        }
    }

    #[test]
    fn test_parse_known_formats() {
        let config = DateFormatConfig::default();
        let expected = NaiveDate::from_ymd_opt(2023, 1, 15);
        assert_eq!(parse_date_string("2023-01-15", &config), expected);
        assert_eq!(parse_date_string("15.01.2023", &config), expected);
        assert_eq!(parse_date_string("20230115", &config), expected);
        assert_eq!(parse_date_string("not a date", &config), None);
    }

    #[test]
    fn test_detection_covers_unlisted_shapes() {
        let config = DateFormatConfig::default();
        let expected = NaiveDate::from_ymd_opt(2023, 1, 15);
        assert_eq!(parse_date_string("2023/01/15", &config), expected);
        assert_eq!(parse_date_string("2023.01.15", &config), expected);
        // month first, because 15 cannot be a month
        assert_eq!(parse_date_string("01/15/2023", &config), expected);
        assert_eq!(parse_date_string("01-15-2023", &no_formats()), expected);

        let strict = DateFormatConfig {
            enable_format_detection: false,
            ..DateFormatConfig::default()
        };
        assert_eq!(parse_date_string("01/15/2023", &strict), None);
    }

    #[test]
    fn test_detect_date_format() {
        assert_eq!(detect_date_format("03/04/2023"), Some("%d/%m/%Y"));
        assert_eq!(detect_date_format("03/14/2023"), Some("%m/%d/%Y"));
        assert_eq!(detect_date_format("2023-1-5"), Some("%Y-%m-%d"));
        assert_eq!(detect_date_format("2023-01/15"), None);
        assert_eq!(detect_date_format("15 Jan 2023"), None);
        assert_eq!(detect_date_format("1/2/3"), None);
    }

    #[test]
    fn test_parse_timestamp_falls_back_to_date() {
        let config = DateFormatConfig::default();
        let ts = parse_timestamp_string("2023-01-15", &config).unwrap();
        assert_eq!(ts.to_string(), "2023-01-15 00:00:00");
        let ts = parse_timestamp_string("2023-01-15 08:30:00", &config).unwrap();
        assert_eq!(ts.to_string(), "2023-01-15 08:30:00");
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let ts = parse_timestamp_string("2023-01-15T08:30:00+02:00", &no_formats()).unwrap();
        assert_eq!(ts.to_string(), "2023-01-15 06:30:00");
    }
}
