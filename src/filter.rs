/// Inclusive date-range filter applied to record timestamps before bucketing.
use chrono::{DateTime, FixedOffset, NaiveDate};

/// Accepted format for `--fromdate` / `--todate`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive `[from, to]` bounds on the date part of a timestamp.
/// A missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// A date flag that is not `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDate {
    pub flag: &'static str,
    pub value: String,
}

impl std::fmt::Display for InvalidDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid {} value {:?}: expected YYYY-MM-DD",
            self.flag, self.value
        )
    }
}

impl std::error::Error for InvalidDate {}

impl DateRange {
    /// Build a range from the raw CLI strings, validating both.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, InvalidDate> {
        Ok(Self {
            from: from.map(|v| parse_date("--fromdate", v)).transpose()?,
            to: to.map(|v| parse_date("--todate", v)).transpose()?,
        })
    }

    /// True when no bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Whether a timestamp's date (in the log's own offset) falls inside the range.
    pub fn contains(&self, timestamp: &DateTime<FixedOffset>) -> bool {
        let date = timestamp.date_naive();
        if self.from.is_some_and(|from| date < from) {
            return false;
        }
        if self.to.is_some_and(|to| date > to) {
            return false;
        }
        true
    }
}

fn parse_date(flag: &'static str, value: &str) -> Result<NaiveDate, InvalidDate> {
    let invalid = || InvalidDate {
        flag,
        value: value.to_string(),
    };
    // chrono accepts unpadded fields and signed years; insist on the exact shape.
    let shaped = value.len() == 10
        && value
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if !shaped {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_timestamp;

    fn ts(text: &str) -> DateTime<FixedOffset> {
        parse_timestamp(text).unwrap()
    }

    #[test]
    fn test_unbounded_accepts_everything() {
        let range = DateRange::parse(None, None).unwrap();
        assert!(range.is_unbounded());
        assert!(range.contains(&ts("01/Jan/1999:00:00:00 +0000")));
    }

    #[test]
    fn test_inclusive_bounds() {
        let range = DateRange::parse(Some("2025-11-01"), Some("2025-11-07")).unwrap();
        assert!(!range.contains(&ts("31/Oct/2025:23:59:59 +0000")));
        assert!(range.contains(&ts("01/Nov/2025:00:00:00 +0000")));
        assert!(range.contains(&ts("04/Nov/2025:12:00:00 +0000")));
        assert!(range.contains(&ts("07/Nov/2025:23:59:59 +0000")));
        assert!(!range.contains(&ts("08/Nov/2025:00:00:00 +0000")));
    }

    #[test]
    fn test_open_ended_bounds() {
        let from_only = DateRange::parse(Some("2025-11-01"), None).unwrap();
        assert!(from_only.contains(&ts("01/Jan/2030:00:00:00 +0000")));
        assert!(!from_only.contains(&ts("31/Oct/2025:10:00:00 +0000")));

        let to_only = DateRange::parse(None, Some("2025-11-07")).unwrap();
        assert!(to_only.contains(&ts("01/Jan/2000:00:00:00 +0000")));
        assert!(!to_only.contains(&ts("08/Nov/2025:00:00:01 +0000")));
    }

    #[test]
    fn test_date_uses_log_offset() {
        // 23:30 on Nov 7 at -0500 is already Nov 8 in UTC.
        let range = DateRange::parse(None, Some("2025-11-07")).unwrap();
        assert!(range.contains(&ts("07/Nov/2025:23:30:00 -0500")));
    }

    #[test]
    fn test_invalid_dates_rejected() {
        for bad in ["2025-13-01", "2025-11-31", "11/01/2025", "2025-1-1", "", "yesterday", "+2025-11-01"] {
            let err = DateRange::parse(Some(bad), None).unwrap_err();
            assert_eq!(err.flag, "--fromdate");
            assert_eq!(err.value, bad);
        }
        let err = DateRange::parse(Some("2025-11-01"), Some("2025/11/07")).unwrap_err();
        assert_eq!(err.flag, "--todate");
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }
}
