use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::ops::RangeInclusive;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%m/%d/%y",
    "%m-%d-%y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%Y%m%d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

/// Years a parsed date may fall in; anything else is a misread layout.
const PLAUSIBLE_YEARS: RangeInclusive<i32> = 1900..=2200;

/// `%Y` also accepts one or two digits, so year-first layouts are only tried
/// when the value starts with a four-digit year.
fn layout_applies(fmt: &str, value: &str) -> bool {
    !fmt.starts_with("%Y") || value.chars().take(4).filter(char::is_ascii_digit).count() == 4
}

fn plausible(date: NaiveDate) -> Option<NaiveDate> {
    PLAUSIBLE_YEARS.contains(&date.year()).then_some(date)
}

/// Permissive date parse. Returns `None` when no known layout matches;
/// substituting a default is the caller's job.
///
/// Ambiguous slash dates are read month-first (`01/02/2024` is January 2nd)
/// and two-digit years land in 1970..=2069 (`06/01/24` is June 1st 2024).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return None;
    }

    let without_tz = cleaned
        .trim_end_matches('Z')
        .trim_end_matches("+00:00")
        .trim_end_matches("-00:00");

    let date = DATE_FORMATS
        .iter()
        .filter(|fmt| layout_applies(fmt, cleaned))
        .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok().and_then(plausible));
    if date.is_some() {
        return date;
    }

    DATETIME_FORMATS
        .iter()
        .filter(|fmt| layout_applies(fmt, without_tz))
        .find_map(|fmt| {
            NaiveDateTime::parse_from_str(without_tz, fmt)
                .ok()
                .and_then(|dt| plausible(dt.date()))
        })
}

/// Whole days from `from` to `to`; negative when `to` is earlier.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Inclusive day count of `[start, end]`, floored at 0.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (days_between(start, end) + 1).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_common_layouts() {
        assert_eq!(parse_date("2024-03-15"), Some(ymd(2024, 3, 15)));
        assert_eq!(parse_date("2024/03/15"), Some(ymd(2024, 3, 15)));
        assert_eq!(parse_date("03/15/2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(parse_date("15/03/2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(parse_date("15.03.2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(parse_date("Mar 15, 2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(parse_date("15 March 2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(parse_date("20240315"), Some(ymd(2024, 3, 15)));
        assert_eq!(parse_date("2024-03-15 00:00:00"), Some(ymd(2024, 3, 15)));
        assert_eq!(parse_date("2024-03-15T08:30:00Z"), Some(ymd(2024, 3, 15)));
    }

    #[test]
    fn test_ambiguous_slash_date_is_month_first() {
        assert_eq!(parse_date("01/02/2024"), Some(ymd(2024, 1, 2)));
    }

    #[test]
    fn test_two_digit_years_are_month_first() {
        assert_eq!(parse_date("06/01/24"), Some(ymd(2024, 6, 1)));
        assert_eq!(parse_date("6/1/24"), Some(ymd(2024, 6, 1)));
        assert_eq!(parse_date("12/31/24"), Some(ymd(2024, 12, 31)));
        assert_eq!(parse_date("06-01-24"), Some(ymd(2024, 6, 1)));
    }

    #[test]
    fn test_implausible_years_are_rejected() {
        assert_eq!(parse_date("0006-01-24"), None);
        assert_eq!(parse_date("9999-01-01"), None);
        assert_eq!(parse_date("06/01/0024"), None);
    }

    #[test]
    fn test_unparseable_date_is_absent() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("ongoing"), None);
        assert_eq!(parse_date("2024-13-40"), None);
    }

    #[test]
    fn test_inclusive_days() {
        assert_eq!(inclusive_days(ymd(2024, 1, 1), ymd(2024, 1, 1)), 1);
        assert_eq!(inclusive_days(ymd(2024, 1, 1), ymd(2024, 1, 20)), 20);
        assert_eq!(inclusive_days(ymd(2024, 1, 5), ymd(2024, 1, 1)), 0);
        assert_eq!(days_between(ymd(2024, 1, 5), ymd(2024, 1, 1)), -4);
    }
}
