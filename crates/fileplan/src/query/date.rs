//! Date literal parsing and matching.
//!
//! ## Supported literals
//!
//! - `today`, `yesterday`, `today-N`, `today+N`
//! - `thisweek`, `lastweek`, `pastweek` (and the `month`/`year` variants)
//! - `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY.MM.DD`
//!
//! Every literal denotes a span of whole days. Relative literals are stored
//! unresolved and only turned into a span against the `today` of the match
//! run, so one compiled query keeps tracking the calendar.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use super::field::Operator;

/// Largest `today±N` offset accepted, roughly 2700 years.
pub const MAX_DAY_OFFSET: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    ThisWeek,
    LastWeek,
    PastWeek,
    ThisMonth,
    LastMonth,
    PastMonth,
    ThisYear,
    LastYear,
    PastYear,
}

impl Period {
    fn lookup(raw: &str) -> Option<Self> {
        match raw {
            "thisweek" => Some(Self::ThisWeek),
            "lastweek" => Some(Self::LastWeek),
            "pastweek" => Some(Self::PastWeek),
            "thismonth" => Some(Self::ThisMonth),
            "lastmonth" => Some(Self::LastMonth),
            "pastmonth" => Some(Self::PastMonth),
            "thisyear" => Some(Self::ThisYear),
            "lastyear" => Some(Self::LastYear),
            "pastyear" => Some(Self::PastYear),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::ThisWeek => "thisweek",
            Self::LastWeek => "lastweek",
            Self::PastWeek => "pastweek",
            Self::ThisMonth => "thismonth",
            Self::LastMonth => "lastmonth",
            Self::PastMonth => "pastmonth",
            Self::ThisYear => "thisyear",
            Self::LastYear => "lastyear",
            Self::PastYear => "pastyear",
        }
    }

    /// First day and day after the last day of the period.
    fn days(self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let year = today.year();
        let month = today.month();
        match self {
            Self::ThisWeek | Self::LastWeek => {
                let mut offset = today.weekday().num_days_from_monday() as i64;
                if self == Self::LastWeek {
                    offset += 7;
                }
                let start = today.checked_sub_signed(Duration::try_days(offset)?)?;
                Some((start, start.checked_add_signed(Duration::try_days(7)?)?))
            }
            Self::ThisMonth => month_span(year, month),
            Self::LastMonth => {
                let (year, month) = if month == 1 {
                    (year.checked_sub(1)?, 12)
                } else {
                    (year, month - 1)
                };
                month_span(year, month)
            }
            Self::ThisYear => year_span(year),
            Self::LastYear => year_span(year.checked_sub(1)?),
            Self::PastWeek => trailing_span(today, 7),
            Self::PastMonth => trailing_span(today, 30),
            Self::PastYear => trailing_span(today, 365),
        }
    }
}

/// Right-hand side of a datetime comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateSpec {
    Absolute(NaiveDate),
    /// Whole days relative to the match-time `today` (`yesterday` is `-1`).
    Relative(i64),
    Period(Period),
}

impl DateSpec {
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        if lower.is_empty() {
            return None;
        }

        if lower == "yesterday" {
            return Some(Self::Relative(-1));
        }
        if let Some(rest) = lower.strip_prefix("today") {
            return parse_day_offset(rest).map(Self::Relative);
        }
        if let Some(period) = Period::lookup(lower.as_str()) {
            return Some(Self::Period(period));
        }
        parse_absolute_date(lower.as_str()).map(Self::Absolute)
    }

    /// True when the span depends on the date of the match run.
    pub fn is_relative(&self) -> bool {
        !matches!(self, Self::Absolute(_))
    }

    /// Half-open span `[start, end)` covered by the literal.
    pub fn span(&self, today: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let (first, after_last) = match self {
            Self::Absolute(date) => (*date, date.succ_opt()?),
            Self::Relative(offset) => {
                let date = today.checked_add_signed(Duration::try_days(*offset)?)?;
                (date, date.succ_opt()?)
            }
            Self::Period(period) => period.days(today)?,
        };
        Some((first.and_hms_opt(0, 0, 0)?, after_last.and_hms_opt(0, 0, 0)?))
    }

    pub fn matches(&self, operator: Operator, timestamp: NaiveDateTime, today: NaiveDate) -> bool {
        let Some((start, end)) = self.span(today) else {
            return false;
        };
        match operator {
            Operator::Eq => start <= timestamp && timestamp < end,
            Operator::Ne => timestamp < start || timestamp >= end,
            Operator::Lt => timestamp < start,
            Operator::Lte => timestamp < end,
            Operator::Gt => timestamp >= end,
            Operator::Gte => timestamp >= start,
            _ => false,
        }
    }
}

impl fmt::Display for DateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Relative(0) => f.write_str("today"),
            Self::Relative(-1) => f.write_str("yesterday"),
            Self::Relative(offset) if *offset > 0 => write!(f, "today+{offset}"),
            Self::Relative(offset) => write!(f, "today{offset}"),
            Self::Period(period) => f.write_str(period.name()),
        }
    }
}

fn parse_day_offset(rest: &str) -> Option<i64> {
    if rest.is_empty() {
        return Some(0);
    }
    let (sign, digits) = match rest.as_bytes()[0] {
        b'-' => (-1, &rest[1..]),
        b'+' => (1, &rest[1..]),
        _ => return None,
    };
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let days = digits.parse::<i64>().ok()?;
    (days <= MAX_DAY_OFFSET).then_some(sign * days)
}

fn parse_absolute_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() < 5 || !raw[..4].chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let format = match raw.as_bytes()[4] {
        b'-' => "%Y-%m-%d",
        b'/' => "%Y/%m/%d",
        b'.' => "%Y.%m.%d",
        _ => return None,
    };
    NaiveDate::parse_from_str(raw, format).ok()
}

fn month_span(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Some((start, NaiveDate::from_ymd_opt(next_year, next_month, 1)?))
}

fn year_span(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?,
    ))
}

fn trailing_span(today: NaiveDate, days: i64) -> Option<(NaiveDate, NaiveDate)> {
    let start = today.checked_sub_signed(Duration::try_days(days - 1)?)?;
    Some((start, today.succ_opt()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(date: NaiveDate, h: u32) -> NaiveDateTime {
        date.and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn relative_forms_parse() {
        assert_eq!(DateSpec::parse("today"), Some(DateSpec::Relative(0)));
        assert_eq!(DateSpec::parse("Yesterday"), Some(DateSpec::Relative(-1)));
        assert_eq!(DateSpec::parse("today-7"), Some(DateSpec::Relative(-7)));
        assert_eq!(DateSpec::parse("today+2"), Some(DateSpec::Relative(2)));
        assert_eq!(DateSpec::parse("today-"), None);
        assert_eq!(DateSpec::parse("todayx"), None);
    }

    #[test]
    fn oversized_offsets_are_rejected() {
        assert_eq!(
            DateSpec::parse("today-1000000"),
            Some(DateSpec::Relative(-MAX_DAY_OFFSET))
        );
        assert_eq!(DateSpec::parse("today-1000001"), None);
        assert_eq!(DateSpec::parse("today-200000000000000"), None);
        assert_eq!(DateSpec::parse("today+99999999999999999999"), None);
    }

    #[test]
    fn spans_out_of_calendar_range_never_match() {
        let today = day(2025, 6, 29);
        let spec = DateSpec::Relative(i64::MIN);
        assert_eq!(spec.span(today), None);
        assert!(!spec.matches(Operator::Lt, at(today, 1), today));
        assert_eq!(DateSpec::Relative(i64::MAX / 2).span(today), None);
    }

    #[test]
    fn absolute_forms_parse() {
        let expected = Some(DateSpec::Absolute(day(2024, 6, 15)));
        assert_eq!(DateSpec::parse("2024-06-15"), expected);
        assert_eq!(DateSpec::parse("2024/06/15"), expected);
        assert_eq!(DateSpec::parse("2024.06.15"), expected);
        assert_eq!(DateSpec::parse("2024-13-01"), None);
        assert_eq!(DateSpec::parse("notadate"), None);
    }

    #[test]
    fn relative_dates_follow_the_match_day() {
        let spec = DateSpec::parse("today").unwrap();
        let monday = day(2025, 6, 30);
        let tuesday = day(2025, 7, 1);
        assert!(spec.matches(Operator::Eq, at(monday, 9), monday));
        assert!(!spec.matches(Operator::Eq, at(monday, 9), tuesday));
        assert!(spec.matches(Operator::Lt, at(monday, 9), tuesday));
    }

    #[test]
    fn comparisons_use_whole_days() {
        let spec = DateSpec::parse("2024-01-01").unwrap();
        let today = day(2025, 1, 1);
        assert!(spec.matches(Operator::Gt, at(day(2024, 1, 2), 0), today));
        assert!(!spec.matches(Operator::Gt, at(day(2024, 1, 1), 23), today));
        assert!(spec.matches(Operator::Gte, at(day(2024, 1, 1), 0), today));
        assert!(spec.matches(Operator::Lte, at(day(2024, 1, 1), 23), today));
        assert!(spec.matches(Operator::Lt, at(day(2023, 12, 31), 23), today));
        assert!(spec.matches(Operator::Ne, at(day(2023, 12, 31), 23), today));
    }

    #[test]
    fn week_starts_on_monday() {
        let spec = DateSpec::parse("thisweek").unwrap();
        let sunday = day(2025, 6, 29);
        assert!(spec.matches(Operator::Eq, at(day(2025, 6, 23), 1), sunday));
        assert!(!spec.matches(Operator::Eq, at(day(2025, 6, 22), 23), sunday));
    }

    #[test]
    fn month_spans_cover_leap_days() {
        let spec = DateSpec::parse("lastmonth").unwrap();
        let today = day(2024, 3, 10);
        assert!(spec.matches(Operator::Eq, at(day(2024, 2, 29), 12), today));
        assert!(!spec.matches(Operator::Eq, at(day(2024, 3, 1), 0), today));
    }

    #[test]
    fn display_round_trips() {
        for raw in ["today", "yesterday", "today-3", "today+1", "thisyear", "2024-06-15"] {
            let spec = DateSpec::parse(raw).unwrap();
            assert_eq!(spec.to_string(), raw);
        }
    }
}
