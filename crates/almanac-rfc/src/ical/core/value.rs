//! iCalendar DATE, PERIOD and property value types (RFC 5545 §3.3).

use std::fmt;

use chrono::{Datelike, NaiveDate};

use super::{DateTime, Duration};

/// DATE value (RFC 5545 §3.3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl Date {
    #[must_use]
    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    /// Returns the chrono date, or `None` for an impossible date.
    #[must_use]
    pub fn naive(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )
    }

    /// Builds a DATE from a chrono date. Years outside `0..=65535` saturate.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "chrono guarantees month and day fit in u8"
    )]
    pub fn from_naive(date: NaiveDate) -> Self {
        let year = u16::try_from(date.year()).unwrap_or(if date.year() < 0 { 0 } else { u16::MAX });
        Self::new(year, date.month() as u8, date.day() as u8)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

/// PERIOD value (RFC 5545 §3.3.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    /// Explicit start and end.
    Explicit { start: DateTime, end: DateTime },
    /// Start plus a (positive) duration.
    Duration { start: DateTime, duration: Duration },
}

impl Period {
    #[must_use]
    pub fn explicit(start: DateTime, end: DateTime) -> Self {
        Self::Explicit { start, end }
    }

    #[must_use]
    pub fn from_duration(start: DateTime, duration: Duration) -> Self {
        Self::Duration { start, duration }
    }

    /// Returns the start of the period.
    #[must_use]
    pub fn start(&self) -> &DateTime {
        match self {
            Self::Explicit { start, .. } | Self::Duration { start, .. } => start,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit { start, end } => write!(f, "{start}/{end}"),
            Self::Duration { start, duration } => write!(f, "{start}/{duration}"),
        }
    }
}

/// Typed property value.
///
/// Multi-valued properties (RDATE, EXDATE, FREEBUSY) carry their whole
/// comma-separated list in one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i32),
    Date(Date),
    DateTime(DateTime),
    Duration(Duration),
    Period(Period),
    DateList(Vec<Date>),
    DateTimeList(Vec<DateTime>),
    PeriodList(Vec<Period>),
    /// RECUR value kept in its textual form (`FREQ=DAILY;COUNT=5`).
    Recur(String),
    /// Unknown or unparsed value.
    Unknown(String),
}

impl Value {
    /// Returns this value as text, if it is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_datetime(&self) -> Option<&DateTime> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<&Date> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_duration(&self) -> Option<&Duration> {
        match self {
            Self::Duration(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the recurrence rule text for RECUR values, or text values that hold one.
    #[must_use]
    pub fn as_recur(&self) -> Option<&str> {
        match self {
            Self::Recur(r) | Self::Text(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the textual representation used for text matching.
    #[must_use]
    pub fn to_match_text(&self) -> String {
        match self {
            Self::Text(s) | Self::Recur(s) | Self::Unknown(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Date(d) => d.to_string(),
            Self::DateTime(dt) => dt.to_string(),
            Self::Duration(d) => d.to_string(),
            Self::Period(p) => p.to_string(),
            Self::DateList(list) => join(list),
            Self::DateTimeList(list) => join(list),
            Self::PeriodList(list) => join(list),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
