//! Calendar, period and date-range helpers.
//!
//! A bid month is accounted over a "blend" period which can be slightly
//! wider or narrower than the literal calendar month.

use std::collections::BTreeSet;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::BidError;

/// A calendar month, e.g. `2019-10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, BidError> {
        if !(1..=12).contains(&month) {
            return Err(BidError::Config(format!("month out of range: {}", month)));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        self.day(1)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day() - Days::new(1)
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    fn day(&self, day: u32) -> NaiveDate {
        // Month is validated at construction, day 1 always exists.
        NaiveDate::from_ymd_opt(self.year, self.month, day).unwrap_or(NaiveDate::MIN)
    }
}

impl FromStr for YearMonth {
    type Err = BidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| BidError::Config(format!("expected YYYY-MM, got {:?}", s)))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| BidError::Config(format!("bad year in {:?}", s)))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| BidError::Config(format!("bad month in {:?}", s)))?;
        YearMonth::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = BidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Duration with minute granularity, used for credit, block and duty time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Period {
    minutes: i64,
}

impl Period {
    pub const ZERO: Period = Period { minutes: 0 };

    pub fn hours(hours: i64) -> Self {
        Self { minutes: hours * 60 }
    }

    pub fn minutes(minutes: i64) -> Self {
        Self { minutes }
    }

    pub fn total_minutes(&self) -> i64 {
        self.minutes
    }

    /// Ratio of two periods, 0.0 when the divisor is zero.
    pub fn ratio(&self, other: Period) -> f64 {
        if other.minutes == 0 {
            0.0
        } else {
            self.minutes as f64 / other.minutes as f64
        }
    }
}

impl Add for Period {
    type Output = Period;

    fn add(self, rhs: Period) -> Period {
        Period {
            minutes: self.minutes + rhs.minutes,
        }
    }
}

impl Sub for Period {
    type Output = Period;

    fn sub(self, rhs: Period) -> Period {
        Period {
            minutes: self.minutes - rhs.minutes,
        }
    }
}

impl Sum for Period {
    fn sum<I: Iterator<Item = Period>>(iter: I) -> Period {
        iter.fold(Period::ZERO, |acc, p| acc + p)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minutes < 0 { "-" } else { "" };
        let abs = self.minutes.abs();
        write!(f, "{}{}:{:02}", sign, abs / 60, abs % 60)
    }
}

/// Half-open date-time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// From the start of `first` to 23:59 on `last`.
    pub fn from_dates(first: NaiveDate, last: NaiveDate) -> Self {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN);
        Self {
            start: first.and_time(NaiveTime::MIN),
            end: last.and_time(end_of_day),
        }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when the two intervals touch end-to-start within one minute.
    pub fn abuts(&self, other: &Interval) -> bool {
        let one_minute = chrono::Duration::minutes(1);
        let gap_after = other.start - self.end;
        let gap_before = self.start - other.end;
        (gap_after >= chrono::Duration::zero() && gap_after <= one_minute)
            || (gap_before >= chrono::Duration::zero() && gap_before <= one_minute)
    }

    pub fn span(&self, other: &Interval) -> Interval {
        Interval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// The blend period a month's credit accounting covers.
#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    year_month: YearMonth,
}

impl Calendar {
    pub fn new(year_month: YearMonth) -> Self {
        Self { year_month }
    }

    pub fn year_month(&self) -> YearMonth {
        self.year_month
    }

    pub fn is_within_period(&self, date: NaiveDate) -> bool {
        date >= self.first_date_in_period() && date <= self.last_date_in_period()
    }

    pub fn remaining_dates_in_period(&self, today: NaiveDate) -> Vec<NaiveDate> {
        self.first_date_in_period()
            .iter_days()
            .take_while(|date| *date <= self.last_date_in_period())
            .filter(|date| *date >= today)
            .collect()
    }

    pub fn first_date_in_period(&self) -> NaiveDate {
        let ym = self.year_month;
        match ym.month() {
            2 => ym.previous().last_day(),
            3 => ym.first_day() + Days::new(1),
            _ => ym.first_day(),
        }
    }

    pub fn last_date_in_period(&self) -> NaiveDate {
        let ym = self.year_month;
        match ym.month() {
            1 => ym.last_day() - Days::new(1),
            2 => ym.next().first_day(),
            _ => ym.last_day(),
        }
    }
}

/// Length of the longest run of consecutive days in `dates`.
pub fn longest_consecutive_run(dates: &BTreeSet<NaiveDate>) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<NaiveDate> = None;
    for date in dates {
        current = match previous {
            Some(prev) if prev.succ_opt() == Some(*date) => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(*date);
    }
    longest
}

pub fn exceeds_consecutive(limit: usize, dates: &BTreeSet<NaiveDate>) -> bool {
    dates.len() > limit && longest_consecutive_run(dates) > limit
}

/// Every date from `start` for `num_days` days.
pub fn date_run(start: NaiveDate, num_days: u32) -> BTreeSet<NaiveDate> {
    start.iter_days().take(num_days.max(1) as usize).collect()
}
