//! Maps human period labels ("Today", "Last week", "March", ...) to a
//! half-open Unix-time interval computed in the operating region's civil time.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Days, Month, Months, NaiveDate, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Kyiv;

/// Quarter hours searched past a skipped midnight.
const MIDNIGHT_GAP_STEPS: i64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Today,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    /// That calendar month of the current year.
    Month(Month),
}

/// `[from, to)` in Unix seconds. `to` is `None` when the interval runs through now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub from: i64,
    pub to: Option<i64>,
}

const RELATIVE: [Period; 5] = [
    Period::Today,
    Period::ThisWeek,
    Period::LastWeek,
    Period::ThisMonth,
    Period::LastMonth,
];

const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

/// Resolves `label` against the given instant.
pub fn resolve(label: &str, now: DateTime<Tz>) -> Result<Interval> {
    label.parse::<Period>()?.interval(now)
}

pub fn now_in(tz: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&tz)
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::Today => "Today",
            Period::ThisWeek => "This week",
            Period::LastWeek => "Last week",
            Period::ThisMonth => "This month",
            Period::LastMonth => "Last month",
            Period::Month(month) => month.name(),
        }
    }

    /// Label with spaces replaced by underscores, safe inside callback payloads.
    pub fn token(&self) -> String {
        self.label().replace(' ', "_")
    }

    /// Whether items in this period can still change as new transactions arrive.
    pub fn is_current(&self, now: DateTime<Tz>) -> bool {
        match self {
            Period::Month(month) => month.number_from_month() == now.month(),
            _ => true,
        }
    }

    /// Periods offered to the user: the relative buckets, then every month of
    /// the year up to and including the current one.
    pub fn choices(now: DateTime<Tz>) -> Vec<Period> {
        let current = now.month() as usize;
        RELATIVE
            .iter()
            .copied()
            .chain(MONTHS.iter().take(current).map(|m| Period::Month(*m)))
            .collect()
    }

    pub fn interval(&self, now: DateTime<Tz>) -> Result<Interval> {
        let tz = now.timezone();
        let today = now.date_naive();
        let invalid = || Error::InvalidPeriod(self.label().to_owned());

        let (from, to) = match self {
            Period::Today => (today, None),
            Period::ThisWeek => (week_start(today).ok_or_else(invalid)?, None),
            Period::LastWeek => {
                let this_week = week_start(today).ok_or_else(invalid)?;
                let last_week = this_week
                    .checked_sub_days(Days::new(7))
                    .ok_or_else(invalid)?;
                (last_week, Some(this_week))
            }
            Period::ThisMonth => (month_start(today).ok_or_else(invalid)?, None),
            Period::LastMonth => {
                let this_month = month_start(today).ok_or_else(invalid)?;
                let last_month = this_month
                    .checked_sub_months(Months::new(1))
                    .ok_or_else(invalid)?;
                (last_month, Some(this_month))
            }
            Period::Month(month) => {
                let start = NaiveDate::from_ymd_opt(today.year(), month.number_from_month(), 1)
                    .ok_or_else(invalid)?;
                let end = start
                    .checked_add_months(Months::new(1))
                    .ok_or_else(invalid)?;
                if self.is_current(now) {
                    (start, None)
                } else {
                    (start, Some(end))
                }
            }
        };

        Ok(Interval {
            from: midnight(&tz, from).ok_or_else(invalid)?,
            to: match to {
                Some(to) => Some(midnight(&tz, to).ok_or_else(invalid)?),
                None => None,
            },
        })
    }
}

/// Monday of the ISO week containing `date`.
fn week_start(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_sub_days(Days::new(date.weekday().num_days_from_monday().into()))
}

fn month_start(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)
}

/// Start of the civil day `date`. Where a DST change skips 00:00 the day starts
/// at the first local time that exists.
fn midnight(tz: &Tz, date: NaiveDate) -> Option<i64> {
    let local = date.and_hms_opt(0, 0, 0)?;
    (0..=MIDNIGHT_GAP_STEPS)
        .map(|step| local + TimeDelta::minutes(15 * step))
        .find_map(|at| tz.from_local_datetime(&at).earliest())
        .map(|at| at.timestamp())
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(label: &str) -> Result<Self> {
        let period = match label {
            "Today" => Period::Today,
            "This week" => Period::ThisWeek,
            "Last week" => Period::LastWeek,
            "This month" => Period::ThisMonth,
            "Last month" => Period::LastMonth,
            other => MONTHS
                .iter()
                .find(|month| month.name() == other)
                .map(|month| Period::Month(*month))
                .ok_or_else(|| Error::InvalidPeriod(label.to_owned()))?,
        };
        Ok(period)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
