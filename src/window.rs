//! Date windows for contact fetching.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// Half-open UTC interval `[start, end)` covering whole local days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl DateWindow {
    /// Days `first..=last` in a timezone `utc_offset_minutes` east of UTC.
    pub fn for_days(first: NaiveDate, last: NaiveDate, utc_offset_minutes: i32) -> Result<Self> {
        if last < first {
            bail!("window end {} is before start {}", last, first);
        }
        let offset = Duration::minutes(i64::from(utc_offset_minutes));
        let local_midnight = |day: NaiveDate| day.and_time(chrono::NaiveTime::MIN).and_utc() - offset;

        let next = last
            .succ_opt()
            .with_context(|| format!("no day after {}", last))?;

        Ok(Self {
            start: local_midnight(first),
            end: local_midnight(next),
            first_day: first,
            last_day: last,
        })
    }

    pub fn single_day(day: NaiveDate, utc_offset_minutes: i32) -> Result<Self> {
        Self::for_days(day, day, utc_offset_minutes)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first_day == self.last_day {
            write!(f, "{}", self.first_day)
        } else {
            write!(f, "{} .. {}", self.first_day, self.last_day)
        }
    }
}

/// Parse a `YYYY-MM-DD` command-line date.
pub fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", s))
}
