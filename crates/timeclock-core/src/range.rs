//! Date range resolution for pull-direction fetches.
//!
//! Every fetch entry point expresses a reporting window as a token plus, for
//! `custom`, an inclusive start and end date. The resolver turns that into a
//! concrete half-open `[start, end)` interval of naive local instants.

use crate::{Result, error::Error};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named range token accepted by the fetch APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeToken {
    /// Start of today through start of tomorrow
    Today,
    /// Today plus the 6 preceding days
    SevenDays,
    /// Today plus the 29 preceding days
    ThirtyDays,
    /// Start of the current month through start of tomorrow
    Month,
    /// Caller-supplied inclusive start and end dates
    Custom,
}

impl RangeToken {
    /// Parse a token from its wire spelling.
    ///
    /// # Errors
    /// Returns `Error::InvalidRange` on an unrecognized token.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "today" => Ok(RangeToken::Today),
            "7days" => Ok(RangeToken::SevenDays),
            "30days" => Ok(RangeToken::ThirtyDays),
            "month" => Ok(RangeToken::Month),
            "custom" => Ok(RangeToken::Custom),
            _ => Err(Error::InvalidRange {
                message: format!("Unknown range token: {s}"),
            }),
        }
    }

    /// The wire spelling of this token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RangeToken::Today => "today",
            RangeToken::SevenDays => "7days",
            RangeToken::ThirtyDays => "30days",
            RangeToken::Month => "month",
            RangeToken::Custom => "custom",
        }
    }
}

impl fmt::Display for RangeToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RangeToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RangeToken::parse(s)
    }
}

/// Half-open `[start, end)` interval of naive local instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    /// Returns `true` if the instant falls inside the interval.
    #[must_use]
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Resolve a range token against a reference instant.
///
/// `custom_start`/`custom_end` are inclusive dates and are required only for
/// `RangeToken::Custom`; they are ignored for every other token. The end date
/// is inclusive at day granularity, so `custom` over a single day yields an
/// interval exactly one day wide.
///
/// # Errors
/// Returns `Error::InvalidRange` if `custom` is requested without both dates
/// or with `start > end`, or if date arithmetic overflows the calendar.
pub fn resolve_range(
    token: RangeToken,
    now: NaiveDateTime,
    custom_start: Option<NaiveDate>,
    custom_end: Option<NaiveDate>,
) -> Result<DateRange> {
    let today = now.date();
    let tomorrow = next_day(today)?;

    let (start_day, end_day) = match token {
        RangeToken::Today => (today, tomorrow),
        RangeToken::SevenDays => (back_days(today, 6)?, tomorrow),
        RangeToken::ThirtyDays => (back_days(today, 29)?, tomorrow),
        RangeToken::Month => {
            let first = today.with_day(1).ok_or_else(|| Error::InvalidRange {
                message: format!("Cannot compute month start for {today}"),
            })?;
            (first, tomorrow)
        }
        RangeToken::Custom => {
            let (start, end) = match (custom_start, custom_end) {
                (Some(start), Some(end)) => (start, end),
                _ => {
                    return Err(Error::InvalidRange {
                        message: "Custom range requires both start and end dates".to_string(),
                    });
                }
            };
            if start > end {
                return Err(Error::InvalidRange {
                    message: format!("Custom range start {start} is after end {end}"),
                });
            }
            (start, next_day(end)?)
        }
    };

    Ok(DateRange {
        start: start_of_day(start_day),
        end: start_of_day(end_day),
    })
}

fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_hms_opt(0, 0, 0).unwrap_or_default()
}

fn next_day(day: NaiveDate) -> Result<NaiveDate> {
    day.checked_add_days(Days::new(1))
        .ok_or_else(|| Error::InvalidRange {
            message: format!("Date overflow past {day}"),
        })
}

fn back_days(day: NaiveDate, n: u64) -> Result<NaiveDate> {
    day.checked_sub_days(Days::new(n))
        .ok_or_else(|| Error::InvalidRange {
            message: format!("Date underflow before {day}"),
        })
}
