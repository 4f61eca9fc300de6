use std::fmt::{Display, Formatter};

use time::{Date, Month, OffsetDateTime};

use crate::ValidationError;

pub const MAX_HISTORY_YEARS: u16 = 100;

/// Inclusive calendar-day window shared by every fetch in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: Date,
    end: Date,
}

impl DateRange {
    /// `years` calendar years back from `end` on the same month and day.
    ///
    /// 29 February falls back to 28 February when the start year has none.
    pub fn trailing_years(end: Date, years: u16) -> Result<Self, ValidationError> {
        if years == 0 || years > MAX_HISTORY_YEARS {
            return Err(ValidationError::InvalidHistoryYears {
                value: years,
                max: MAX_HISTORY_YEARS,
            });
        }

        let year = end.year() - i32::from(years);
        let start = Date::from_calendar_date(year, end.month(), end.day())
            .or_else(|_| Date::from_calendar_date(year, Month::February, 28))
            .map_err(|_| ValidationError::InvalidHistoryYears {
                value: years,
                max: MAX_HISTORY_YEARS,
            })?;

        Ok(Self { start, end })
    }

    pub const fn start(&self) -> Date {
        self.start
    }

    pub const fn end(&self) -> Date {
        self.end
    }

    /// Epoch seconds at the first instant of `start`, UTC.
    pub fn start_epoch(&self) -> i64 {
        self.start.midnight().assume_utc().unix_timestamp()
    }

    /// Epoch seconds at the first instant after `end`, UTC, so the end day is included.
    pub fn end_epoch_exclusive(&self) -> i64 {
        self.end.midnight().assume_utc().unix_timestamp() + 86_400
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Today's date in UTC.
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}
