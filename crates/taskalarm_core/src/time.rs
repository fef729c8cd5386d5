//! Calendar arithmetic on epoch-millisecond timestamps.
//!
//! Local days are defined by a fixed UTC offset from configuration.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

pub const ONE_SECOND_MS: i64 = 1_000;
pub const ONE_MINUTE_MS: i64 = 60 * ONE_SECOND_MS;
pub const ONE_HOUR_MS: i64 = 60 * ONE_MINUTE_MS;
pub const ONE_DAY_MS: i64 = 24 * ONE_HOUR_MS;
pub const ONE_WEEK_MS: i64 = 7 * ONE_DAY_MS;

/// Local calendar under a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCalendar {
    offset: FixedOffset,
}

impl Default for LocalCalendar {
    fn default() -> Self {
        Self::utc()
    }
}

impl LocalCalendar {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Returns `None` when the offset is outside ±24h.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        let seconds = minutes.checked_mul(60)?;
        FixedOffset::east_opt(seconds).map(|offset| Self { offset })
    }

    /// Local midnight of the day containing `timestamp`.
    pub fn start_of_day(&self, timestamp: i64) -> i64 {
        let Some(utc) = DateTime::from_timestamp_millis(timestamp) else {
            return timestamp;
        };
        self.midnight_of(utc.with_timezone(&self.offset).date_naive())
    }

    /// Local midnight of `date`.
    pub fn midnight_of(&self, date: NaiveDate) -> i64 {
        date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
            - i64::from(self.offset.local_minus_utc()) * ONE_SECOND_MS
    }

    /// `millis_of_day` after local midnight of the day containing `timestamp`.
    pub fn at_millis_of_day(&self, timestamp: i64, millis_of_day: i64) -> i64 {
        self.start_of_day(timestamp) + millis_of_day
    }
}

/// Truncates `timestamp` to the start of its minute.
pub fn start_of_minute(timestamp: i64) -> i64 {
    timestamp - timestamp.rem_euclid(ONE_MINUTE_MS)
}
