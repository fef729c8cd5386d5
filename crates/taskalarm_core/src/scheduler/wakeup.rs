//! External wake-up timer and quiet-hours contracts.

use crate::time::{LocalCalendar, ONE_DAY_MS};

/// The process-wide wake-up timer. Only one instant is armed at a time.
#[cfg_attr(test, mockall::automock)]
pub trait WakeupPrimitive: Send + Sync {
    /// Replaces any armed instant with `timestamp`.
    fn arm(&self, timestamp: i64);
    fn cancel(&self);
}

/// Moves instants that fall inside a do-not-disturb window.
pub trait QuietHoursPolicy: Send + Sync {
    fn adjust(&self, timestamp: i64) -> i64;
}

/// Identity policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoQuietHours;

impl QuietHoursPolicy for NoQuietHours {
    fn adjust(&self, timestamp: i64) -> i64 {
        timestamp
    }
}

/// Daily quiet window in local time.
///
/// A window with `start > end` spans midnight: instants after `start` are
/// deferred to `end` on the following day, instants before `end` to `end`
/// on the same day. Boundaries themselves are not quiet.
#[derive(Debug, Clone, Copy)]
pub struct QuietHours {
    calendar: LocalCalendar,
    start_ms: i64,
    end_ms: i64,
}

impl QuietHours {
    pub fn new(calendar: LocalCalendar, start_ms: i64, end_ms: i64) -> Self {
        Self {
            calendar,
            start_ms,
            end_ms,
        }
    }
}

impl QuietHoursPolicy for QuietHours {
    fn adjust(&self, timestamp: i64) -> i64 {
        let start = self.calendar.at_millis_of_day(timestamp, self.start_ms);
        let end = self.calendar.at_millis_of_day(timestamp, self.end_ms);
        if start > end {
            if timestamp < end {
                end
            } else if timestamp > start {
                end + ONE_DAY_MS
            } else {
                timestamp
            }
        } else if timestamp > start && timestamp < end {
            end
        } else {
            timestamp
        }
    }
}
