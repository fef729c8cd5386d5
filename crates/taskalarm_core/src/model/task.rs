//! Task snapshot as seen by the alarm engine.
//!
//! # Invariants
//! - `due_at`/`hide_until` carry a separate "has time of day" flag; date-only
//!   values resolve through the configured default notification time.
//! - Ring modes are mutually exclusive; the last write wins.

use crate::model::alarm::AlarmRule;
use crate::model::ValidationError;
use crate::time::ONE_DAY_MS;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable task identifier.
pub type TaskId = Uuid;

/// How insistently a delivered reminder rings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingMode {
    #[default]
    Once,
    FiveTimes,
    NonStop,
}

const FLAG_AT_DEADLINE: u32 = 1 << 1;
const FLAG_AFTER_DEADLINE: u32 = 1 << 2;
const FLAG_RING_NONSTOP: u32 = 1 << 3;
const FLAG_RING_FIVE_TIMES: u32 = 1 << 4;
const FLAG_AT_START: u32 = 1 << 5;

/// Per-task notification mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationFlags {
    pub at_start: bool,
    pub at_deadline: bool,
    pub after_deadline: bool,
    ring: RingMode,
}

impl NotificationFlags {
    pub fn ring_mode(&self) -> RingMode {
        self.ring
    }

    /// Enables or disables non-stop ringing. Enabling clears five-times mode.
    pub fn set_ring_nonstop(&mut self, enabled: bool) {
        if enabled {
            self.ring = RingMode::NonStop;
        } else if self.ring == RingMode::NonStop {
            self.ring = RingMode::Once;
        }
    }

    /// Enables or disables five-times ringing. Enabling clears non-stop mode.
    pub fn set_ring_five_times(&mut self, enabled: bool) {
        if enabled {
            self.ring = RingMode::FiveTimes;
        } else if self.ring == RingMode::FiveTimes {
            self.ring = RingMode::Once;
        }
    }

    /// Packs the flags into the persisted bit layout.
    pub fn to_bits(self) -> u32 {
        let mut bits = 0;
        if self.at_start {
            bits |= FLAG_AT_START;
        }
        if self.at_deadline {
            bits |= FLAG_AT_DEADLINE;
        }
        if self.after_deadline {
            bits |= FLAG_AFTER_DEADLINE;
        }
        match self.ring {
            RingMode::Once => {}
            RingMode::FiveTimes => bits |= FLAG_RING_FIVE_TIMES,
            RingMode::NonStop => bits |= FLAG_RING_NONSTOP,
        }
        bits
    }

    /// Unpacks persisted bits. Unknown bits are ignored.
    ///
    /// Rows written by older clients may carry both ring bits; non-stop wins.
    pub fn from_bits(bits: u32) -> Self {
        let ring = if bits & FLAG_RING_NONSTOP != 0 {
            RingMode::NonStop
        } else if bits & FLAG_RING_FIVE_TIMES != 0 {
            RingMode::FiveTimes
        } else {
            RingMode::Once
        };
        Self {
            at_start: bits & FLAG_AT_START != 0,
            at_deadline: bits & FLAG_AT_DEADLINE != 0,
            after_deadline: bits & FLAG_AFTER_DEADLINE != 0,
            ring,
        }
    }
}

/// A start or due instant with its date-only/time-of-day distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateAnchor {
    pub timestamp: i64,
    pub has_time: bool,
}

/// Task fields the alarm engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub due_at: i64,
    pub due_has_time: bool,
    /// Start ("hide until") instant.
    pub hide_until: i64,
    pub hide_until_has_time: bool,
    pub created_at: i64,
    pub completed_at: i64,
    pub deleted_at: i64,
    pub last_notified_at: i64,
    pub notify: NotificationFlags,
}

impl Task {
    /// Creates an active task with a generated id and no dates.
    pub fn new(created_at: i64) -> Self {
        Self::with_id(Uuid::new_v4(), created_at)
    }

    pub fn with_id(id: TaskId, created_at: i64) -> Self {
        Self {
            id,
            due_at: 0,
            due_has_time: false,
            hide_until: 0,
            hide_until_has_time: false,
            created_at,
            completed_at: 0,
            deleted_at: 0,
            last_notified_at: 0,
            notify: NotificationFlags::default(),
        }
    }

    /// Sets a due instant that carries a time of day.
    pub fn due_at_time(mut self, timestamp: i64) -> Self {
        self.due_at = timestamp;
        self.due_has_time = true;
        self
    }

    /// Sets a date-only due instant; any time-of-day part is ignored.
    pub fn due_on_date(mut self, timestamp: i64) -> Self {
        self.due_at = timestamp;
        self.due_has_time = false;
        self
    }

    /// Hides the task until its due instant (start == due).
    pub fn hidden_until_due(mut self) -> Self {
        self.hide_until = self.due_at;
        self.hide_until_has_time = self.due_has_time;
        self
    }

    pub fn due_anchor(&self) -> Option<DateAnchor> {
        (self.due_at > 0).then_some(DateAnchor {
            timestamp: self.due_at,
            has_time: self.due_has_time,
        })
    }

    pub fn start_anchor(&self) -> Option<DateAnchor> {
        (self.hide_until > 0).then_some(DateAnchor {
            timestamp: self.hide_until,
            has_time: self.hide_until_has_time,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at > 0
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at > 0
    }

    /// Returns whether reminders may still fire for this task.
    pub fn is_active(&self) -> bool {
        !self.is_completed() && !self.is_deleted()
    }

    /// True when the task stays hidden until a due instant with a time of day.
    pub fn is_hidden_until_due_time(&self) -> bool {
        self.due_has_time
            && self.hide_until_has_time
            && self.due_at > 0
            && self.hide_until == self.due_at
    }

    /// Alarm rules implied by the task's notification flags.
    ///
    /// The after-deadline mode maps to a daily reminder starting one day after
    /// the due instant, capped at seven firings.
    pub fn default_alarm_rules(&self) -> Vec<AlarmRule> {
        let mut rules = Vec::new();
        if self.notify.at_start && self.hide_until > 0 {
            rules.push(AlarmRule::when_started(self.id, 0));
        }
        if self.notify.at_deadline && self.due_at > 0 {
            rules.push(AlarmRule::when_due(self.id, 0));
        }
        if self.notify.after_deadline && self.due_at > 0 {
            rules.push(AlarmRule::when_overdue(self.id));
        }
        rules
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("due_at", self.due_at),
            ("hide_until", self.hide_until),
            ("created_at", self.created_at),
            ("completed_at", self.completed_at),
            ("deleted_at", self.deleted_at),
            ("last_notified_at", self.last_notified_at),
        ] {
            if value < 0 {
                return Err(ValidationError::NegativeTimestamp { field, value });
            }
        }
        Ok(())
    }
}

/// Days between firings of the after-deadline reminder.
pub(crate) const OVERDUE_INTERVAL_MS: i64 = ONE_DAY_MS;
/// Additional firings of the after-deadline reminder after the first.
pub(crate) const OVERDUE_REPEAT: u32 = 6;
