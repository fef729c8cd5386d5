//! Alarm rules and the notifications computed from them.
//!
//! # Invariants
//! - Rule identity for reconciliation is `(kind, offset, repeat, interval)`;
//!   the row id is storage identity only.
//! - `Notification` is an immutable value with structural equality.

use crate::model::task::{TaskId, OVERDUE_INTERVAL_MS, OVERDUE_REPEAT};
use crate::model::ValidationError;
use crate::time::ONE_DAY_MS;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable alarm-rule identifier.
pub type AlarmId = Uuid;

/// Closed set of alarm semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    /// `offset` is an absolute timestamp.
    DateTime,
    /// `offset` is a signed delta from the start instant.
    RelativeToStart,
    /// `offset` is a signed delta from the due instant.
    RelativeToEnd,
    /// `offset` is the length of the jitter window.
    Random,
    /// `offset` is an absolute timestamp; fires even if already notified.
    Snooze,
}

impl AlarmKind {
    /// Stable storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DateTime => "date_time",
            Self::RelativeToStart => "rel_start",
            Self::RelativeToEnd => "rel_end",
            Self::Random => "random",
            Self::Snooze => "snooze",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "date_time" => Some(Self::DateTime),
            "rel_start" => Some(Self::RelativeToStart),
            "rel_end" => Some(Self::RelativeToEnd),
            "random" => Some(Self::Random),
            "snooze" => Some(Self::Snooze),
            _ => None,
        }
    }
}

/// One alarm rule attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRule {
    pub id: AlarmId,
    pub task_id: TaskId,
    pub kind: AlarmKind,
    pub offset: i64,
    /// Additional firings after the first; `0` fires once.
    pub repeat: u32,
    /// Milliseconds between repeat firings.
    pub interval: i64,
}

impl AlarmRule {
    /// Creates a single-shot rule with a generated id.
    pub fn new(task_id: TaskId, kind: AlarmKind, offset: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            kind,
            offset,
            repeat: 0,
            interval: 0,
        }
    }

    /// Fires at an absolute instant.
    pub fn at(task_id: TaskId, timestamp: i64) -> Self {
        Self::new(task_id, AlarmKind::DateTime, timestamp)
    }

    pub fn when_started(task_id: TaskId, offset: i64) -> Self {
        Self::new(task_id, AlarmKind::RelativeToStart, offset)
    }

    pub fn when_due(task_id: TaskId, offset: i64) -> Self {
        Self::new(task_id, AlarmKind::RelativeToEnd, offset)
    }

    /// Daily reminder after the deadline passes.
    pub fn when_overdue(task_id: TaskId) -> Self {
        Self::when_due(task_id, ONE_DAY_MS).repeating(OVERDUE_REPEAT, OVERDUE_INTERVAL_MS)
    }

    pub fn random(task_id: TaskId, window: i64) -> Self {
        Self::new(task_id, AlarmKind::Random, window)
    }

    pub fn snooze(task_id: TaskId, until: i64) -> Self {
        Self::new(task_id, AlarmKind::Snooze, until)
    }

    /// Returns a copy firing `repeat` more times, `interval` apart.
    pub fn repeating(mut self, repeat: u32, interval: i64) -> Self {
        self.repeat = repeat;
        self.interval = interval;
        self
    }

    /// Returns whether both rules describe the same schedule.
    pub fn same_schedule(&self, other: &AlarmRule) -> bool {
        self.schedule_key() == other.schedule_key()
    }

    pub fn schedule_key(&self) -> (AlarmKind, i64, u32, i64) {
        (self.kind, self.offset, self.repeat, self.interval)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval < 0 {
            return Err(ValidationError::NegativeInterval(self.interval));
        }
        if self.repeat > 0 && self.interval == 0 {
            return Err(ValidationError::RepeatWithoutInterval {
                repeat: self.repeat,
            });
        }
        match self.kind {
            AlarmKind::Random if self.offset <= 0 => {
                Err(ValidationError::EmptyRandomWindow(self.offset))
            }
            AlarmKind::DateTime | AlarmKind::Snooze if self.offset < 0 => {
                Err(ValidationError::NegativeTimestamp {
                    field: "offset",
                    value: self.offset,
                })
            }
            _ => Ok(()),
        }
    }
}

/// A reminder due at `timestamp` for one task/rule pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Notification {
    pub task_id: TaskId,
    pub alarm_id: AlarmId,
    pub timestamp: i64,
    pub kind: AlarmKind,
}

impl Notification {
    pub fn new(task_id: TaskId, alarm_id: AlarmId, timestamp: i64, kind: AlarmKind) -> Self {
        Self {
            task_id,
            alarm_id,
            timestamp,
            kind,
        }
    }
}
