//! Time-ordered queue of pending reminders.
//!
//! # Invariants
//! - Entries are ordered by fire time, then alarm id, then task id.
//! - The wake-up timer is armed on insert only when the earliest fire time
//!   moves earlier, and on removal only when the earliest fire time changes.
//! - Overdue lookup never removes; removal is an explicit follow-up call.

use crate::model::alarm::{AlarmId, Notification};
use crate::model::task::TaskId;
use crate::scheduler::wakeup::{QuietHoursPolicy, WakeupPrimitive};
use log::debug;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A queued notification with its ordering keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduledEntry {
    notification: Notification,
}

impl ScheduledEntry {
    pub fn new(notification: Notification) -> Self {
        Self { notification }
    }

    pub fn notification(&self) -> &Notification {
        &self.notification
    }

    pub fn timestamp(&self) -> i64 {
        self.notification.timestamp
    }

    pub fn task_id(&self) -> TaskId {
        self.notification.task_id
    }

    pub fn alarm_id(&self) -> AlarmId {
        self.notification.alarm_id
    }
}

impl From<Notification> for ScheduledEntry {
    fn from(value: Notification) -> Self {
        Self::new(value)
    }
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp()
            .cmp(&other.timestamp())
            .then_with(|| self.alarm_id().cmp(&other.alarm_id()))
            .then_with(|| self.task_id().cmp(&other.task_id()))
            .then_with(|| self.notification.kind.cmp(&other.notification.kind))
    }
}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending reminders plus ownership of the notification wake-up timer.
pub struct NotificationQueue {
    entries: Mutex<BTreeSet<ScheduledEntry>>,
    wakeup: Arc<dyn WakeupPrimitive>,
    quiet_hours: Arc<dyn QuietHoursPolicy>,
}

impl NotificationQueue {
    pub fn new(wakeup: Arc<dyn WakeupPrimitive>, quiet_hours: Arc<dyn QuietHoursPolicy>) -> Self {
        Self {
            entries: Mutex::new(BTreeSet::new()),
            wakeup,
            quiet_hours,
        }
    }

    /// Inserts `entry`. Returns `false` when an equal entry was already queued.
    pub fn add(&self, entry: ScheduledEntry) -> bool {
        let mut entries = self.entries.lock();
        let previous = earliest(&entries);
        let timestamp = entry.timestamp();
        if !entries.insert(entry) {
            return false;
        }
        if previous.map_or(true, |earliest| timestamp < earliest) {
            self.arm(timestamp);
        }
        true
    }

    /// Removes the given entries. Returns how many were present.
    pub fn remove(&self, removed: &[ScheduledEntry]) -> usize {
        let mut entries = self.entries.lock();
        let previous = earliest(&entries);
        let count = removed
            .iter()
            .filter(|entry| entries.remove(entry))
            .count();
        if count > 0 {
            self.rearm_after_removal(&entries, previous);
        }
        count
    }

    /// Removes every entry owned by `task_id`. Returns how many were removed.
    pub fn cancel_for_task(&self, task_id: TaskId) -> usize {
        let mut entries = self.entries.lock();
        let previous = earliest(&entries);
        let before = entries.len();
        entries.retain(|entry| entry.task_id() != task_id);
        let count = before - entries.len();
        if count > 0 {
            self.rearm_after_removal(&entries, previous);
        }
        count
    }

    /// Entries due at or before `now`, in queue order.
    pub fn overdue_entries(&self, now: i64) -> Vec<ScheduledEntry> {
        self.entries
            .lock()
            .iter()
            .take_while(|entry| entry.timestamp() <= now)
            .copied()
            .collect()
    }

    /// Earliest fire time after quiet-hours adjustment, or `0` when empty.
    pub fn next_scheduled_time(&self) -> i64 {
        earliest(&self.entries.lock()).map_or(0, |timestamp| self.quiet_hours.adjust(timestamp))
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.cancel();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Ordered snapshot of all queued entries.
    pub fn entries(&self) -> Vec<ScheduledEntry> {
        self.entries.lock().iter().copied().collect()
    }

    fn rearm_after_removal(&self, entries: &BTreeSet<ScheduledEntry>, previous: Option<i64>) {
        match earliest(entries) {
            None => self.cancel(),
            Some(timestamp) if Some(timestamp) != previous => self.arm(timestamp),
            Some(_) => {}
        }
    }

    fn arm(&self, timestamp: i64) {
        let adjusted = self.quiet_hours.adjust(timestamp);
        debug!(
            "event=queue_arm module=scheduler status=ok queue=notification at={} adjusted={}",
            timestamp, adjusted
        );
        self.wakeup.arm(adjusted);
    }

    fn cancel(&self) {
        debug!("event=queue_cancel module=scheduler status=ok queue=notification");
        self.wakeup.cancel();
    }
}

fn earliest(entries: &BTreeSet<ScheduledEntry>) -> Option<i64> {
    entries.first().map(ScheduledEntry::timestamp)
}
