//! Visibility refresh instants.
//!
//! Tracks future instants at which a task's due or hidden state flips, so the
//! host can recompute visible lists. Instants are coalesced by value and carry
//! no task ownership.

use crate::clock::Clock;
use crate::model::task::Task;
use crate::scheduler::wakeup::WakeupPrimitive;
use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct RefreshScheduler {
    pending: Mutex<BTreeSet<i64>>,
    clock: Arc<dyn Clock>,
    wakeup: Arc<dyn WakeupPrimitive>,
}

impl RefreshScheduler {
    pub fn new(clock: Arc<dyn Clock>, wakeup: Arc<dyn WakeupPrimitive>) -> Self {
        Self {
            pending: Mutex::new(BTreeSet::new()),
            clock,
            wakeup,
        }
    }

    /// Queues `timestamp` if it is in the future. Returns whether it was new.
    pub fn schedule_refresh(&self, timestamp: i64) -> bool {
        if timestamp <= self.clock.now_millis() {
            return false;
        }
        let mut pending = self.pending.lock();
        let previous = pending.first().copied();
        if !pending.insert(timestamp) {
            return false;
        }
        if previous.map_or(true, |earliest| timestamp < earliest) {
            self.arm(timestamp);
        }
        true
    }

    /// Queues the due and start instants of `task`.
    pub fn schedule_task(&self, task: &Task) {
        if task.due_at > 0 {
            self.schedule_refresh(task.due_at);
        }
        if task.hide_until > 0 {
            self.schedule_refresh(task.hide_until);
        }
    }

    /// Drops lapsed instants and arms the wake-up for the earliest remaining.
    pub fn schedule_next(&self) {
        let now = self.clock.now_millis();
        let mut pending = self.pending.lock();
        let upcoming = pending.split_off(&now.saturating_add(1));
        let dropped = pending.len();
        *pending = upcoming;
        debug!(
            "event=refresh_prune module=scheduler status=ok dropped={} remaining={}",
            dropped,
            pending.len()
        );
        if let Some(&earliest) = pending.first() {
            self.arm(earliest);
        }
    }

    /// Ordered snapshot of pending instants.
    pub fn pending(&self) -> Vec<i64> {
        self.pending.lock().iter().copied().collect()
    }

    fn arm(&self, timestamp: i64) {
        debug!(
            "event=refresh_arm module=scheduler status=ok at={}",
            timestamp
        );
        self.wakeup.arm(timestamp);
    }
}
