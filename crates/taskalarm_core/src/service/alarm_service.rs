//! Alarm reconciliation and triggering.
//!
//! # Responsibility
//! - Converge a task's persisted alarm rules to a desired set.
//! - Compute due reminders for every active task and hand them to the caller.
//! - Feed the notification queue with upcoming reminders.
//!
//! # Invariants
//! - Delivered state lives only in `Task::last_notified_at`, which the
//!   delivery sink advances; the service caches nothing between passes.
//! - Store errors propagate unchanged; nothing is retried here.
//! - Snooze rules are deleted once delivered.

use crate::alarm::calculator::AlarmCalculator;
use crate::clock::Clock;
use crate::model::alarm::{AlarmId, AlarmKind, AlarmRule, Notification};
use crate::model::task::TaskId;
use crate::repo::alarm_repo::AlarmRuleStore;
use crate::repo::task_repo::TaskStore;
use crate::repo::RepoResult;
use crate::scheduler::notification_queue::{NotificationQueue, ScheduledEntry};
use log::{debug, info};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use uuid::Uuid;

pub struct AlarmService<T: TaskStore, A: AlarmRuleStore> {
    tasks: T,
    alarms: A,
    calculator: AlarmCalculator,
    clock: Arc<dyn Clock>,
}

impl<T: TaskStore, A: AlarmRuleStore> AlarmService<T, A> {
    pub fn new(tasks: T, alarms: A, calculator: AlarmCalculator, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks,
            alarms,
            calculator,
            clock,
        }
    }

    /// Makes the stored rules of `task_id` match `desired`.
    ///
    /// Rules are matched by schedule `(kind, offset, repeat, interval)`;
    /// ids and task ids in `desired` are ignored. Stored rules with no match
    /// are deleted, unmatched desired rules are inserted with fresh ids.
    /// Returns whether anything changed.
    pub fn synchronize_alarms(&self, task_id: TaskId, desired: &[AlarmRule]) -> RepoResult<bool> {
        let existing = self.alarms.alarms_for_task(task_id)?;
        let mut deleted = 0usize;
        let mut inserted = 0usize;

        for rule in &existing {
            if !desired.iter().any(|wanted| wanted.same_schedule(rule)) {
                self.alarms.delete_alarm(rule.id)?;
                deleted += 1;
            }
        }

        let mut seen = HashSet::new();
        for wanted in desired {
            if !seen.insert(wanted.schedule_key()) {
                continue;
            }
            if existing.iter().any(|rule| rule.same_schedule(wanted)) {
                continue;
            }
            self.alarms.insert_alarm(&AlarmRule {
                id: Uuid::new_v4(),
                task_id,
                ..wanted.clone()
            })?;
            inserted += 1;
        }

        let changed = deleted + inserted > 0;
        if changed {
            info!(
                "event=alarm_sync module=service status=ok task_id={} inserted={} deleted={}",
                task_id, inserted, deleted
            );
        }
        Ok(changed)
    }

    /// Stored rules of one task.
    pub fn get_alarms(&self, task_id: TaskId) -> RepoResult<Vec<AlarmRule>> {
        self.alarms.alarms_for_task(task_id)
    }

    /// Replaces any snooze on each task with one firing at `until`.
    pub fn snooze(&self, until: i64, task_ids: &[TaskId]) -> RepoResult<()> {
        for &task_id in task_ids {
            let mut desired: Vec<AlarmRule> = self
                .alarms
                .alarms_for_task(task_id)?
                .into_iter()
                .filter(|rule| rule.kind != AlarmKind::Snooze)
                .collect();
            desired.push(AlarmRule::snooze(task_id, until));
            self.synchronize_alarms(task_id, &desired)?;
        }
        info!(
            "event=alarm_snooze module=service status=ok tasks={} until={}",
            task_ids.len(),
            until
        );
        Ok(())
    }

    /// Delivers every reminder due at the current time and returns the next
    /// wake-up instant, or `0` when nothing is pending.
    ///
    /// `on_due` runs once with the due batch, and only when it is non-empty.
    /// It must present the reminders and advance each task's last-notified
    /// timestamp; a second pass with no task changes then delivers nothing.
    pub fn trigger_alarms<F>(&self, on_due: F) -> RepoResult<i64>
    where
        F: FnOnce(&[Notification]),
    {
        let now = self.clock.now_millis();
        let (due, upcoming) = self.compute_all(now)?;
        let next_wake = upcoming
            .iter()
            .map(|notification| notification.timestamp)
            .min()
            .unwrap_or(0);

        let fired_snoozes: Vec<AlarmId> = due
            .iter()
            .filter(|notification| notification.kind == AlarmKind::Snooze)
            .map(|notification| notification.alarm_id)
            .collect();

        if !due.is_empty() {
            on_due(&due);
        }
        for alarm_id in fired_snoozes {
            self.alarms.delete_alarm(alarm_id)?;
        }

        info!(
            "event=alarm_trigger module=service status=ok now={} delivered={} pending={} next_wake={}",
            now,
            due.len(),
            upcoming.len(),
            next_wake
        );
        Ok(next_wake)
    }

    /// Replaces the queue's contents with freshly computed reminders for
    /// every active task. Returns the number of queued entries.
    pub fn schedule_pending(&self, queue: &NotificationQueue) -> RepoResult<usize> {
        let now = self.clock.now_millis();
        let (due, upcoming) = self.compute_all(now)?;
        let fresh = due.into_iter().chain(upcoming).map(ScheduledEntry::from).collect();
        reconcile_queue(queue, queue.entries(), fresh);
        Ok(queue.len())
    }

    /// Recomputes the queue entries of a single task after it changed.
    /// Returns the number of entries queued for the task.
    pub fn schedule_task(&self, task_id: TaskId, queue: &NotificationQueue) -> RepoResult<usize> {
        let mut fresh = BTreeSet::new();
        if let Some(task) = self.tasks.get_task(task_id)?.filter(|task| task.is_active()) {
            let now = self.clock.now_millis();
            for rule in self.alarms.alarms_for_task(task_id)? {
                if let Some(notification) = self.calculator.compute_next_fire(&task, &rule, now) {
                    fresh.insert(ScheduledEntry::from(notification));
                }
            }
        }
        let current = queue
            .entries()
            .into_iter()
            .filter(|entry| entry.task_id() == task_id)
            .collect();
        let queued = fresh.len();
        reconcile_queue(queue, current, fresh);
        Ok(queued)
    }

    /// Splits every computed reminder into due (`<= now`) and upcoming.
    fn compute_all(&self, now: i64) -> RepoResult<(Vec<Notification>, Vec<Notification>)> {
        let mut due = Vec::new();
        let mut upcoming = Vec::new();
        for (task, rules) in self.tasks.active_tasks_with_alarms()? {
            if !task.is_active() {
                continue;
            }
            for rule in &rules {
                match self.calculator.compute_next_fire(&task, rule, now) {
                    Some(notification) if notification.timestamp <= now => due.push(notification),
                    Some(notification) => upcoming.push(notification),
                    None => {}
                }
            }
        }
        Ok((due, upcoming))
    }
}

/// Moves `queue` from `current` to `fresh` with the fewest wake-up changes.
///
/// Fresh entries go in first and in ascending order, so only an earlier
/// minimum re-arms; stale entries are then removed in one batch.
fn reconcile_queue(
    queue: &NotificationQueue,
    current: Vec<ScheduledEntry>,
    fresh: BTreeSet<ScheduledEntry>,
) {
    for entry in &fresh {
        queue.add(*entry);
    }
    let stale: Vec<ScheduledEntry> = current
        .into_iter()
        .filter(|entry| !fresh.contains(entry))
        .collect();
    queue.remove(&stale);
    debug!(
        "event=queue_reconcile module=service status=ok fresh={} removed={}",
        fresh.len(),
        stale.len()
    );
}
