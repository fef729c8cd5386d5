//! Next-fire computation for one task/rule pair.
//!
//! # Responsibility
//! - Map `(Task, AlarmRule)` to the next `Notification`, if any.
//!
//! # Invariants
//! - Total: malformed or unanchored rules yield `None`, never an error.
//! - A result is always strictly after `task.last_notified_at`, except for
//!   snoozes, which fire regardless.
//! - Deterministic for fixed inputs, configuration and random seed.

use crate::config::SchedulerConfig;
use crate::model::alarm::{AlarmKind, AlarmRule, Notification};
use crate::model::task::{DateAnchor, Task};
use crate::time::{start_of_minute, LocalCalendar, ONE_SECOND_MS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Source of uniform values in `[0, 1)` keyed by a per-draw value.
///
/// Equal keys must yield equal values so a scheduling pass is reproducible.
pub trait RandomSource: Send + Sync {
    fn unit(&self, key: u64) -> f64;
}

/// `StdRng` reseeded from `seed ^ key` on every draw.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeededRandom {
    seed: u64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl RandomSource for SeededRandom {
    fn unit(&self, key: u64) -> f64 {
        StdRng::seed_from_u64(self.seed ^ key).gen::<f64>()
    }
}

pub struct AlarmCalculator {
    default_due_time_enabled: bool,
    default_due_time_ms: i64,
    calendar: LocalCalendar,
    random: Arc<dyn RandomSource>,
}

impl AlarmCalculator {
    pub fn new(config: &SchedulerConfig, random: Arc<dyn RandomSource>) -> Self {
        Self {
            default_due_time_enabled: config.default_due_time_enabled,
            default_due_time_ms: i64::from(config.default_due_time_ms),
            calendar: config.calendar(),
            random,
        }
    }

    /// Builds a calculator seeded from `config.random_seed`.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config, Arc::new(SeededRandom::new(config.random_seed)))
    }

    /// Computes the next reminder for `rule` on `task` as seen at `now`.
    ///
    /// `now` only selects the current window of a randomized reminder; all
    /// other kinds depend on the task and rule alone.
    pub fn compute_next_fire(&self, task: &Task, rule: &AlarmRule, now: i64) -> Option<Notification> {
        let fire_at = match rule.kind {
            AlarmKind::Snooze => {
                return Some(Notification::new(task.id, rule.id, rule.offset, rule.kind));
            }
            AlarmKind::DateTime => rule.offset,
            AlarmKind::RelativeToStart => self.relative_fire_time(task, rule, task.start_anchor()?)?,
            AlarmKind::RelativeToEnd => self.relative_fire_time(task, rule, task.due_anchor()?)?,
            AlarmKind::Random => self.random_fire_time(task, rule, now)?,
        };
        (fire_at > task.last_notified_at)
            .then(|| Notification::new(task.id, rule.id, fire_at, rule.kind))
    }

    /// Effective anchor instant, or `None` for a date-only anchor while the
    /// default time is disabled.
    ///
    /// Timed anchors land one second into their minute; a nonzero second
    /// marks "specific time" for downstream consumers.
    fn resolve_anchor(&self, anchor: DateAnchor) -> Option<i64> {
        if anchor.has_time {
            Some(start_of_minute(anchor.timestamp) + ONE_SECOND_MS)
        } else if self.default_due_time_enabled {
            Some(
                self.calendar
                    .at_millis_of_day(anchor.timestamp, self.default_due_time_ms),
            )
        } else {
            None
        }
    }

    fn relative_fire_time(&self, task: &Task, rule: &AlarmRule, anchor: DateAnchor) -> Option<i64> {
        let first = self.resolve_anchor(anchor)?.checked_add(rule.offset)?;
        if rule.repeat == 0 || rule.interval <= 0 || first > task.last_notified_at {
            return Some(first);
        }
        // smallest n with first + n * interval > last_notified
        let elapsed = task.last_notified_at - first;
        let n = elapsed / rule.interval + 1;
        if n > i64::from(rule.repeat) {
            return None;
        }
        first.checked_add(n.checked_mul(rule.interval)?)
    }

    /// Picks an instant strictly inside the current jitter window.
    ///
    /// The window starts at the later of creation and the last notification,
    /// and advances by whole windows once `now` has passed it entirely.
    fn random_fire_time(&self, task: &Task, rule: &AlarmRule, now: i64) -> Option<i64> {
        let window = rule.offset;
        if window <= 1 {
            return None;
        }
        let mut start = task.created_at.max(task.last_notified_at);
        if now > start.saturating_add(window) {
            start += (now - start) / window * window;
        }
        let unit = self.random.unit(random_key(task, start)).clamp(0.0, 1.0);
        let jitter = 1 + ((window - 1) as f64 * unit) as i64;
        let mut fire_at = start + jitter.min(window - 1);
        if task.is_hidden_until_due_time() && fire_at > task.due_at {
            fire_at = task.due_at;
        }
        Some(fire_at)
    }
}

fn random_key(task: &Task, window_start: i64) -> u64 {
    let id = task.id.as_u128();
    (id as u64) ^ ((id >> 64) as u64) ^ (window_start as u64).rotate_left(32)
}

#[cfg(test)]
mod tests {
    use super::{AlarmCalculator, RandomSource, SeededRandom};
    use crate::config::SchedulerConfig;
    use crate::model::alarm::{AlarmKind, AlarmRule, Notification};
    use crate::model::task::Task;
    use crate::time::{ONE_DAY_MS, ONE_HOUR_MS, ONE_MINUTE_MS, ONE_SECOND_MS, ONE_WEEK_MS};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    struct RandomStub(f64);

    impl RandomSource for RandomStub {
        fn unit(&self, _key: u64) -> f64 {
            self.0
        }
    }

    fn millis(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .timestamp_millis()
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            default_due_time_ms: (13 * ONE_HOUR_MS) as u32,
            ..SchedulerConfig::default()
        }
    }

    fn calculator(unit: f64) -> AlarmCalculator {
        AlarmCalculator::new(&config(), Arc::new(RandomStub(unit)))
    }

    // 2023-11-03 17:13:25.250 UTC
    fn now() -> i64 {
        millis(2023, 11, 3, 17, 13, 25) + 250
    }

    fn fired(task: &Task, rule: &AlarmRule, at: i64) -> Option<Notification> {
        Some(Notification::new(task.id, rule.id, at, rule.kind))
    }

    #[test]
    fn ignores_already_delivered_date_time() {
        let mut task = Task::new(0);
        task.last_notified_at = now();
        let rule = AlarmRule::at(task.id, now());

        assert_eq!(calculator(0.5).compute_next_fire(&task, &rule, now()), None);
    }

    #[test]
    fn date_time_after_last_notification_fires() {
        let mut task = Task::new(0);
        task.last_notified_at = now();
        let rule = AlarmRule::at(task.id, now() + 1);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, now() + 1)
        );
    }

    #[test]
    fn snooze_fires_even_when_already_notified() {
        let mut task = Task::new(0);
        task.last_notified_at = now();
        let rule = AlarmRule::snooze(task.id, now());

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, now())
        );
    }

    #[test]
    fn date_only_due_uses_default_time() {
        let task = Task::new(0).due_on_date(now());
        let rule = AlarmRule::when_due(task.id, 0);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, millis(2023, 11, 3, 13, 0, 0))
        );
    }

    #[test]
    fn date_only_due_without_default_time_never_fires() {
        let config = SchedulerConfig {
            default_due_time_enabled: false,
            ..config()
        };
        let calculator = AlarmCalculator::new(&config, Arc::new(RandomStub(0.5)));
        let task = Task::new(0).due_on_date(now());
        let rule = AlarmRule::when_due(task.id, 0);

        assert_eq!(calculator.compute_next_fire(&task, &rule, now()), None);
        assert_eq!(
            calculator.compute_next_fire(&task, &rule, now() + ONE_WEEK_MS),
            None
        );
    }

    #[test]
    fn timed_due_lands_one_second_into_minute() {
        let task = Task::new(0).due_at_time(now());
        let rule = AlarmRule::when_due(task.id, 0);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, millis(2023, 11, 3, 17, 13, 1))
        );
    }

    #[test]
    fn date_only_start_uses_default_time() {
        let task = Task::new(0).due_on_date(now()).hidden_until_due();
        let rule = AlarmRule::when_started(task.id, 0);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, millis(2023, 11, 3, 13, 0, 0))
        );
    }

    #[test]
    fn timed_start_lands_one_second_into_minute() {
        let task = Task::new(0).due_at_time(now()).hidden_until_due();
        let rule = AlarmRule::when_started(task.id, 0);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, millis(2023, 11, 3, 17, 13, 1))
        );
    }

    #[test]
    fn relative_after_date_only_due() {
        let task = Task::new(0).due_on_date(now());
        let rule = AlarmRule::when_due(task.id, ONE_DAY_MS);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, millis(2023, 11, 4, 13, 0, 0))
        );
    }

    #[test]
    fn relative_after_timed_due() {
        let task = Task::new(0).due_at_time(now());
        let rule = AlarmRule::when_due(task.id, ONE_DAY_MS);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, millis(2023, 11, 4, 17, 13, 1))
        );
    }

    #[test]
    fn relative_after_date_only_start() {
        let task = Task::new(0).due_on_date(now()).hidden_until_due();
        let rule = AlarmRule::when_started(task.id, ONE_DAY_MS);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, millis(2023, 11, 4, 13, 0, 0))
        );
    }

    #[test]
    fn relative_before_timed_due() {
        let task = Task::new(0).due_at_time(now());
        let rule = AlarmRule::when_due(task.id, -15 * ONE_MINUTE_MS);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, millis(2023, 11, 3, 16, 58, 1))
        );
    }

    #[test]
    fn first_repeat_after_initial_firing() {
        let due = millis(2023, 11, 3, 17, 13, 1);
        let mut task = Task::new(0).due_at_time(due);
        task.last_notified_at = due + 4 * ONE_MINUTE_MS;
        let rule = AlarmRule::when_due(task.id, 0).repeating(1, 5 * ONE_MINUTE_MS);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, due + 5 * ONE_MINUTE_MS)
        );
    }

    #[test]
    fn second_repeat() {
        let due = millis(2023, 11, 3, 17, 13, 1);
        let mut task = Task::new(0).due_at_time(due);
        task.last_notified_at = due + 6 * ONE_MINUTE_MS;
        let rule = AlarmRule::when_due(task.id, 0).repeating(2, 5 * ONE_MINUTE_MS);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, due + 10 * ONE_MINUTE_MS)
        );
    }

    #[test]
    fn repeat_series_terminates() {
        let due = millis(2023, 11, 3, 17, 13, 1);
        let mut task = Task::new(0).due_at_time(due);
        task.last_notified_at = due + 10 * ONE_MINUTE_MS;
        let rule = AlarmRule::when_due(task.id, 0).repeating(2, 5 * ONE_MINUTE_MS);

        assert_eq!(calculator(0.5).compute_next_fire(&task, &rule, now()), None);
    }

    #[test]
    fn overdue_reminder_repeats_daily() {
        let due = millis(2022, 1, 30, 13, 30, 1);
        let mut task = Task::new(0).due_at_time(due);
        task.last_notified_at = due + 6 * ONE_DAY_MS;
        let rule = AlarmRule::when_overdue(task.id);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, due + 7 * ONE_DAY_MS)
        );
    }

    #[test]
    fn overdue_reminder_stops_after_a_week() {
        let due = millis(2022, 1, 30, 13, 30, 1);
        let mut task = Task::new(0).due_at_time(due);
        task.last_notified_at = due + 7 * ONE_DAY_MS;
        let rule = AlarmRule::when_overdue(task.id);

        assert_eq!(calculator(0.5).compute_next_fire(&task, &rule, now()), None);
    }

    #[test]
    fn relative_end_without_due_is_none() {
        let task = Task::new(0);
        let rule = AlarmRule::when_due(task.id, 0);

        assert_eq!(calculator(0.5).compute_next_fire(&task, &rule, now()), None);
    }

    #[test]
    fn relative_start_without_start_is_none() {
        let task = Task::new(0).due_on_date(now());
        let rule = AlarmRule::when_started(task.id, 0);

        assert_eq!(calculator(0.5).compute_next_fire(&task, &rule, now()), None);
    }

    #[test]
    fn initial_random_reminder_falls_inside_window_from_creation() {
        let created = now() - ONE_DAY_MS;
        let task = Task::new(created);
        let rule = AlarmRule::random(task.id, ONE_WEEK_MS);

        let expected = created + 1 + ((ONE_WEEK_MS - 1) as f64 * 0.5) as i64;
        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, expected)
        );
    }

    #[test]
    fn next_random_reminder_counts_from_last_notification() {
        let mut task = Task::new(now() - 30 * ONE_DAY_MS);
        task.last_notified_at = now() - ONE_DAY_MS;
        let rule = AlarmRule::random(task.id, ONE_WEEK_MS);

        let notification = calculator(0.25)
            .compute_next_fire(&task, &rule, now())
            .expect("random reminder should fire");
        assert!(notification.timestamp > task.last_notified_at);
        assert!(notification.timestamp < task.last_notified_at + ONE_WEEK_MS);
    }

    #[test]
    fn lapsed_random_window_advances_to_current_window() {
        let mut task = Task::new(now() - 30 * ONE_DAY_MS);
        task.last_notified_at = now() - 14 * ONE_DAY_MS - ONE_HOUR_MS;
        let rule = AlarmRule::random(task.id, ONE_WEEK_MS);

        let notification = calculator(0.99)
            .compute_next_fire(&task, &rule, now())
            .expect("random reminder should fire");
        let window_start = task.last_notified_at + 2 * ONE_WEEK_MS;
        assert!(notification.timestamp > window_start);
        assert!(notification.timestamp < window_start + ONE_WEEK_MS);
        assert!(notification.timestamp > now());
    }

    #[test]
    fn random_reminder_clamps_to_due_time_when_hidden_until_due() {
        let created = now();
        let due = created + ONE_HOUR_MS + ONE_SECOND_MS;
        let task = Task::new(created).due_at_time(due).hidden_until_due();
        let rule = AlarmRule::random(task.id, ONE_WEEK_MS);

        assert_eq!(
            calculator(0.5).compute_next_fire(&task, &rule, now()),
            fired(&task, &rule, due)
        );
    }

    #[test]
    fn seeded_random_is_stable_for_same_key() {
        let random = SeededRandom::new(42);
        let first = random.unit(7);
        assert_eq!(first, random.unit(7));
        assert!((0.0..1.0).contains(&first));
    }

    #[test]
    fn seeded_calculator_is_deterministic() {
        let config = SchedulerConfig {
            random_seed: 99,
            ..config()
        };
        let task = Task::new(now() - ONE_DAY_MS);
        let rule = AlarmRule::random(task.id, ONE_WEEK_MS);

        let first = AlarmCalculator::from_config(&config).compute_next_fire(&task, &rule, now());
        let second = AlarmCalculator::from_config(&config).compute_next_fire(&task, &rule, now());
        assert_eq!(first, second);
        assert_eq!(first.map(|n| n.kind), Some(AlarmKind::Random));
    }

    #[test]
    fn advancing_last_notified_suppresses_refire() {
        let mut task = Task::new(0).due_at_time(now());
        let rule = AlarmRule::when_due(task.id, 0);
        let calculator = calculator(0.5);

        let notification = calculator
            .compute_next_fire(&task, &rule, now())
            .expect("first pass fires");
        task.last_notified_at = notification.timestamp;
        assert_eq!(calculator.compute_next_fire(&task, &rule, now()), None);
    }
}
