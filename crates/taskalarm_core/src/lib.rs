//! Alarm and reminder scheduling engine for a personal task manager.
//!
//! Decides when each task's reminders fire next, keeps the earliest pending
//! instants in memory and touches the single OS wake-up timer only when the
//! earliest instant changes.

pub mod alarm;
pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod scheduler;
pub mod service;
pub mod time;

pub use alarm::calculator::{AlarmCalculator, RandomSource, SeededRandom};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, QuietHoursConfig, SchedulerConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::alarm::{AlarmId, AlarmKind, AlarmRule, Notification};
pub use model::task::{DateAnchor, NotificationFlags, RingMode, Task, TaskId};
pub use model::ValidationError;
pub use repo::alarm_repo::{AlarmRuleStore, SqliteAlarmRepository};
pub use repo::task_repo::{SqliteTaskRepository, TaskStore};
pub use repo::{RepoError, RepoResult};
pub use scheduler::notification_queue::{NotificationQueue, ScheduledEntry};
pub use scheduler::refresh::RefreshScheduler;
pub use scheduler::wakeup::{NoQuietHours, QuietHours, QuietHoursPolicy, WakeupPrimitive};
pub use service::alarm_service::AlarmService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
