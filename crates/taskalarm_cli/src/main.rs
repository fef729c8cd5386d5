//! Command-line driver for the alarm engine.
//!
//! # Responsibility
//! - Open a task database, configure logging and run one engine operation.
//! - Act as the delivery sink for `trigger`: print reminders and advance
//!   each task's last-notified timestamp.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use taskalarm_core::db::open_db;
use taskalarm_core::time::{LocalCalendar, ONE_MINUTE_MS};
use taskalarm_core::{
    init_logging_from_config, AlarmCalculator, AlarmService, Clock, SchedulerConfig,
    SqliteAlarmRepository, SqliteTaskRepository, SystemClock, Task, TaskId, TaskStore,
};

#[derive(Parser)]
#[command(name = "taskalarm")]
#[command(about = "Task reminder scheduling engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file path
    #[arg(long)]
    db: PathBuf,

    /// JSON configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver every due reminder and print the next wake-up instant
    Trigger,
    /// Create a task with the default reminders implied by its flags
    AddTask {
        /// Due date (`YYYY-MM-DD`) or instant (RFC 3339)
        #[arg(long)]
        due: String,
        /// Remind when the task starts (start equals due)
        #[arg(long)]
        at_start: bool,
        /// Remind at the deadline
        #[arg(long)]
        at_deadline: bool,
        /// Remind daily for a week after the deadline
        #[arg(long)]
        after_deadline: bool,
    },
    /// Snooze tasks for a number of minutes
    Snooze {
        #[arg(required = true)]
        tasks: Vec<TaskId>,
        #[arg(long, default_value_t = 10)]
        minutes: i64,
    },
    /// List a task's stored alarm rules
    Alarms { task: TaskId },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    init_logging_from_config(&config).map_err(anyhow::Error::msg)?;

    let conn = open_db(&cli.db).with_context(|| format!("opening {}", cli.db.display()))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = AlarmService::new(
        SqliteTaskRepository::new(&conn),
        SqliteAlarmRepository::new(&conn),
        AlarmCalculator::from_config(&config),
        clock.clone(),
    );

    match cli.command {
        Commands::Trigger => {
            let sink = SqliteTaskRepository::new(&conn);
            let now = clock.now_millis();
            let mut sink_result = Ok(());
            let next_wake = service.trigger_alarms(|batch| {
                for notification in batch {
                    println!(
                        "due task={} alarm={} kind={} at={}",
                        notification.task_id,
                        notification.alarm_id,
                        notification.kind.as_str(),
                        notification.timestamp
                    );
                    if let Err(err) = sink.advance_last_notified(notification.task_id, now) {
                        sink_result = Err(err);
                    }
                }
            })?;
            sink_result?;
            println!("next_wake={next_wake}");
        }
        Commands::AddTask {
            due,
            at_start,
            at_deadline,
            after_deadline,
        } => {
            let now = clock.now_millis();
            let mut task = match parse_due(&due, &config.calendar())? {
                (timestamp, true) => Task::new(now).due_at_time(timestamp),
                (timestamp, false) => Task::new(now).due_on_date(timestamp),
            };
            if at_start {
                task = task.hidden_until_due();
            }
            task.notify.at_start = at_start;
            task.notify.at_deadline = at_deadline;
            task.notify.after_deadline = after_deadline;

            let id = SqliteTaskRepository::new(&conn).create_task(&task)?;
            service.synchronize_alarms(id, &task.default_alarm_rules())?;
            info!("event=cli_add_task module=cli status=ok task_id={id}");
            println!("{id}");
        }
        Commands::Snooze { tasks, minutes } => {
            if minutes <= 0 {
                bail!("--minutes must be positive, got {minutes}");
            }
            let until = clock.now_millis() + minutes * ONE_MINUTE_MS;
            service.snooze(until, &tasks)?;
            println!("snoozed_until={until}");
        }
        Commands::Alarms { task } => {
            for rule in service.get_alarms(task)? {
                println!(
                    "{} kind={} offset={} repeat={} interval={}",
                    rule.id,
                    rule.kind.as_str(),
                    rule.offset,
                    rule.repeat,
                    rule.interval
                );
            }
        }
    }
    Ok(())
}

/// Parses a due argument into `(millis, has_time)`.
///
/// Date-only values map to local midnight of `calendar`, the same day the
/// calculator resolves the default due time on.
fn parse_due(value: &str, calendar: &LocalCalendar) -> Result<(i64, bool)> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok((calendar.midnight_of(date), false));
    }
    let instant = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("due `{value}` is neither YYYY-MM-DD nor RFC 3339"))?;
    Ok((instant.timestamp_millis(), true))
}

#[cfg(test)]
mod tests {
    use super::parse_due;
    use chrono::{FixedOffset, TimeZone};
    use taskalarm_core::time::LocalCalendar;
    use taskalarm_core::{AlarmCalculator, AlarmRule, SchedulerConfig, Task};

    #[test]
    fn parses_date_only_due() {
        assert_eq!(
            parse_due("1970-01-02", &LocalCalendar::utc()).unwrap(),
            (86_400_000, false)
        );
    }

    #[test]
    fn date_only_due_west_of_utc_fires_on_that_local_day() {
        let config = SchedulerConfig {
            utc_offset_minutes: -300,
            ..SchedulerConfig::default()
        };
        let (due, has_time) = parse_due("2024-05-18", &config.calendar()).unwrap();
        assert!(!has_time);

        let task = Task::new(0).due_on_date(due);
        let rule = AlarmRule::when_due(task.id, 0);
        let fired = AlarmCalculator::from_config(&config)
            .compute_next_fire(&task, &rule, 0)
            .unwrap();

        let local = FixedOffset::west_opt(5 * 3600).unwrap();
        let expected = local
            .with_ymd_and_hms(2024, 5, 18, 18, 0, 0)
            .unwrap()
            .timestamp_millis();
        assert_eq!(fired.timestamp, expected);
    }

    #[test]
    fn parses_timed_due() {
        assert_eq!(
            parse_due("1970-01-01T00:01:00+00:00", &LocalCalendar::utc()).unwrap(),
            (60_000, true)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_due("tomorrow", &LocalCalendar::utc()).is_err());
    }
}
