//! Task store contract and SQLite implementation.
//!
//! # Invariants
//! - `last_notified_at` only moves forward.
//! - "Active" means neither completed nor deleted.

use crate::model::alarm::AlarmRule;
use crate::model::task::{NotificationFlags, Task, TaskId};
use crate::repo::alarm_repo::{parse_alarm_row, ALARM_SELECT_SQL};
use crate::repo::{parse_bool, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;

const TASK_SELECT_SQL: &str = "SELECT
    uuid,
    due_at,
    due_has_time,
    hide_until,
    hide_until_has_time,
    created_at,
    completed_at,
    deleted_at,
    last_notified_at,
    notify_flags
FROM tasks";

/// Task persistence as seen by the alarm engine.
pub trait TaskStore {
    fn create_task(&self, task: &Task) -> RepoResult<TaskId>;
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// Active tasks owning at least one alarm rule, with their rules.
    fn active_tasks_with_alarms(&self) -> RepoResult<Vec<(Task, Vec<AlarmRule>)>>;
    /// Raises the task's last-notified timestamp to `timestamp` if it is later.
    fn advance_last_notified(&self, id: TaskId, timestamp: i64) -> RepoResult<()>;
}

pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TaskStore for SqliteTaskRepository<'_> {
    fn create_task(&self, task: &Task) -> RepoResult<TaskId> {
        task.validate()?;

        self.conn.execute(
            "INSERT INTO tasks (
                uuid,
                due_at,
                due_has_time,
                hide_until,
                hide_until_has_time,
                created_at,
                completed_at,
                deleted_at,
                last_notified_at,
                notify_flags
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                task.id.to_string(),
                task.due_at,
                task.due_has_time,
                task.hide_until,
                task.hide_until_has_time,
                task.created_at,
                task.completed_at,
                task.deleted_at,
                task.last_notified_at,
                task.notify.to_bits(),
            ],
        )?;

        Ok(task.id)
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;

        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                due_at = ?1,
                due_has_time = ?2,
                hide_until = ?3,
                hide_until_has_time = ?4,
                created_at = ?5,
                completed_at = ?6,
                deleted_at = ?7,
                last_notified_at = ?8,
                notify_flags = ?9
             WHERE uuid = ?10;",
            params![
                task.due_at,
                task.due_has_time,
                task.hide_until,
                task.hide_until_has_time,
                task.created_at,
                task.completed_at,
                task.deleted_at,
                task.last_notified_at,
                task.notify.to_bits(),
                task.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(task.id));
        }
        Ok(())
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_task_row(row)?)),
            None => Ok(None),
        }
    }

    fn active_tasks_with_alarms(&self) -> RepoResult<Vec<(Task, Vec<AlarmRule>)>> {
        let mut rules_by_task: HashMap<TaskId, Vec<AlarmRule>> = HashMap::new();
        let mut stmt = self.conn.prepare(&format!(
            "{ALARM_SELECT_SQL}
             JOIN tasks ON tasks.uuid = alarms.task_uuid
             WHERE tasks.completed_at = 0 AND tasks.deleted_at = 0
             ORDER BY alarms.rowid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if let Some(rule) = parse_alarm_row(row)? {
                rules_by_task.entry(rule.task_id).or_default().push(rule);
            }
        }

        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE completed_at = 0
               AND deleted_at = 0
               AND EXISTS (SELECT 1 FROM alarms WHERE alarms.task_uuid = tasks.uuid)
             ORDER BY uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            let task = parse_task_row(row)?;
            if let Some(rules) = rules_by_task.remove(&task.id) {
                tasks.push((task, rules));
            }
        }
        Ok(tasks)
    }

    fn advance_last_notified(&self, id: TaskId, timestamp: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET last_notified_at = MAX(last_notified_at, ?1)
             WHERE uuid = ?2;",
            params![timestamp, id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("uuid")?;
    let flags: i64 = row.get("notify_flags")?;
    let flags = u32::try_from(flags).map_err(|_| {
        RepoError::InvalidData(format!("invalid flags `{flags}` in tasks.notify_flags"))
    })?;

    let task = Task {
        id: parse_uuid(&id_text, "tasks.uuid")?,
        due_at: row.get("due_at")?,
        due_has_time: parse_bool(row.get("due_has_time")?, "tasks.due_has_time")?,
        hide_until: row.get("hide_until")?,
        hide_until_has_time: parse_bool(
            row.get("hide_until_has_time")?,
            "tasks.hide_until_has_time",
        )?,
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
        deleted_at: row.get("deleted_at")?,
        last_notified_at: row.get("last_notified_at")?,
        notify: NotificationFlags::from_bits(flags),
    };
    task.validate()
        .map_err(|err| RepoError::InvalidData(format!("tasks row {}: {err}", task.id)))?;
    Ok(task)
}
