//! Alarm-rule store contract and SQLite implementation.

use crate::model::alarm::{AlarmId, AlarmKind, AlarmRule};
use crate::model::task::TaskId;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use log::warn;
use rusqlite::{params, Connection, Row};

pub(crate) const ALARM_SELECT_SQL: &str = "SELECT
    alarms.uuid,
    alarms.task_uuid,
    alarms.kind,
    alarms.offset_ms,
    alarms.repeat_count,
    alarms.interval_ms
FROM alarms";

/// CRUD over alarm rules keyed by task.
pub trait AlarmRuleStore {
    /// Rules of one task in insertion order.
    fn alarms_for_task(&self, task_id: TaskId) -> RepoResult<Vec<AlarmRule>>;
    fn insert_alarm(&self, rule: &AlarmRule) -> RepoResult<AlarmId>;
    /// Returns whether a row was deleted.
    fn delete_alarm(&self, id: AlarmId) -> RepoResult<bool>;
}

pub struct SqliteAlarmRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAlarmRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AlarmRuleStore for SqliteAlarmRepository<'_> {
    fn alarms_for_task(&self, task_id: TaskId) -> RepoResult<Vec<AlarmRule>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ALARM_SELECT_SQL} WHERE alarms.task_uuid = ?1 ORDER BY alarms.rowid ASC;"
        ))?;
        let mut rows = stmt.query([task_id.to_string()])?;
        let mut rules = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(rule) = parse_alarm_row(row)? {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    fn insert_alarm(&self, rule: &AlarmRule) -> RepoResult<AlarmId> {
        rule.validate()?;

        let inserted = self.conn.execute(
            "INSERT INTO alarms (uuid, task_uuid, kind, offset_ms, repeat_count, interval_ms)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6
             WHERE EXISTS (SELECT 1 FROM tasks WHERE uuid = ?2);",
            params![
                rule.id.to_string(),
                rule.task_id.to_string(),
                rule.kind.as_str(),
                rule.offset,
                rule.repeat,
                rule.interval,
            ],
        )?;
        if inserted == 0 {
            return Err(RepoError::NotFound(rule.task_id));
        }

        Ok(rule.id)
    }

    fn delete_alarm(&self, id: AlarmId) -> RepoResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM alarms WHERE uuid = ?1;", [id.to_string()])?;
        Ok(deleted > 0)
    }
}

/// Decodes one alarm row; `None` for a kind this build does not know.
pub(crate) fn parse_alarm_row(row: &Row<'_>) -> RepoResult<Option<AlarmRule>> {
    let id_text: String = row.get(0)?;
    let id = parse_uuid(&id_text, "alarms.uuid")?;
    let kind_text: String = row.get(2)?;
    let Some(kind) = AlarmKind::parse(&kind_text) else {
        warn!(
            "event=alarm_row_skipped module=repo status=skip alarm_id={} reason=unknown_kind kind={}",
            id, kind_text
        );
        return Ok(None);
    };
    let task_text: String = row.get(1)?;
    let repeat: i64 = row.get(4)?;
    let repeat = u32::try_from(repeat).map_err(|_| {
        RepoError::InvalidData(format!("invalid repeat `{repeat}` in alarms.repeat_count"))
    })?;

    Ok(Some(AlarmRule {
        id,
        task_id: parse_uuid(&task_text, "alarms.task_uuid")?,
        kind,
        offset: row.get(3)?,
        repeat,
        interval: row.get(5)?,
    }))
}
