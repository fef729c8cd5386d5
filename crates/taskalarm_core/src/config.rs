//! Scheduler configuration.
//!
//! # Responsibility
//! - Hold the knobs the calculator and queues read at construction time.
//! - Load them from JSON with every field optional.
//!
//! # Invariants
//! - Times of day are millis after local midnight and below 24h.
//! - `utc_offset_minutes` stays within ±18h.

use crate::scheduler::wakeup::{NoQuietHours, QuietHours, QuietHoursPolicy};
use crate::time::{LocalCalendar, ONE_DAY_MS, ONE_HOUR_MS};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Quiet-hours window; `start_ms > end_ms` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHoursConfig {
    pub start_ms: u32,
    pub end_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Whether date-only anchors resolve to `default_due_time_ms`.
    pub default_due_time_enabled: bool,
    pub default_due_time_ms: u32,
    pub utc_offset_minutes: i32,
    pub random_seed: u64,
    pub quiet_hours: Option<QuietHoursConfig>,
    pub log_level: Option<String>,
    pub log_dir: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_due_time_enabled: true,
            default_due_time_ms: (18 * ONE_HOUR_MS) as u32,
            utc_offset_minutes: 0,
            random_seed: 0,
            quiet_hours: None,
            log_level: None,
            log_dir: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl SchedulerConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_time_of_day("default_due_time_ms", self.default_due_time_ms)?;
        if let Some(quiet) = self.quiet_hours {
            check_time_of_day("quiet_hours.start_ms", quiet.start_ms)?;
            check_time_of_day("quiet_hours.end_ms", quiet.end_ms)?;
        }
        if self.utc_offset_minutes.unsigned_abs() > MAX_UTC_OFFSET_MINUTES.unsigned_abs() {
            return Err(ConfigError::Invalid(format!(
                "utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}, got {}",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }

    /// Local calendar; falls back to UTC for an unvalidated, out-of-range offset.
    pub fn calendar(&self) -> LocalCalendar {
        LocalCalendar::from_offset_minutes(self.utc_offset_minutes).unwrap_or_default()
    }

    /// Quiet-hours policy applied when arming wake-ups.
    pub fn quiet_hours_policy(&self) -> Arc<dyn QuietHoursPolicy> {
        match self.quiet_hours {
            Some(window) => Arc::new(QuietHours::new(
                self.calendar(),
                i64::from(window.start_ms),
                i64::from(window.end_ms),
            )),
            None => Arc::new(NoQuietHours),
        }
    }
}

fn check_time_of_day(field: &str, value: u32) -> Result<(), ConfigError> {
    if i64::from(value) >= ONE_DAY_MS {
        return Err(ConfigError::Invalid(format!(
            "{field} must be below one day in millis, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, QuietHoursConfig, SchedulerConfig};
    use crate::time::ONE_HOUR_MS;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = SchedulerConfig::from_json_str("{}").expect("empty config should parse");
        assert_eq!(config, SchedulerConfig::default());
        assert!(config.default_due_time_enabled);
        assert_eq!(i64::from(config.default_due_time_ms), 18 * ONE_HOUR_MS);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = SchedulerConfig::from_json_str(
            r#"{
                "default_due_time_ms": 46800000,
                "random_seed": 7,
                "quiet_hours": { "start_ms": 79200000, "end_ms": 25200000 }
            }"#,
        )
        .expect("config should parse");
        assert_eq!(i64::from(config.default_due_time_ms), 13 * ONE_HOUR_MS);
        assert_eq!(config.random_seed, 7);
        assert_eq!(
            config.quiet_hours,
            Some(QuietHoursConfig {
                start_ms: 79_200_000,
                end_ms: 25_200_000,
            })
        );
    }

    #[test]
    fn rejects_time_of_day_past_midnight() {
        let err = SchedulerConfig::from_json_str(r#"{ "default_due_time_ms": 86400000 }"#)
            .expect_err("24h must be rejected");
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("default_due_time_ms")));
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let err = SchedulerConfig::from_json_str(r#"{ "utc_offset_minutes": 1200 }"#)
            .expect_err("offset must be bounded");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn most_negative_offset_is_invalid_not_a_panic() {
        let err = SchedulerConfig::from_json_str(r#"{ "utc_offset_minutes": -2147483648 }"#)
            .expect_err("i32::MIN offset must be rejected");
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("utc_offset_minutes")));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = SchedulerConfig::from_json_str("{ nope").expect_err("bad json");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(br#"{ "default_due_time_enabled": false }"#)
            .expect("write config");
        let config = SchedulerConfig::load(file.path()).expect("config should load");
        assert!(!config.default_due_time_enabled);
    }
}
