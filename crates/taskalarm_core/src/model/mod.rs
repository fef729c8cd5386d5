//! Read-only domain snapshots consumed by the scheduling engine.
//!
//! # Responsibility
//! - Define the task and alarm-rule shapes the calculator works on.
//! - Define the `Notification` value produced by every scheduling pass.
//!
//! # Invariants
//! - All timestamps are Unix epoch milliseconds; `0` means "unset".
//! - Alarm rules are recreated, never updated in place.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod alarm;
pub mod task;

/// Validation failures for task and alarm-rule writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NegativeTimestamp { field: &'static str, value: i64 },
    NegativeInterval(i64),
    RepeatWithoutInterval { repeat: u32 },
    EmptyRandomWindow(i64),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeTimestamp { field, value } => {
                write!(f, "{field} must not be negative, got {value}")
            }
            Self::NegativeInterval(value) => {
                write!(f, "alarm interval must not be negative, got {value}")
            }
            Self::RepeatWithoutInterval { repeat } => write!(
                f,
                "alarm repeats {repeat} times but has no positive interval"
            ),
            Self::EmptyRandomWindow(value) => {
                write!(f, "random alarm window must be positive, got {value}")
            }
        }
    }
}

impl Error for ValidationError {}
