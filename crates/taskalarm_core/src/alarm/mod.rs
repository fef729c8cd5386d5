//! Alarm fire-time calculation.

pub mod calculator;
