//! Use-case services over the stores.
//!
//! # Responsibility
//! - Orchestrate store reads, calculator calls and queue updates.
//! - Keep callers decoupled from storage details.

pub mod alarm_service;
