//! In-memory wake-up coalescing.
//!
//! # Responsibility
//! - Keep the pending reminder instants and visibility-refresh instants.
//! - Touch the single external wake-up timer only when the earliest pending
//!   instant changes.
//!
//! # Invariants
//! - Each queue is guarded by its own lock; wake-up calls are issued while
//!   holding it so timer state follows mutation order.
//! - Quiet-hours adjustment applies to armed instants only, never to ordering.

pub mod notification_queue;
pub mod refresh;
pub mod wakeup;
