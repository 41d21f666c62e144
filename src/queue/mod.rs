//! Bounded retry queues
//!
//! This module provides:
//! - A fixed-capacity slot array shared by producer tasks and one consumer
//! - Duplicate suppression on insert and backpressure when full
//! - Round-robin draining with per-item retry budgets

mod bounded;

pub use bounded::{BoundedRetryQueue, DrainOutcome, InsertOutcome, QueueConfig, WorkItem};
