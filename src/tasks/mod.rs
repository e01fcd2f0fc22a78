//! Background Tasks Module
//!
//! Async conveniences layered over a shared cache. The engines never schedule
//! anything themselves; these tasks are just callers of the public operations.
//!
//! # Tasks
//! - TTL Cleanup: calls `clear_expired_items` at a fixed interval
//! - Scheduled expiry: one timer per item, armed at put, cancelled on delete

mod cleanup;
mod timers;

pub use cleanup::spawn_cleanup_task;
pub use timers::ScheduledCache;
