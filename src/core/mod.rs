//! Scheduler core modules
//!
//! Contains the scheduler state, classes, thread management and time.

pub mod config;
pub mod critical;
pub mod error;
pub mod kernel;
pub mod prio;
pub mod types;
pub mod thread;
pub mod sched;
pub mod time;
