//! Core system modules
//!
//! Contains configuration, errors, threads, the scheduler and time helpers.

pub mod config;
pub mod critical;
pub mod error;
pub mod types;
pub mod thread;
pub mod sched;
pub mod time;
