//! Synchronization primitives
//!
//! Contains the recursive mutex and the counting/binary semaphore.

pub mod mutex;
pub mod sem;

pub use mutex::MutexResource;
pub use sem::SemaphoreResource;
