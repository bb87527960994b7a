//! Core type definitions for rtsys
//!
//! These types provide strong typing for the system layer primitives.

use crate::config::{CFG_STACK_ALIGN, CFG_THREAD_STACK_SIZE};

/// Abstract thread priority (higher value = higher priority)
pub type Priority = i32;

/// Returned for objects that have no valid priority
pub const PRIORITY_WRONG: Priority = -1;
/// Idle-equivalent priority, below the normal range
pub const PRIORITY_IDLE: Priority = 0;
/// Lowest normal priority
pub const PRIORITY_MIN: Priority = 1;
/// Default priority of a new thread
pub const PRIORITY_NORM: Priority = 4;
/// Highest normal priority
pub const PRIORITY_MAX: Priority = 7;

/// Stack element type handed to the kernel
pub type StackWord = u32;

/// Thread stack size rounded up to the stack alignment
pub const THREAD_STACK_SIZE: usize =
    (CFG_THREAD_STACK_SIZE + CFG_STACK_ALIGN - 1) / CFG_STACK_ALIGN * CFG_STACK_ALIGN;

/// Thread stack depth in stack words
pub const THREAD_STACK_DEPTH: usize = THREAD_STACK_SIZE / core::mem::size_of::<StackWord>();

/// Upper bound of semaphore permits
pub const MAX_PERMITS: i32 = i32::MAX;

/// Thread lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ThreadStatus {
    /// Constructed, not registered with the kernel
    New = 0,
    /// Registered, the kernel may schedule it
    Runnable = 1,
    /// Terminated
    Dead = 2,
}

impl ThreadStatus {
    #[inline]
    pub(crate) const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ThreadStatus::New,
            1 => ThreadStatus::Runnable,
            _ => ThreadStatus::Dead,
        }
    }
}

/// Semaphore flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SemaphoreKind {
    /// Counting semaphore with an explicit cap
    Counting,
    /// Binary toggle, starts taken
    Binary,
}

/// Test a value against the supported priority range
#[inline]
pub fn is_priority(priority: Priority) -> bool {
    (PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) || priority == PRIORITY_IDLE
}
