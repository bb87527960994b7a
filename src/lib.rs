//! rtsys: a static-memory system layer over an embedded real-time kernel
//!
//! Provides:
//! - Fixed-capacity resource pools with optional heap fallback
//! - Threads with a `New -> Runnable -> Dead` lifecycle
//! - Recursive mutexes and counting/binary semaphores
//! - A scheduler binding the kernel tick and context switch to CPU interrupts
//!
//! The kernel and the CPU are collaborators behind the [`port::Kernel`] and
//! [`port::CpuProcessor`] traits.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(feature = "alloc")]
extern crate alloc;

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
#[cfg(target_arch = "arm")]
mod lang_items;

pub mod core;
pub mod mem;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use self::core::config;
pub use self::core::critical;
pub use self::core::critical::IsrContext;
pub use self::core::error;
pub use self::core::error::{SysError, SysResult};
pub use self::core::types;
pub use self::core::types::*;
pub use self::core::thread;
pub use self::core::thread::{Task, ThreadResource};
pub use self::core::sched;
pub use self::core::sched::Scheduler;
pub use self::core::time;

pub use mem::{Allocator, NoAllocator, PoolBox, ResourcePool};
#[cfg(feature = "alloc")]
pub use mem::HeapAllocator;

pub use sync::{MutexResource, SemaphoreResource};
