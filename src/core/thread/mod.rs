//! Thread resource
//!
//! Bridges a user [`Task`] to a native kernel task. A thread owns its stack
//! and task control block for its whole lifetime and moves strictly
//! forward through `New -> Runnable -> Dead`.

mod stack;

pub use stack::ThreadStack;

use core::cell::{Cell, UnsafeCell};
use core::ffi::c_void;
use core::marker::PhantomPinned;
use core::mem::MaybeUninit;
use core::ptr::addr_of_mut;

use critical_section::Mutex;
use portable_atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};

use crate::config::CFG_THREAD_NAME;
use crate::critical::{is_isr_context, IsrContext};
use crate::error::{SysError, SysResult};
use crate::mem::{Allocator, PoolBox};
use crate::port::Kernel;
use crate::sched;
use crate::types::{is_priority, Priority, ThreadStatus, PRIORITY_MAX, PRIORITY_NORM, PRIORITY_WRONG};

/// Unit of work executed by a thread.
///
/// The body runs once on the new kernel task; when it returns the thread
/// is dead and its kernel task is parked forever.
pub trait Task: Sync {
    /// Task body
    fn start(&self);

    /// Whether the task object is usable
    fn is_constructed(&self) -> bool {
        true
    }
}

impl<F: Fn() + Sync> Task for F {
    fn start(&self) {
        self()
    }
}

/// Object marker of a live thread resource ('THRD')
const THREAD_MAGIC: u32 = 0x5448_5244;

/// Thread bound to a kernel task
pub struct ThreadResource<K: Kernel> {
    magic: AtomicU32,
    task: &'static dyn Task,
    status: AtomicU8,
    /// Set while an `execute` owns the kernel registration
    claimed: AtomicBool,
    priority: AtomicI32,
    thread: Mutex<Cell<Option<K::TaskHandle>>>,
    tcb: UnsafeCell<MaybeUninit<K::TaskBuffer>>,
    stack: UnsafeCell<MaybeUninit<ThreadStack>>,
    _pin: PhantomPinned,
}

// SAFETY: tcb and stack are only handed to the kernel, the rest is atomic
// or guarded by a critical section
unsafe impl<K: Kernel> Sync for ThreadResource<K> {}
unsafe impl<K: Kernel> Send for ThreadResource<K> {}

impl<K: Kernel> ThreadResource<K> {
    /// Construct a thread for `task` in storage from `alloc`.
    ///
    /// The stack and control block are reserved inside the slot, nothing is
    /// allocated when the thread is executed.
    pub fn create_in<'a, A: Allocator + ?Sized>(
        task: &'static dyn Task,
        alloc: &'a A,
    ) -> SysResult<PoolBox<'a, Self, A>> {
        if PRIORITY_MAX as u32 >= K::MAX_PRIORITIES {
            return Err(SysError::PrioUnsupported);
        }
        if !task.is_constructed() {
            return Err(SysError::NotConstructed);
        }

        let thread = unsafe {
            PoolBox::new_in_place(alloc, |ptr: *mut Self| {
                addr_of_mut!((*ptr).magic).write(AtomicU32::new(THREAD_MAGIC));
                addr_of_mut!((*ptr).task).write(task);
                addr_of_mut!((*ptr).status).write(AtomicU8::new(ThreadStatus::New as u8));
                addr_of_mut!((*ptr).claimed).write(AtomicBool::new(false));
                addr_of_mut!((*ptr).priority).write(AtomicI32::new(PRIORITY_NORM));
                addr_of_mut!((*ptr).thread).write(Mutex::new(Cell::new(None)));
                addr_of_mut!((*ptr).tcb).write(UnsafeCell::new(MaybeUninit::uninit()));
                addr_of_mut!((*ptr).stack).write(UnsafeCell::new(MaybeUninit::uninit()));
            })?
        };
        Ok(thread)
    }

    #[inline]
    pub fn is_constructed(&self) -> bool {
        self.magic.load(Ordering::Acquire) == THREAD_MAGIC
    }

    /// Current lifecycle state
    #[inline]
    pub fn status(&self) -> ThreadStatus {
        ThreadStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    #[inline]
    fn handle(&self) -> Option<K::TaskHandle> {
        critical_section::with(|cs| self.thread.borrow(cs).get())
    }

    /// Register the thread with the kernel.
    ///
    /// The thread stays `New` until the kernel accepts the task, a rejected
    /// call leaves it executable again.
    pub fn execute(&self) -> SysResult<()> {
        if !self.is_constructed() {
            return Err(SysError::NotConstructed);
        }
        if self.status() != ThreadStatus::New {
            return Err(SysError::StatusInvalid);
        }
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SysError::StatusInvalid)?;

        let priority = self.priority.load(Ordering::Acquire);
        let stack = ThreadStack::base(self.stack.get().cast::<ThreadStack>());
        let tcb = self.tcb.get().cast::<K::TaskBuffer>();
        let arg = self as *const Self as *mut c_void;

        let handle = unsafe {
            K::task_create_static(
                start::<K>,
                CFG_THREAD_NAME,
                stack,
                ThreadStack::DEPTH,
                arg,
                convert_priority(priority),
                tcb,
            )
        };

        let Some(handle) = handle else {
            self.claimed.store(false, Ordering::Release);
            crate::error!("kernel rejected thread creation");
            return Err(SysError::KernelRejected);
        };

        // A body that already finished has stored Dead, which stays
        critical_section::with(|cs| {
            self.thread.borrow(cs).set(Some(handle));
            let _ = self.status.compare_exchange(
                ThreadStatus::New as u8,
                ThreadStatus::Runnable as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        });

        // Priority changed while the kernel call was in flight
        let current = self.priority.load(Ordering::Acquire);
        if current != priority {
            K::task_priority_set(handle, convert_priority(current));
        }
        crate::debug!("thread executed, priority {=i32}", current);
        Ok(())
    }

    /// Wait until the thread is dead.
    ///
    /// Only a runnable thread can be joined. Polls the status and yields on
    /// every iteration, it does not block on a wait queue.
    pub fn join(&self) -> SysResult<()> {
        if !self.is_constructed() {
            return Err(SysError::NotConstructed);
        }
        if is_isr_context() {
            return Err(SysError::IsrContext);
        }
        if self.status() != ThreadStatus::Runnable {
            return Err(SysError::StatusInvalid);
        }
        loop {
            match self.status() {
                ThreadStatus::Dead => return Ok(()),
                ThreadStatus::New => return Err(SysError::StatusInvalid),
                ThreadStatus::Runnable => K::task_yield(),
            }
        }
    }

    /// Stored priority, [`PRIORITY_WRONG`] if not constructed
    pub fn priority(&self) -> Priority {
        if self.is_constructed() {
            self.priority.load(Ordering::Acquire)
        } else {
            PRIORITY_WRONG
        }
    }

    /// Change the priority.
    ///
    /// A runnable thread is updated in the kernel immediately, a new one at
    /// `execute`. On a dead thread the call only validates `priority`.
    pub fn set_priority(&self, priority: Priority) -> SysResult<()> {
        if !self.is_constructed() {
            return Err(SysError::NotConstructed);
        }
        if !is_priority(priority) {
            return Err(SysError::PrioInvalid);
        }
        match self.status() {
            ThreadStatus::Runnable => {
                if let Some(handle) = self.handle() {
                    K::task_priority_set(handle, convert_priority(priority));
                }
                self.priority.store(priority, Ordering::Release);
            }
            ThreadStatus::New => {
                self.priority.store(priority, Ordering::Release);
            }
            ThreadStatus::Dead => {}
        }
        Ok(())
    }
}

impl<K: Kernel> Drop for ThreadResource<K> {
    fn drop(&mut self) {
        let handle = critical_section::with(|cs| self.thread.borrow(cs).take());
        if let Some(handle) = handle {
            unsafe { K::task_delete(handle) };
            self.status.store(ThreadStatus::Dead as u8, Ordering::Release);
        }
        self.magic.store(0, Ordering::Release);
    }
}

/// Abstract priorities map one to one onto kernel priorities
#[inline]
fn convert_priority(priority: Priority) -> u32 {
    priority as u32
}

/// Kernel entry point of every thread
extern "C" fn start<K: Kernel>(arg: *mut c_void) {
    let thread = arg.cast_const().cast::<ThreadResource<K>>();
    match unsafe { thread.as_ref() } {
        Some(thread) if thread.is_constructed() && thread.task.is_constructed() => {
            thread.task.start();
            thread.status.store(ThreadStatus::Dead as u8, Ordering::Release);
            crate::debug!("thread finished");
        }
        _ => {
            crate::error!("thread entry with invalid resource");
        }
    }
    // Kernel task functions must never return
    loop {
        K::task_suspend_current();
    }
}

// ============ Static conveniences ============

/// Put the calling thread to sleep for `ms` milliseconds
#[inline]
pub fn sleep<K: Kernel>(ms: u32) -> SysResult<()> {
    sched::sleep_thread::<K>(ms)
}

/// Yield the processor to the next ready thread
#[inline]
pub fn yield_now<K: Kernel>() -> SysResult<()> {
    sched::yield_thread::<K>()
}

/// Request a reschedule from interrupt context
#[inline]
pub fn yield_from_interrupt(cx: &IsrContext) -> SysResult<()> {
    sched::yield_thread_from_interrupt(cx)
}
