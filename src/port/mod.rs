//! Port layer - collaborator interfaces
//!
//! This module defines what the system layer consumes from the underlying
//! real-time kernel ([`Kernel`]) and from the CPU driver
//! ([`CpuProcessor`]), plus the concrete ports shipped with the crate.

use core::ffi::c_void;

use crate::critical::IsrContext;
use crate::types::StackWord;

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(all(feature = "freertos", target_arch = "arm"))]
pub mod freertos;

/// Kernel task entry point. Must never return.
pub type TaskEntry = extern "C" fn(*mut c_void);

/// Interrupt handler bound to a CPU interrupt line
pub type IsrHandler = fn(&IsrContext);

/// Underlying real-time kernel.
///
/// The kernel is process-global, so every primitive is an associated
/// function. Objects created with `*_static` live in caller-provided
/// storage that must stay at the same address until deleted.
pub trait Kernel: 'static {
    /// Native task identifier
    type TaskHandle: Copy + PartialEq + Send;
    /// Task control block storage
    type TaskBuffer;
    /// Native semaphore or mutex identifier
    type SemHandle: Copy + Send + Sync;
    /// Semaphore or mutex control block storage
    type SemBuffer;

    /// Number of native priority levels, `0..MAX_PRIORITIES`
    const MAX_PRIORITIES: u32;

    // ============ Tasks ============

    /// Register a task on pre-allocated stack and control block.
    ///
    /// # Safety
    /// `stack` must point to `depth` words and `tcb` to a task buffer, both
    /// valid and unmoved until [`Kernel::task_delete`] returns. `arg` must
    /// stay valid for as long as the task may run.
    unsafe fn task_create_static(
        entry: TaskEntry,
        name: &'static str,
        stack: *mut StackWord,
        depth: u32,
        arg: *mut c_void,
        priority: u32,
        tcb: *mut Self::TaskBuffer,
    ) -> Option<Self::TaskHandle>;

    /// Remove a task from the kernel.
    ///
    /// # Safety
    /// `task` must come from `task_create_static` and not be deleted yet.
    unsafe fn task_delete(task: Self::TaskHandle);

    /// Change the priority of a live task
    fn task_priority_set(task: Self::TaskHandle, priority: u32);

    /// Suspend the calling task
    fn task_suspend_current();

    /// Voluntarily give up the processor
    fn task_yield();

    /// Delay the calling task; false if it was not delayed
    fn task_delay(ticks: u32) -> bool;

    /// Kernel tick rate in Hz
    fn tick_rate_hz() -> u32;

    // ============ Scheduler hooks ============

    /// Advance the tick counter; true if a context switch is due
    fn increment_tick() -> bool;

    /// Select the next task to run
    fn switch_context();

    // ============ Recursive mutex ============

    /// # Safety
    /// `buffer` must stay valid and unmoved until `semaphore_delete`.
    unsafe fn recursive_mutex_create_static(buffer: *mut Self::SemBuffer) -> Option<Self::SemHandle>;

    /// Take the mutex, blocking forever
    fn recursive_mutex_take(mutex: Self::SemHandle) -> bool;

    /// Give the mutex back once
    fn recursive_mutex_give(mutex: Self::SemHandle) -> bool;

    // ============ Semaphores ============

    /// # Safety
    /// `buffer` must stay valid and unmoved until `semaphore_delete`.
    unsafe fn counting_semaphore_create_static(
        maximum: u32,
        initial: u32,
        buffer: *mut Self::SemBuffer,
    ) -> Option<Self::SemHandle>;

    /// # Safety
    /// `buffer` must stay valid and unmoved until `semaphore_delete`.
    unsafe fn binary_semaphore_create_static(buffer: *mut Self::SemBuffer) -> Option<Self::SemHandle>;

    /// Take a permit, blocking forever
    fn semaphore_take(sem: Self::SemHandle) -> bool;

    /// Give a permit from task context
    fn semaphore_give(sem: Self::SemHandle) -> bool;

    /// Give a permit from interrupt context.
    ///
    /// `woken` is set when a task of higher priority than the interrupted
    /// one became ready.
    fn semaphore_give_from_isr(sem: Self::SemHandle, woken: &mut bool) -> bool;

    /// Live permit count
    fn semaphore_count(sem: Self::SemHandle) -> u32;

    /// Release a semaphore or mutex.
    ///
    /// # Safety
    /// No task may be blocked on the object and the handle is dead after.
    unsafe fn semaphore_delete(sem: Self::SemHandle);
}

/// CPU hardware timer resource
pub trait CpuTimer {
    /// Set the firing period in microseconds
    fn set_period(&self, us: u64) -> bool;
    /// Start counting
    fn start(&self);
    /// Stop counting
    fn stop(&self);
    /// Interrupt source raised by this timer
    fn interrupt_source(&self) -> u32;
}

/// CPU interrupt line resource
pub trait CpuInterrupt: Sync {
    /// Unmask the line
    fn enable(&self);
    /// Mask the line, returning whether it was enabled
    fn disable(&self) -> bool;
    /// Raise the line by software
    fn jump(&self);
}

/// CPU driver
pub trait CpuProcessor {
    type Timer: CpuTimer + 'static;
    type Interrupt: CpuInterrupt + 'static;

    /// Obtain a timer resource
    fn create_timer(&self, index: u32) -> Option<&'static Self::Timer>;

    /// Obtain an interrupt line bound to `handler`
    fn create_interrupt(&self, handler: IsrHandler, source: u32) -> Option<&'static Self::Interrupt>;
}
