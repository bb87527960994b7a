//! Scheduler module
//!
//! Binds the kernel to the CPU: a periodic timer drives the tick and a
//! software triggered line performs context switches requested from
//! interrupt handlers. The scheduler also owns the fixed pools every thread,
//! mutex and semaphore it creates is placed in.

mod routine;

pub use routine::{SvcallRoutine, TimerRoutine};

use core::cell::Cell;
use core::ptr::NonNull;

use crate::config::{
    CFG_NUMBER_OF_MUTEXES, CFG_NUMBER_OF_SEMAPHORES, CFG_NUMBER_OF_THREADS, CFG_SVCALL_SOURCE,
    CFG_TIMER_INDEX,
};
use crate::critical::{is_isr_context, IsrContext};
use crate::error::{SysError, SysResult};
use crate::mem::{Allocator, PoolBox, ResourcePool};
use crate::port::{CpuInterrupt, CpuProcessor, CpuTimer, Kernel};
use crate::sync::{MutexResource, SemaphoreResource};
use crate::thread::{Task, ThreadResource};
use crate::time;

pub type ThreadPool<K> = ResourcePool<ThreadResource<K>, CFG_NUMBER_OF_THREADS>;
pub type MutexPool<K> = ResourcePool<MutexResource<K>, CFG_NUMBER_OF_MUTEXES>;
pub type SemaphorePool<K> = ResourcePool<SemaphoreResource<K>, CFG_NUMBER_OF_SEMAPHORES>;

/// Thread created by a [`Scheduler`]
pub type Thread<'s, K> = PoolBox<'s, ThreadResource<K>, ThreadPool<K>>;
/// Mutex created by a [`Scheduler`]
pub type Mutex<'s, K> = PoolBox<'s, MutexResource<K>, MutexPool<K>>;
/// Semaphore created by a [`Scheduler`]
pub type Semaphore<'s, K> = PoolBox<'s, SemaphoreResource<K>, SemaphorePool<K>>;

/// Software interrupt of the live scheduler
static SVCALL: critical_section::Mutex<Cell<Option<&'static dyn CpuInterrupt>>> =
    critical_section::Mutex::new(Cell::new(None));

/// System scheduler.
///
/// At most one scheduler is alive at a time. Creating it starts the tick,
/// dropping it stops the tick and releases the software interrupt.
pub struct Scheduler<K: Kernel, C: CpuProcessor> {
    isr_tim: TimerRoutine<K>,
    isr_svc: SvcallRoutine<K>,
    tim: &'static C::Timer,
    int_tim: &'static C::Interrupt,
    int_svc: &'static C::Interrupt,
    threads: ThreadPool<K>,
    mutexes: MutexPool<K>,
    semaphores: SemaphorePool<K>,
}

impl<K: Kernel, C: CpuProcessor> Scheduler<K, C> {
    /// Acquire the CPU resources and start the tick
    pub fn new(cpu: &C) -> SysResult<Self> {
        if svcall_installed() {
            return Err(SysError::SchedulerInstalled);
        }

        let period = time::tick_period_us(K::tick_rate_hz());
        if period == 0 {
            crate::error!("kernel tick rate out of range");
            return Err(SysError::InvalidArgument);
        }

        let tim = cpu.create_timer(CFG_TIMER_INDEX).ok_or(SysError::CpuResource)?;
        if !tim.set_period(period) {
            crate::error!("timer rejected a period of {=u64} us", period);
            return Err(SysError::CpuResource);
        }
        let int_tim = cpu
            .create_interrupt(TimerRoutine::<K>::handler, tim.interrupt_source())
            .ok_or(SysError::CpuResource)?;
        let int_svc = cpu
            .create_interrupt(SvcallRoutine::<K>::handler, CFG_SVCALL_SOURCE)
            .ok_or(SysError::CpuResource)?;

        critical_section::with(|cs| {
            let slot = SVCALL.borrow(cs);
            if slot.get().is_some() {
                return Err(SysError::SchedulerInstalled);
            }
            slot.set(Some(int_svc as &'static dyn CpuInterrupt));
            Ok(())
        })?;

        int_tim.enable();
        int_svc.enable();
        tim.start();
        crate::info!("scheduler started, tick {=u64} us", period);

        Ok(Scheduler {
            isr_tim: TimerRoutine::new(),
            isr_svc: SvcallRoutine::new(),
            tim,
            int_tim,
            int_svc,
            threads: ResourcePool::new(),
            mutexes: ResourcePool::new(),
            semaphores: ResourcePool::new(),
        })
    }

    #[inline]
    pub fn is_constructed(&self) -> bool {
        self.isr_tim.is_constructed() && self.isr_svc.is_constructed()
    }

    /// Create a thread for `task` in the thread pool
    pub fn create_thread(&self, task: &'static dyn Task) -> SysResult<Thread<'_, K>> {
        ThreadResource::create_in(task, &self.threads)
    }

    /// Create a recursive mutex in the mutex pool
    pub fn create_mutex(&self) -> SysResult<Mutex<'_, K>> {
        MutexResource::create_in(&self.mutexes)
    }

    /// Create a counting semaphore in the semaphore pool
    pub fn create_semaphore(&self, permits: i32, maximum: i32) -> SysResult<Semaphore<'_, K>> {
        SemaphoreResource::create_in(&self.semaphores, permits, maximum)
    }

    /// Create a binary semaphore in the semaphore pool
    pub fn create_binary_semaphore(&self) -> SysResult<Semaphore<'_, K>> {
        SemaphoreResource::create_binary_in(&self.semaphores)
    }

    /// Sleep the calling thread, see [`sleep_thread`]
    #[inline]
    pub fn sleep(&self, ms: u32) -> SysResult<()> {
        sleep_thread::<K>(ms)
    }

    /// Yield the calling thread, see [`yield_thread`]
    #[inline]
    pub fn yield_now(&self) -> SysResult<()> {
        yield_thread::<K>()
    }

    /// Raw thread-sized slot from the thread pool
    pub fn allocate(&self, size: usize) -> SysResult<NonNull<u8>> {
        self.threads.allocate(size)
    }

    /// Return a slot obtained from [`Scheduler::allocate`]
    ///
    /// # Safety
    /// `ptr` must be null or an unfreed address returned by `allocate`, and
    /// any value placed there must already be dropped.
    pub unsafe fn free(&self, ptr: *mut u8) {
        unsafe { self.threads.free(ptr) }
    }

    /// Thread slots in use
    #[inline]
    pub fn threads_used(&self) -> usize {
        self.threads.used()
    }
}

impl<K: Kernel, C: CpuProcessor> Drop for Scheduler<K, C> {
    fn drop(&mut self) {
        self.tim.stop();
        self.int_tim.disable();
        self.int_svc.disable();

        let own = self.int_svc as *const C::Interrupt as *const u8;
        critical_section::with(|cs| {
            let slot = SVCALL.borrow(cs);
            if let Some(line) = slot.get() {
                if core::ptr::eq(line as *const dyn CpuInterrupt as *const u8, own) {
                    slot.set(None);
                }
            }
        });
        crate::info!("scheduler stopped");
    }
}

#[inline]
fn svcall_installed() -> bool {
    critical_section::with(|cs| SVCALL.borrow(cs).get().is_some())
}

// ============ Thread operations ============

/// Put the calling thread to sleep for `ms` milliseconds.
///
/// The duration is issued to the kernel as whole seconds followed by the
/// remaining milliseconds. Both delays are always requested.
pub fn sleep_thread<K: Kernel>(ms: u32) -> SysResult<()> {
    if is_isr_context() {
        return Err(SysError::IsrContext);
    }
    let hz = K::tick_rate_hz();
    let (s, rem) = time::split_ms(ms);
    let slept_s = K::task_delay(time::s_to_ticks(s, hz));
    let slept_ms = K::task_delay(time::ms_to_ticks(rem, hz));
    if slept_s && slept_ms {
        Ok(())
    } else {
        Err(SysError::NotDelayed)
    }
}

/// Give the processor to the next ready thread
pub fn yield_thread<K: Kernel>() -> SysResult<()> {
    if is_isr_context() {
        return Err(SysError::IsrContext);
    }
    K::task_yield();
    Ok(())
}

/// Request a context switch on return from the current interrupt
pub fn yield_thread_from_interrupt(_cx: &IsrContext) -> SysResult<()> {
    let line = critical_section::with(|cs| SVCALL.borrow(cs).get());
    match line {
        Some(line) => {
            line.jump();
            Ok(())
        }
        None => Err(SysError::NotConstructed),
    }
}
