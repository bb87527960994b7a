//! Scheduler interrupt routines
//!
//! Stateless ISR bodies bound to the CPU timer line and the software
//! triggered line. They only decide when the kernel picks a task, never
//! which one.

use core::marker::PhantomData;

use crate::critical::IsrContext;
use crate::port::Kernel;

/// Tick interrupt body
pub struct TimerRoutine<K: Kernel> {
    _kernel: PhantomData<fn() -> K>,
}

impl<K: Kernel> TimerRoutine<K> {
    pub const fn new() -> Self {
        Self { _kernel: PhantomData }
    }

    #[inline]
    pub fn is_constructed(&self) -> bool {
        true
    }

    /// Advance the kernel tick and select a task if one became due
    pub fn start(&self, _cx: &IsrContext) {
        if K::increment_tick() {
            K::switch_context();
        }
    }

    /// Entry bound to the timer interrupt line
    pub(crate) fn handler(cx: &IsrContext) {
        Self::new().start(cx);
    }
}

/// Software interrupt body
pub struct SvcallRoutine<K: Kernel> {
    _kernel: PhantomData<fn() -> K>,
}

impl<K: Kernel> SvcallRoutine<K> {
    pub const fn new() -> Self {
        Self { _kernel: PhantomData }
    }

    #[inline]
    pub fn is_constructed(&self) -> bool {
        true
    }

    /// Select the next task unconditionally
    pub fn start(&self, _cx: &IsrContext) {
        K::switch_context();
    }

    /// Entry bound to the software interrupt line
    pub(crate) fn handler(cx: &IsrContext) {
        Self::new().start(cx);
    }
}
