//! Execution context helpers
//!
//! Distinguishes interrupt context from task context, both at runtime and
//! through the [`IsrContext`] token that ISR-safe operations require.

use core::marker::PhantomData;

/// Proof that the holder runs inside an interrupt service routine.
///
/// CPU drivers create one when dispatching an interrupt and hand a
/// reference to the bound handler. It is `!Send`, so the token cannot leave
/// the handler that received it.
pub struct IsrContext {
    _not_send: PhantomData<*const ()>,
}

impl IsrContext {
    /// Create a context token.
    ///
    /// # Safety
    /// Must only be called by interrupt dispatch code, with interrupts of
    /// the kernel's priority class masked or nested per the kernel rules.
    #[inline(always)]
    pub unsafe fn new_unchecked() -> Self {
        IsrContext { _not_send: PhantomData }
    }
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}
