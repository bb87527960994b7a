//! Thread stack storage

use crate::types::{StackWord, THREAD_STACK_DEPTH};

/// Stack of one thread, aligned to 8 bytes as the ARM AAPCS requires
#[repr(C, align(8))]
pub struct ThreadStack {
    words: [StackWord; THREAD_STACK_DEPTH],
}

impl ThreadStack {
    /// Depth in stack words as passed to the kernel
    pub const DEPTH: u32 = THREAD_STACK_DEPTH as u32;

    /// Pointer to the lowest stack word
    #[inline]
    pub fn base(this: *mut Self) -> *mut StackWord {
        // SAFETY: no reference is created, only the field address is taken
        unsafe { core::ptr::addr_of_mut!((*this).words).cast::<StackWord>() }
    }
}
