//! Heap-backed storage provider

use alloc::alloc::{alloc, dealloc, Layout};
use core::marker::PhantomData;
use core::ptr::NonNull;

use super::Allocator;
use crate::error::{SysError, SysResult};

/// Provider that places one `T` per allocation on the global heap
pub struct HeapAllocator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> HeapAllocator<T> {
    pub const fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for HeapAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Allocator for HeapAllocator<T> {
    fn allocate(&self, size: usize) -> SysResult<NonNull<u8>> {
        let layout = Layout::new::<T>();
        if size != layout.size() {
            return Err(SysError::SizeMismatch);
        }
        if layout.size() == 0 {
            return Ok(NonNull::<T>::dangling().cast::<u8>());
        }
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).ok_or(SysError::PoolExhausted)
    }

    unsafe fn free(&self, ptr: *mut u8) {
        let layout = Layout::new::<T>();
        if ptr.is_null() || layout.size() == 0 {
            return;
        }
        unsafe { dealloc(ptr, layout) };
    }
}
