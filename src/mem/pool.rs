//! Fixed-capacity resource pool
//!
//! Hands out `N` slots sized for one `T` each, out of a buffer reserved at
//! compile time. With `N = 0` the pool either delegates to the heap
//! (feature `alloc`) or refuses every allocation.

use core::cell::{RefCell, UnsafeCell};
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use critical_section::Mutex;

use super::Allocator;
use crate::error::{SysError, SysResult};

/// Homogeneous slot allocator for one resource type
pub struct ResourcePool<T, const N: usize> {
    buf: UnsafeCell<MaybeUninit<[T; N]>>,
    used: Mutex<RefCell<[bool; N]>>,
}

unsafe impl<T: Send, const N: usize> Sync for ResourcePool<T, N> {}
unsafe impl<T: Send, const N: usize> Send for ResourcePool<T, N> {}

impl<T, const N: usize> ResourcePool<T, N> {
    /// Create an empty pool
    pub const fn new() -> Self {
        Self {
            buf: UnsafeCell::new(MaybeUninit::uninit()),
            used: Mutex::new(RefCell::new([false; N])),
        }
    }

    /// Number of slots
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of live allocations
    pub fn used(&self) -> usize {
        critical_section::with(|cs| self.used.borrow_ref(cs).iter().filter(|u| **u).count())
    }

    /// Check whether `ptr` points at one of this pool's slots
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.slot_index(ptr).is_some()
    }

    #[inline]
    fn slot_ptr(&self, index: usize) -> NonNull<u8> {
        let base = self.buf.get().cast::<T>();
        // SAFETY: index < N, the result stays inside the buffer
        unsafe { NonNull::new_unchecked(base.add(index).cast::<u8>()) }
    }

    fn slot_index(&self, ptr: *const u8) -> Option<usize> {
        let size = core::mem::size_of::<T>();
        if N == 0 || size == 0 || ptr.is_null() {
            return None;
        }
        let base = self.buf.get() as usize;
        let addr = ptr as usize;
        if addr < base || addr >= base + size * N {
            return None;
        }
        let offset = addr - base;
        if offset % size != 0 {
            return None;
        }
        Some(offset / size)
    }

    fn allocate_heap(&self) -> SysResult<NonNull<u8>> {
        #[cfg(feature = "alloc")]
        {
            super::HeapAllocator::<T>::new().allocate(core::mem::size_of::<T>())
        }

        #[cfg(not(feature = "alloc"))]
        {
            Err(SysError::PoolDisabled)
        }
    }

    unsafe fn free_heap(&self, _ptr: *mut u8) {
        #[cfg(feature = "alloc")]
        unsafe {
            super::HeapAllocator::<T>::new().free(_ptr)
        }
    }
}

impl<T, const N: usize> Allocator for ResourcePool<T, N> {
    /// Zero-sized slots cannot be told apart on free and are refused
    fn allocate(&self, size: usize) -> SysResult<NonNull<u8>> {
        if size == 0 || size != core::mem::size_of::<T>() {
            return Err(SysError::SizeMismatch);
        }
        if N == 0 {
            return self.allocate_heap();
        }

        critical_section::with(|cs| {
            let mut used = self.used.borrow_ref_mut(cs);
            match used.iter().position(|u| !*u) {
                Some(index) => {
                    used[index] = true;
                    Ok(self.slot_ptr(index))
                }
                None => {
                    crate::warn!("resource pool exhausted, capacity {=usize}", N);
                    Err(SysError::PoolExhausted)
                }
            }
        })
    }

    unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        if N == 0 {
            unsafe { self.free_heap(ptr) };
            return;
        }
        if let Some(index) = self.slot_index(ptr) {
            critical_section::with(|cs| {
                self.used.borrow_ref_mut(cs)[index] = false;
            });
        }
    }
}

impl<T, const N: usize> Default for ResourcePool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
