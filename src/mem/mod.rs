//! Storage providers for system resources
//!
//! Threads, mutexes and semaphores are never placed on a general heap
//! directly. They are constructed into storage handed out by an
//! [`Allocator`]: a fixed-slot [`ResourcePool`], the [`HeapAllocator`] when
//! the `alloc` feature is on, or [`NoAllocator`].

mod pool;
#[cfg(feature = "alloc")]
mod heap;

pub use pool::ResourcePool;
#[cfg(feature = "alloc")]
pub use heap::HeapAllocator;

use core::marker::PhantomData;
use core::ops::Deref;
use core::pin::Pin;
use core::ptr::NonNull;

use crate::error::{SysError, SysResult};

/// Storage provider capability
pub trait Allocator {
    /// Allocate `size` bytes of storage
    fn allocate(&self, size: usize) -> SysResult<NonNull<u8>>;

    /// Return storage to the provider. A null pointer is ignored.
    ///
    /// # Safety
    /// `ptr` must be null or an address returned by `allocate` on this
    /// provider that has not been freed yet.
    unsafe fn free(&self, ptr: *mut u8);
}

/// Provider that refuses every allocation
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAllocator;

impl Allocator for NoAllocator {
    #[inline]
    fn allocate(&self, _size: usize) -> SysResult<NonNull<u8>> {
        Err(SysError::PoolDisabled)
    }

    #[inline]
    unsafe fn free(&self, _ptr: *mut u8) {}
}

/// Owned value living in provider storage.
///
/// The value is never moved once placed, so kernel objects may keep raw
/// pointers into it. Dropping the box drops the value and frees the slot.
pub struct PoolBox<'a, T, A: Allocator + ?Sized> {
    ptr: NonNull<T>,
    alloc: &'a A,
    _owns: PhantomData<T>,
}

unsafe impl<T: Send, A: Allocator + Sync + ?Sized> Send for PoolBox<'_, T, A> {}
unsafe impl<T: Sync, A: Allocator + Sync + ?Sized> Sync for PoolBox<'_, T, A> {}

impl<'a, T, A: Allocator + ?Sized> PoolBox<'a, T, A> {
    /// Move `value` into storage obtained from `alloc`
    pub fn new_in(value: T, alloc: &'a A) -> SysResult<Self> {
        let raw = alloc.allocate(core::mem::size_of::<T>())?;
        if (raw.as_ptr() as usize) % core::mem::align_of::<T>() != 0 {
            unsafe { alloc.free(raw.as_ptr()) };
            return Err(SysError::SizeMismatch);
        }
        let ptr = raw.cast::<T>();
        unsafe { ptr.as_ptr().write(value) };
        Ok(PoolBox { ptr, alloc, _owns: PhantomData })
    }

    /// Build the value directly inside storage obtained from `alloc`.
    ///
    /// # Safety
    /// `init` must fully initialize every field of `*ptr` that is not
    /// `MaybeUninit` and must not read the slot before writing it.
    pub(crate) unsafe fn new_in_place(alloc: &'a A, init: impl FnOnce(*mut T)) -> SysResult<Self> {
        let raw = alloc.allocate(core::mem::size_of::<T>())?;
        if (raw.as_ptr() as usize) % core::mem::align_of::<T>() != 0 {
            unsafe { alloc.free(raw.as_ptr()) };
            return Err(SysError::SizeMismatch);
        }
        let ptr = raw.cast::<T>();
        init(ptr.as_ptr());
        Ok(PoolBox { ptr, alloc, _owns: PhantomData })
    }

    /// Pinned shared access to the value
    #[inline]
    pub fn as_pin(&self) -> Pin<&T> {
        // SAFETY: the value is never moved out of its slot
        unsafe { Pin::new_unchecked(self.ptr.as_ref()) }
    }

    /// Pinned exclusive access to the value
    #[inline]
    pub fn as_pin_mut(&mut self) -> Pin<&mut T> {
        // SAFETY: the value is never moved out of its slot
        unsafe { Pin::new_unchecked(self.ptr.as_mut()) }
    }

    /// Address of the value inside the provider storage
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }
}

impl<T, A: Allocator + ?Sized> Deref for PoolBox<'_, T, A> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, A: Allocator + ?Sized> Drop for PoolBox<'_, T, A> {
    fn drop(&mut self) {
        unsafe {
            core::ptr::drop_in_place(self.ptr.as_ptr());
            self.alloc.free(self.ptr.as_ptr().cast::<u8>());
        }
    }
}
