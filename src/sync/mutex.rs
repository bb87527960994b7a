//! Recursive mutex resource
//!
//! The owning task may lock the mutex again without deadlocking itself and
//! must unlock it as many times as it locked it. Recursion and priority
//! inheritance are provided by the kernel lock this type wraps.

use core::cell::UnsafeCell;
use core::marker::PhantomPinned;
use core::mem::MaybeUninit;
use core::pin::Pin;

use crate::critical::is_isr_context;
use crate::error::{SysError, SysResult};
use crate::mem::{Allocator, PoolBox};
use crate::port::Kernel;

/// Recursive mutex over a statically stored kernel lock
pub struct MutexResource<K: Kernel> {
    handle: Option<K::SemHandle>,
    buffer: UnsafeCell<MaybeUninit<K::SemBuffer>>,
    _pin: PhantomPinned,
}

// SAFETY: the buffer is only touched by the kernel, which serializes access
unsafe impl<K: Kernel> Sync for MutexResource<K> {}
unsafe impl<K: Kernel> Send for MutexResource<K> {}

impl<K: Kernel> MutexResource<K> {
    /// Create an unconstructed mutex. Call [`construct`](Self::construct)
    /// once it sits at its final address.
    pub const fn new() -> Self {
        MutexResource {
            handle: None,
            buffer: UnsafeCell::new(MaybeUninit::uninit()),
            _pin: PhantomPinned,
        }
    }

    /// Construct a mutex in storage from `alloc`
    pub fn create_in<A: Allocator + ?Sized>(alloc: &A) -> SysResult<PoolBox<'_, Self, A>> {
        let mut mutex = PoolBox::new_in(Self::new(), alloc)?;
        mutex.as_pin_mut().construct()?;
        Ok(mutex)
    }

    /// Register the kernel lock in this object's storage
    pub fn construct(self: Pin<&mut Self>) -> SysResult<()> {
        // SAFETY: the value is not moved, only its handle is written
        let this = unsafe { self.get_unchecked_mut() };
        if this.handle.is_some() {
            return Err(SysError::StatusInvalid);
        }
        let buffer = this.buffer.get().cast::<K::SemBuffer>();
        let handle = unsafe { K::recursive_mutex_create_static(buffer) };
        this.handle = Some(handle.ok_or(SysError::KernelRejected)?);
        Ok(())
    }

    #[inline]
    pub fn is_constructed(&self) -> bool {
        self.handle.is_some()
    }

    /// Non-blocking lock attempt. Not provided by this layer.
    pub fn try_lock(&self) -> SysResult<()> {
        self.handle.ok_or(SysError::NotConstructed)?;
        Err(SysError::Unsupported)
    }

    /// Lock the mutex, blocking the calling task without timeout
    pub fn lock(&self) -> SysResult<()> {
        let handle = self.handle.ok_or(SysError::NotConstructed)?;
        if is_isr_context() {
            return Err(SysError::IsrContext);
        }
        if K::recursive_mutex_take(handle) {
            Ok(())
        } else {
            Err(SysError::KernelRejected)
        }
    }

    /// Unlock one level of recursion
    pub fn unlock(&self) -> SysResult<()> {
        let handle = self.handle.ok_or(SysError::NotConstructed)?;
        if is_isr_context() {
            return Err(SysError::IsrContext);
        }
        if K::recursive_mutex_give(handle) {
            Ok(())
        } else {
            Err(SysError::KernelRejected)
        }
    }
}

impl<K: Kernel> Default for MutexResource<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kernel> Drop for MutexResource<K> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            unsafe { K::semaphore_delete(handle) };
        }
    }
}
