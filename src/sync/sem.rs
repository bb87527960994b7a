//! Semaphore resource
//!
//! Counting and binary semaphores over statically stored kernel objects,
//! with an ISR-safe release that reports whether a reschedule is needed.

use core::cell::UnsafeCell;
use core::marker::PhantomPinned;
use core::mem::MaybeUninit;
use core::pin::Pin;

use portable_atomic::{AtomicBool, Ordering};

use crate::critical::{is_isr_context, IsrContext};
use crate::error::{SysError, SysResult};
use crate::mem::{Allocator, PoolBox};
use crate::port::Kernel;
use crate::types::{SemaphoreKind, MAX_PERMITS};

/// Counting or binary semaphore
pub struct SemaphoreResource<K: Kernel> {
    kind: SemaphoreKind,
    /// Initial permits, the live count is kept by the kernel
    permits: i32,
    maximum: i32,
    handle: Option<K::SemHandle>,
    buffer: UnsafeCell<MaybeUninit<K::SemBuffer>>,
    /// Set by the last ISR release when a higher priority task woke up
    woken: AtomicBool,
    _pin: PhantomPinned,
}

// SAFETY: the buffer is only touched by the kernel, which serializes access
unsafe impl<K: Kernel> Sync for SemaphoreResource<K> {}
unsafe impl<K: Kernel> Send for SemaphoreResource<K> {}

impl<K: Kernel> SemaphoreResource<K> {
    /// Unconstructed semaphore of the given kind.
    ///
    /// A counting semaphore is capped at [`MAX_PERMITS`]; a binary one
    /// ignores `permits` and starts taken.
    pub const fn new_typed(kind: SemaphoreKind, permits: i32) -> Self {
        Self::raw(kind, permits, MAX_PERMITS)
    }

    /// Unconstructed counting semaphore with an explicit cap
    pub const fn new_counting(permits: i32, maximum: i32) -> Self {
        Self::raw(SemaphoreKind::Counting, permits, maximum)
    }

    const fn raw(kind: SemaphoreKind, permits: i32, maximum: i32) -> Self {
        SemaphoreResource {
            kind,
            permits,
            maximum,
            handle: None,
            buffer: UnsafeCell::new(MaybeUninit::uninit()),
            woken: AtomicBool::new(false),
            _pin: PhantomPinned,
        }
    }

    /// Construct a counting semaphore in storage from `alloc`
    pub fn create_in<A: Allocator + ?Sized>(
        alloc: &A,
        permits: i32,
        maximum: i32,
    ) -> SysResult<PoolBox<'_, Self, A>> {
        Self::place(alloc, Self::new_counting(permits, maximum))
    }

    /// Construct a binary semaphore in storage from `alloc`
    pub fn create_binary_in<A: Allocator + ?Sized>(alloc: &A) -> SysResult<PoolBox<'_, Self, A>> {
        Self::place(alloc, Self::new_typed(SemaphoreKind::Binary, 0))
    }

    /// Construct a semaphore of `kind` in storage from `alloc`
    pub fn create_typed_in<A: Allocator + ?Sized>(
        alloc: &A,
        kind: SemaphoreKind,
        permits: i32,
    ) -> SysResult<PoolBox<'_, Self, A>> {
        Self::place(alloc, Self::new_typed(kind, permits))
    }

    fn place<A: Allocator + ?Sized>(alloc: &A, sem: Self) -> SysResult<PoolBox<'_, Self, A>> {
        let mut sem = PoolBox::new_in(sem, alloc)?;
        sem.as_pin_mut().construct()?;
        Ok(sem)
    }

    /// Validate the arguments and register the kernel object in place
    pub fn construct(self: Pin<&mut Self>) -> SysResult<()> {
        // SAFETY: the value is not moved, only its handle is written
        let this = unsafe { self.get_unchecked_mut() };
        if this.handle.is_some() {
            return Err(SysError::StatusInvalid);
        }
        let buffer = this.buffer.get().cast::<K::SemBuffer>();
        let handle = match this.kind {
            SemaphoreKind::Counting => {
                if this.permits < 0 || this.maximum < 1 || this.permits > this.maximum {
                    return Err(SysError::InvalidArgument);
                }
                unsafe {
                    K::counting_semaphore_create_static(
                        this.maximum as u32,
                        this.permits as u32,
                        buffer,
                    )
                }
            }
            SemaphoreKind::Binary => unsafe { K::binary_semaphore_create_static(buffer) },
        };
        this.handle = Some(handle.ok_or(SysError::KernelRejected)?);
        Ok(())
    }

    #[inline]
    pub fn is_constructed(&self) -> bool {
        self.handle.is_some()
    }

    #[inline]
    pub fn kind(&self) -> SemaphoreKind {
        self.kind
    }

    /// Permit cap, 1 for binary semaphores
    #[inline]
    pub fn maximum(&self) -> i32 {
        match self.kind {
            SemaphoreKind::Counting => self.maximum,
            SemaphoreKind::Binary => 1,
        }
    }

    /// Take one permit, blocking the calling task without timeout
    pub fn acquire(&self) -> SysResult<()> {
        let handle = self.handle.ok_or(SysError::NotConstructed)?;
        if is_isr_context() {
            return Err(SysError::IsrContext);
        }
        if K::semaphore_take(handle) {
            Ok(())
        } else {
            Err(SysError::KernelRejected)
        }
    }

    /// Return one permit from task context. Rejected at the cap.
    pub fn release(&self) -> SysResult<()> {
        let handle = self.handle.ok_or(SysError::NotConstructed)?;
        if is_isr_context() {
            return Err(SysError::IsrContext);
        }
        if K::semaphore_give(handle) {
            Ok(())
        } else {
            Err(SysError::KernelRejected)
        }
    }

    /// Return one permit from interrupt context.
    ///
    /// Afterwards [`has_to_switch_context`](Self::has_to_switch_context)
    /// tells whether the woken task outranks the interrupted one.
    pub fn release_from_interrupt(&self, _cx: &IsrContext) -> SysResult<()> {
        let handle = self.handle.ok_or(SysError::NotConstructed)?;
        self.woken.store(false, Ordering::Relaxed);
        let mut woken = false;
        let given = K::semaphore_give_from_isr(handle, &mut woken);
        self.woken.store(woken, Ordering::Release);
        if given {
            Ok(())
        } else {
            Err(SysError::KernelRejected)
        }
    }

    /// True if the last ISR release woke a higher priority task
    #[inline]
    pub fn has_to_switch_context(&self) -> bool {
        self.woken.load(Ordering::Acquire)
    }

    /// Live permit count as seen by the kernel
    pub fn count(&self) -> i32 {
        match self.handle {
            Some(handle) => K::semaphore_count(handle) as i32,
            None => 0,
        }
    }
}

impl<K: Kernel> Drop for SemaphoreResource<K> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            unsafe { K::semaphore_delete(handle) };
        }
    }
}
