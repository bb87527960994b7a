//! Error types for rtsys
//!
//! Uses Rust's Result pattern instead of boolean success flags.

/// System layer error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SysError {
    // ============ Construction errors ============
    /// Object or one of its dependencies is not constructed
    NotConstructed,
    /// Invalid argument passed to a constructor
    InvalidArgument,
    /// A scheduler already owns the software interrupt handle
    SchedulerInstalled,
    /// Requested CPU timer or interrupt could not be obtained
    CpuResource,

    // ============ Memory errors ============
    /// No free slot left in the resource pool
    PoolExhausted,
    /// Pool has no capacity and heap fallback is off
    PoolDisabled,
    /// Requested size does not match the pool slot size
    SizeMismatch,

    // ============ Priority errors ============
    /// Priority is outside of the supported range
    PrioInvalid,
    /// Kernel priority space cannot represent the abstract range
    PrioUnsupported,

    // ============ Operation errors ============
    /// Operation is not valid in the current lifecycle state
    StatusInvalid,
    /// Kernel rejected the call
    KernelRejected,
    /// Kernel reported the task was not delayed
    NotDelayed,
    /// Blocking call issued from interrupt context
    IsrContext,
    /// Operation is not implemented by this layer
    Unsupported,
}

/// Result type alias for system layer operations
pub type SysResult<T> = Result<T, SysError>;

impl SysError {
    /// True for errors that leave the object permanently unusable
    #[inline]
    pub fn is_construction(self) -> bool {
        matches!(
            self,
            SysError::NotConstructed
                | SysError::InvalidArgument
                | SysError::SchedulerInstalled
                | SysError::CpuResource
                | SysError::PrioUnsupported
        )
    }
}
