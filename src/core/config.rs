//! Compile-time configuration for rtsys
//!
//! These constants control the resource limits of the system layer.

/// Stack size of every thread in bytes
pub const CFG_THREAD_STACK_SIZE: usize = 2048;

/// Stack alignment in bytes
pub const CFG_STACK_ALIGN: usize = 8;

/// Number of thread slots in the scheduler pool (0 = heap or disabled)
pub const CFG_NUMBER_OF_THREADS: usize = 4;

/// Number of mutex slots in the scheduler pool (0 = heap or disabled)
pub const CFG_NUMBER_OF_MUTEXES: usize = 8;

/// Number of semaphore slots in the scheduler pool (0 = heap or disabled)
pub const CFG_NUMBER_OF_SEMAPHORES: usize = 8;

/// CPU timer index used for the system tick
pub const CFG_TIMER_INDEX: u32 = 0;

/// Interrupt source of the software-triggered scheduler line
pub const CFG_SVCALL_SOURCE: u32 = 14;

/// Name given to kernel tasks, debug only
pub const CFG_THREAD_NAME: &str = "rtsys thread\0";

// ============ FreeRTOS port ============

/// Must match `configTICK_RATE_HZ` of the linked kernel
pub const CFG_FREERTOS_TICK_RATE_HZ: u32 = 1000;

/// Must match `configMAX_PRIORITIES` of the linked kernel
pub const CFG_FREERTOS_MAX_PRIORITIES: u32 = 8;

/// Bytes reserved for one `StaticTask_t`, at least its size
pub const CFG_FREERTOS_TCB_SIZE: usize = 256;

/// Bytes reserved for one `StaticQueue_t`, at least its size
pub const CFG_FREERTOS_QUEUE_SIZE: usize = 96;
