//! FreeRTOS kernel port
//!
//! Binds [`Kernel`] to the FreeRTOS C API of a linked kernel built with
//! `configSUPPORT_STATIC_ALLOCATION`, `configUSE_RECURSIVE_MUTEXES` and
//! `configUSE_COUNTING_SEMAPHORES`. Context switches are carried out by the
//! Cortex-M4 PendSV handler.

#![allow(non_snake_case, non_upper_case_globals)]

use core::ffi::{c_char, c_void};
use core::ptr::NonNull;

use cortex_m::peripheral::scb::{Exception, VectActive};
use cortex_m::peripheral::SCB;

use crate::config::{
    CFG_FREERTOS_MAX_PRIORITIES, CFG_FREERTOS_QUEUE_SIZE, CFG_FREERTOS_TCB_SIZE,
    CFG_FREERTOS_TICK_RATE_HZ,
};
use crate::port::{Kernel, TaskEntry};
use crate::types::StackWord;

type BaseType = i32;
type UBaseType = u32;
type TickType = u32;

const pdTRUE: BaseType = 1;
const pdFALSE: BaseType = 0;
const portMAX_DELAY: TickType = 0xFFFF_FFFF;
const queueSEND_TO_BACK: BaseType = 0;
const queueQUEUE_TYPE_BINARY_SEMAPHORE: u8 = 3;
const queueQUEUE_TYPE_RECURSIVE_MUTEX: u8 = 4;

/// Opaque `StaticTask_t` storage
#[repr(C, align(8))]
pub struct StaticTask([u8; CFG_FREERTOS_TCB_SIZE]);

/// Opaque `StaticQueue_t` storage
#[repr(C, align(8))]
pub struct StaticQueue([u8; CFG_FREERTOS_QUEUE_SIZE]);

/// `TaskHandle_t`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(NonNull<c_void>);

/// `QueueHandle_t`, also used for semaphores and mutexes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct QueueHandle(NonNull<c_void>);

// SAFETY: kernel handles are plain identifiers, the kernel serializes
// every access to the objects behind them
unsafe impl Send for TaskHandle {}
unsafe impl Send for QueueHandle {}
unsafe impl Sync for QueueHandle {}

extern "C" {
    /// First word of the pointed TCB holds the saved top of stack
    pub(crate) static mut pxCurrentTCB: *mut c_void;

    fn xTaskCreateStatic(
        pxTaskCode: TaskEntry,
        pcName: *const c_char,
        ulStackDepth: u32,
        pvParameters: *mut c_void,
        uxPriority: UBaseType,
        puxStackBuffer: *mut StackWord,
        pxTaskBuffer: *mut StaticTask,
    ) -> *mut c_void;
    fn vTaskDelete(xTaskToDelete: *mut c_void);
    fn vTaskPrioritySet(xTask: *mut c_void, uxNewPriority: UBaseType);
    fn vTaskSuspend(xTaskToSuspend: *mut c_void);
    fn vTaskDelay(xTicksToDelay: TickType);
    fn xTaskIncrementTick() -> BaseType;
    fn vTaskSwitchContext();

    fn xQueueCreateMutexStatic(ucQueueType: u8, pxStaticQueue: *mut StaticQueue) -> *mut c_void;
    fn xQueueTakeMutexRecursive(xMutex: *mut c_void, xTicksToWait: TickType) -> BaseType;
    fn xQueueGiveMutexRecursive(xMutex: *mut c_void) -> BaseType;
    fn xQueueCreateCountingSemaphoreStatic(
        uxMaxCount: UBaseType,
        uxInitialCount: UBaseType,
        pxStaticQueue: *mut StaticQueue,
    ) -> *mut c_void;
    fn xQueueGenericCreateStatic(
        uxQueueLength: UBaseType,
        uxItemSize: UBaseType,
        pucQueueStorage: *mut u8,
        pxStaticQueue: *mut StaticQueue,
        ucQueueType: u8,
    ) -> *mut c_void;
    fn xQueueSemaphoreTake(xQueue: *mut c_void, xTicksToWait: TickType) -> BaseType;
    fn xQueueGenericSend(
        xQueue: *mut c_void,
        pvItemToQueue: *const c_void,
        xTicksToWait: TickType,
        xCopyPosition: BaseType,
    ) -> BaseType;
    fn xQueueGiveFromISR(xQueue: *mut c_void, pxHigherPriorityTaskWoken: *mut BaseType) -> BaseType;
    fn uxQueueMessagesWaiting(xQueue: *const c_void) -> UBaseType;
    fn vQueueDelete(xQueue: *mut c_void);

    fn vTaskStartScheduler();
}

/// FreeRTOS kernel
pub struct FreeRtos;

impl FreeRtos {
    /// Hand the processor to the kernel. Returns only if the kernel failed
    /// to create its idle task, in which case the core sleeps forever.
    pub fn start() -> ! {
        unsafe { vTaskStartScheduler() };
        crate::error!("kernel scheduler returned");
        loop {
            cortex_m::asm::wfi();
        }
    }
}

impl Kernel for FreeRtos {
    type TaskHandle = TaskHandle;
    type TaskBuffer = StaticTask;
    type SemHandle = QueueHandle;
    type SemBuffer = StaticQueue;

    const MAX_PRIORITIES: u32 = CFG_FREERTOS_MAX_PRIORITIES;

    unsafe fn task_create_static(
        entry: TaskEntry,
        name: &'static str,
        stack: *mut StackWord,
        depth: u32,
        arg: *mut c_void,
        priority: u32,
        tcb: *mut StaticTask,
    ) -> Option<TaskHandle> {
        let raw = unsafe {
            xTaskCreateStatic(entry, name.as_ptr().cast::<c_char>(), depth, arg, priority, stack, tcb)
        };
        NonNull::new(raw).map(TaskHandle)
    }

    unsafe fn task_delete(task: TaskHandle) {
        unsafe { vTaskDelete(task.0.as_ptr()) }
    }

    fn task_priority_set(task: TaskHandle, priority: u32) {
        unsafe { vTaskPrioritySet(task.0.as_ptr(), priority) }
    }

    fn task_suspend_current() {
        unsafe { vTaskSuspend(core::ptr::null_mut()) }
    }

    fn task_yield() {
        SCB::set_pendsv();
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    /// `vTaskDelay` reports nothing, a delay is always accepted
    fn task_delay(ticks: u32) -> bool {
        unsafe { vTaskDelay(ticks) };
        true
    }

    #[inline]
    fn tick_rate_hz() -> u32 {
        CFG_FREERTOS_TICK_RATE_HZ
    }

    fn increment_tick() -> bool {
        critical_section::with(|_| unsafe { xTaskIncrementTick() } != pdFALSE)
    }

    /// Outside PendSV the switch is deferred to it, only there is the task
    /// context saved
    fn switch_context() {
        if matches!(SCB::vect_active(), VectActive::Exception(Exception::PendSV)) {
            unsafe { vTaskSwitchContext() }
        } else {
            SCB::set_pendsv();
        }
    }

    unsafe fn recursive_mutex_create_static(buffer: *mut StaticQueue) -> Option<QueueHandle> {
        let raw = unsafe { xQueueCreateMutexStatic(queueQUEUE_TYPE_RECURSIVE_MUTEX, buffer) };
        NonNull::new(raw).map(QueueHandle)
    }

    fn recursive_mutex_take(mutex: QueueHandle) -> bool {
        unsafe { xQueueTakeMutexRecursive(mutex.0.as_ptr(), portMAX_DELAY) == pdTRUE }
    }

    fn recursive_mutex_give(mutex: QueueHandle) -> bool {
        unsafe { xQueueGiveMutexRecursive(mutex.0.as_ptr()) == pdTRUE }
    }

    unsafe fn counting_semaphore_create_static(
        maximum: u32,
        initial: u32,
        buffer: *mut StaticQueue,
    ) -> Option<QueueHandle> {
        let raw = unsafe { xQueueCreateCountingSemaphoreStatic(maximum, initial, buffer) };
        NonNull::new(raw).map(QueueHandle)
    }

    unsafe fn binary_semaphore_create_static(buffer: *mut StaticQueue) -> Option<QueueHandle> {
        let raw = unsafe {
            xQueueGenericCreateStatic(
                1,
                0,
                core::ptr::null_mut(),
                buffer,
                queueQUEUE_TYPE_BINARY_SEMAPHORE,
            )
        };
        NonNull::new(raw).map(QueueHandle)
    }

    fn semaphore_take(sem: QueueHandle) -> bool {
        unsafe { xQueueSemaphoreTake(sem.0.as_ptr(), portMAX_DELAY) == pdTRUE }
    }

    fn semaphore_give(sem: QueueHandle) -> bool {
        unsafe { xQueueGenericSend(sem.0.as_ptr(), core::ptr::null(), 0, queueSEND_TO_BACK) == pdTRUE }
    }

    fn semaphore_give_from_isr(sem: QueueHandle, woken: &mut bool) -> bool {
        let mut higher: BaseType = pdFALSE;
        let given = unsafe { xQueueGiveFromISR(sem.0.as_ptr(), &mut higher) == pdTRUE };
        *woken = higher != pdFALSE;
        given
    }

    fn semaphore_count(sem: QueueHandle) -> u32 {
        unsafe { uxQueueMessagesWaiting(sem.0.as_ptr()) }
    }

    unsafe fn semaphore_delete(sem: QueueHandle) {
        unsafe { vQueueDelete(sem.0.as_ptr()) }
    }
}
