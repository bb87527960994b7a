//! Cortex-M4 CPU driver
//!
//! SysTick is the only timer and PendSV the software triggered line. Bound
//! handlers are dispatched from the exception entries together with an
//! [`IsrContext`].
//!
//! With the `freertos` feature PendSV also saves and restores the task
//! context around its handler, using the FreeRTOS ARM_CM4F frame layout
//! for tasks that do not use the FPU.

use core::cell::Cell;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;
use critical_section::Mutex;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::critical::IsrContext;
#[cfg(feature = "freertos")]
use crate::port::freertos::pxCurrentTCB;
use crate::port::{CpuInterrupt, CpuProcessor, CpuTimer, IsrHandler};
use crate::time::US_PER_S;

/// Exception number of PendSV
pub const PENDSV_SOURCE: u32 = 14;
/// Exception number of SysTick
pub const SYSTICK_SOURCE: u32 = 15;

/// SysTick reload register is 24 bits wide
const SYST_RELOAD_MAX: u64 = 0x00FF_FFFF;

/// Kernel exceptions run at the lowest priority
const KERNEL_EXCEPTION_PRIORITY: u8 = 0xF0;

/// Cortex-M4 processor driven from the core clock
pub struct CortexM4 {
    core_clock_hz: u32,
}

impl CortexM4 {
    pub const fn new(core_clock_hz: u32) -> Self {
        CortexM4 { core_clock_hz }
    }
}

impl CpuProcessor for CortexM4 {
    type Timer = SysTickTimer;
    type Interrupt = ExceptionLine;

    fn create_timer(&self, index: u32) -> Option<&'static SysTickTimer> {
        if index != 0 {
            return None;
        }
        SYSTICK.clock_hz.store(self.core_clock_hz, Ordering::Release);
        Some(&SYSTICK)
    }

    fn create_interrupt(&self, handler: IsrHandler, source: u32) -> Option<&'static ExceptionLine> {
        match source {
            PENDSV_SOURCE => PENDSV_LINE.bind(handler),
            SYSTICK_SOURCE => SYSTICK_LINE.bind(handler),
            _ => None,
        }
    }
}

// ============ SysTick ============

/// The SysTick timer
pub struct SysTickTimer {
    clock_hz: AtomicU32,
    reload: AtomicU32,
}

static SYSTICK: SysTickTimer = SysTickTimer {
    clock_hz: AtomicU32::new(0),
    reload: AtomicU32::new(0),
};

impl CpuTimer for SysTickTimer {
    fn set_period(&self, us: u64) -> bool {
        let cycles = (self.clock_hz.load(Ordering::Acquire) as u64).saturating_mul(us) / US_PER_S;
        if cycles == 0 || cycles > SYST_RELOAD_MAX + 1 {
            return false;
        }
        self.reload.store((cycles - 1) as u32, Ordering::Release);
        true
    }

    fn start(&self) {
        let mut syst = unsafe { cortex_m::Peripherals::steal() }.SYST;
        syst.set_reload(self.reload.load(Ordering::Acquire));
        syst.clear_current();
        syst.set_clock_source(SystClkSource::Core);
        syst.enable_interrupt();
        syst.enable_counter();
    }

    fn stop(&self) {
        let mut syst = unsafe { cortex_m::Peripherals::steal() }.SYST;
        syst.disable_counter();
        syst.disable_interrupt();
    }

    #[inline]
    fn interrupt_source(&self) -> u32 {
        SYSTICK_SOURCE
    }
}

// ============ Exception lines ============

/// A system exception with one bound handler
pub struct ExceptionLine {
    source: u32,
    system: SystemHandler,
    handler: Mutex<Cell<Option<IsrHandler>>>,
    enabled: AtomicBool,
}

static PENDSV_LINE: ExceptionLine = ExceptionLine::new(PENDSV_SOURCE, SystemHandler::PendSV);
static SYSTICK_LINE: ExceptionLine = ExceptionLine::new(SYSTICK_SOURCE, SystemHandler::SysTick);

impl ExceptionLine {
    const fn new(source: u32, system: SystemHandler) -> Self {
        ExceptionLine {
            source,
            system,
            handler: Mutex::new(Cell::new(None)),
            enabled: AtomicBool::new(false),
        }
    }

    /// Rebinding is only allowed while the line is masked
    fn bind(&'static self, handler: IsrHandler) -> Option<&'static Self> {
        critical_section::with(|cs| {
            if self.enabled.load(Ordering::Acquire) {
                return None;
            }
            self.handler.borrow(cs).set(Some(handler));
            Some(self)
        })
    }

    #[inline]
    fn dispatch(&self) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        let handler = critical_section::with(|cs| self.handler.borrow(cs).get());
        if let Some(handler) = handler {
            // SAFETY: only called from the exception entries below
            let cx = unsafe { IsrContext::new_unchecked() };
            handler(&cx);
        }
    }
}

impl CpuInterrupt for ExceptionLine {
    fn enable(&self) {
        let mut scb = unsafe { cortex_m::Peripherals::steal() }.SCB;
        unsafe { scb.set_priority(self.system, KERNEL_EXCEPTION_PRIORITY) };
        self.enabled.store(true, Ordering::Release);
    }

    fn disable(&self) -> bool {
        self.enabled.swap(false, Ordering::AcqRel)
    }

    fn jump(&self) {
        match self.source {
            PENDSV_SOURCE => SCB::set_pendsv(),
            _ => SCB::set_pendst(),
        }
    }
}

// ============ Exception entries ============

#[cortex_m_rt::exception]
fn SysTick() {
    SYSTICK_LINE.dispatch();
}

#[cfg(not(feature = "freertos"))]
#[cortex_m_rt::exception]
fn PendSV() {
    PENDSV_LINE.dispatch();
}

#[cfg(feature = "freertos")]
#[no_mangle]
extern "C" fn pendsv_dispatch() {
    PENDSV_LINE.dispatch();
}

/// PendSV exception handler with full context switch
///
/// 1. Save R4-R11, LR to the current task stack and store its top in the TCB
/// 2. Run the bound handler, which may select another TCB
/// 3. Restore R4-R11, LR from the selected task stack
/// 4. Exception return
#[cfg(feature = "freertos")]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    core::arch::naked_asm!(
        "mrs r0, psp",
        "isb",

        "ldr r3, ={current_tcb}",
        "ldr r2, [r3]",

        "stmdb r0!, {{r4-r11, lr}}",
        "str r0, [r2]",

        "stmdb sp!, {{r0, r3}}",
        "cpsid i",
        "dsb",
        "isb",
        "bl {dispatch}",
        "cpsie i",
        "ldmia sp!, {{r0, r3}}",

        "ldr r1, [r3]",
        "ldr r0, [r1]",
        "ldmia r0!, {{r4-r11, lr}}",
        "msr psp, r0",
        "isb",

        "bx lr",

        current_tcb = sym pxCurrentTCB,
        dispatch = sym pendsv_dispatch,
    );
}
