//! Host kernel and CPU doubles
//!
//! `HostKernel` runs every kernel task on its own std thread and implements
//! semaphores and recursive mutexes with `Mutex` + `Condvar`. Scheduler hooks
//! and delays are recorded per calling thread so tests in one binary do not
//! observe each other.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use rtsys::port::{CpuInterrupt, CpuProcessor, CpuTimer, IsrHandler, Kernel, TaskEntry};
use rtsys::{IsrContext, StackWord, Task};

pub const TICK_RATE_HZ: u32 = 1000;

/// Kernel with the default of 8 priorities
pub type Host = HostKernel<8>;

pub struct HostKernel<const PRIORITIES: u32>;

// ============ Per-thread instrumentation ============

thread_local! {
    static PRIORITY: Cell<u32> = const { Cell::new(0) };
    static DELAYS: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
    static DELAY_RESULT: Cell<bool> = const { Cell::new(true) };
    static TICK_SWITCH_DUE: Cell<bool> = const { Cell::new(false) };
    static TICKS: Cell<u32> = const { Cell::new(0) };
    static SWITCHES: Cell<u32> = const { Cell::new(0) };
    static FAIL_NEXT_TASK: Cell<bool> = const { Cell::new(false) };
    static STALL_NEXT_TASK: Cell<Option<&'static Gate>> = const { Cell::new(None) };
    static OPEN_ON_YIELD: Cell<Option<&'static Gate>> = const { Cell::new(None) };
    static FAIL_NEXT_OBJECT: Cell<bool> = const { Cell::new(false) };
    static LAST_TASK: Cell<usize> = const { Cell::new(usize::MAX) };
    static LAST_OBJECT: Cell<usize> = const { Cell::new(usize::MAX) };
}

/// Handle of the last task created by the calling thread
pub fn last_task() -> usize {
    LAST_TASK.with(Cell::get)
}

/// Handle of the last semaphore or mutex created by the calling thread
pub fn last_object() -> usize {
    LAST_OBJECT.with(Cell::get)
}

/// Priority the calling thread runs at as seen by the kernel
pub fn set_current_priority(priority: u32) {
    PRIORITY.with(|p| p.set(priority));
}

/// Delays requested by the calling thread, drained
pub fn take_delays() -> Vec<u32> {
    DELAYS.with(|d| std::mem::take(&mut *d.borrow_mut()))
}

pub fn set_delay_result(delayed: bool) {
    DELAY_RESULT.with(|r| r.set(delayed));
}

/// Value the next `increment_tick` calls report
pub fn set_tick_switch_due(due: bool) {
    TICK_SWITCH_DUE.with(|d| d.set(due));
}

pub fn ticks() -> u32 {
    TICKS.with(Cell::get)
}

pub fn switches() -> u32 {
    SWITCHES.with(Cell::get)
}

pub fn fail_next_task() {
    FAIL_NEXT_TASK.with(|f| f.set(true));
}

/// Block the next task creation of the calling thread on `gate`
pub fn stall_next_task(gate: &'static Gate) {
    STALL_NEXT_TASK.with(|s| s.set(Some(gate)));
}

/// Open `gate` on the next yield of the calling thread
pub fn open_on_yield(gate: &'static Gate) {
    OPEN_ON_YIELD.with(|o| o.set(Some(gate)));
}

pub fn fail_next_object() {
    FAIL_NEXT_OBJECT.with(|f| f.set(true));
}

// ============ Tasks ============

struct TaskRecord {
    priority: Arc<AtomicU32>,
    deleted: bool,
}

static TASKS: Mutex<Vec<TaskRecord>> = Mutex::new(Vec::new());

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Kernel priority of a task
pub fn task_priority(task: usize) -> u32 {
    lock(&TASKS)[task].priority.load(Ordering::SeqCst)
}

pub fn task_deleted(task: usize) -> bool {
    lock(&TASKS)[task].deleted
}

struct SendArg(*mut c_void);
unsafe impl Send for SendArg {}

// ============ Objects ============

struct RecursiveLock {
    state: Mutex<(Option<ThreadId>, u32)>,
    cond: Condvar,
}

struct Counter {
    state: Mutex<CounterState>,
    cond: Condvar,
    maximum: u32,
}

struct CounterState {
    count: u32,
    waiters: Vec<u32>,
}

enum Object {
    Lock(RecursiveLock),
    Counter(Counter),
}

static OBJECTS: Mutex<Vec<Option<Arc<Object>>>> = Mutex::new(Vec::new());

fn register(object: Object) -> Option<usize> {
    if FAIL_NEXT_OBJECT.with(|f| f.replace(false)) {
        return None;
    }
    let mut objects = lock(&OBJECTS);
    objects.push(Some(Arc::new(object)));
    let handle = objects.len() - 1;
    LAST_OBJECT.with(|l| l.set(handle));
    Some(handle)
}

fn object(handle: usize) -> Option<Arc<Object>> {
    lock(&OBJECTS).get(handle).cloned().flatten()
}

/// Whether a semaphore or mutex is still registered
pub fn object_alive(handle: usize) -> bool {
    object(handle).is_some()
}

fn counter(maximum: u32, initial: u32) -> Object {
    Object::Counter(Counter {
        state: Mutex::new(CounterState { count: initial, waiters: Vec::new() }),
        cond: Condvar::new(),
        maximum,
    })
}

fn give(counter: &Counter) -> bool {
    let mut state = lock(&counter.state);
    if state.count >= counter.maximum {
        return false;
    }
    state.count += 1;
    counter.cond.notify_one();
    true
}

impl<const PRIORITIES: u32> Kernel for HostKernel<PRIORITIES> {
    type TaskHandle = usize;
    type TaskBuffer = u64;
    type SemHandle = usize;
    type SemBuffer = u64;

    const MAX_PRIORITIES: u32 = PRIORITIES;

    unsafe fn task_create_static(
        entry: TaskEntry,
        _name: &'static str,
        stack: *mut StackWord,
        depth: u32,
        arg: *mut c_void,
        priority: u32,
        _tcb: *mut u64,
    ) -> Option<usize> {
        if let Some(gate) = STALL_NEXT_TASK.with(Cell::take) {
            gate.wait();
        }
        if FAIL_NEXT_TASK.with(|f| f.replace(false)) || stack.is_null() || depth == 0 {
            return None;
        }
        let shared = Arc::new(AtomicU32::new(priority));
        let index = {
            let mut tasks = lock(&TASKS);
            tasks.push(TaskRecord { priority: shared.clone(), deleted: false });
            tasks.len() - 1
        };
        LAST_TASK.with(|l| l.set(index));
        let arg = SendArg(arg);
        thread::spawn(move || {
            let arg = arg;
            PRIORITY.with(|p| p.set(shared.load(Ordering::SeqCst)));
            entry(arg.0);
        });
        Some(index)
    }

    unsafe fn task_delete(task: usize) {
        lock(&TASKS)[task].deleted = true;
    }

    fn task_priority_set(task: usize, priority: u32) {
        lock(&TASKS)[task].priority.store(priority, Ordering::SeqCst);
    }

    fn task_suspend_current() {
        loop {
            thread::park();
        }
    }

    fn task_yield() {
        if let Some(gate) = OPEN_ON_YIELD.with(Cell::take) {
            gate.open();
        }
        thread::yield_now();
    }

    fn task_delay(ticks: u32) -> bool {
        DELAYS.with(|d| d.borrow_mut().push(ticks));
        DELAY_RESULT.with(Cell::get)
    }

    fn tick_rate_hz() -> u32 {
        TICK_RATE_HZ
    }

    fn increment_tick() -> bool {
        TICKS.with(|t| t.set(t.get() + 1));
        TICK_SWITCH_DUE.with(Cell::get)
    }

    fn switch_context() {
        SWITCHES.with(|s| s.set(s.get() + 1));
    }

    unsafe fn recursive_mutex_create_static(buffer: *mut u64) -> Option<usize> {
        if buffer.is_null() {
            return None;
        }
        register(Object::Lock(RecursiveLock {
            state: Mutex::new((None, 0)),
            cond: Condvar::new(),
        }))
    }

    fn recursive_mutex_take(mutex: usize) -> bool {
        let Some(object) = object(mutex) else { return false };
        let Object::Lock(rec) = &*object else { return false };
        let me = thread::current().id();
        let mut state = lock(&rec.state);
        while matches!(state.0, Some(owner) if owner != me) {
            state = rec.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.0 = Some(me);
        state.1 += 1;
        true
    }

    fn recursive_mutex_give(mutex: usize) -> bool {
        let Some(object) = object(mutex) else { return false };
        let Object::Lock(rec) = &*object else { return false };
        let mut state = lock(&rec.state);
        if state.0 != Some(thread::current().id()) {
            return false;
        }
        state.1 -= 1;
        if state.1 == 0 {
            state.0 = None;
            rec.cond.notify_one();
        }
        true
    }

    unsafe fn counting_semaphore_create_static(
        maximum: u32,
        initial: u32,
        buffer: *mut u64,
    ) -> Option<usize> {
        if buffer.is_null() || initial > maximum {
            return None;
        }
        register(counter(maximum, initial))
    }

    unsafe fn binary_semaphore_create_static(buffer: *mut u64) -> Option<usize> {
        if buffer.is_null() {
            return None;
        }
        register(counter(1, 0))
    }

    fn semaphore_take(sem: usize) -> bool {
        let Some(object) = object(sem) else { return false };
        let Object::Counter(counter) = &*object else { return false };
        let priority = PRIORITY.with(Cell::get);
        let mut state = lock(&counter.state);
        state.waiters.push(priority);
        while state.count == 0 {
            state = counter.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        if let Some(pos) = state.waiters.iter().position(|&p| p == priority) {
            state.waiters.swap_remove(pos);
        }
        state.count -= 1;
        true
    }

    fn semaphore_give(sem: usize) -> bool {
        match object(sem).as_deref() {
            Some(Object::Counter(counter)) => give(counter),
            _ => false,
        }
    }

    fn semaphore_give_from_isr(sem: usize, woken: &mut bool) -> bool {
        let Some(object) = object(sem) else { return false };
        let Object::Counter(counter) = &*object else { return false };
        let interrupted = PRIORITY.with(Cell::get);
        *woken = lock(&counter.state).waiters.iter().any(|&p| p > interrupted);
        give(counter)
    }

    fn semaphore_count(sem: usize) -> u32 {
        match object(sem).as_deref() {
            Some(Object::Counter(counter)) => lock(&counter.state).count,
            _ => 0,
        }
    }

    unsafe fn semaphore_delete(sem: usize) {
        if let Some(slot) = lock(&OBJECTS).get_mut(sem) {
            *slot = None;
        }
    }
}

/// Number of tasks currently blocked on a semaphore
pub fn waiters(sem: usize) -> usize {
    match object(sem).as_deref() {
        Some(Object::Counter(counter)) => lock(&counter.state).waiters.len(),
        _ => 0,
    }
}

// ============ CPU double ============

pub struct MockTimer {
    pub source: u32,
    pub period_us: AtomicU64,
    pub running: AtomicBool,
    pub accept_period: AtomicBool,
}

impl CpuTimer for MockTimer {
    fn set_period(&self, us: u64) -> bool {
        if !self.accept_period.load(Ordering::SeqCst) {
            return false;
        }
        self.period_us.store(us, Ordering::SeqCst);
        true
    }

    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn interrupt_source(&self) -> u32 {
        self.source
    }
}

pub struct MockLine {
    pub source: u32,
    handler: IsrHandler,
    pub enabled: AtomicBool,
    pub jumps: AtomicU32,
}

impl CpuInterrupt for MockLine {
    fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    fn disable(&self) -> bool {
        self.enabled.swap(false, Ordering::SeqCst)
    }

    fn jump(&self) {
        self.jumps.fetch_add(1, Ordering::SeqCst);
    }
}

/// CPU handing out leaked timers and interrupt lines
pub struct MockCpu {
    pub timer_source: u32,
    pub refuse_timer: bool,
    pub refuse_period: bool,
    pub refuse_interrupt: bool,
    timers: Mutex<Vec<&'static MockTimer>>,
    lines: Mutex<Vec<&'static MockLine>>,
}

impl MockCpu {
    pub fn new() -> Self {
        MockCpu {
            timer_source: 30,
            refuse_timer: false,
            refuse_period: false,
            refuse_interrupt: false,
            timers: Mutex::new(Vec::new()),
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn timer(&self) -> &'static MockTimer {
        lock(&self.timers)[0]
    }

    pub fn line(&self, source: u32) -> &'static MockLine {
        let line = lock(&self.lines).iter().rev().find(|l| l.source == source).copied();
        line.unwrap_or_else(|| panic!("no line for source {source}"))
    }

    /// Raise `source` and run its handler if the line is enabled
    pub fn fire(&self, source: u32) -> bool {
        let line = self.line(source);
        if !line.enabled.load(Ordering::SeqCst) {
            return false;
        }
        let cx = unsafe { IsrContext::new_unchecked() };
        (line.handler)(&cx);
        true
    }
}

impl CpuProcessor for MockCpu {
    type Timer = MockTimer;
    type Interrupt = MockLine;

    fn create_timer(&self, _index: u32) -> Option<&'static MockTimer> {
        if self.refuse_timer {
            return None;
        }
        let timer: &'static MockTimer = Box::leak(Box::new(MockTimer {
            source: self.timer_source,
            period_us: AtomicU64::new(0),
            running: AtomicBool::new(false),
            accept_period: AtomicBool::new(!self.refuse_period),
        }));
        lock(&self.timers).push(timer);
        Some(timer)
    }

    fn create_interrupt(&self, handler: IsrHandler, source: u32) -> Option<&'static MockLine> {
        if self.refuse_interrupt {
            return None;
        }
        let line: &'static MockLine = Box::leak(Box::new(MockLine {
            source,
            handler,
            enabled: AtomicBool::new(false),
            jumps: AtomicU32::new(0),
        }));
        lock(&self.lines).push(line);
        Some(line)
    }
}

// ============ Helpers ============

/// One-shot latch tasks can block on
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
    waiting: AtomicU32,
}

impl Gate {
    pub const fn new() -> Self {
        Gate { open: Mutex::new(false), cond: Condvar::new(), waiting: AtomicU32::new(0) }
    }

    /// Number of callers that reached `wait`
    pub fn waiting(&self) -> u32 {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        *lock(&self.open) = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let mut open = lock(&self.open);
        while !*open {
            open = self.cond.wait(open).unwrap_or_else(|e| e.into_inner());
        }
    }
}

pub fn leak_gate() -> &'static Gate {
    Box::leak(Box::new(Gate::new()))
}

/// Task blocking on `gate` until it opens
pub fn gated_task(gate: &'static Gate) -> &'static dyn Task {
    leak_task(move || gate.wait())
}

/// Leak a closure as a task
pub fn leak_task<F: Fn() + Sync + 'static>(f: F) -> &'static dyn Task {
    Box::leak(Box::new(f))
}

/// Poll `cond` for up to two seconds
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(std::time::Duration::from_millis(1));
    }
    cond()
}

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialize tests that install a scheduler
pub fn serial() -> MutexGuard<'static, ()> {
    lock(&SERIAL)
}
