//! Producer-Consumer example with a binary semaphore over FreeRTOS

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::singleton;
use cortex_m_rt::entry;
use defmt::info;
use rtsys::port::cortex_m4::CortexM4;
use rtsys::port::freertos::FreeRtos;
use rtsys::sched::Semaphore;
use rtsys::{thread, Scheduler, SemaphoreResource, Task};

const CORE_CLOCK_HZ: u32 = 16_000_000;

static CPU: CortexM4 = CortexM4::new(CORE_CLOCK_HZ);

static PRODUCED: AtomicU32 = AtomicU32::new(0);
static CONSUMED: AtomicU32 = AtomicU32::new(0);

type Sched = Scheduler<FreeRtos, CortexM4>;

struct Producer {
    sem: &'static SemaphoreResource<FreeRtos>,
}

impl Task for Producer {
    fn start(&self) {
        loop {
            let n = PRODUCED.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = self.sem.release();
            info!("[P] produced #{}", n);
            let _ = thread::sleep::<FreeRtos>(200);
        }
    }
}

struct Consumer {
    sem: &'static SemaphoreResource<FreeRtos>,
}

impl Task for Consumer {
    fn start(&self) {
        loop {
            let _ = self.sem.acquire();
            let n = CONSUMED.fetch_add(1, Ordering::Relaxed) + 1;
            info!("[C] consumed #{}", n);
        }
    }
}

#[entry]
fn main() -> ! {
    info!("Producer-Consumer Demo");

    let sched: &'static Sched =
        singleton!(: Sched = Sched::new(&CPU).expect("scheduler init failed")).unwrap();
    let sem: &'static Semaphore<'static, FreeRtos> = singleton!(
        : Semaphore<'static, FreeRtos> = sched.create_binary_semaphore().expect("semaphore init failed")
    )
    .unwrap();

    let producer: &'static Producer = singleton!(: Producer = Producer { sem }).unwrap();
    let consumer: &'static Consumer = singleton!(: Consumer = Consumer { sem }).unwrap();

    let p = sched.create_thread(producer).unwrap();
    let c = sched.create_thread(consumer).unwrap();
    p.set_priority(3).unwrap();
    c.set_priority(5).unwrap();
    p.execute().unwrap();
    c.execute().unwrap();

    info!("Starting...");
    FreeRtos::start()
}
