//! Programmable interval timer. The scheduler reloads the divisor on every
//! tick; this model records the programming the entry glue pushes out the
//! command/channel ports.

use lazy_static::lazy_static;
use spin::Mutex;

const CHANNEL0: u16 = 0x40;
const CMD_REG: u16 = 0x43;
const PIT_MODE: u8 = 0x30;
const FREQ_DIVISOR: u16 = 59659;

#[derive(Debug, Clone, Copy)]
struct PortWrite {
    port: u16,
    value: u8,
}

#[derive(Debug)]
struct Pit {
    last_write: Option<PortWrite>,
    divisor: Option<u16>,
    rearm_count: u64,
}

impl Pit {
    const fn new() -> Self {
        Self {
            last_write: None,
            divisor: None,
            rearm_count: 0,
        }
    }

    fn outb(&mut self, value: u8, port: u16) {
        self.last_write = Some(PortWrite { port, value });
    }

    fn reload_divisor(&mut self) {
        self.outb((FREQ_DIVISOR & 0xff) as u8, CHANNEL0);
        self.outb((FREQ_DIVISOR >> 8) as u8, CHANNEL0);
        self.divisor = Some(FREQ_DIVISOR);
    }
}

lazy_static! {
    static ref PIT: Mutex<Pit> = Mutex::new(Pit::new());
}

pub fn init() {
    let mut pit = PIT.lock();
    *pit = Pit::new();
    pit.outb(PIT_MODE, CMD_REG);
    pit.reload_divisor();
}

/// Reinitializes channel 0 with the fixed divisor; called once per
/// scheduler tick.
pub fn rearm() {
    let mut pit = PIT.lock();
    pit.reload_divisor();
    pit.rearm_count += 1;
}

pub fn rearm_count() -> u64 {
    PIT.lock().rearm_count
}
