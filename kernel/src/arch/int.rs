//! Interrupt-flag state. The machine has one hardware thread of control, so
//! masking the timer and keyboard is the only synchronization primitive the
//! core uses; every read-then-write of shared state runs inside `free`.

use core::sync::atomic::{AtomicBool, Ordering};

static INT_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn enable() {
    INT_ENABLED.store(true, Ordering::SeqCst);
}

pub fn disable() {
    INT_ENABLED.store(false, Ordering::SeqCst);
}

pub fn are_enabled() -> bool {
    INT_ENABLED.load(Ordering::SeqCst)
}

/// Runs `f` with interrupts masked, restoring the previous flag afterwards.
pub fn free<R>(f: impl FnOnce() -> R) -> R {
    let was_enabled = are_enabled();
    disable();

    let ret = f();

    if was_enabled {
        enable();
    }

    ret
}
