//! Process-management core of a teaching kernel: process records and their
//! lifecycle, program launch/termination, per-process address spaces,
//! round-robin scheduling over timer ticks, and the three virtual terminals
//! each owning a foreground shell.
//!
//! The surrounding kernel (boot, interrupt vectors, device drivers, the
//! on-disk file system, text rendering) stays outside; it registers a
//! [`fs::FileSystem`], forwards interrupts and system calls in, and applies
//! the control [`Transfer`]s this core hands back.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod device;
pub mod error;
pub mod fs;
pub mod mem;
pub mod proc;
pub mod syscall;
pub mod terminal;
pub mod util;


use alloc::boxed::Box;
use log::info;

use crate::error::Result;
pub use crate::proc::context::Transfer;

/// Brings every subsystem to its power-on state and registers the file
/// system collaborator. Interrupts stay masked until the entry glue is
/// ready to take them.
pub fn init(filesystem: Box<dyn fs::FileSystem>) {
    arch::int::disable();
    arch::cpu::init();
    mem::init();
    proc::init();
    proc::scheduler::init();
    terminal::init();
    device::pit::init();
    fs::register(filesystem);

    info!("kernel: Initialized process core");
}

/// Launches the first terminal's root shell. The returned transfer is the
/// jump into user mode that starts the system running.
pub fn boot() -> Result<Transfer> {
    terminal::mark_shell_launched(0);
    proc::exec::execute(proc::exec::SHELL_COMMAND)
}
