//! Modeled CPU execution state: the kernel-mode stack register the hardware
//! task segment would hold, and the stack-frame pair of whatever control flow
//! is currently running. The launch/halt/scheduler paths swap these values;
//! the entry glue performs the actual register loads.

use common::layout;
use lazy_static::lazy_static;
use spin::Mutex;

/// A stack-pointer/base-pointer snapshot. Two of these per process record:
/// one frozen at user-mode entry, one refreshed at every preemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackFrame {
    pub sp: u32,
    pub bp: u32,
}

impl StackFrame {
    pub const fn new(sp: u32, bp: u32) -> Self {
        Self { sp, bp }
    }

    /// Frame a process starts from: an empty kernel stack for its slot.
    pub const fn at_kernel_stack_top(slot: usize) -> Self {
        let top = layout::kernel_stack_top(slot);
        Self { sp: top, bp: top }
    }
}

#[derive(Debug)]
struct CpuState {
    kernel_stack_top: u32,
    frame: StackFrame,
}

impl CpuState {
    const fn new() -> Self {
        let boot_top = layout::KERNEL_MEM_CEILING - 4;
        Self {
            kernel_stack_top: boot_top,
            frame: StackFrame::new(boot_top, boot_top),
        }
    }
}

lazy_static! {
    static ref CPU: Mutex<CpuState> = Mutex::new(CpuState::new());
}

pub fn init() {
    *CPU.lock() = CpuState::new();
}

pub fn current_frame() -> StackFrame {
    CPU.lock().frame
}

pub fn set_frame(frame: StackFrame) {
    CPU.lock().frame = frame;
}

/// Reprograms the kernel-mode stack register for a slot (tss.esp0 analog).
pub fn set_kernel_stack(slot: usize) {
    CPU.lock().kernel_stack_top = layout::kernel_stack_top(slot);
}

pub fn kernel_stack_top() -> u32 {
    CPU.lock().kernel_stack_top
}
