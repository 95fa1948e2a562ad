//! Process control store: a fixed arena of control records keyed by slot,
//! the 6-bit allocation mask, and the index of the currently executing
//! process. A record is valid exactly while its mask bit is set.

use crate::{
    arch::cpu::StackFrame,
    error::Result,
    fs::file_desc::DescriptorTable,
    proc::context::SavedContext,
};
use lazy_static::lazy_static;
use spin::Mutex;

pub mod context;
pub mod exec;
pub mod scheduler;

pub const MAX_PROCESSES: usize = 6;
pub const ARGS_BUF_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    LimitReached,
    InvalidSlot(usize),
    NoCurrentProcess,
}

/// One of the six fixed process identities. Records, kernel stacks and
/// address-space bindings are all keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

impl Slot {
    pub(crate) const fn new(index: usize) -> Self {
        debug_assert!(index < MAX_PROCESSES);
        Self(index)
    }

    pub const fn get(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessControlBlock {
    slot: Slot,
    pub saved: SavedContext,
    pub fd_table: DescriptorTable,
    args: [u8; ARGS_BUF_LEN],
    args_len: usize,
    /// Terminal the process belongs to; never changes for its lifetime.
    pub terminal: usize,
    /// Launched as a terminal's root shell: no parent, respawned on halt.
    pub shell_root: bool,
    pub parent: Option<Slot>,
    pub child: Option<Slot>,
}

impl ProcessControlBlock {
    fn new(slot: Slot, terminal: usize, launch_frame: StackFrame) -> Self {
        let mut fd_table = DescriptorTable::new();
        fd_table.open_std();

        Self {
            slot,
            saved: SavedContext::at_launch(launch_frame),
            fd_table,
            args: [0; ARGS_BUF_LEN],
            args_len: 0,
            terminal,
            shell_root: false,
            parent: None,
            child: None,
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn args(&self) -> &[u8] {
        &self.args[..self.args_len]
    }

    pub fn set_args(&mut self, args: &[u8]) {
        debug_assert!(args.len() <= ARGS_BUF_LEN);
        self.args[..args.len()].copy_from_slice(args);
        self.args_len = args.len();
    }

    pub fn clear_args(&mut self) {
        self.args = [0; ARGS_BUF_LEN];
        self.args_len = 0;
    }
}

pub struct ProcessTable {
    records: [Option<ProcessControlBlock>; MAX_PROCESSES],
    mask: u8,
    current: Option<Slot>,
}

impl ProcessTable {
    const fn new() -> Self {
        Self {
            records: [None; MAX_PROCESSES],
            mask: 0,
            current: None,
        }
    }

    /// Scans for a clear mask bit, lowest first, and claims it. The mask is
    /// untouched when every slot is taken.
    fn allocate_slot(&mut self) -> Result<Slot> {
        for index in 0..MAX_PROCESSES {
            let bit = 1 << index;
            if self.mask & bit == 0 {
                self.mask |= bit;
                return Ok(Slot::new(index));
            }
        }

        Err(ProcessError::LimitReached.into())
    }

    fn release_slot(&mut self, slot: Slot) {
        // the child link must have been cleared before the record goes back
        // to the allocator
        debug_assert!(self
            .records[slot.get()]
            .map(|r| r.child.is_none())
            .unwrap_or(true));

        self.mask &= !(1 << slot.get());
        self.records[slot.get()] = None;
    }

    fn is_live(&self, slot: Slot) -> bool {
        self.mask & (1 << slot.get()) != 0
    }

    fn live_count(&self) -> usize {
        self.mask.count_ones() as usize
    }

    fn record(&self, slot: Slot) -> Result<&ProcessControlBlock> {
        if !self.is_live(slot) {
            return Err(ProcessError::InvalidSlot(slot.get()).into());
        }

        self.records[slot.get()]
            .as_ref()
            .ok_or(ProcessError::InvalidSlot(slot.get()).into())
    }

    fn record_mut(&mut self, slot: Slot) -> Result<&mut ProcessControlBlock> {
        if !self.is_live(slot) {
            return Err(ProcessError::InvalidSlot(slot.get()).into());
        }

        self.records[slot.get()]
            .as_mut()
            .ok_or(ProcessError::InvalidSlot(slot.get()).into())
    }

    fn install(&mut self, record: ProcessControlBlock) {
        debug_assert!(self.is_live(record.slot));
        self.records[record.slot.get()] = Some(record);
    }
}

lazy_static! {
    static ref PROCESS_TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable::new());
}

pub fn init() {
    *PROCESS_TABLE.lock() = ProcessTable::new();
}

pub fn allocate_slot() -> Result<Slot> {
    PROCESS_TABLE.lock().allocate_slot()
}

pub fn release_slot(slot: Slot) {
    PROCESS_TABLE.lock().release_slot(slot);
}

pub fn install(record: ProcessControlBlock) {
    PROCESS_TABLE.lock().install(record);
}

pub fn new_record(slot: Slot, terminal: usize, launch_frame: StackFrame) -> ProcessControlBlock {
    ProcessControlBlock::new(slot, terminal, launch_frame)
}

pub fn is_live(slot: Slot) -> bool {
    PROCESS_TABLE.lock().is_live(slot)
}

pub fn live_count() -> usize {
    PROCESS_TABLE.lock().live_count()
}

pub fn slot_mask() -> u8 {
    PROCESS_TABLE.lock().mask
}

pub fn current_slot() -> Option<Slot> {
    PROCESS_TABLE.lock().current
}

pub fn set_current(slot: Slot) {
    PROCESS_TABLE.lock().current = Some(slot);
}

/// Runs `f` on `slot`'s record; fails when the slot is not live.
pub fn with_record<R>(slot: Slot, f: impl FnOnce(&mut ProcessControlBlock) -> R) -> Result<R> {
    let mut table = PROCESS_TABLE.lock();
    Ok(f(table.record_mut(slot)?))
}

/// Runs `f` on the currently executing process's record.
pub fn with_current<R>(f: impl FnOnce(&mut ProcessControlBlock) -> R) -> Result<R> {
    let mut table = PROCESS_TABLE.lock();
    let slot = table.current.ok_or(ProcessError::NoCurrentProcess)?;
    Ok(f(table.record_mut(slot)?))
}
