//! Page-mapping tables for the single user program region and the three
//! terminal video aliases. Every rewrite applies immediately: the generation
//! counter stands in for the page-base register reload the entry glue
//! performs, and a bumped generation means stale translations are gone.

use bitflags::bitflags;
use common::layout::{
    PROGRAM_REGION_SIZE, USER_WINDOW_BASE, VIDEO_BACKING_PHYS, VIDEO_MEM_PHYS, VIDEO_PAGE_SIZE,
};
use lazy_static::lazy_static;
use spin::Mutex;

use crate::terminal::TERMINAL_COUNT;

const DIR_ENTRY_LEN: usize = 1024;
const PAGE_SHIFT: usize = 12;
const DIR_SHIFT: usize = 22;

/// Directory index of the 4 MiB user program region (128 MiB).
const PROGRAM_DIR_IDX: usize = (USER_WINDOW_BASE >> DIR_SHIFT) as usize;
/// Directory index of the user video alias pages (132 MiB).
const VIDEO_DIR_IDX: usize = PROGRAM_DIR_IDX + 1;
/// Physical 4 MiB slot of the kernel image.
const KERNEL_DIR_IDX: usize = 1;
/// Index of the visible video page within the low identity table.
const VIDEO_PAGE_IDX: usize = (VIDEO_MEM_PHYS as usize) >> PAGE_SHIFT;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        const PRESENT = 1 << 0;
        const READ_WRITE = 1 << 1;
        const USER = 1 << 2;
        const PAGE_4MB = 1 << 7;
        const GLOBAL = 1 << 8;
    }
}

impl EntryFlags {
    const VID: Self = Self::PRESENT.union(Self::READ_WRITE).union(Self::USER);
}

#[derive(Debug)]
struct PageMapper {
    directory: [u32; DIR_ENTRY_LEN],
    low_table: [u32; DIR_ENTRY_LEN],
    video_table: [u32; DIR_ENTRY_LEN],
    generation: u64,
}

impl PageMapper {
    const fn new() -> Self {
        Self {
            directory: [0; DIR_ENTRY_LEN],
            low_table: [0; DIR_ENTRY_LEN],
            video_table: [0; DIR_ENTRY_LEN],
            generation: 0,
        }
    }

    fn init(&mut self) {
        self.directory = [0; DIR_ENTRY_LEN];

        // identity table for the first 4 MiB; only the video page is
        // user-visible
        for i in 0..DIR_ENTRY_LEN {
            self.low_table[i] = ((i << PAGE_SHIFT) as u32) | EntryFlags::READ_WRITE.bits();
        }
        self.low_table[VIDEO_PAGE_IDX] |= (EntryFlags::PRESENT | EntryFlags::USER).bits();

        // the hosted model has no physical address for its own tables, so
        // directory links carry flags only
        self.directory[0] =
            (EntryFlags::PRESENT | EntryFlags::READ_WRITE | EntryFlags::USER).bits();
        self.directory[KERNEL_DIR_IDX] = ((KERNEL_DIR_IDX as u32) << DIR_SHIFT)
            | (EntryFlags::PRESENT
                | EntryFlags::READ_WRITE
                | EntryFlags::PAGE_4MB
                | EntryFlags::GLOBAL)
                .bits();
        self.directory[VIDEO_DIR_IDX] =
            (EntryFlags::PRESENT | EntryFlags::READ_WRITE | EntryFlags::USER).bits();

        // terminal 0 is active at power-on; its alias starts on the visible
        // page
        self.reset_video_aliases();
        self.video_table[0] = VIDEO_MEM_PHYS | EntryFlags::VID.bits();
        self.apply();
    }

    fn bind_process(&mut self, slot: usize) {
        let phys_region = (slot as u32 + 2) << DIR_SHIFT;
        self.directory[PROGRAM_DIR_IDX] = phys_region
            | (EntryFlags::PRESENT
                | EntryFlags::READ_WRITE
                | EntryFlags::USER
                | EntryFlags::PAGE_4MB)
                .bits();
        self.apply();
    }

    fn bind_terminal_video(&mut self, terminal: usize) {
        self.video_table[terminal] = VIDEO_MEM_PHYS | EntryFlags::VID.bits();
        self.apply();
    }

    fn reset_video_aliases(&mut self) {
        for (t, phys) in VIDEO_BACKING_PHYS.iter().enumerate() {
            self.video_table[t] = phys | EntryFlags::VID.bits();
        }
    }

    fn apply(&mut self) {
        self.generation += 1;
    }

    fn bound_program_slot(&self) -> Option<usize> {
        let entry = self.directory[PROGRAM_DIR_IDX];
        if entry & EntryFlags::PRESENT.bits() == 0 {
            return None;
        }

        Some((entry >> DIR_SHIFT) as usize - 2)
    }

    fn visible_terminal(&self) -> Option<usize> {
        (0..TERMINAL_COUNT)
            .find(|t| self.video_table[*t] & !0xfff == VIDEO_MEM_PHYS)
    }
}

lazy_static! {
    static ref PAGE_MAPPER: Mutex<PageMapper> = Mutex::new(PageMapper::new());
}

pub fn init() {
    PAGE_MAPPER.lock().init();
}

/// Rewrites the user program region to the physical memory reserved for
/// `slot` and applies the mapping. `slot` is caller-validated.
pub fn bind_process(slot: usize) {
    debug_assert!(slot < crate::proc::MAX_PROCESSES);
    PAGE_MAPPER.lock().bind_process(slot);
}

/// Makes `terminal`'s video alias point at the visible page. The other
/// aliases keep their private backing pages.
pub fn bind_terminal_video(terminal: usize) {
    debug_assert!(terminal < TERMINAL_COUNT);
    PAGE_MAPPER.lock().bind_terminal_video(terminal);
}

/// Restores all three video aliases to their private backing pages.
pub fn unbind_terminal_video() {
    let mut mapper = PAGE_MAPPER.lock();
    mapper.reset_video_aliases();
    mapper.apply();
}

pub fn bound_program_slot() -> Option<usize> {
    PAGE_MAPPER.lock().bound_program_slot()
}

/// Terminal whose alias currently resolves to the visible page, if any.
pub fn visible_terminal() -> Option<usize> {
    PAGE_MAPPER.lock().visible_terminal()
}

pub fn apply_generation() -> u64 {
    PAGE_MAPPER.lock().generation
}

/// Size of the user program region, re-exported for the loader.
pub const PROGRAM_REGION_LEN: usize = PROGRAM_REGION_SIZE as usize;

/// Size of one video page, re-exported for the terminal glue.
pub const VIDEO_PAGE_LEN: usize = VIDEO_PAGE_SIZE;
