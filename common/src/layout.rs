//! Fixed physical/virtual memory layout of the machine. The kernel and user
//! programs must agree on every value here; nothing is negotiated at runtime.

/// First address past the kernel's reserved low memory. Kernel-mode stacks
/// grow downward from here.
pub const KERNEL_MEM_CEILING: u32 = 0x0080_0000;

/// Size of the region reserved per process slot below the kernel ceiling;
/// holds that slot's kernel-mode stack.
pub const KERNEL_STACK_REGION: u32 = 0x8000;

/// Base of the single user-space program window (128 MiB).
pub const USER_WINDOW_BASE: u32 = 0x0800_0000;

/// First address past the user-space program window (132 MiB).
pub const USER_WINDOW_LIMIT: u32 = 0x0840_0000;

/// Size of one program region (one 4 MiB directory entry).
pub const PROGRAM_REGION_SIZE: u32 = 0x0040_0000;

/// Virtual address every program image is loaded at, verbatim.
pub const IMAGE_LOAD_ADDR: u32 = 0x0804_8000;

/// Offset of `IMAGE_LOAD_ADDR` within its 4 MiB program region.
pub const IMAGE_LOAD_OFFSET: usize = (IMAGE_LOAD_ADDR - USER_WINDOW_BASE) as usize;

/// One text-mode video page.
pub const VIDEO_PAGE_SIZE: usize = 0x1000;

/// Physical address of the visible video page.
pub const VIDEO_MEM_PHYS: u32 = 0x000B_8000;

/// Physical addresses of the three per-terminal private backing pages.
pub const VIDEO_BACKING_PHYS: [u32; 3] = [0x000B_9000, 0x000B_A000, 0x000B_B000];

/// Base of the user-visible video alias pages, one page per terminal,
/// directly above the program window.
pub const VIDEO_ALIAS_BASE: u32 = USER_WINDOW_LIMIT;

/// Kernel-mode stack top for a process slot. The 4-byte bias keeps the first
/// push inside the slot's own region.
pub const fn kernel_stack_top(slot: usize) -> u32 {
    KERNEL_MEM_CEILING - KERNEL_STACK_REGION * (slot as u32 + 1) - 4
}

/// User-visible video alias address for a terminal.
pub const fn video_alias_addr(terminal: usize) -> u32 {
    VIDEO_ALIAS_BASE + (terminal * VIDEO_PAGE_SIZE) as u32
}
