//! Backing storage for the per-slot program regions. Each slot owns one
//! 4 MiB frame; the frame is materialized the first time its slot is used
//! and zeroed again when the slot is re-used for a new program image.

use alloc::{vec, vec::Vec};
use lazy_static::lazy_static;
use spin::Mutex;

use crate::{mem::paging::PROGRAM_REGION_LEN, proc::MAX_PROCESSES};

struct ProgramFrames {
    frames: [Option<Vec<u8>>; MAX_PROCESSES],
}

impl ProgramFrames {
    const fn new() -> Self {
        Self {
            frames: [None, None, None, None, None, None],
        }
    }

    fn frame_mut(&mut self, slot: usize) -> &mut [u8] {
        self.frames[slot].get_or_insert_with(|| vec![0; PROGRAM_REGION_LEN])
    }
}

lazy_static! {
    static ref PROGRAM_FRAMES: Mutex<ProgramFrames> = Mutex::new(ProgramFrames::new());
}

pub fn init() {
    *PROGRAM_FRAMES.lock() = ProgramFrames::new();
}

/// Zeroes `slot`'s frame ahead of a fresh image load.
pub fn clear_frame(slot: usize) {
    debug_assert!(slot < MAX_PROCESSES);
    PROGRAM_FRAMES.lock().frame_mut(slot).fill(0);
}

/// Runs `f` on `slot`'s frame bytes.
pub fn with_frame<R>(slot: usize, f: impl FnOnce(&mut [u8]) -> R) -> R {
    debug_assert!(slot < MAX_PROCESSES);
    f(PROGRAM_FRAMES.lock().frame_mut(slot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::layout::IMAGE_LOAD_OFFSET;

    #[test]
    fn frames_are_independent() {
        let _guard = crate::test::lock();
        init();

        with_frame(0, |frame| frame[IMAGE_LOAD_OFFSET] = 0x7f);
        with_frame(1, |frame| assert_eq!(frame[IMAGE_LOAD_OFFSET], 0));
        with_frame(0, |frame| assert_eq!(frame[IMAGE_LOAD_OFFSET], 0x7f));

        clear_frame(0);
        with_frame(0, |frame| assert_eq!(frame[IMAGE_LOAD_OFFSET], 0));
    }
}
