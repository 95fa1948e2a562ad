//! Round-robin scheduling over the leaf processes. The timer interrupt
//! lands here once per tick; whatever happens, the tick re-arms the PIT
//! before control leaves the kernel.

use super::{context::Transfer, Slot, MAX_PROCESSES};
use crate::{
    arch::{cpu, int},
    device::pit,
    error::Result,
    mem::paging,
    proc,
};
use lazy_static::lazy_static;
use log::debug;
use spin::Mutex;

/// Ordered set of schedulable slots. `None` is the empty sentinel: it marks
/// unused capacity, never a real slot, and compaction keeps it out of the
/// interior. The queue holds exactly the live slots with no live child;
/// launch and halt move parents out and back in as they gain and lose their
/// child.
#[derive(Debug)]
pub(crate) struct RunQueue {
    entries: [Option<Slot>; MAX_PROCESSES],
    count: usize,
}

impl RunQueue {
    const fn new() -> Self {
        Self {
            entries: [None; MAX_PROCESSES],
            count: 0,
        }
    }

    fn add(&mut self, slot: Slot) -> Result<()> {
        if self.contains(slot) {
            return Ok(());
        }

        if self.count == MAX_PROCESSES {
            return Err(super::ProcessError::LimitReached.into());
        }

        self.entries[self.count] = Some(slot);
        self.count += 1;
        Ok(())
    }

    fn remove(&mut self, slot: Slot) {
        for entry in self.entries.iter_mut() {
            if *entry == Some(slot) {
                *entry = None;
                self.count -= 1;
                break;
            }
        }

        self.compact();
    }

    /// Shifts live entries to the front, preserving order, so sentinels only
    /// trail the queue.
    fn compact(&mut self) {
        let mut write = 0;
        for read in 0..MAX_PROCESSES {
            if let Some(slot) = self.entries[read].take() {
                self.entries[write] = Some(slot);
                write += 1;
            }
        }
    }

    fn head(&self) -> Option<Slot> {
        self.entries[0]
    }

    /// Moves the head to the tail of the live prefix.
    fn rotate(&mut self) {
        if self.count < 2 {
            return;
        }

        let head = self.entries[0];
        for i in 1..self.count {
            self.entries[i - 1] = self.entries[i];
        }
        self.entries[self.count - 1] = head;
    }

    fn contains(&self, slot: Slot) -> bool {
        self.entries.iter().any(|e| *e == Some(slot))
    }
}

lazy_static! {
    static ref RUN_QUEUE: Mutex<RunQueue> = Mutex::new(RunQueue::new());
}

pub fn init() {
    *RUN_QUEUE.lock() = RunQueue::new();
}

/// Appends a newly schedulable slot at the tail; it gets no preferential
/// turn.
pub fn add_entry(slot: Slot) -> Result<()> {
    int::free(|| RUN_QUEUE.lock().add(slot))
}

/// Drops a slot (terminated, or no longer a leaf) and compacts.
pub fn remove_entry(slot: Slot) {
    int::free(|| RUN_QUEUE.lock().remove(slot));
}

pub(crate) fn queued_slots() -> ([Option<Slot>; MAX_PROCESSES], usize) {
    let queue = RUN_QUEUE.lock();
    (queue.entries, queue.count)
}

/// Timer-tick entry point. Picks the next eligible leaf in strict FIFO
/// rotation and switches stacks to it; every exit path re-arms the PIT.
pub fn on_timer_tick() -> Transfer {
    int::free(tick)
}

fn tick() -> Transfer {
    // a lone process keeps the CPU; the tick only re-arms the timer
    if proc::live_count() <= 1 {
        pit::rearm();
        return Transfer::None;
    }

    let next = loop {
        let head = {
            let mut queue = RUN_QUEUE.lock();
            let head = queue.head();
            queue.rotate();
            head
        };

        let head = match head {
            Some(slot) => slot,
            None => {
                // queue exhausted this rotation
                pit::rearm();
                return Transfer::None;
            }
        };

        if Some(head) == proc::current_slot() {
            pit::rearm();
            return Transfer::None;
        }

        // leaf-only scheduling: a record with a live child sits out until
        // the child halts
        match proc::with_record(head, |r| r.child.is_some()) {
            Ok(true) => continue,
            Ok(false) => break head,
            Err(_) => {
                pit::rearm();
                return Transfer::None;
            }
        }
    };

    let current = match proc::current_slot() {
        Some(slot) => slot,
        None => {
            pit::rearm();
            return Transfer::None;
        }
    };

    switch_task(current, next)
}

/// The mid-tick stack switch: snapshot the outgoing frame, rebind the
/// address space, load the incoming frame. Execution resumes on the
/// incoming process's stack when the glue applies the returned transfer.
fn switch_task(from: Slot, to: Slot) -> Transfer {
    let outgoing_frame = cpu::current_frame();
    let _ = proc::with_record(from, |r| r.saved.run = outgoing_frame);

    paging::bind_process(to.get());

    let incoming_frame = match proc::with_record(to, |r| r.saved.run) {
        Ok(frame) => frame,
        Err(_) => {
            pit::rearm();
            return Transfer::None;
        }
    };

    proc::set_current(to);
    cpu::set_kernel_stack(to.get());
    cpu::set_frame(incoming_frame);
    pit::rearm();

    debug!("sched: Switched task (from: {}, to: {})", from.get(), to.get());

    Transfer::Switch { from, to }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: usize) -> Slot {
        Slot::new(n)
    }

    #[test]
    fn queue_rotates_fifo() {
        let mut queue = RunQueue::new();
        queue.add(slot(0)).unwrap();
        queue.add(slot(1)).unwrap();
        queue.add(slot(2)).unwrap();

        assert_eq!(queue.head(), Some(slot(0)));
        queue.rotate();
        assert_eq!(queue.head(), Some(slot(1)));
        queue.rotate();
        assert_eq!(queue.head(), Some(slot(2)));
        queue.rotate();
        assert_eq!(queue.head(), Some(slot(0)));
    }

    #[test]
    fn remove_compacts_interior_sentinels() {
        let mut queue = RunQueue::new();
        queue.add(slot(0)).unwrap();
        queue.add(slot(1)).unwrap();
        queue.add(slot(2)).unwrap();

        queue.remove(slot(1));
        assert_eq!(queue.entries[0], Some(slot(0)));
        assert_eq!(queue.entries[1], Some(slot(2)));
        assert_eq!(queue.entries[2], None);
        assert_eq!(queue.count, 2);
    }

    #[test]
    fn add_is_idempotent_per_slot() {
        let mut queue = RunQueue::new();
        queue.add(slot(4)).unwrap();
        queue.add(slot(4)).unwrap();
        assert_eq!(queue.count, 1);
    }

    #[test]
    fn rotation_skips_nothing_with_single_entry() {
        let mut queue = RunQueue::new();
        queue.add(slot(3)).unwrap();
        queue.rotate();
        assert_eq!(queue.head(), Some(slot(3)));
    }

    #[test]
    fn lone_process_only_rearms_the_timer() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();
        crate::boot().unwrap();

        let rearms = pit::rearm_count();
        assert_eq!(on_timer_tick(), Transfer::None);
        assert_eq!(proc::current_slot(), Some(slot(0)));
        assert_eq!(pit::rearm_count(), rearms + 1);
    }

    #[test]
    fn two_shells_ping_pong_fifo() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();
        crate::boot().unwrap();

        // entering terminal 1 spawns its root shell on slot 1
        crate::terminal::switch_to(1).unwrap();
        assert_eq!(proc::current_slot(), Some(slot(1)));

        assert_eq!(
            on_timer_tick(),
            Transfer::Switch {
                from: slot(1),
                to: slot(0)
            }
        );
        assert_eq!(proc::current_slot(), Some(slot(0)));
        assert_eq!(paging::bound_program_slot(), Some(0));

        assert_eq!(
            on_timer_tick(),
            Transfer::Switch {
                from: slot(0),
                to: slot(1)
            }
        );
        assert_eq!(proc::current_slot(), Some(slot(1)));
    }

    #[test]
    fn switch_round_trips_saved_frames() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();
        crate::boot().unwrap();
        crate::terminal::switch_to(1).unwrap();

        let frame_b = cpu::current_frame();
        assert_eq!(
            on_timer_tick(),
            Transfer::Switch {
                from: slot(1),
                to: slot(0)
            }
        );
        let frame_a = cpu::current_frame();

        // coming back must reload slot 1's frame exactly as snapshotted
        assert_eq!(
            on_timer_tick(),
            Transfer::Switch {
                from: slot(0),
                to: slot(1)
            }
        );
        assert_eq!(cpu::current_frame(), frame_b);

        assert_eq!(
            on_timer_tick(),
            Transfer::Switch {
                from: slot(1),
                to: slot(0)
            }
        );
        assert_eq!(cpu::current_frame(), frame_a);
    }

    #[test]
    fn parent_with_live_child_is_never_selected() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();
        crate::boot().unwrap();

        // slot 0 gains a child (slot 1), then terminal 1 spawns slot 2
        crate::proc::exec::execute(b"counter").unwrap();
        crate::terminal::switch_to(1).unwrap();

        for _ in 0..12 {
            match on_timer_tick() {
                Transfer::Switch { to, .. } => assert_ne!(to, slot(0)),
                Transfer::None => {}
                other => panic!("unexpected transfer {:?}", other),
            }
        }
    }

    #[test]
    fn non_leaf_queue_entry_is_skipped_and_rotated() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();
        crate::boot().unwrap();
        crate::proc::exec::execute(b"counter").unwrap();
        crate::terminal::switch_to(1).unwrap();

        // force the non-leaf parent into the queue; the pop loop must step
        // over it
        add_entry(slot(0)).unwrap();

        let mut switched_to = alloc::vec::Vec::new();
        for _ in 0..6 {
            if let Transfer::Switch { to, .. } = on_timer_tick() {
                switched_to.push(to.get());
            }
        }
        assert!(!switched_to.is_empty());
        assert!(switched_to.iter().all(|s| *s != 0));

        remove_entry(slot(0));
    }
}
