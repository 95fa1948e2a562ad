//! Program launch and termination. `execute` hands the processor to a new
//! program and `halt` hands it back; neither returns control the way a
//! normal call does. The returned [`Transfer`] tells the entry glue which
//! one-way jump to perform.

use super::{context::Transfer, Slot};
use crate::{
    arch::{cpu, cpu::StackFrame, int},
    error::{Error, Result},
    fs,
    mem::{paging, phys},
    proc::{self, scheduler},
    syscall::SyscallError,
    terminal,
};
use common::{image::ImageHeader, layout};
use log::info;

/// Name buffer bound; a longer program name is cut here.
pub const NAME_BUF_LEN: usize = 32;

/// The reserved invocation that starts a terminal's root shell.
pub const SHELL_COMMAND: &[u8] = b"shell terminal";
const SHELL_NAME: &str = "shell";
const SHELL_ARGS: &[u8] = b"terminal";
const EXIT_NAME: &str = "exit";

/// Status a process reports when it self-halts through the `exit` command.
pub const EXIT_STATUS: u16 = 69;
/// Reserved status for processes torn down by a hardware fault.
pub const FAULT_STATUS: u16 = 256;

struct Command<'a> {
    name: &'a str,
    args: &'a [u8],
}

/// Splits a command at the first space: program name (truncated to the name
/// buffer) and the raw argument string.
fn parse_command(command: &[u8]) -> Result<Command> {
    if command.is_empty() {
        return Err(SyscallError::EmptyCommand.into());
    }

    let split = command.iter().position(|b| *b == b' ');
    let (name, args) = match split {
        Some(at) => (&command[..at], &command[at + 1..]),
        None => (command, &command[command.len()..]),
    };

    let name = &name[..name.len().min(NAME_BUF_LEN)];
    let name = core::str::from_utf8(name)
        .map_err(|_| Error::Failed("program name is not valid utf-8"))?;

    if args.len() > super::ARGS_BUF_LEN {
        return Err(SyscallError::CommandTooLong.into());
    }

    Ok(Command { name, args })
}

/// Reads a program's header through the file system and resolves its entry
/// point.
fn resolve_entry_point(name: &str) -> Result<u32> {
    let meta = fs::resolve(name)?;

    let mut header_bytes = [0; common::image::HEADER_LEN];
    fs::with(|f| f.read(meta.inode, 0, &mut header_bytes))?;

    let header = ImageHeader::parse(&header_bytes)?;
    Ok(header.entry_point())
}

/// Loads and launches a program, handing the processor over until the
/// matching `halt`. The eventual 0–255 status arrives at the caller's saved
/// call site through that halt's `Transfer::Resume`; an `Err` here is the
/// only way `execute` "returns" directly.
pub fn execute(command: &[u8]) -> Result<Transfer> {
    int::disable();

    let parsed = match parse_command(command) {
        Ok(parsed) => parsed,
        Err(err) => {
            int::enable();
            return Err(err);
        }
    };

    // `exit` is an immediate self-halt, no image load involved
    if parsed.name == EXIT_NAME {
        int::enable();
        return halt_with(EXIT_STATUS);
    }

    let shell_root = parsed.name == SHELL_NAME && parsed.args == SHELL_ARGS;

    let slot = match proc::allocate_slot() {
        Ok(slot) => slot,
        Err(err) => {
            int::enable();
            return Err(err);
        }
    };

    paging::bind_process(slot.get());

    match launch(parsed, slot, shell_root) {
        Ok(transfer) => {
            int::enable();
            Ok(transfer)
        }
        Err(err) => {
            // undo the claim and put the caller's region back
            if let Some(caller) = proc::current_slot() {
                paging::bind_process(caller.get());
            }
            proc::release_slot(slot);
            int::enable();
            Err(err)
        }
    }
}

fn launch(command: Command, slot: Slot, shell_root: bool) -> Result<Transfer> {
    let meta = fs::resolve(command.name)?;

    phys::clear_frame(slot.get());
    phys::with_frame(slot.get(), |frame| {
        fs::with(|f| f.load_image(command.name, &mut frame[layout::IMAGE_LOAD_OFFSET..]))
    })?;

    let entry = resolve_entry_point(command.name)?;

    let caller = proc::current_slot();
    let (parent, terminal) = if shell_root {
        (None, terminal::active())
    } else {
        let caller = caller.ok_or(super::ProcessError::NoCurrentProcess)?;
        let terminal = proc::with_record(caller, |r| r.terminal)?;
        (Some(caller), terminal)
    };

    // the caller's frame is what halt will restore
    let mut record = proc::new_record(slot, terminal, cpu::current_frame());
    record.set_args(command.args);
    record.shell_root = shell_root;
    record.parent = parent;
    proc::install(record);

    if let Some(parent) = parent {
        proc::with_record(parent, |r| {
            // one live child per record; a second concurrent launch is a
            // contract violation
            debug_assert!(r.child.is_none());
            r.child = Some(slot);
        })?;

        // the parent stops being a leaf until this child halts
        scheduler::remove_entry(parent);
    }
    scheduler::add_entry(slot)?;

    proc::set_current(slot);
    cpu::set_kernel_stack(slot.get());
    cpu::set_frame(StackFrame::at_kernel_stack_top(slot.get()));

    info!(
        "proc: Launched (name: {}, slot: {}, terminal: {}, inode: {})",
        command.name,
        slot.get(),
        terminal,
        meta.inode
    );

    Ok(Transfer::EnterUser { slot, entry })
}

/// Voluntary termination with an 8-bit status.
pub fn halt(status: u8) -> Result<Transfer> {
    halt_with(status as u16)
}

/// Teardown for a process killed by a hardware fault; same path as a
/// voluntary halt, reserved status.
pub fn fault_halt() -> Result<Transfer> {
    halt_with(FAULT_STATUS)
}

fn halt_with(status: u16) -> Result<Transfer> {
    int::disable();
    let result = teardown(status);
    int::enable();
    result
}

fn teardown(status: u16) -> Result<Transfer> {
    let slot = proc::current_slot().ok_or(super::ProcessError::NoCurrentProcess)?;
    let (shell_root, terminal, parent, entry_frame) =
        proc::with_record(slot, |r| (r.shell_root, r.terminal, r.parent, r.saved.entry))?;

    // a terminal's foreground session is never left without a shell: a
    // halting root shell turns into a fresh one on the same slot
    if shell_root {
        let entry = resolve_entry_point(SHELL_NAME)?;
        proc::with_record(slot, |r| {
            r.fd_table.close_all();
            r.fd_table.open_std();
            r.clear_args();
        })?;

        info!("proc: Respawned shell (slot: {}, terminal: {})", slot.get(), terminal);
        return Ok(Transfer::EnterUser { slot, entry });
    }

    let parent = parent.ok_or(Error::Failed("halting process has no parent"))?;

    // 2..7 explicitly, 0/1 as part of teardown
    proc::with_record(slot, |r| r.fd_table.close_all())?;
    proc::release_slot(slot);
    proc::with_record(parent, |r| r.child = None)?;

    cpu::set_kernel_stack(parent.get());
    paging::bind_process(parent.get());

    scheduler::remove_entry(slot);
    // the parent is a leaf again
    scheduler::add_entry(parent)?;

    proc::set_current(parent);
    cpu::set_frame(entry_frame);

    let status = if status == FAULT_STATUS {
        status
    } else {
        status & 0xff
    };

    info!("proc: Halted (slot: {}, status: {})", slot.get(), status);

    Ok(Transfer::Resume {
        slot: parent,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::file_desc::{DESC_TABLE_LEN, FIRST_USER_FD},
        test::{self, SHELL_ENTRY},
    };
    use alloc::vec::Vec;

    fn queued() -> Vec<usize> {
        let (entries, _) = scheduler::queued_slots();
        entries.iter().flatten().map(|s| s.get()).collect()
    }

    #[test]
    fn boot_launches_root_shell() {
        let _guard = test::lock();
        test::init_kernel();

        let transfer = crate::boot().unwrap();
        let slot = match transfer {
            Transfer::EnterUser { slot, entry } => {
                assert_eq!(entry, SHELL_ENTRY);
                slot
            }
            other => panic!("expected user entry, got {:?}", other),
        };

        assert_eq!(slot.get(), 0);
        assert_eq!(proc::current_slot(), Some(slot));
        assert_eq!(proc::slot_mask(), 0b000001);
        assert_eq!(queued(), [0]);
        assert_eq!(paging::bound_program_slot(), Some(0));

        let (shell_root, terminal) =
            proc::with_record(slot, |r| (r.shell_root, r.terminal)).unwrap();
        assert!(shell_root);
        assert_eq!(terminal, 0);
    }

    #[test]
    fn fresh_process_has_terminal_pair_open_only() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();

        proc::with_current(|r| {
            for fd in 0..2 {
                let desc = r.fd_table.get(fd).unwrap();
                assert!(desc.is_in_use());
                assert_eq!(desc.ops(), crate::fs::file_desc::FileOps::Terminal);
            }
            for fd in FIRST_USER_FD..DESC_TABLE_LEN {
                assert!(!r.fd_table.get(fd).unwrap().is_in_use());
            }
        })
        .unwrap();
    }

    #[test]
    fn seventh_concurrent_execute_fails_cleanly() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();

        // chain five children under the shell: slots 1..5
        for _ in 0..5 {
            execute(b"counter").unwrap();
        }
        assert_eq!(proc::slot_mask().count_ones(), 6);

        let mask_before = proc::slot_mask();
        let queue_before = queued();
        assert!(execute(b"counter").is_err());
        assert_eq!(proc::slot_mask(), mask_before);
        assert_eq!(queued(), queue_before);
    }

    #[test]
    fn halt_restores_parent_frame_bit_for_bit() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();

        for status in [0u8, 1, 127, 255] {
            let marker = StackFrame::new(0x007f_a000 + status as u32, 0x007f_b000);
            cpu::set_frame(marker);

            let child = match execute(b"counter").unwrap() {
                Transfer::EnterUser { slot, .. } => slot,
                other => panic!("expected user entry, got {:?}", other),
            };
            assert_ne!(cpu::current_frame(), marker);

            let transfer = halt(status).unwrap();
            assert_eq!(
                transfer,
                Transfer::Resume {
                    slot: Slot::new(0),
                    status: status as u16
                }
            );
            assert_eq!(cpu::current_frame(), marker);
            assert!(!proc::is_live(child));
        }
    }

    #[test]
    fn fault_teardown_uses_reserved_status() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();
        execute(b"counter").unwrap();

        let transfer = fault_halt().unwrap();
        assert_eq!(
            transfer,
            Transfer::Resume {
                slot: Slot::new(0),
                status: FAULT_STATUS
            }
        );
    }

    #[test]
    fn exit_command_is_reserved_self_halt() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();
        execute(b"counter").unwrap();

        // `exit` never reaches the loader; the child halts with the
        // reserved status
        let transfer = execute(b"exit").unwrap();
        assert_eq!(
            transfer,
            Transfer::Resume {
                slot: Slot::new(0),
                status: EXIT_STATUS
            }
        );
    }

    #[test]
    fn halting_root_shell_respawns_in_place() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();

        // dirty the shell's descriptor table first
        let fd = crate::syscall::open(b"frame0.txt");
        assert!(fd >= 0);

        let transfer = halt(0).unwrap();
        match transfer {
            Transfer::EnterUser { slot, entry } => {
                assert_eq!(slot.get(), 0);
                assert_eq!(entry, SHELL_ENTRY);
            }
            other => panic!("expected respawn, got {:?}", other),
        }

        assert!(crate::terminal::shell_launched(0));
        assert_eq!(proc::slot_mask(), 0b000001);
        proc::with_current(|r| {
            assert!(!r.fd_table.get(fd as usize).unwrap().is_in_use());
            assert!(r.args().is_empty());
        })
        .unwrap();
    }

    #[test]
    fn failed_load_releases_slot_and_rebinds_caller() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();

        let mask_before = proc::slot_mask();
        assert!(execute(b"no-such-program").is_err());
        assert_eq!(proc::slot_mask(), mask_before);
        assert_eq!(paging::bound_program_slot(), Some(0));
        assert_eq!(queued(), [0]);
    }

    #[test]
    fn empty_command_is_rejected() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();

        assert!(execute(b"").is_err());
        assert_eq!(proc::slot_mask(), 0b000001);
    }

    #[test]
    fn image_lands_verbatim_at_fixed_offset() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();

        let child = match execute(b"counter").unwrap() {
            Transfer::EnterUser { slot, .. } => slot,
            other => panic!("expected user entry, got {:?}", other),
        };

        let image = test::program_image(test::COUNTER_ENTRY, b"counter body");
        phys::with_frame(child.get(), |frame| {
            let at = layout::IMAGE_LOAD_OFFSET;
            assert_eq!(&frame[at..at + image.len()], &image[..]);
        });
    }

    #[test]
    fn child_inherits_terminal_and_links_back() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();

        let child = match execute(b"cat frame0.txt").unwrap() {
            Transfer::EnterUser { slot, .. } => slot,
            other => panic!("expected user entry, got {:?}", other),
        };

        let (parent, terminal, shell_root) =
            proc::with_record(child, |r| (r.parent, r.terminal, r.shell_root)).unwrap();
        assert_eq!(parent, Some(Slot::new(0)));
        assert_eq!(terminal, 0);
        assert!(!shell_root);

        assert_eq!(
            proc::with_record(Slot::new(0), |r| r.child).unwrap(),
            Some(child)
        );
        assert_eq!(proc::with_record(child, |r| r.args().to_vec()).unwrap(), b"frame0.txt");
    }

    #[test]
    fn run_queue_holds_exactly_the_leaves() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();

        // the shell stops being a leaf when its child launches
        execute(b"counter").unwrap();
        assert_eq!(queued(), [1]);

        // and becomes one again when the child halts
        halt(0).unwrap();
        assert_eq!(queued(), [0]);
    }

    #[test]
    fn oversized_arguments_fail_the_launch() {
        let _guard = test::lock();
        test::init_kernel();
        crate::boot().unwrap();

        let mut command = Vec::from(&b"counter "[..]);
        command.resize(command.len() + crate::proc::ARGS_BUF_LEN + 1, b'a');
        assert!(execute(&command).is_err());
        assert_eq!(proc::slot_mask(), 0b000001);
    }
}
