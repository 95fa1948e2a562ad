//! The surface the system-call entry glue dispatches into. Data calls
//! return the classic value-or-minus-one; `execute` and `halt` are
//! re-exported from [`crate::proc::exec`] because they yield a control
//! [`Transfer`] instead of returning to their caller.
//!
//! The glue owns user-memory copies: it brings buffers into kernel space,
//! calls these functions, and writes results back through the user pointers.

use crate::{
    arch::addr::VirtualAddress,
    error::Result,
    fs::{
        self,
        file_desc::{FileOps, DESC_TABLE_LEN, FD_STDIN, FD_STDOUT},
    },
    proc, terminal,
};
use common::layout;
use log::warn;

pub use crate::proc::exec::{execute, fault_halt, halt};

pub const SYS_HALT: u64 = 1;
pub const SYS_EXECUTE: u64 = 2;
pub const SYS_READ: u64 = 3;
pub const SYS_WRITE: u64 = 4;
pub const SYS_OPEN: u64 = 5;
pub const SYS_CLOSE: u64 = 6;
pub const SYS_GETARGS: u64 = 7;
pub const SYS_VIDMAP: u64 = 8;
pub const SYS_SET_HANDLER: u64 = 9;
pub const SYS_SIGRETURN: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    BadDescriptor,
    NoFreeDescriptor,
    WrongDirection,
    ArgsDontFit,
    OutsideUserWindow,
    EmptyCommand,
    CommandTooLong,
}

const RET_FAILURE: i32 = -1;

fn as_retval(result: Result<i32>) -> i32 {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!("syscall: Failed (err: {:?})", err);
            RET_FAILURE
        }
    }
}

/// Looks up the calling process's descriptor `fd`, runs the dispatch, and
/// stores the updated cursor back. The read/write split only differs in the
/// reserved-descriptor direction rule: 0 never writes, 1 never reads.
fn read_inner(fd: usize, buf: &mut [u8]) -> Result<i32> {
    if fd >= DESC_TABLE_LEN {
        return Err(SyscallError::BadDescriptor.into());
    }
    if fd == FD_STDOUT {
        return Err(SyscallError::WrongDirection.into());
    }

    let (desc, terminal) = proc::with_current(|r| (r.fd_table.get(fd), r.terminal))?;
    let mut desc = desc.ok_or(SyscallError::BadDescriptor)?;
    if !desc.is_in_use() {
        return Err(SyscallError::BadDescriptor.into());
    }

    let read = desc.read(terminal, buf)?;
    proc::with_current(|r| r.fd_table.set(fd, desc))?;

    Ok(read as i32)
}

pub fn read(fd: usize, buf: &mut [u8]) -> i32 {
    as_retval(read_inner(fd, buf))
}

fn write_inner(fd: usize, buf: &[u8]) -> Result<i32> {
    if fd >= DESC_TABLE_LEN {
        return Err(SyscallError::BadDescriptor.into());
    }
    if fd == FD_STDIN {
        return Err(SyscallError::WrongDirection.into());
    }

    let (desc, terminal) = proc::with_current(|r| (r.fd_table.get(fd), r.terminal))?;
    let mut desc = desc.ok_or(SyscallError::BadDescriptor)?;
    if !desc.is_in_use() {
        return Err(SyscallError::BadDescriptor.into());
    }

    let written = desc.write(terminal, buf)?;
    proc::with_current(|r| r.fd_table.set(fd, desc))?;

    Ok(written as i32)
}

pub fn write(fd: usize, buf: &[u8]) -> i32 {
    as_retval(write_inner(fd, buf))
}

fn open_inner(name: &[u8]) -> Result<i32> {
    let name = core::str::from_utf8(name)
        .map_err(|_| crate::error::Error::Failed("file name is not valid utf-8"))?;
    let meta = fs::resolve(name)?;

    let ops = FileOps::for_file_type(meta.file_type);
    let fd = proc::with_current(|r| r.fd_table.alloc(ops, meta.inode))??;

    Ok(fd as i32)
}

/// Binds a free descriptor 2..7 to the named file's capability.
pub fn open(name: &[u8]) -> i32 {
    as_retval(open_inner(name))
}

fn close_inner(fd: usize) -> Result<i32> {
    proc::with_current(|r| r.fd_table.close(fd))??;
    Ok(0)
}

pub fn close(fd: usize) -> i32 {
    as_retval(close_inner(fd))
}

fn getargs_inner(buf: &mut [u8]) -> Result<i32> {
    proc::with_current(|r| {
        let args = r.args();
        // arguments that do not fit leave the caller's buffer untouched
        if args.len() > buf.len() {
            return Err(SyscallError::ArgsDontFit.into());
        }

        buf[..args.len()].copy_from_slice(args);
        if args.len() < buf.len() {
            buf[args.len()] = 0;
        }

        Ok(0)
    })?
}

/// Copies the calling process's argument string into `buf`.
pub fn getargs(buf: &mut [u8]) -> i32 {
    as_retval(getargs_inner(buf))
}

fn vidmap_inner(screen_start: u32) -> Result<i32> {
    // the caller hands in the location it wants the pointer stored at; only
    // addresses inside the program window are acceptable
    if !VirtualAddress::new(screen_start).is_user() {
        return Err(SyscallError::OutsideUserWindow.into());
    }

    Ok(layout::video_alias_addr(terminal::active()) as i32)
}

/// Validates the caller-supplied location and yields the active terminal's
/// video alias address; the glue stores it through the user pointer and
/// returns 0 to the program.
pub fn vidmap(screen_start: u32) -> i32 {
    as_retval(vidmap_inner(screen_start))
}

/// Signal registration stub; signals are not delivered.
pub fn set_handler(_signum: u32, _handler_address: u32) -> i32 {
    0
}

/// Signal return stub.
pub fn sigreturn() -> i32 {
    0
}
