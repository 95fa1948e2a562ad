use super::{FileType, FsError};
use crate::{
    device::chardev,
    error::Result,
    syscall::SyscallError,
    terminal,
};

pub const DESC_TABLE_LEN: usize = 8;
pub const FD_STDIN: usize = 0;
pub const FD_STDOUT: usize = 1;
pub const FIRST_USER_FD: usize = 2;

/// Capability an open description dispatches through, resolved once at open
/// time from the on-disk file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOps {
    Terminal,
    Regular,
    Directory,
    Device,
}

impl FileOps {
    pub fn for_file_type(ty: FileType) -> Self {
        match ty {
            FileType::CharDevice => Self::Device,
            FileType::Directory => Self::Directory,
            FileType::Regular => Self::Regular,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FileDescriptor {
    ops: FileOps,
    inode: u32,
    position: usize,
    in_use: bool,
}

impl FileDescriptor {
    const fn closed() -> Self {
        Self {
            ops: FileOps::Terminal,
            inode: 0,
            position: 0,
            in_use: false,
        }
    }

    fn open(ops: FileOps, inode: u32) -> Self {
        Self {
            ops,
            inode,
            position: 0,
            in_use: true,
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    pub fn ops(&self) -> FileOps {
        self.ops
    }

    /// Dispatches a read through the capability. `terminal` is the calling
    /// process's terminal, consulted only by the terminal capability.
    pub fn read(&mut self, terminal: usize, buf: &mut [u8]) -> Result<usize> {
        match self.ops {
            FileOps::Terminal => terminal::read_line(terminal, buf),
            FileOps::Regular => {
                let read =
                    super::with(|fs| fs.read(self.inode, self.position, buf))?;
                self.position += read;
                Ok(read)
            }
            FileOps::Directory => {
                let name = match super::with(|fs| Ok(fs.dir_entry_name(self.position)))? {
                    Some(name) => name,
                    None => return Ok(0),
                };
                self.position += 1;

                let n = name.len().min(buf.len());
                buf[..n].copy_from_slice(&name.as_bytes()[..n]);
                Ok(n)
            }
            FileOps::Device => chardev::read(buf),
        }
    }

    pub fn write(&mut self, terminal: usize, buf: &[u8]) -> Result<usize> {
        match self.ops {
            FileOps::Terminal => terminal::write_bytes(terminal, buf),
            FileOps::Device => chardev::write(buf),
            FileOps::Regular | FileOps::Directory => Err(FsError::ReadOnly.into()),
        }
    }
}

/// The per-process table of open descriptions. Entries 0/1 are the terminal
/// pair opened at process start; 2..7 belong to the program.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorTable {
    entries: [FileDescriptor; DESC_TABLE_LEN],
}

impl DescriptorTable {
    pub const fn new() -> Self {
        Self {
            entries: [FileDescriptor::closed(); DESC_TABLE_LEN],
        }
    }

    /// Opens 0/1 to the terminal capability, the state every process starts
    /// from.
    pub fn open_std(&mut self) {
        self.entries[FD_STDIN] = FileDescriptor::open(FileOps::Terminal, 0);
        self.entries[FD_STDOUT] = FileDescriptor::open(FileOps::Terminal, 0);
    }

    pub fn get(&self, fd: usize) -> Option<FileDescriptor> {
        self.entries.get(fd).copied()
    }

    pub fn set(&mut self, fd: usize, desc: FileDescriptor) {
        self.entries[fd] = desc;
    }

    /// Binds the first free user entry, 2..7.
    pub fn alloc(&mut self, ops: FileOps, inode: u32) -> Result<usize> {
        for fd in FIRST_USER_FD..DESC_TABLE_LEN {
            if !self.entries[fd].in_use {
                self.entries[fd] = FileDescriptor::open(ops, inode);
                return Ok(fd);
            }
        }

        Err(SyscallError::NoFreeDescriptor.into())
    }

    /// Closes a user entry; 0/1 are rejected.
    pub fn close(&mut self, fd: usize) -> Result<()> {
        if !(FIRST_USER_FD..DESC_TABLE_LEN).contains(&fd) {
            return Err(SyscallError::BadDescriptor.into());
        }

        if !self.entries[fd].in_use {
            return Err(SyscallError::BadDescriptor.into());
        }

        self.entries[fd] = FileDescriptor::closed();
        Ok(())
    }

    /// Closes every entry, 0/1 included; halt's teardown path.
    pub fn close_all(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = FileDescriptor::closed();
        }
    }

    pub fn in_use_count(&self) -> usize {
        self.entries.iter().filter(|e| e.in_use).count()
    }
}
