//! Seam to the on-disk file system. The core never walks directories or
//! block maps itself; a collaborator registered at init answers name
//! resolution, image loads and byte reads.

use crate::error::Result;
use alloc::{boxed::Box, string::String};
use spin::Mutex;

pub mod file_desc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotRegistered,
    NotFound,
    ReadFailed,
    ReadOnly,
}

/// On-disk file classes, in the order the disk format numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    CharDevice,
    Directory,
    Regular,
}

#[derive(Debug, Clone, Copy)]
pub struct FileMeta {
    pub file_type: FileType,
    pub inode: u32,
    pub size: usize,
}

pub trait FileSystem: Send + Sync {
    /// Name lookup in the flat directory.
    fn resolve(&self, name: &str) -> Option<FileMeta>;

    /// Copies the whole image of `name` verbatim to the start of `dst`.
    fn load_image(&self, name: &str, dst: &mut [u8]) -> Result<usize>;

    /// Reads file bytes; returns 0 at end of file.
    fn read(&self, inode: u32, offset: usize, buf: &mut [u8]) -> Result<usize>;

    /// Name of the directory entry at `index`, `None` past the last one.
    fn dir_entry_name(&self, index: usize) -> Option<String>;
}

static FILE_SYSTEM: Mutex<Option<Box<dyn FileSystem>>> = Mutex::new(None);

pub fn register(fs: Box<dyn FileSystem>) {
    *FILE_SYSTEM.lock() = Some(fs);
}

pub fn with<R>(f: impl FnOnce(&dyn FileSystem) -> Result<R>) -> Result<R> {
    match FILE_SYSTEM.lock().as_deref() {
        Some(fs) => f(fs),
        None => Err(FsError::NotRegistered.into()),
    }
}

pub fn resolve(name: &str) -> Result<FileMeta> {
    with(|fs| fs.resolve(name).ok_or(FsError::NotFound.into()))
}
