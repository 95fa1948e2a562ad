use crate::{fs::FsError, proc::ProcessError, syscall::SyscallError};
use common::image::ImageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Failed(&'static str),
    ProcessError(ProcessError),
    FsError(FsError),
    SyscallError(SyscallError),
    ImageError(ImageError),
}

impl From<&'static str> for Error {
    fn from(s: &'static str) -> Self {
        Error::Failed(s)
    }
}

impl From<ProcessError> for Error {
    fn from(err: ProcessError) -> Self {
        Error::ProcessError(err)
    }
}

impl From<FsError> for Error {
    fn from(err: FsError) -> Self {
        Error::FsError(err)
    }
}

impl From<SyscallError> for Error {
    fn from(err: SyscallError) -> Self {
        Error::SyscallError(err)
    }
}

impl From<ImageError> for Error {
    fn from(err: ImageError) -> Self {
        Error::ImageError(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
