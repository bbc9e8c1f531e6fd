use std::convert::TryFrom;
use std::io;
use std::os::raw::c_int;

use lfs_sys as sys;
use thiserror::Error;

/// The engine's error vocabulary. Every variant carries the exact negative
/// status code the engine expects from a callback.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LfsError {
    #[error("littlefs: Error during device operation")]
    Io = sys::LFS_ERR_IO,
    #[error("littlefs: Corrupted")]
    Corrupt = sys::LFS_ERR_CORRUPT,
    #[error("littlefs: No directory entry")]
    NoEntry = sys::LFS_ERR_NOENT,
    #[error("littlefs: Entry already exists")]
    EntryExists = sys::LFS_ERR_EXIST,
    #[error("littlefs: Entry is not a dir")]
    NotDir = sys::LFS_ERR_NOTDIR,
    #[error("littlefs: Entry is a dir")]
    IsDir = sys::LFS_ERR_ISDIR,
    #[error("littlefs: Dir is not empty")]
    DirNotEmpty = sys::LFS_ERR_NOTEMPTY,
    #[error("littlefs: Bad file number")]
    BadFileNum = sys::LFS_ERR_BADF,
    #[error("littlefs: File too large")]
    FileTooLarge = sys::LFS_ERR_FBIG,
    #[error("littlefs: Invalid parameter")]
    InvalidParam = sys::LFS_ERR_INVAL,
    #[error("littlefs: No space left on device")]
    NoSpace = sys::LFS_ERR_NOSPC,
    #[error("littlefs: No more memory available")]
    NoMemory = sys::LFS_ERR_NOMEM,
    #[error("littlefs: No data/attr available")]
    NoAttr = sys::LFS_ERR_NOATTR,
    #[error("littlefs: File name too long")]
    NameTooLong = sys::LFS_ERR_NAMETOOLONG,
}

impl LfsError {
    pub const ALL: [LfsError; 14] = [
        LfsError::Io,
        LfsError::Corrupt,
        LfsError::NoEntry,
        LfsError::EntryExists,
        LfsError::NotDir,
        LfsError::IsDir,
        LfsError::DirNotEmpty,
        LfsError::BadFileNum,
        LfsError::FileTooLarge,
        LfsError::InvalidParam,
        LfsError::NoSpace,
        LfsError::NoMemory,
        LfsError::NoAttr,
        LfsError::NameTooLong,
    ];

    /// The negative status code handed back to the engine.
    pub fn code(self) -> c_int {
        self as c_int
    }
}

impl TryFrom<c_int> for LfsError {
    type Error = c_int;

    /// Codes outside the engine's error set are returned unchanged.
    fn try_from(code: c_int) -> Result<Self, Self::Error> {
        LfsError::ALL
            .iter()
            .copied()
            .find(|err| err.code() == code)
            .ok_or(code)
    }
}

impl From<io::Error> for LfsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidInput => LfsError::InvalidParam,
            io::ErrorKind::OutOfMemory => LfsError::NoMemory,
            _ => LfsError::Io,
        }
    }
}

/// Converts an engine status code into a `Result`. Non-negative values are
/// success; negative values outside the known set collapse to `Io`.
pub fn errval(errno: c_int) -> Result<(), LfsError> {
    if errno >= sys::LFS_ERR_OK {
        return Ok(());
    }
    Err(LfsError::try_from(errno).unwrap_or(LfsError::Io))
}

/// Failure to recover a live backend from a context handle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    #[error("configuration record carries no context")]
    Unbound,
    #[error("context slot {index} is outside the registry")]
    OutOfRange { index: usize },
    #[error("context slot {index} generation {generation} no longer holds a device")]
    Stale { index: usize, generation: u32 },
    #[error("context slot {index} is already in use")]
    Busy { index: usize },
}

impl ResolveError {
    /// Programming errors: continuing would leave the engine talking to the
    /// wrong device or to none at all.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ResolveError::Busy { .. })
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("all {capacity} context slots are in use")]
    RegistryFull { capacity: usize },
    #[error("context resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Engine(#[from] LfsError),
    #[error("filesystem is not mounted")]
    NotMounted,
    #[error("filesystem is already mounted")]
    AlreadyMounted,
}
