use thiserror::Error;

/// Every operation of the engine fails with exactly one of these kinds.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("file already exists")]
    AlreadyExists,
    #[error("is a directory")]
    IsDirectory,
    #[error("not a directory")]
    NotDirectory,
    /// Operation not valid for this entry type, e.g. mkdir under a regular file.
    #[error("operation not supported for this entry")]
    Unsupported,
    #[error("no space left on device")]
    NoSpace,
    #[error("file exceeds the per-file block limit")]
    FileTooLarge,
    #[error("offset {offset} is beyond the end of file ({size} bytes)")]
    InvalidSeek { offset: u64, size: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("access denied")]
    AccessDenied,
    #[error("name too long")]
    NameTooLong,
    /// In-memory or on-disk state contradicts itself (double free, bad record).
    #[error("inconsistent filesystem state: {0}")]
    Corruption(String),
}

impl FsError {
    /// Maps the error kind to the errno a host integration layer reports.
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::AlreadyExists => libc::EEXIST,
            Self::IsDirectory => libc::EISDIR,
            Self::NotDirectory => libc::ENOTDIR,
            Self::Unsupported => libc::ENXIO,
            Self::NoSpace => libc::ENOSPC,
            Self::FileTooLarge => libc::EFBIG,
            Self::InvalidSeek { .. } => libc::ESPIPE,
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::AccessDenied => libc::EACCES,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::Corruption(_) => libc::EIO,
        }
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
