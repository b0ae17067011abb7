/*!
 * Filesystem Error Types
 * Structured errors with errno mapping for the transport layer
 */

use std::io;

use thiserror::Error;

/// Filesystem operation result
#[must_use = "filesystem operations can fail and must be handled"]
pub type FsResult<T> = Result<T, FsError>;

/// Filesystem errors
///
/// Variants carry a context string naming the operation and path.
/// `errno` maps each variant to the POSIX code the transport hands
/// back to the kernel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("I/O error (errno {errno}): {context}")]
    Io { errno: i32, context: String },
}

impl FsError {
    /// Convert an `io::Error` to an `FsError`, preserving the OS errno
    /// where the kind has no dedicated variant.
    pub fn from_io(e: &io::Error, context: impl Into<String>) -> Self {
        let context = context.into();
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(context),
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied(context),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(context),
            _ => FsError::Io {
                errno: e.raw_os_error().unwrap_or(libc::EIO),
                context: format!("{}: {}", context, e),
            },
        }
    }

    /// Convert a `nix` errno to an `FsError`.
    pub fn from_nix(e: nix::errno::Errno, context: impl Into<String>) -> Self {
        let context = context.into();
        match e {
            nix::errno::Errno::ENOENT => FsError::NotFound(context),
            nix::errno::Errno::EACCES => FsError::PermissionDenied(context),
            nix::errno::Errno::EEXIST => FsError::AlreadyExists(context),
            nix::errno::Errno::ENOTDIR => FsError::NotADirectory(context),
            nix::errno::Errno::EISDIR => FsError::IsADirectory(context),
            _ => FsError::Io {
                errno: e as i32,
                context,
            },
        }
    }

    /// POSIX error code for the transport layer.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::PermissionDenied(_) => libc::EACCES,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::InvalidPath(_) => libc::EINVAL,
            FsError::NotSupported(_) => libc::EOPNOTSUPP,
            FsError::Io { errno, .. } => *errno,
        }
    }
}
