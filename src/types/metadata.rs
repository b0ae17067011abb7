/*!
 * File Metadata
 * Stat results for real and synthetic files, plus filesystem statistics
 */

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::entry::FileType;

/// Stat result for one filesystem object.
///
/// Real nodes fill this from `lstat`; virtual nodes synthesize it with
/// epoch timestamps and a read-only mode.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStat {
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub rdev: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl FileStat {
    /// Build from an `lstat` result.
    #[must_use]
    pub fn from_metadata(md: &fs::Metadata) -> Self {
        Self {
            mode: md.mode(),
            nlink: md.nlink() as u32,
            uid: md.uid(),
            gid: md.gid(),
            size: md.size(),
            rdev: md.rdev(),
            atime: epoch_time(md.atime(), md.atime_nsec()),
            mtime: epoch_time(md.mtime(), md.mtime_nsec()),
            ctime: epoch_time(md.ctime(), md.ctime_nsec()),
        }
    }

    /// Synthetic descriptor for a generated file: regular file,
    /// owner/group read only, single link, timestamps pinned at the
    /// epoch, size equal to the current content length.
    #[must_use]
    pub fn generated(size: u64, uid: u32, gid: u32) -> Self {
        Self {
            mode: libc::S_IFREG as u32 | 0o440,
            nlink: 1,
            uid,
            gid,
            size,
            rdev: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
        }
    }

    /// File type derived from the mode word.
    #[inline]
    #[must_use]
    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode)
    }

    #[inline]
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self.file_type(), FileType::Directory)
    }

    #[inline]
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self.file_type(), FileType::File)
    }
}

/// Convert stat seconds + nanoseconds into a `SystemTime`.
/// Pre-epoch timestamps clamp to the epoch.
fn epoch_time(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs as u32)
    } else {
        UNIX_EPOCH
    }
}

/// `statvfs` result for the backing filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub favail: u64,
    pub bsize: u64,
    pub frsize: u64,
    pub namemax: u64,
}
