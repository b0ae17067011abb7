/*!
 * Real Nodes
 * 1:1 proxy for a path on the backing filesystem
 */

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use nix::sys::stat::{Mode, SFlag};
use nix::unistd::AccessFlags;
use parking_lot::Mutex;

use crate::types::{DirEntry, FileStat, FileType, FsError, FsResult, FsStats};

/// A resolved path backed directly by the underlying storage.
///
/// Stateless: every operation delegates to the equivalent primitive
/// call on the wrapped absolute path, or on an already-open handle for
/// handle-scoped transfers.
#[derive(Debug, Clone)]
pub struct RealNode {
    path: PathBuf,
}

impl RealNode {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Absolute path on the backing filesystem.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ctx(&self, op: &str) -> String {
        format!("{} {}", op, self.path.display())
    }

    pub fn access(&self, mask: i32) -> FsResult<()> {
        let flags = AccessFlags::from_bits_truncate(mask);
        nix::unistd::access(&self.path, flags).map_err(|e| FsError::from_nix(e, self.ctx("access")))
    }

    /// Attributes via `lstat` (symlinks are not followed).
    pub fn getattr(&self) -> FsResult<FileStat> {
        let md = fs::symlink_metadata(&self.path)
            .map_err(|e| FsError::from_io(&e, self.ctx("getattr")))?;
        Ok(FileStat::from_metadata(&md))
    }

    pub fn readlink(&self) -> FsResult<PathBuf> {
        fs::read_link(&self.path).map_err(|e| FsError::from_io(&e, self.ctx("readlink")))
    }

    /// Physical directory entries, without the `.`/`..` pseudo-entries.
    pub fn list(&self) -> FsResult<Vec<DirEntry>> {
        let entries =
            fs::read_dir(&self.path).map_err(|e| FsError::from_io(&e, self.ctx("readdir")))?;

        let mut result = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::from_io(&e, self.ctx("readdir")))?;
            let name = entry
                .file_name()
                .into_string()
                .map_err(|_| FsError::InvalidPath("invalid UTF-8 in filename".to_string()))?;
            let file_type = entry
                .file_type()
                .map_err(|e| FsError::from_io(&e, self.ctx("readdir")))?;
            result.push(DirEntry::new(name, FileType::from_std(file_type)));
        }
        Ok(result)
    }

    /// Open the backing file with POSIX open flags.
    pub fn open(&self, flags: i32) -> FsResult<fs::File> {
        let mut options = fs::OpenOptions::new();
        match flags & libc::O_ACCMODE {
            libc::O_WRONLY => {
                options.write(true);
            }
            libc::O_RDWR => {
                options.read(true).write(true);
            }
            _ => {
                options.read(true);
            }
        }
        options.append(flags & libc::O_APPEND != 0);
        options.truncate(flags & libc::O_TRUNC != 0);
        options.create(flags & libc::O_CREAT != 0);
        options.create_new(flags & libc::O_EXCL != 0 && flags & libc::O_CREAT != 0);

        options
            .open(&self.path)
            .map_err(|e| FsError::from_io(&e, self.ctx("open")))
    }

    /// Create (or open) the backing file write-only with `mode`.
    pub fn create(&self, mode: u32) -> FsResult<fs::File> {
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .mode(mode)
            .open(&self.path)
            .map_err(|e| FsError::from_io(&e, self.ctx("create")))
    }

    /// Read `size` bytes at `offset` from a shared handle. The lock
    /// makes the reposition-then-transfer pair atomic per handle.
    pub fn read(&self, file: &Mutex<fs::File>, size: u32, offset: i64) -> FsResult<Vec<u8>> {
        let mut guard = file.lock();
        guard
            .seek(SeekFrom::Start(offset.max(0) as u64))
            .map_err(|e| FsError::from_io(&e, self.ctx("read")))?;
        let mut buf = Vec::with_capacity(size as usize);
        guard
            .by_ref()
            .take(u64::from(size))
            .read_to_end(&mut buf)
            .map_err(|e| FsError::from_io(&e, self.ctx("read")))?;
        Ok(buf)
    }

    /// Write `data` at `offset` through a shared handle, under the same
    /// per-handle lock as `read`.
    pub fn write(&self, file: &Mutex<fs::File>, data: &[u8], offset: i64) -> FsResult<usize> {
        let mut guard = file.lock();
        guard
            .seek(SeekFrom::Start(offset.max(0) as u64))
            .map_err(|e| FsError::from_io(&e, self.ctx("write")))?;
        guard
            .write_all(data)
            .map_err(|e| FsError::from_io(&e, self.ctx("write")))?;
        Ok(data.len())
    }

    pub fn flush(&self, file: &Mutex<fs::File>) -> FsResult<()> {
        file.lock()
            .sync_all()
            .map_err(|e| FsError::from_io(&e, self.ctx("flush")))
    }

    pub fn fsync(&self, file: &Mutex<fs::File>, datasync: bool) -> FsResult<()> {
        let guard = file.lock();
        let result = if datasync {
            guard.sync_data()
        } else {
            guard.sync_all()
        };
        result.map_err(|e| FsError::from_io(&e, self.ctx("fsync")))
    }

    pub fn truncate(&self, size: u64) -> FsResult<()> {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| FsError::from_io(&e, self.ctx("truncate")))?;
        file.set_len(size)
            .map_err(|e| FsError::from_io(&e, self.ctx("truncate")))
    }

    pub fn chmod(&self, mode: u32) -> FsResult<()> {
        fs::set_permissions(&self.path, fs::Permissions::from_mode(mode))
            .map_err(|e| FsError::from_io(&e, self.ctx("chmod")))
    }

    pub fn chown(&self, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        std::os::unix::fs::chown(&self.path, uid, gid)
            .map_err(|e| FsError::from_io(&e, self.ctx("chown")))
    }

    /// Set access/modification times; `None` means "now".
    pub fn utimens(&self, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> FsResult<()> {
        let file = fs::OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|e| FsError::from_io(&e, self.ctx("utimens")))?;
        let now = SystemTime::now();
        let times = fs::FileTimes::new()
            .set_accessed(atime.unwrap_or(now))
            .set_modified(mtime.unwrap_or(now));
        file.set_times(times)
            .map_err(|e| FsError::from_io(&e, self.ctx("utimens")))
    }

    pub fn mkdir(&self, mode: u32) -> FsResult<()> {
        fs::DirBuilder::new()
            .mode(mode)
            .create(&self.path)
            .map_err(|e| FsError::from_io(&e, self.ctx("mkdir")))
    }

    pub fn rmdir(&self) -> FsResult<()> {
        fs::remove_dir(&self.path).map_err(|e| FsError::from_io(&e, self.ctx("rmdir")))
    }

    pub fn unlink(&self) -> FsResult<()> {
        fs::remove_file(&self.path).map_err(|e| FsError::from_io(&e, self.ctx("unlink")))
    }

    pub fn mknod(&self, mode: u32, rdev: u64) -> FsResult<()> {
        let kind = SFlag::from_bits_truncate(mode as libc::mode_t & libc::S_IFMT);
        let perm = Mode::from_bits_truncate(mode as libc::mode_t & 0o7777);
        nix::sys::stat::mknod(&self.path, kind, perm, rdev as libc::dev_t)
            .map_err(|e| FsError::from_nix(e, self.ctx("mknod")))
    }

    /// Move the backing file to another real path.
    pub fn rename_to(&self, new_path: &Path) -> FsResult<()> {
        fs::rename(&self.path, new_path).map_err(|e| {
            FsError::from_io(
                &e,
                format!("rename {} to {}", self.path.display(), new_path.display()),
            )
        })
    }

    /// Create a hard link at this node's path pointing at `source`.
    pub fn link_from(&self, source: &Path) -> FsResult<()> {
        fs::hard_link(source, &self.path).map_err(|e| {
            FsError::from_io(
                &e,
                format!("link {} from {}", self.path.display(), source.display()),
            )
        })
    }

    /// Create a symlink at this node's path with `target` as content.
    pub fn symlink_to(&self, target: &Path) -> FsResult<()> {
        std::os::unix::fs::symlink(target, &self.path).map_err(|e| {
            FsError::from_io(
                &e,
                format!("symlink {} to {}", self.path.display(), target.display()),
            )
        })
    }

    pub fn statfs(&self) -> FsResult<FsStats> {
        let stv = nix::sys::statvfs::statvfs(&self.path)
            .map_err(|e| FsError::from_nix(e, self.ctx("statfs")))?;
        Ok(FsStats {
            blocks: stv.blocks() as u64,
            bfree: stv.blocks_free() as u64,
            bavail: stv.blocks_available() as u64,
            files: stv.files() as u64,
            ffree: stv.files_free() as u64,
            favail: stv.files_available() as u64,
            bsize: stv.block_size() as u64,
            frsize: stv.fragment_size() as u64,
            namemax: stv.name_max() as u64,
        })
    }

    pub fn getxattr(&self, name: &OsStr) -> FsResult<Vec<u8>> {
        if !xattr::SUPPORTED_PLATFORM {
            return Err(FsError::PermissionDenied(self.ctx("getxattr")));
        }
        match xattr::get(&self.path, name) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(FsError::Io {
                errno: libc::ENODATA,
                context: self.ctx("getxattr"),
            }),
            Err(e) => Err(FsError::from_io(&e, self.ctx("getxattr"))),
        }
    }

    pub fn listxattr(&self) -> FsResult<Vec<OsString>> {
        if !xattr::SUPPORTED_PLATFORM {
            return Err(FsError::PermissionDenied(self.ctx("listxattr")));
        }
        let attrs = xattr::list(&self.path)
            .map_err(|e| FsError::from_io(&e, self.ctx("listxattr")))?;
        Ok(attrs.collect())
    }

    pub fn setxattr(&self, name: &OsStr, value: &[u8]) -> FsResult<()> {
        if !xattr::SUPPORTED_PLATFORM {
            return Err(FsError::PermissionDenied(self.ctx("setxattr")));
        }
        xattr::set(&self.path, name, value)
            .map_err(|e| FsError::from_io(&e, self.ctx("setxattr")))
    }
}
