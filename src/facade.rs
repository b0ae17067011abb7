/*!
 * Filesystem Facade
 * Single entry point per incoming operation; resolves the path and
 * dispatches to the resolved node
 */

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::manifest::Manifest;
use crate::mount::Mount;
use crate::node::ResourceNode;
use crate::resolve::PathResolver;
use crate::types::{DirEntry, FileStat, FsError, FsResult, FsStats};

/// One logical open handle.
///
/// Real opens carry the file behind a per-handle lock so the
/// seek-then-transfer pair stays atomic when the handle is shared.
/// Virtual opens are sentinels: no descriptor is ever allocated.
pub enum Handle {
    Real(Mutex<fs::File>),
    Script,
}

/// Dispatch point invoked once per filesystem operation.
///
/// Paths are mount-relative and `/`-separated, exactly as the
/// transport delivers them. Node-level failures propagate unchanged;
/// operations a node cannot carry out report a permission error.
pub struct FilesystemFacade {
    mount: Arc<Mount>,
    handles: DashMap<u64, Arc<Handle>, RandomState>,
    next_handle: AtomicU64,
}

impl FilesystemFacade {
    pub fn new(mount: Arc<Mount>) -> Self {
        Self {
            mount,
            handles: DashMap::with_hasher(RandomState::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// The mount this facade serves.
    #[must_use]
    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    fn resolve(&self, path: &str) -> ResourceNode {
        PathResolver::new(&self.mount).resolve(path)
    }

    fn real_path(&self, path: &str) -> PathBuf {
        PathResolver::new(&self.mount).real_path(path)
    }

    fn insert_handle(&self, handle: Handle) -> u64 {
        let fh = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.handles.insert(fh, Arc::new(handle));
        fh
    }

    fn handle(&self, fh: u64) -> FsResult<Arc<Handle>> {
        self.handles
            .get(&fh)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FsError::Io {
                errno: libc::EBADF,
                context: format!("unknown handle {}", fh),
            })
    }

    pub fn getattr(&self, path: &str) -> FsResult<FileStat> {
        debug!(path, "getattr");
        self.resolve(path).getattr()
    }

    pub fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        debug!(path, mask, "access");
        self.resolve(path).access(mask)
    }

    pub fn readlink(&self, path: &str) -> FsResult<PathBuf> {
        debug!(path, "readlink");
        self.resolve(path).readlink()
    }

    /// List a directory: `.`/`..`, the physical entries, then the
    /// manifest's virtual names, skipping any shadowed by a physical
    /// entry.
    pub fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        debug!(path, "readdir");
        match self.resolve(path) {
            ResourceNode::Real(node) => {
                let mut entries = vec![DirEntry::directory("."), DirEntry::directory("..")];
                entries.extend(node.list()?);
                let manifest = Manifest::load(node.path());
                for name in manifest.filenames() {
                    if entries.iter().all(|e| e.name != name) {
                        entries.push(DirEntry::file(name));
                    }
                }
                Ok(entries)
            }
            ResourceNode::Script(script) => Err(script.denied("readdir")),
        }
    }

    pub fn mknod(&self, path: &str, mode: u32, rdev: u64) -> FsResult<()> {
        debug!(path, mode, "mknod");
        self.resolve(path).mknod(mode, rdev)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        debug!(path, mode, "mkdir");
        self.resolve(path).mkdir(mode)
    }

    pub fn unlink(&self, path: &str) -> FsResult<()> {
        debug!(path, "unlink");
        self.resolve(path).unlink()
    }

    pub fn rmdir(&self, path: &str) -> FsResult<()> {
        debug!(path, "rmdir");
        self.resolve(path).rmdir()
    }

    /// Create a symlink at `path` whose content is `target`, kept
    /// verbatim.
    pub fn symlink(&self, path: &str, target: &Path) -> FsResult<()> {
        debug!(path, target = %target.display(), "symlink");
        self.resolve(path).symlink_to(target)
    }

    /// Move `old` to `new`; both are mount-relative.
    pub fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        debug!(old, new, "rename");
        let new_real = self.real_path(new);
        self.resolve(old).rename_to(&new_real)
    }

    /// Create a hard link at `path` to the mount-relative `source`.
    pub fn link(&self, path: &str, source: &str) -> FsResult<()> {
        debug!(path, source, "link");
        let source_real = self.real_path(source);
        self.resolve(path).link_from(&source_real)
    }

    pub fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        debug!(path, mode, "chmod");
        self.resolve(path).chmod(mode)
    }

    pub fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        debug!(path, "chown");
        self.resolve(path).chown(uid, gid)
    }

    pub fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        debug!(path, size, "truncate");
        self.resolve(path).truncate(size)
    }

    pub fn utimens(
        &self,
        path: &str,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        debug!(path, "utimens");
        self.resolve(path).utimens(atime, mtime)
    }

    /// Open `path`, returning a handle id. Virtual opens always
    /// succeed with a sentinel handle.
    pub fn open(&self, path: &str, flags: i32) -> FsResult<u64> {
        debug!(path, flags, "open");
        let handle = match self.resolve(path) {
            ResourceNode::Real(node) => Handle::Real(Mutex::new(node.open(flags)?)),
            ResourceNode::Script(_) => Handle::Script,
        };
        Ok(self.insert_handle(handle))
    }

    /// Create and open a new real file. Names declared in a manifest
    /// resolve virtual and are rejected.
    pub fn create(&self, path: &str, mode: u32) -> FsResult<u64> {
        debug!(path, mode, "create");
        match self.resolve(path) {
            ResourceNode::Real(node) => {
                let file = node.create(mode)?;
                Ok(self.insert_handle(Handle::Real(Mutex::new(file))))
            }
            ResourceNode::Script(script) => Err(script.denied("create")),
        }
    }

    pub fn read(&self, path: &str, size: u32, offset: i64, fh: u64) -> FsResult<Vec<u8>> {
        debug!(path, size, offset, fh, "read");
        match self.resolve(path) {
            ResourceNode::Real(node) => match self.handle(fh)?.as_ref() {
                Handle::Real(file) => node.read(file, size, offset),
                Handle::Script => Err(FsError::Io {
                    errno: libc::EBADF,
                    context: format!("handle {} does not back {}", fh, path),
                }),
            },
            ResourceNode::Script(script) => Ok(script.read(size, offset)),
        }
    }

    pub fn write(&self, path: &str, data: &[u8], offset: i64, fh: u64) -> FsResult<usize> {
        debug!(path, len = data.len(), offset, fh, "write");
        match self.resolve(path) {
            ResourceNode::Real(node) => match self.handle(fh)?.as_ref() {
                Handle::Real(file) => node.write(file, data, offset),
                Handle::Script => Err(FsError::Io {
                    errno: libc::EBADF,
                    context: format!("handle {} does not back {}", fh, path),
                }),
            },
            ResourceNode::Script(script) => Err(script.denied("write")),
        }
    }

    /// Flush a handle. A no-op for virtual handles, which have no
    /// descriptor to synchronize.
    pub fn flush(&self, path: &str, fh: u64) -> FsResult<()> {
        debug!(path, fh, "flush");
        match self.resolve(path) {
            ResourceNode::Real(node) => match self.handle(fh)?.as_ref() {
                Handle::Real(file) => node.flush(file),
                Handle::Script => Ok(()),
            },
            ResourceNode::Script(_) => Ok(()),
        }
    }

    pub fn fsync(&self, path: &str, datasync: bool, fh: u64) -> FsResult<()> {
        debug!(path, datasync, fh, "fsync");
        match self.resolve(path) {
            ResourceNode::Real(node) => match self.handle(fh)?.as_ref() {
                Handle::Real(file) => node.fsync(file, datasync),
                Handle::Script => Ok(()),
            },
            ResourceNode::Script(_) => Ok(()),
        }
    }

    /// Drop a handle. Closing the last clone of a real handle closes
    /// the descriptor.
    pub fn release(&self, path: &str, fh: u64) -> FsResult<()> {
        debug!(path, fh, "release");
        self.handles.remove(&fh);
        Ok(())
    }

    pub fn statfs(&self, path: &str) -> FsResult<FsStats> {
        debug!(path, "statfs");
        self.resolve(path).statfs()
    }

    pub fn getxattr(&self, path: &str, name: &OsStr) -> FsResult<Vec<u8>> {
        debug!(path, name = ?name, "getxattr");
        self.resolve(path).getxattr(name)
    }

    pub fn listxattr(&self, path: &str) -> FsResult<Vec<OsString>> {
        debug!(path, "listxattr");
        self.resolve(path).listxattr()
    }

    pub fn setxattr(&self, path: &str, name: &OsStr, value: &[u8]) -> FsResult<()> {
        debug!(path, name = ?name, "setxattr");
        self.resolve(path).setxattr(name, value)
    }
}
