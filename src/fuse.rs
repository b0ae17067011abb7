/*!
 * FUSE Transport Glue
 * Translates kernel callbacks into facade operations, mapping inodes
 * to mount-relative paths
 */

use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr,
    Request, TimeOrNow, FUSE_ROOT_ID,
};
use tracing::info;

use crate::facade::FilesystemFacade;
use crate::types::{FileStat, FileType};

/// Attribute/entry cache timeout handed to the kernel. Reads go
/// through direct IO, so generated content is never clamped to a stale
/// size.
const TTL: Duration = Duration::from_secs(1);

/// Bidirectional inode <-> mount-relative path table.
///
/// Paths are the identity in this filesystem; inodes exist only
/// because the kernel protocol requires them.
struct InodeTable {
    paths: HashMap<u64, String>,
    ids: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut paths = HashMap::new();
        let mut ids = HashMap::new();
        paths.insert(FUSE_ROOT_ID, "/".to_string());
        ids.insert("/".to_string(), FUSE_ROOT_ID);
        Self {
            paths,
            ids,
            next: FUSE_ROOT_ID + 1,
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.paths.get(&ino).cloned()
    }

    fn assign(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.ids.get(path) {
            return *ino;
        }
        let ino = self.next;
        self.next += 1;
        self.paths.insert(ino, path.to_string());
        self.ids.insert(path.to_string(), ino);
        ino
    }

    /// Drop a path and everything beneath it; later lookups reassign.
    fn forget_subtree(&mut self, path: &str) {
        let prefix = format!("{}/", path);
        let doomed: Vec<(String, u64)> = self
            .ids
            .iter()
            .filter(|(p, _)| p.as_str() == path || p.starts_with(&prefix))
            .map(|(p, ino)| (p.clone(), *ino))
            .collect();
        for (p, ino) in doomed {
            self.ids.remove(&p);
            self.paths.remove(&ino);
        }
    }
}

fn child_path(parent: &str, name: &OsStr) -> Option<String> {
    let name = name.to_str()?;
    if parent == "/" {
        Some(format!("/{}", name))
    } else {
        Some(format!("{}/{}", parent, name))
    }
}

fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn to_kind(file_type: FileType) -> fuser::FileType {
    match file_type {
        FileType::Directory => fuser::FileType::Directory,
        FileType::Symlink => fuser::FileType::Symlink,
        FileType::BlockDevice => fuser::FileType::BlockDevice,
        FileType::CharDevice => fuser::FileType::CharDevice,
        FileType::Fifo => fuser::FileType::NamedPipe,
        FileType::Socket => fuser::FileType::Socket,
        FileType::File | FileType::Unknown => fuser::FileType::RegularFile,
    }
}

fn to_attr(stat: &FileStat, ino: u64) -> FileAttr {
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(512),
        atime: stat.atime,
        mtime: stat.mtime,
        ctime: stat.ctime,
        crtime: stat.ctime,
        kind: to_kind(stat.file_type()),
        perm: (stat.mode & 0o7777) as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: stat.rdev as u32,
        blksize: 512,
        flags: 0,
    }
}

fn time_of(t: TimeOrNow) -> SystemTime {
    match t {
        TimeOrNow::SpecificTime(st) => st,
        TimeOrNow::Now => SystemTime::now(),
    }
}

/// The `fuser::Filesystem` implementation over a facade.
pub struct ScriptFuse {
    facade: FilesystemFacade,
    inodes: InodeTable,
}

impl ScriptFuse {
    pub fn new(facade: FilesystemFacade) -> Self {
        Self {
            facade,
            inodes: InodeTable::new(),
        }
    }

    /// Fetch attributes and hand out the path's inode in one step.
    fn entry_for(&mut self, path: &str) -> Result<FileAttr, i32> {
        match self.facade.getattr(path) {
            Ok(stat) => {
                let ino = self.inodes.assign(path);
                Ok(to_attr(&stat, ino))
            }
            Err(e) => Err(e.errno()),
        }
    }
}

impl Filesystem for ScriptFuse {
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        info!(
            root = %self.facade.mount().root().display(),
            mountpoint = %self.facade.mount().mountpoint().display(),
            "filesystem initialized"
        );
        Ok(())
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.entry_for(&path) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.getattr(&path) {
            Ok(stat) => reply.attr(&TTL, &to_attr(&stat, ino)),
            Err(e) => reply.error(e.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let result = (|| {
            if let Some(mode) = mode {
                self.facade.chmod(&path, mode)?;
            }
            if uid.is_some() || gid.is_some() {
                self.facade.chown(&path, uid, gid)?;
            }
            if let Some(size) = size {
                self.facade.truncate(&path, size)?;
            }
            if atime.is_some() || mtime.is_some() {
                self.facade
                    .utimens(&path, atime.map(time_of), mtime.map(time_of))?;
            }
            self.facade.getattr(&path)
        })();

        match result {
            Ok(stat) => reply.attr(&TTL, &to_attr(&stat, ino)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.readlink(&path) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        if let Err(e) = self.facade.mknod(&path, mode, rdev as u64) {
            reply.error(e.errno());
            return;
        }
        match self.entry_for(&path) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        if let Err(e) = self.facade.mkdir(&path, mode) {
            reply.error(e.errno());
            return;
        }
        match self.entry_for(&path) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.facade.unlink(&path) {
            Ok(()) => {
                self.inodes.forget_subtree(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.facade.rmdir(&path) {
            Ok(()) => {
                self.inodes.forget_subtree(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, link_name) else {
            reply.error(libc::EINVAL);
            return;
        };
        if let Err(e) = self.facade.symlink(&path, target) {
            reply.error(e.errno());
            return;
        }
        match self.entry_for(&path) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(parent_path), Some(newparent_path)) =
            (self.inodes.path_of(parent), self.inodes.path_of(newparent))
        else {
            reply.error(libc::ENOENT);
            return;
        };
        let (Some(old), Some(new)) = (
            child_path(&parent_path, name),
            child_path(&newparent_path, newname),
        ) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.facade.rename(&old, &new) {
            Ok(()) => {
                self.inodes.forget_subtree(&old);
                self.inodes.forget_subtree(&new);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let (Some(source), Some(newparent_path)) =
            (self.inodes.path_of(ino), self.inodes.path_of(newparent))
        else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&newparent_path, newname) else {
            reply.error(libc::EINVAL);
            return;
        };
        if let Err(e) = self.facade.link(&path, &source) {
            reply.error(e.errno());
            return;
        }
        match self.entry_for(&path) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.open(&path, flags) {
            Ok(fh) => reply.opened(fh, fuser::consts::FOPEN_DIRECT_IO),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let fh = match self.facade.create(&path, mode) {
            Ok(fh) => fh,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        match self.entry_for(&path) {
            Ok(attr) => reply.created(&TTL, &attr, 0, fh, fuser::consts::FOPEN_DIRECT_IO),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.read(&path, size, offset, fh) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.write(&path, data, offset, fh) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(&mut self, _req: &Request, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.flush(&path, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let path = self.inodes.path_of(ino).unwrap_or_default();
        let _ = self.facade.release(&path, fh);
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.fsync(&path, datasync, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let entries = match self.facade.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };

        for (idx, entry) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            let child_ino = match entry.name.as_str() {
                "." => ino,
                ".." => {
                    let parent = parent_path(&path).to_string();
                    self.inodes.assign(&parent)
                }
                name => match child_path(&path, OsStr::new(name)) {
                    Some(child) => self.inodes.assign(&child),
                    None => continue,
                },
            };
            if reply.add(
                child_ino,
                (idx + 1) as i64,
                to_kind(entry.file_type),
                &entry.name,
            ) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, ino: u64, reply: ReplyStatfs) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.statfs(&path) {
            Ok(stats) => reply.statfs(
                stats.blocks,
                stats.bfree,
                stats.bavail,
                stats.files,
                stats.ffree,
                stats.bsize as u32,
                stats.namemax as u32,
                stats.frsize as u32,
            ),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.setxattr(&path, name, value) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.getxattr(&path, name) {
            Ok(value) => {
                if size == 0 {
                    reply.size(value.len() as u32);
                } else if size >= value.len() as u32 {
                    reply.data(&value);
                } else {
                    reply.error(libc::ERANGE);
                }
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.listxattr(&path) {
            Ok(names) => {
                let mut data = Vec::new();
                for name in names {
                    data.extend_from_slice(name.as_bytes());
                    data.push(0);
                }
                if size == 0 {
                    reply.size(data.len() as u32);
                } else if size >= data.len() as u32 {
                    reply.data(&data);
                } else {
                    reply.error(libc::ERANGE);
                }
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.facade.access(&path, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }
}

/// Mount the facade in the foreground until unmounted or signalled.
pub fn mount(facade: FilesystemFacade, mountpoint: &Path) -> anyhow::Result<()> {
    let options = [MountOption::FSName("scriptfs".to_string())];
    fuser::mount2(ScriptFuse::new(facade), mountpoint, &options)?;
    Ok(())
}
