/*!
 * Resource Nodes
 * The polymorphic unit a path resolves to: real or virtual
 */

pub mod real;
pub mod script;

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use real::RealNode;
pub use script::ScriptFile;

use crate::types::{FileStat, FsResult, FsStats};

/// One resolved path. Real nodes delegate to the backing filesystem;
/// script files synthesize content and reject every mutation.
///
/// Path-scoped operations dispatch here so the virtual variant's
/// permission-denied defaults stay in one place. Handle-scoped and
/// listing operations live on the facade, which owns the handle table
/// and the manifest merge.
#[derive(Debug)]
pub enum ResourceNode {
    Real(RealNode),
    Script(ScriptFile),
}

impl ResourceNode {
    pub fn getattr(&self) -> FsResult<FileStat> {
        match self {
            ResourceNode::Real(node) => node.getattr(),
            ResourceNode::Script(script) => Ok(script.getattr()),
        }
    }

    pub fn access(&self, mask: i32) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.access(mask),
            // Virtual files are readable by construction.
            ResourceNode::Script(_) => Ok(()),
        }
    }

    pub fn readlink(&self) -> FsResult<PathBuf> {
        match self {
            ResourceNode::Real(node) => node.readlink(),
            ResourceNode::Script(script) => Err(script.denied("readlink")),
        }
    }

    pub fn truncate(&self, size: u64) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.truncate(size),
            ResourceNode::Script(script) => Err(script.denied("truncate")),
        }
    }

    pub fn chmod(&self, mode: u32) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.chmod(mode),
            ResourceNode::Script(script) => Err(script.denied("chmod")),
        }
    }

    pub fn chown(&self, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.chown(uid, gid),
            ResourceNode::Script(script) => Err(script.denied("chown")),
        }
    }

    pub fn utimens(&self, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.utimens(atime, mtime),
            ResourceNode::Script(script) => Err(script.denied("utimens")),
        }
    }

    pub fn mkdir(&self, mode: u32) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.mkdir(mode),
            ResourceNode::Script(script) => Err(script.denied("mkdir")),
        }
    }

    pub fn rmdir(&self) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.rmdir(),
            ResourceNode::Script(script) => Err(script.denied("rmdir")),
        }
    }

    pub fn unlink(&self) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.unlink(),
            ResourceNode::Script(script) => Err(script.denied("unlink")),
        }
    }

    pub fn mknod(&self, mode: u32, rdev: u64) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.mknod(mode, rdev),
            ResourceNode::Script(script) => Err(script.denied("mknod")),
        }
    }

    pub fn rename_to(&self, new_path: &Path) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.rename_to(new_path),
            ResourceNode::Script(script) => Err(script.denied("rename")),
        }
    }

    pub fn link_from(&self, source: &Path) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.link_from(source),
            ResourceNode::Script(script) => Err(script.denied("link")),
        }
    }

    pub fn symlink_to(&self, target: &Path) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.symlink_to(target),
            ResourceNode::Script(script) => Err(script.denied("symlink")),
        }
    }

    pub fn statfs(&self) -> FsResult<FsStats> {
        match self {
            ResourceNode::Real(node) => node.statfs(),
            ResourceNode::Script(script) => Err(script.denied("statfs")),
        }
    }

    pub fn getxattr(&self, name: &OsStr) -> FsResult<Vec<u8>> {
        match self {
            ResourceNode::Real(node) => node.getxattr(name),
            ResourceNode::Script(script) => Err(script.denied("getxattr")),
        }
    }

    pub fn listxattr(&self) -> FsResult<Vec<OsString>> {
        match self {
            ResourceNode::Real(node) => node.listxattr(),
            ResourceNode::Script(script) => Err(script.denied("listxattr")),
        }
    }

    pub fn setxattr(&self, name: &OsStr, value: &[u8]) -> FsResult<()> {
        match self {
            ResourceNode::Real(node) => node.setxattr(name, value),
            ResourceNode::Script(script) => Err(script.denied("setxattr")),
        }
    }
}
