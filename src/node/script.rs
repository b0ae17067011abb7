/*!
 * Script Files
 * Read-only virtual files whose content is generated on demand
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::CachePolicy;
use crate::command::CommandRunner;
use crate::manifest::ManifestEntry;
use crate::mount::Mount;
use crate::types::{FileStat, FsError};

/// A manifest-declared virtual file.
///
/// Immutable once constructed. Content comes from the cache policy,
/// which invokes the command runner on a miss. Every mutating
/// operation is rejected with a permission error; attributes are
/// synthetic.
#[derive(Debug)]
pub struct ScriptFile {
    path: PathBuf,
    runner: CommandRunner,
    cache: Arc<CachePolicy>,
}

impl ScriptFile {
    /// Build from a manifest entry declared in `manifest_dir`.
    pub fn from_entry(entry: &ManifestEntry, manifest_dir: &Path, mount: &Mount) -> Self {
        let runner = CommandRunner::new(
            entry.out_script.clone(),
            entry.resolved_workdir(manifest_dir),
            entry.env.clone(),
            mount.mountpoint().to_path_buf(),
        );
        Self {
            path: manifest_dir.join(&entry.filename),
            runner,
            cache: mount.policy_for(entry, manifest_dir),
        }
    }

    /// Virtual path of the entry, for diagnostics.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content: served from the cache when the policy's
    /// witness still holds, regenerated otherwise.
    pub fn content(&self) -> Arc<Vec<u8>> {
        self.cache.current(|| self.runner.run())
    }

    /// Synthetic attributes: regular read-only file, epoch timestamps,
    /// size equal to the current content length.
    pub fn getattr(&self) -> FileStat {
        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();
        FileStat::generated(self.content().len() as u64, uid, gid)
    }

    /// Byte slice `[offset, offset + size)` of the content, clipped to
    /// the content length. Offsets at or past the end yield an empty
    /// result, never an error.
    pub fn read(&self, size: u32, offset: i64) -> Vec<u8> {
        let content = self.content();
        let len = content.len();
        let start = offset.max(0) as usize;
        if start >= len {
            return Vec::new();
        }
        let end = len.min(start.saturating_add(size as usize));
        content[start..end].to_vec()
    }

    /// Uniform rejection for mutating and directory operations.
    pub fn denied(&self, op: &str) -> FsError {
        FsError::PermissionDenied(format!("{} {}", op, self.path.display()))
    }
}
