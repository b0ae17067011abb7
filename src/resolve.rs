/*!
 * Path Resolution
 * Walks a mount-relative path to exactly one resource node
 */

use std::path::Path;

use crate::manifest::Manifest;
use crate::mount::Mount;
use crate::node::{RealNode, ResourceNode, ScriptFile};

/// Resolves slash-separated paths against a mount.
///
/// Each non-empty segment descends through the real tree when the name
/// physically exists in the current directory, otherwise through the
/// directory's manifest. Real entries always shadow virtual ones.
/// Resolution never fails: an unmatched segment yields a real node at
/// the literal joined path, so operations like `create` can target
/// not-yet-existing names and existence errors surface from the
/// delegated OS call instead.
pub struct PathResolver<'a> {
    mount: &'a Mount,
}

impl<'a> PathResolver<'a> {
    pub fn new(mount: &'a Mount) -> Self {
        Self { mount }
    }

    /// Resolve `path` (mount-relative, `/`-separated) to a node.
    /// Manifests are re-read on every call so edits take effect
    /// without remounting.
    #[must_use]
    pub fn resolve(&self, path: &str) -> ResourceNode {
        let mut dir = self.mount.root().to_path_buf();
        let mut node = None;

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let candidate = dir.join(segment);
            if candidate.symlink_metadata().is_ok() {
                node = Some(ResourceNode::Real(RealNode::new(candidate.clone())));
            } else {
                let manifest = Manifest::load(&dir);
                node = Some(match manifest.get(segment) {
                    Some(entry) => ResourceNode::Script(ScriptFile::from_entry(
                        entry,
                        manifest.dir(),
                        self.mount,
                    )),
                    // Best-effort node at the literal path; descending
                    // past a virtual file degrades the same way.
                    None => ResourceNode::Real(RealNode::new(candidate.clone())),
                });
            }
            dir = candidate;
        }

        node.unwrap_or_else(|| ResourceNode::Real(RealNode::new(dir)))
    }

    /// Real path under the mount root for a mount-relative path,
    /// regardless of whether anything exists there. Used by operations
    /// whose second argument names a destination (rename, link).
    #[must_use]
    pub fn real_path(&self, path: &str) -> std::path::PathBuf {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            self.mount.root().to_path_buf()
        } else {
            self.mount.root().join(relative)
        }
    }
}

/// Convenience wrapper used by the facade.
pub fn resolve(mount: &Mount, path: &str) -> ResourceNode {
    PathResolver::new(mount).resolve(path)
}
