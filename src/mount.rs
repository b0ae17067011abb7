/*!
 * Mount State
 * Source root, mount point, and the cache-policy registry shared by
 * every resolution for the mount's lifetime
 */

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use dashmap::DashMap;

use crate::cache::CachePolicy;
use crate::manifest::{CacheMethod, ManifestEntry};

/// Default debounce window when a manifest does not set one.
const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Process-lifetime state for one mounted overlay.
///
/// Owns the cache-policy registry, keyed by the virtual file's full
/// path: nodes are rebuilt on every resolution, so witness and value
/// must live here to survive, and each manifest entry keeps its own
/// generation state. Pass-through policies are stateless and never
/// registered.
pub struct Mount {
    root: PathBuf,
    mountpoint: PathBuf,
    policies: DashMap<PathBuf, Arc<CachePolicy>, RandomState>,
}

impl Mount {
    /// Create mount state over `root`, exposed at `mountpoint`. Both
    /// must exist; both are canonicalized.
    pub fn new(root: impl AsRef<Path>, mountpoint: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            root: root.as_ref().canonicalize()?,
            mountpoint: mountpoint.as_ref().canonicalize()?,
            policies: DashMap::with_hasher(RandomState::new()),
        })
    }

    /// Absolute path of the backing source tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path where the overlay is exposed.
    #[must_use]
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Policy instance for one manifest entry, created on first use
    /// and reused for the mount's lifetime.
    pub fn policy_for(&self, entry: &ManifestEntry, manifest_dir: &Path) -> Arc<CachePolicy> {
        let Some(spec) = entry.cache.as_ref() else {
            return Arc::new(CachePolicy::pass_through());
        };

        let key = manifest_dir.join(&entry.filename);
        self.policies
            .entry(key)
            .or_insert_with(|| match spec.method {
                CacheMethod::Stat => {
                    let watch = match spec.path.as_deref() {
                        Some(p) if !p.is_empty() => {
                            let p = Path::new(p);
                            if p.is_absolute() {
                                p.to_path_buf()
                            } else {
                                manifest_dir.join(p)
                            }
                        }
                        _ => manifest_dir.to_path_buf(),
                    };
                    Arc::new(CachePolicy::mtime_watch(watch, spec.recurse))
                }
                CacheMethod::Debounce => {
                    let window = spec
                        .window_secs
                        .map(Duration::from_secs)
                        .unwrap_or(DEFAULT_DEBOUNCE);
                    Arc::new(CachePolicy::time_debounce(window))
                }
            })
            .value()
            .clone()
    }
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("root", &self.root)
            .field("mountpoint", &self.mountpoint)
            .field("policies", &self.policies.len())
            .finish()
    }
}
