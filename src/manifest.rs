/*!
 * Directory Manifests
 * Per-directory `.config.yml` declarations of generated virtual files
 */

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

/// Manifest file name looked up in every directory of the source tree.
pub const MANIFEST_FILE: &str = ".config.yml";

/// Cache-invalidation method selected by a manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMethod {
    /// Re-run when the watched path's modification time changes.
    Stat,
    /// Re-run when more than the debounce window has elapsed.
    Debounce,
}

/// Cache configuration for one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheSpec {
    pub method: CacheMethod,
    /// Watched path for `stat`, resolved against the manifest's
    /// directory. Defaults to the manifest's directory itself.
    #[serde(default)]
    pub path: Option<String>,
    /// For `stat`: also watch every directory beneath `path`.
    #[serde(default)]
    pub recurse: bool,
    /// For `debounce`: window length in seconds (default 1).
    #[serde(default)]
    pub window_secs: Option<u64>,
}

/// One declared virtual file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    /// Name the entry appears under, unique within the manifest.
    pub filename: String,
    /// Shell command whose standard output becomes the file content.
    pub out_script: String,
    /// Working directory for the command; relative values resolve
    /// against the manifest's directory, which is also the default.
    #[serde(default)]
    pub workdir: Option<String>,
    /// Extra environment variables overlaid on the process environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cache: Option<CacheSpec>,
}

impl ManifestEntry {
    /// Working directory with the manifest-directory default applied.
    #[must_use]
    pub fn resolved_workdir(&self, manifest_dir: &Path) -> PathBuf {
        match self.workdir.as_deref() {
            Some(w) if !w.is_empty() => {
                let p = Path::new(w);
                if p.is_absolute() {
                    p.to_path_buf()
                } else {
                    manifest_dir.join(p)
                }
            }
            _ => manifest_dir.to_path_buf(),
        }
    }
}

/// The parsed manifest of one directory.
///
/// Loading never fails: a missing file is an empty manifest, and a
/// malformed one is logged and treated as empty so a bad edit cannot
/// take every lookup in the directory down with it.
#[derive(Debug, Clone)]
pub struct Manifest {
    dir: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Read `.config.yml` from `dir`. Re-read on every resolution so
    /// edits are picked up without remounting.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let file = dir.join(MANIFEST_FILE);
        let entries = match fs::read_to_string(&file) {
            Ok(text) => match serde_yaml::from_str::<Option<Vec<ManifestEntry>>>(&text) {
                Ok(parsed) => parsed.unwrap_or_default(),
                Err(e) => {
                    warn!(manifest = %file.display(), error = %e, "ignoring malformed manifest");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            dir: dir.to_path_buf(),
            entries,
        }
    }

    /// Directory the manifest belongs to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Declared filenames, in manifest order.
    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.filename.as_str())
    }

    /// Look up an entry by filename. First match wins; filenames are
    /// unique by contract.
    #[must_use]
    pub fn get(&self, filename: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.filename == filename)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
