/*!
 * Cache Policies
 * Decide when a virtual file's generator is re-run versus served from
 * the stored result
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tracing::debug;

/// Stored generation state: the last produced value and the witness
/// that proved it valid at the time.
#[derive(Debug)]
struct CacheEntry<W> {
    witness: W,
    value: Arc<Vec<u8>>,
}

/// Per-entry cache-invalidation policy.
///
/// Policy state sits behind a single mutex per instance, held across
/// the generator run: one in-flight generation per key, late arrivals
/// wait and reuse the fresh result.
#[derive(Debug)]
pub enum CachePolicy {
    /// Run the generator on every call. The default.
    PassThrough,
    /// Re-run when the watched path's modification time changes;
    /// with `recurse`, when the newest mtime across the path and every
    /// directory beneath it changes.
    MtimeWatch {
        watch: PathBuf,
        recurse: bool,
        state: Mutex<Option<CacheEntry<SystemTime>>>,
    },
    /// Re-run only when more than `window` has elapsed since the last
    /// run, coalescing bursts of reads into one execution.
    TimeDebounce {
        window: Duration,
        state: Mutex<Option<CacheEntry<Instant>>>,
    },
}

impl CachePolicy {
    #[must_use]
    pub fn pass_through() -> Self {
        CachePolicy::PassThrough
    }

    #[must_use]
    pub fn mtime_watch(watch: PathBuf, recurse: bool) -> Self {
        CachePolicy::MtimeWatch {
            watch,
            recurse,
            state: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn time_debounce(window: Duration) -> Self {
        CachePolicy::TimeDebounce {
            window,
            state: Mutex::new(None),
        }
    }

    /// Current content for the entry this policy guards: the stored
    /// value when still valid, otherwise the result of `produce`,
    /// which is stored along with a fresh witness.
    pub fn current<F>(&self, produce: F) -> Arc<Vec<u8>>
    where
        F: FnOnce() -> Vec<u8>,
    {
        match self {
            CachePolicy::PassThrough => Arc::new(produce()),

            CachePolicy::MtimeWatch {
                watch,
                recurse,
                state,
            } => {
                let mut state = state.lock();
                let witness = watched_mtime(watch, *recurse);
                if let (Some(entry), Some(current)) = (state.as_ref(), witness) {
                    if entry.witness == current {
                        return entry.value.clone();
                    }
                }
                let value = Arc::new(produce());
                *state = witness.map(|w| CacheEntry {
                    witness: w,
                    value: value.clone(),
                });
                value
            }

            CachePolicy::TimeDebounce { window, state } => {
                let mut state = state.lock();
                if let Some(entry) = state.as_ref() {
                    if entry.witness.elapsed() <= *window {
                        return entry.value.clone();
                    }
                }
                let value = Arc::new(produce());
                *state = Some(CacheEntry {
                    witness: Instant::now(),
                    value: value.clone(),
                });
                value
            }
        }
    }
}

/// Modification-time witness for a watched path. `None` when the path
/// cannot be stat'ed, which forces regeneration on every call.
fn watched_mtime(watch: &Path, recurse: bool) -> Option<SystemTime> {
    let top = match fs::metadata(watch).and_then(|md| md.modified()) {
        Ok(t) => t,
        Err(e) => {
            debug!(watch = %watch.display(), error = %e, "watch path not stattable");
            return None;
        }
    };
    if !recurse {
        return Some(top);
    }

    // Newest mtime across the watch path and the directories beneath it.
    let mut newest = top;
    let mut stack = vec![watch.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if let Ok(modified) = entry.metadata().and_then(|md| md.modified()) {
                    newest = newest.max(modified);
                }
                stack.push(entry.path());
            }
        }
    }
    Some(newest)
}
