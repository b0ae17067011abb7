/*!
 * scriptfs Library
 * Overlay filesystem engine with manifest-declared virtual files
 */

pub mod cache;
pub mod command;
pub mod facade;
pub mod fuse;
pub mod manifest;
pub mod mount;
pub mod node;
pub mod resolve;
pub mod tracer;
pub mod types;

// Re-exports
pub use cache::CachePolicy;
pub use command::CommandRunner;
pub use facade::FilesystemFacade;
pub use manifest::{CacheMethod, CacheSpec, Manifest, ManifestEntry, MANIFEST_FILE};
pub use mount::Mount;
pub use node::{RealNode, ResourceNode, ScriptFile};
pub use resolve::PathResolver;
pub use tracer::init_tracing;
pub use types::{DirEntry, FileStat, FileType, FsError, FsResult, FsStats};
