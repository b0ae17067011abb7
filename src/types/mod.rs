/*!
 * Shared Types
 * Error, metadata, and directory-entry types used across the engine
 */

pub mod entry;
pub mod errors;
pub mod metadata;

pub use entry::{DirEntry, FileType};
pub use errors::{FsError, FsResult};
pub use metadata::{FileStat, FsStats};
