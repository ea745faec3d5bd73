//! Storage module
//!
//! Filesystem-facing collaborators of the catalog: library folder
//! enumeration and thumbnail file naming.

pub mod library;
pub mod thumbnails;

pub use library::{scan_library, FolderSource, LocalFolders};
pub use thumbnails::{thumbnail_path, ThumbnailStore};
