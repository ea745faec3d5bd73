//! Thumbnail locations
//!
//! Generated thumbnails are named after the SHA-256 of the comic's unique
//! identifier, so any identifier maps to a flat, filesystem-safe file name.
//! Image encoding lives outside the catalog; this module only names files.
//!
//! Example: "[Author]Title" is stored at "thumbnails/3f1a...9c.jpg"

use crate::config::THUMBNAIL_EXTENSION;
use crate::database::Comic;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

/// File path of the generated thumbnail for `unique_identifier` under `dir`.
pub fn thumbnail_path(dir: &Path, unique_identifier: &str) -> PathBuf {
    dir.join(format!(
        "{}.{}",
        hash_identifier(unique_identifier),
        THUMBNAIL_EXTENSION
    ))
}

/// Absolute path of the comic's chosen thumbnail source, if it has one.
/// Relative sources are resolved against the comic folder.
pub fn resolve_thumbnail_source(comic: &Comic) -> Option<PathBuf> {
    let source = comic.metadata().thumbnail_source.as_deref()?;
    let path = Path::new(source);

    if path.is_absolute() || source.starts_with('/') || source.starts_with('\\') {
        Some(path.to_path_buf())
    } else {
        Some(Path::new(comic.path()).join(path))
    }
}

fn hash_identifier(unique_identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(unique_identifier.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Folder holding generated thumbnails
#[derive(Clone, Debug)]
pub struct ThumbnailStore {
    root: PathBuf,
}

impl ThumbnailStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the thumbnail folder if needed
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        tracing::info!("Thumbnail store initialized at: {:?}", self.root);
        Ok(())
    }

    pub fn path_for(&self, comic: &Comic) -> PathBuf {
        thumbnail_path(&self.root, &comic.unique_identifier())
    }

    pub async fn exists(&self, comic: &Comic) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(comic)).await?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MetadataUpdate;
    use tempfile::TempDir;

    fn comic() -> Comic {
        Comic::new("/library/Manga/Author/Title", "Title", "Author", "Manga").unwrap()
    }

    #[test]
    fn test_thumbnail_path_is_stable_and_flat() {
        let dir = Path::new("/thumbs");
        let first = thumbnail_path(dir, "[Author]Title");
        let second = thumbnail_path(dir, "[Author]Title");
        let other = thumbnail_path(dir, "[Author]Other/Title");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(other.parent().unwrap(), dir);

        let name = first.file_name().unwrap().to_str().unwrap();
        assert_eq!(name.len(), 64 + 4); // SHA-256 hex + ".jpg"
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn test_resolve_relative_and_absolute_sources() {
        let none = comic();
        assert_eq!(resolve_thumbnail_source(&none), None);

        let relative = none.with_metadata(
            MetadataUpdate::default().thumbnail_source(Some("cover.png".to_string())),
        );
        assert_eq!(
            resolve_thumbnail_source(&relative),
            Some(PathBuf::from("/library/Manga/Author/Title/cover.png"))
        );

        let absolute = none.with_metadata(
            MetadataUpdate::default().thumbnail_source(Some("/elsewhere/cover.png".to_string())),
        );
        assert_eq!(
            resolve_thumbnail_source(&absolute),
            Some(PathBuf::from("/elsewhere/cover.png"))
        );
    }

    #[tokio::test]
    async fn test_store_paths() {
        let temp_dir = TempDir::new().unwrap();
        let store = ThumbnailStore::new(temp_dir.path().join("thumbnails"));
        store.initialize().await.unwrap();

        let comic = comic();
        assert!(!store.exists(&comic).await.unwrap());

        tokio::fs::write(store.path_for(&comic), b"jpeg").await.unwrap();
        assert!(store.exists(&comic).await.unwrap());
        assert!(store.path_for(&comic).starts_with(store.root()));
    }
}
