//! Library folder enumeration
//!
//! A library root is laid out as `root/<category>/<author>/<title>`, one
//! folder per comic. Enumeration sits behind `FolderSource` so the catalog
//! can be fed from anything that can list child folders.

use crate::database::Comic;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Lists the child folders of a path
#[async_trait]
pub trait FolderSource: Send + Sync {
    /// Child folders of `path`, sorted. Files are not included.
    async fn child_folders(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Folder source backed by the local filesystem
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFolders;

#[async_trait]
impl FolderSource for LocalFolders {
    async fn child_folders(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut folders = Vec::new();
        let mut entries = fs::read_dir(path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                folders.push(entry.path());
            }
        }

        folders.sort();
        Ok(folders)
    }
}

fn folder_name(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str();
    if name.is_none() {
        tracing::warn!("Skipping folder with a non UTF-8 name: {:?}", path);
    }
    name
}

/// Build comics from `root/<category>/<author>/<title>`.
pub async fn scan_library<S>(source: &S, root: &Path) -> Result<Vec<Comic>>
where
    S: FolderSource + ?Sized,
{
    let root = absolute_root(root)?;
    tracing::info!("Scanning library root: {:?}", root);

    let mut comics = Vec::new();
    for category_dir in source.child_folders(&root).await? {
        let Some(category) = folder_name(&category_dir) else {
            continue;
        };

        for author_dir in source.child_folders(&category_dir).await? {
            let Some(author) = folder_name(&author_dir) else {
                continue;
            };

            for title_dir in source.child_folders(&author_dir).await? {
                let Some(title) = folder_name(&title_dir) else {
                    continue;
                };
                let Some(path) = title_dir.to_str() else {
                    tracing::warn!("Skipping comic with a non UTF-8 path: {:?}", title_dir);
                    continue;
                };

                match Comic::new(path, title, author, category) {
                    Ok(comic) => comics.push(comic),
                    Err(e @ (AppError::InvalidComic(_) | AppError::InvalidComicPath { .. })) => {
                        tracing::warn!("Skipping folder {:?}: {}", title_dir, e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    tracing::info!("Found {} comics under {:?}", comics.len(), root);
    Ok(comics)
}

/// Resolve a possibly relative root against the working directory.
pub fn absolute_root(root: &Path) -> Result<PathBuf> {
    if root.is_absolute() {
        Ok(root.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// In-memory folder tree
    struct FakeFolders(HashMap<PathBuf, Vec<PathBuf>>);

    #[async_trait]
    impl FolderSource for FakeFolders {
        async fn child_folders(&self, path: &Path) -> Result<Vec<PathBuf>> {
            Ok(self.0.get(path).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_scan_local_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for comic in ["Manga/Author A/Vol 1", "Manga/Author A/Vol 2", "Western/Author B/Issue"] {
            std::fs::create_dir_all(root.join(comic)).unwrap();
        }
        // Loose files are ignored at every level
        std::fs::write(root.join("Manga").join("notes.txt"), b"x").unwrap();
        std::fs::write(root.join("Manga/Author A/Vol 1/page01.jpg"), b"x").unwrap();

        let comics = scan_library(&LocalFolders, root).await.unwrap();

        let ids: Vec<String> = comics.iter().map(Comic::unique_identifier).collect();
        assert_eq!(ids, vec!["[Author A]Vol 1", "[Author A]Vol 2", "[Author B]Issue"]);
        assert_eq!(comics[2].category(), "Western");
        assert_eq!(Path::new(comics[0].path()), root.join("Manga/Author A/Vol 1"));
    }

    #[tokio::test]
    async fn test_scan_through_custom_source() {
        let root = PathBuf::from("/lib");
        let mut tree = HashMap::new();
        tree.insert(root.clone(), vec![root.join("Cat")]);
        tree.insert(root.join("Cat"), vec![root.join("Cat/Someone")]);
        tree.insert(root.join("Cat/Someone"), vec![root.join("Cat/Someone/Story")]);

        let comics = scan_library(&FakeFolders(tree), &root).await.unwrap();

        assert_eq!(comics.len(), 1);
        assert_eq!(comics[0].unique_identifier(), "[Someone]Story");
        assert_eq!(comics[0].category(), "Cat");
    }

    #[tokio::test]
    async fn test_invalid_folders_are_skipped() {
        let root = PathBuf::from("/lib");
        let author = root.join("Cat/Someone");
        let mut tree = HashMap::new();
        tree.insert(root.clone(), vec![root.join("Cat")]);
        tree.insert(root.join("Cat"), vec![author.clone()]);
        tree.insert(
            author.clone(),
            vec![author.join(" "), author.join("Good"), author.join("Vol\\1")],
        );

        let comics = scan_library(&FakeFolders(tree), &root).await.unwrap();

        let ids: Vec<String> = comics.iter().map(Comic::unique_identifier).collect();
        assert_eq!(ids, vec!["[Someone]Good"]);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = scan_library(&LocalFolders, &temp_dir.path().join("missing")).await;
        assert!(result.is_err());
    }
}
