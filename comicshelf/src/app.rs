//! Application context and initialization
//!
//! This module opens everything the front end needs from a data directory.
//! The context is created once on startup and passed explicitly.

use crate::config::{DATABASE_FILE_NAME, THUMBNAIL_DIR_NAME};
use crate::database::CatalogManager;
use crate::error::Result;
use crate::services::{CatalogSettings, LibraryService, SettingsService};
use crate::storage::{LocalFolders, ThumbnailStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Central application context holding all services
#[derive(Clone)]
pub struct AppContext {
    pub data_dir: PathBuf,
    pub settings: SettingsService,
    pub catalog: CatalogManager,
    pub library: LibraryService,
    pub thumbnails: ThumbnailStore,
}

impl AppContext {
    /// Open the data directory, creating it if needed, and bring the
    /// catalog to the latest schema.
    pub async fn open(data_dir: PathBuf) -> Result<Self> {
        tracing::info!("Initializing application");
        tracing::info!("Data directory: {:?}", data_dir);

        tokio::fs::create_dir_all(&data_dir).await?;

        let settings = SettingsService::new(data_dir.clone());
        let loaded = settings.load().await?;

        let thumbnails = ThumbnailStore::new(thumbnail_dir(&data_dir, &loaded));
        thumbnails.initialize().await?;

        let catalog = CatalogManager::open(&data_dir.join(DATABASE_FILE_NAME)).await?;
        let library = LibraryService::new(catalog.clone(), Arc::new(LocalFolders));

        tracing::info!("Application initialized successfully");

        Ok(Self {
            data_dir,
            settings,
            catalog,
            library,
            thumbnails,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    /// Close the catalog connection
    pub async fn close(self) {
        self.catalog.connection().close().await;
    }
}

fn thumbnail_dir(data_dir: &std::path::Path, settings: &CatalogSettings) -> PathBuf {
    match &settings.thumbnail_dir {
        Some(dir) => PathBuf::from(dir),
        None => data_dir.join(THUMBNAIL_DIR_NAME),
    }
}

/// Platform data directory for the catalog, e.g. `~/.local/share/comicshelf`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("comicshelf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");

        let ctx = AppContext::open(data_dir.clone()).await.unwrap();

        assert!(ctx.database_path().exists());
        assert!(data_dir.join("settings.json").exists());
        assert!(data_dir.join(THUMBNAIL_DIR_NAME).is_dir());
        assert!(ctx.catalog.get_all_comics().await.unwrap().is_empty());
        ctx.close().await;
    }

    #[tokio::test]
    async fn test_open_uses_configured_thumbnail_dir() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        let custom = temp_dir.path().join("covers");

        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        SettingsService::new(data_dir.clone())
            .update_thumbnail_dir(Some(custom.to_string_lossy().into_owned()))
            .await
            .unwrap();

        let ctx = AppContext::open(data_dir).await.unwrap();
        assert_eq!(ctx.thumbnails.root(), custom.as_path());
        assert!(custom.is_dir());
        ctx.close().await;
    }

    #[test]
    fn test_default_data_dir_is_app_specific() {
        let dir = default_data_dir();
        assert!(dir.ends_with("comicshelf"));
        if let Some(base) = dirs::data_dir() {
            assert_eq!(dir, base.join("comicshelf"));
        }
    }

    #[tokio::test]
    async fn test_reopen_keeps_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().to_path_buf();

        let ctx = AppContext::open(data_dir.clone()).await.unwrap();
        ctx.catalog.add_playlist("Reading").await.unwrap();
        ctx.close().await;

        let ctx = AppContext::open(data_dir).await.unwrap();
        let playlists = ctx.catalog.get_all_playlists(&[]).await.unwrap();
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].name, "Reading");
        ctx.close().await;
    }
}
