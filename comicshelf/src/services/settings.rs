//! Settings service
//!
//! Manages catalog settings persistence using JSON file storage.

use crate::config::SETTINGS_FILE_NAME;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Catalog settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CatalogSettings {
    /// Library folders scanned when no roots are given
    #[serde(default)]
    pub library_roots: Vec<String>,
    /// Custom thumbnail location (if None, uses data_dir/thumbnails)
    #[serde(default)]
    pub thumbnail_dir: Option<String>,
}

/// Service for managing catalog settings
#[derive(Clone, Debug)]
pub struct SettingsService {
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            settings_path: data_dir.join(SETTINGS_FILE_NAME),
        }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<CatalogSettings> {
        if !fs::try_exists(&self.settings_path).await? {
            tracing::info!("Settings file not found, creating default settings");
            let default = CatalogSettings::default();
            self.save(&default).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(&self.settings_path).await?;
        let settings: CatalogSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Generic(format!("Failed to parse settings: {}", e)))?;

        Ok(settings)
    }

    /// Save settings to disk
    pub async fn save(&self, settings: &CatalogSettings) -> Result<()> {
        let content = serde_json::to_string_pretty(settings)?;

        fs::write(&self.settings_path, content).await?;
        tracing::info!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }

    /// Get library roots
    pub async fn get_library_roots(&self) -> Result<Vec<String>> {
        let settings = self.load().await?;
        Ok(settings.library_roots)
    }

    /// Add library roots, keeping existing ones and their order
    pub async fn remember_library_roots(&self, roots: &[String]) -> Result<()> {
        let mut settings = self.load().await?;
        let before = settings.library_roots.len();
        for root in roots {
            if !settings.library_roots.contains(root) {
                settings.library_roots.push(root.clone());
            }
        }

        if settings.library_roots.len() != before {
            self.save(&settings).await?;
        }
        Ok(())
    }

    /// Update thumbnail folder
    pub async fn update_thumbnail_dir(&self, thumbnail_dir: Option<String>) -> Result<()> {
        let mut settings = self.load().await?;
        settings.thumbnail_dir = thumbnail_dir;
        self.save(&settings).await?;
        Ok(())
    }
}
