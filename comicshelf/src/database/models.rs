//! Catalog models
//!
//! Value types handed across the catalog boundary. A `Comic` is an immutable
//! snapshot; edits produce new values through `with_metadata` and friends,
//! and only the catalog manager writes them back to storage.

use crate::config::DATE_ADDED_FORMAT;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Today's date in the format stored in `comics.date_added`.
pub fn today() -> String {
    chrono::Local::now().format(DATE_ADDED_FORMAT).to_string()
}

/// User-editable metadata owned by exactly one comic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicMetadata {
    pub display_title: Option<String>,
    pub tags: BTreeSet<String>,
    pub loved: bool,
    pub disliked: bool,
    /// Relative to the comic folder, or absolute
    pub thumbnail_source: Option<String>,
    pub date_added: String,
}

impl ComicMetadata {
    /// Metadata for a comic seen for the first time today.
    pub fn fresh() -> Self {
        Self {
            display_title: None,
            tags: BTreeSet::new(),
            loved: false,
            disliked: false,
            thumbnail_source: None,
            date_added: today(),
        }
    }
}

/// Field-by-field metadata edit. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataUpdate {
    pub display_title: Option<Option<String>>,
    pub tags: Option<BTreeSet<String>>,
    pub loved: Option<bool>,
    pub disliked: Option<bool>,
    pub thumbnail_source: Option<Option<String>>,
    pub date_added: Option<String>,
}

impl MetadataUpdate {
    pub fn display_title(mut self, display_title: Option<String>) -> Self {
        self.display_title = Some(display_title);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn loved(mut self, loved: bool) -> Self {
        self.loved = Some(loved);
        self
    }

    pub fn disliked(mut self, disliked: bool) -> Self {
        self.disliked = Some(disliked);
        self
    }

    pub fn thumbnail_source(mut self, thumbnail_source: Option<String>) -> Self {
        self.thumbnail_source = Some(thumbnail_source);
        self
    }

    pub fn date_added(mut self, date_added: impl Into<String>) -> Self {
        self.date_added = Some(date_added.into());
        self
    }

    fn apply(self, base: &ComicMetadata) -> ComicMetadata {
        ComicMetadata {
            display_title: self
                .display_title
                .unwrap_or_else(|| base.display_title.clone()),
            tags: self.tags.unwrap_or_else(|| base.tags.clone()),
            loved: self.loved.unwrap_or(base.loved),
            disliked: self.disliked.unwrap_or(base.disliked),
            thumbnail_source: self
                .thumbnail_source
                .unwrap_or_else(|| base.thumbnail_source.clone()),
            date_added: self.date_added.unwrap_or_else(|| base.date_added.clone()),
        }
    }
}

impl From<ComicMetadata> for MetadataUpdate {
    fn from(metadata: ComicMetadata) -> Self {
        Self {
            display_title: Some(metadata.display_title),
            tags: Some(metadata.tags),
            loved: Some(metadata.loved),
            disliked: Some(metadata.disliked),
            thumbnail_source: Some(metadata.thumbnail_source),
            date_added: Some(metadata.date_added),
        }
    }
}

/// A comic folder in the library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comic {
    path: String,
    title: String,
    author: String,
    category: String,
    metadata: ComicMetadata,
}

impl Comic {
    /// A comic found on disk, with fresh metadata.
    pub fn new(
        path: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        category: impl Into<String>,
    ) -> Result<Self> {
        Self::with_stored_metadata(path, title, author, category, ComicMetadata::fresh())
    }

    /// A comic reconstructed with known metadata (e.g. from a database row).
    pub fn with_stored_metadata(
        path: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        category: impl Into<String>,
        metadata: ComicMetadata,
    ) -> Result<Self> {
        let comic = Self {
            path: path.into(),
            title: title.into(),
            author: author.into(),
            category: category.into(),
            metadata,
        };
        comic.validate()?;
        Ok(comic)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("title", &self.title),
            ("author", &self.author),
            ("category", &self.category),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::InvalidComic(format!("{} must not be empty", field)));
            }
        }

        let segments = path_segments(&self.path);
        let tail_matches = segments.len() >= 2
            && segments[segments.len() - 1] == self.title
            && segments[segments.len() - 2] == self.author;

        if !is_absolute(&self.path) || !tail_matches {
            return Err(AppError::InvalidComicPath {
                path: self.path.clone(),
                author: self.author.clone(),
                title: self.title.clone(),
            });
        }

        Ok(())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn metadata(&self) -> &ComicMetadata {
        &self.metadata
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.metadata.tags
    }

    /// Identity of the comic: `[author]title`
    pub fn unique_identifier(&self) -> String {
        unique_identifier(&self.author, &self.title)
    }

    /// Display title, falling back to the folder title.
    pub fn display_title(&self) -> &str {
        self.metadata.display_title.as_deref().unwrap_or(&self.title)
    }

    /// A copy with `update` merged into the metadata.
    pub fn with_metadata(&self, update: MetadataUpdate) -> Comic {
        Comic {
            metadata: update.apply(&self.metadata),
            ..self.clone()
        }
    }

    /// A copy filed under another category.
    pub fn with_category(&self, category: impl Into<String>) -> Result<Comic> {
        Self::with_stored_metadata(
            self.path.clone(),
            self.title.clone(),
            self.author.clone(),
            category,
            self.metadata.clone(),
        )
    }
}

pub fn unique_identifier(author: &str, title: &str) -> String {
    format!("[{}]{}", author, title)
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty()).collect()
}

fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    // Drive-letter paths such as `C:\Comics`
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// A named set of comics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    /// Ordered by unique identifier, no duplicates
    pub comics: Vec<Comic>,
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comics: Vec::new(),
        }
    }

    pub fn contains(&self, comic: &Comic) -> bool {
        let id = comic.unique_identifier();
        self.comics.iter().any(|c| c.unique_identifier() == id)
    }

    pub fn len(&self) -> usize {
        self.comics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_identifier() {
        let comic = Comic::new("/library/Manga/Author A/Title B", "Title B", "Author A", "Manga")
            .unwrap();

        assert_eq!(comic.unique_identifier(), "[Author A]Title B");
    }

    #[test]
    fn test_windows_paths_accepted() {
        let comic = Comic::new(r"C:\Comics\Manga\Someone\Volume 1", "Volume 1", "Someone", "Manga");
        assert!(comic.is_ok());
    }

    #[test]
    fn test_path_must_end_with_author_and_title() {
        let swapped = Comic::new("/library/Manga/Title/Author", "Title", "Author", "Manga");
        assert!(matches!(swapped, Err(AppError::InvalidComicPath { .. })));

        let too_short = Comic::new("/Title", "Title", "Author", "Manga");
        assert!(matches!(too_short, Err(AppError::InvalidComicPath { .. })));

        let relative = Comic::new("Manga/Author/Title", "Title", "Author", "Manga");
        assert!(matches!(relative, Err(AppError::InvalidComicPath { .. })));
    }

    #[test]
    fn test_empty_fields_rejected() {
        let result = Comic::new("/library/Author/Title", "Title", "Author", "");
        assert!(matches!(result, Err(AppError::InvalidComic(_))));
    }

    #[test]
    fn test_with_metadata_merges_fields() {
        let comic = Comic::new("/lib/Cat/A/T", "T", "A", "Cat").unwrap();
        let date = comic.metadata().date_added.clone();

        let loved = comic.with_metadata(MetadataUpdate::default().loved(true).tags(["x", "y"]));
        assert!(loved.metadata().loved);
        assert_eq!(loved.tags().len(), 2);
        assert_eq!(loved.metadata().date_added, date);

        let renamed =
            loved.with_metadata(MetadataUpdate::default().display_title(Some("Shown".into())));
        assert_eq!(renamed.display_title(), "Shown");
        assert!(renamed.metadata().loved, "unset fields keep their value");
        assert_eq!(renamed.tags(), loved.tags());

        // Original is untouched
        assert!(!comic.metadata().loved);
        assert_eq!(comic.display_title(), "T");
    }

    #[test]
    fn test_with_category_keeps_identity() {
        let comic = Comic::new("/lib/Cat/A/T", "T", "A", "Cat").unwrap();
        let moved = comic.with_category("Other").unwrap();

        assert_eq!(moved.category(), "Other");
        assert_eq!(moved.unique_identifier(), comic.unique_identifier());
    }
}
