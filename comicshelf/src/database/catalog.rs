//! Catalog data access
//!
//! `CatalogManager` is the only write path to the catalog. Multi-row writes
//! run in one transaction and are rolled back as a whole on failure.
//! `ScopedCatalog` carries the same primitives bound to a single borrowed
//! connection, which is how migration hooks reach the catalog from inside
//! their transaction.

use super::connection::{finish, Connection};
use super::models::{Comic, ComicMetadata, Playlist};
use super::row_reader::RowReader;
use super::runner::MigrationRunner;
use crate::error::{AppError, Result};
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

const COMIC_COLUMNS: &[&str] = &[
    "path",
    "unique_identifier",
    "title",
    "author",
    "category",
    "display_title",
    "thumbnail_source",
    "date_added",
    "loved",
    "disliked",
];

const SELECT_ACTIVE_COMICS: &str = r#"
    SELECT path, unique_identifier, title, author, category, display_title,
           thumbnail_source, date_added, loved, disliked
    FROM comics
    WHERE active = 1
    ORDER BY unique_identifier
"#;

const METADATA_COLUMNS: &[&str] = &[
    "display_title",
    "thumbnail_source",
    "date_added",
    "loved",
    "disliked",
];

const SELECT_METADATA: &str = r#"
    SELECT display_title, thumbnail_source, date_added, loved, disliked
    FROM comics
    WHERE unique_identifier = ?
"#;

const COMIC_TAG_COLUMNS: &[&str] = &["tag", "name"];

const SELECT_COMIC_TAGS: &str = r#"
    SELECT ct.tag AS tag, t.name AS name
    FROM comic_tags ct
    LEFT JOIN tags t ON t.name = ct.tag
    WHERE ct.comic = ?
    ORDER BY ct.tag
"#;

const UPSERT_COMIC: &str = r#"
    INSERT INTO comics (
        path, unique_identifier, title, author, category, display_title,
        thumbnail_source, date_added, loved, disliked, active
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
    ON CONFLICT(unique_identifier) DO UPDATE SET
        path = excluded.path,
        title = excluded.title,
        author = excluded.author,
        category = excluded.category,
        display_title = excluded.display_title,
        thumbnail_source = excluded.thumbnail_source,
        date_added = excluded.date_added,
        loved = excluded.loved,
        disliked = excluded.disliked,
        active = 1
"#;

const MEMBERSHIP_COLUMNS: &[&str] = &["playlist", "comic"];

const FOREIGN_KEY_CHECK_COLUMNS: &[&str] = &["table", "parent"];

/// Catalog primitives bound to one connection or open transaction
pub struct ScopedCatalog<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ScopedCatalog<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Raw access for statements the catalog has no primitive for.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut *self.conn
    }

    /// All active comics with metadata and tags.
    pub async fn active_comics(&mut self) -> Result<Vec<Comic>> {
        let mut rows = Vec::new();
        {
            let stream = sqlx::query(SELECT_ACTIVE_COMICS).fetch(&mut *self.conn);
            let mut reader = RowReader::new(stream, COMIC_COLUMNS);
            while reader.advance().await? {
                rows.push(ComicRow::read(&reader)?);
            }
        }

        let mut comics = Vec::with_capacity(rows.len());
        for row in rows {
            let tags = self.tags_of(&row.unique_identifier).await?;
            comics.push(row.into_comic(tags)?);
        }

        Ok(comics)
    }

    /// Stored metadata for a comic, active or not.
    pub async fn metadata(&mut self, unique_identifier: &str) -> Result<Option<ComicMetadata>> {
        let found = {
            let stream = sqlx::query(SELECT_METADATA)
                .bind(unique_identifier)
                .fetch(&mut *self.conn);
            let mut reader = RowReader::new(stream, METADATA_COLUMNS);
            if reader.advance().await? {
                Some(read_metadata(&reader)?)
            } else {
                None
            }
        };

        match found {
            Some(mut metadata) => {
                metadata.tags = self.tags_of(unique_identifier).await?;
                Ok(Some(metadata))
            }
            None => Ok(None),
        }
    }

    /// Tag names associated with a comic.
    ///
    /// An association naming a tag that does not exist means the store is
    /// corrupt; it is reported as `DanglingTag` and never skipped.
    pub async fn tags_of(&mut self, unique_identifier: &str) -> Result<BTreeSet<String>> {
        let stream = sqlx::query(SELECT_COMIC_TAGS)
            .bind(unique_identifier)
            .fetch(&mut *self.conn);
        let mut reader = RowReader::new(stream, COMIC_TAG_COLUMNS);

        let mut tags = BTreeSet::new();
        while reader.advance().await? {
            let tag = reader.get_string("tag")?;
            match reader.get_optional_string("name")? {
                Some(name) => {
                    tags.insert(name);
                }
                None => {
                    return Err(AppError::DanglingTag {
                        comic: unique_identifier.to_string(),
                        tag,
                    })
                }
            }
        }

        Ok(tags)
    }

    /// Insert the comic, or overwrite and reactivate the stored row, then
    /// replace its tag associations.
    pub async fn upsert_comic(&mut self, comic: &Comic) -> Result<()> {
        let id = comic.unique_identifier();
        let metadata = comic.metadata();

        sqlx::query(UPSERT_COMIC)
            .bind(comic.path())
            .bind(&id)
            .bind(comic.title())
            .bind(comic.author())
            .bind(comic.category())
            .bind(&metadata.display_title)
            .bind(&metadata.thumbnail_source)
            .bind(&metadata.date_added)
            .bind(metadata.loved)
            .bind(metadata.disliked)
            .execute(&mut *self.conn)
            .await?;

        sqlx::query("DELETE FROM comic_tags WHERE comic = ?")
            .bind(&id)
            .execute(&mut *self.conn)
            .await?;

        for tag in &metadata.tags {
            sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
                .bind(tag)
                .execute(&mut *self.conn)
                .await?;
            sqlx::query("INSERT OR IGNORE INTO comic_tags (comic, tag) VALUES (?, ?)")
                .bind(&id)
                .bind(tag)
                .execute(&mut *self.conn)
                .await?;
        }

        tracing::debug!("Saved comic: {}", id);
        Ok(())
    }

    /// Set the active flag. Returns false if the comic is not stored.
    pub async fn set_active(&mut self, unique_identifier: &str, active: bool) -> Result<bool> {
        let rows = sqlx::query("UPDATE comics SET active = ? WHERE unique_identifier = ?")
            .bind(active)
            .bind(unique_identifier)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();

        Ok(rows > 0)
    }

    pub async fn all_tags(&mut self) -> Result<Vec<String>> {
        let tags = sqlx::query_scalar("SELECT name FROM tags ORDER BY name")
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(tags)
    }

    pub async fn playlist_exists(&mut self, name: &str) -> Result<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT name FROM playlists WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(found.is_some())
    }

    pub async fn insert_playlist(&mut self, name: &str) -> Result<()> {
        sqlx::query("INSERT INTO playlists (name) VALUES (?)")
            .bind(name)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Delete a playlist and its memberships. Returns false if it did not exist.
    pub async fn delete_playlist(&mut self, name: &str) -> Result<bool> {
        sqlx::query("DELETE FROM playlist_items WHERE playlist = ?")
            .bind(name)
            .execute(&mut *self.conn)
            .await?;
        let rows = sqlx::query("DELETE FROM playlists WHERE name = ?")
            .bind(name)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    /// Move memberships from `old_name` to a newly created `new_name`.
    pub async fn move_playlist(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        self.insert_playlist(new_name).await?;
        sqlx::query("UPDATE playlist_items SET playlist = ? WHERE playlist = ?")
            .bind(new_name)
            .bind(old_name)
            .execute(&mut *self.conn)
            .await?;
        sqlx::query("DELETE FROM playlists WHERE name = ?")
            .bind(old_name)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn playlist_names(&mut self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM playlists ORDER BY name")
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(names)
    }

    /// Every `(playlist, comic identifier)` membership pair.
    pub async fn playlist_memberships(&mut self) -> Result<Vec<(String, String)>> {
        let stream = sqlx::query("SELECT playlist, comic FROM playlist_items ORDER BY playlist, comic")
            .fetch(&mut *self.conn);
        let mut reader = RowReader::new(stream, MEMBERSHIP_COLUMNS);

        let mut memberships = Vec::new();
        while reader.advance().await? {
            memberships.push((reader.get_string("playlist")?, reader.get_string("comic")?));
        }
        Ok(memberships)
    }

    /// Returns false if the comic was already a member.
    pub async fn add_playlist_item(&mut self, playlist: &str, unique_identifier: &str) -> Result<bool> {
        let rows = sqlx::query("INSERT OR IGNORE INTO playlist_items (playlist, comic) VALUES (?, ?)")
            .bind(playlist)
            .bind(unique_identifier)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    /// Returns false if the comic was not a member.
    pub async fn remove_playlist_item(
        &mut self,
        playlist: &str,
        unique_identifier: &str,
    ) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM playlist_items WHERE playlist = ? AND comic = ?")
            .bind(playlist)
            .bind(unique_identifier)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    /// Upsert every comic in order.
    pub async fn upsert_comics(&mut self, comics: &[Comic]) -> Result<()> {
        for comic in comics {
            self.upsert_comic(comic).await?;
        }
        Ok(())
    }

    /// Clear the active flag of every stored comic in `comics`.
    pub async fn deactivate_comics(&mut self, comics: &[Comic]) -> Result<()> {
        for comic in comics {
            let id = comic.unique_identifier();
            if !self.set_active(&id, false).await? {
                tracing::debug!("Comic not in catalog, nothing to remove: {}", id);
            }
        }
        Ok(())
    }

    /// Save the comics found by a scan and soft-delete the ones that vanished.
    pub async fn apply_scan(&mut self, found: &[Comic], missing: &[Comic]) -> Result<()> {
        self.upsert_comics(found).await?;
        self.deactivate_comics(missing).await
    }

    /// Create a playlist, refusing names already taken.
    pub async fn create_playlist(&mut self, name: &str) -> Result<()> {
        if self.playlist_exists(name).await? {
            return Err(AppError::PlaylistExists(name.to_string()));
        }
        self.insert_playlist(name).await
    }

    pub async fn rename_playlist(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        if !self.playlist_exists(old_name).await? {
            return Err(AppError::PlaylistNotFound(old_name.to_string()));
        }
        if old_name == new_name {
            return Ok(());
        }
        if self.playlist_exists(new_name).await? {
            return Err(AppError::PlaylistExists(new_name.to_string()));
        }
        self.move_playlist(old_name, new_name).await
    }

    /// Returns how many comics were not already members.
    pub async fn add_to_playlist(&mut self, name: &str, comics: &[Comic]) -> Result<usize> {
        if !self.playlist_exists(name).await? {
            return Err(AppError::PlaylistNotFound(name.to_string()));
        }

        let mut added = 0;
        for comic in comics {
            if self.add_playlist_item(name, &comic.unique_identifier()).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Returns how many comics were actually members.
    pub async fn remove_from_playlist(&mut self, name: &str, comics: &[Comic]) -> Result<usize> {
        let mut removed = 0;
        for comic in comics {
            if self
                .remove_playlist_item(name, &comic.unique_identifier())
                .await?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Fail with `DanglingAssociation` if any foreign key points nowhere.
    pub async fn verify_associations(&mut self) -> Result<()> {
        let stream = sqlx::query("PRAGMA foreign_key_check").fetch(&mut *self.conn);
        let mut reader = RowReader::new(stream, FOREIGN_KEY_CHECK_COLUMNS);

        if reader.advance().await? {
            let table = reader.get_string("table")?;
            let parent = reader.get_string("parent")?;
            tracing::error!("Association table {} references missing {} rows", table, parent);
            return Err(AppError::DanglingAssociation(table));
        }

        Ok(())
    }
}

/// A comic row before its tags are attached
struct ComicRow {
    path: String,
    unique_identifier: String,
    title: String,
    author: String,
    category: String,
    metadata: ComicMetadata,
}

impl ComicRow {
    fn read(reader: &RowReader<'_>) -> Result<Self> {
        Ok(Self {
            path: reader.get_string("path")?,
            unique_identifier: reader.get_string("unique_identifier")?,
            title: reader.get_string("title")?,
            author: reader.get_string("author")?,
            category: reader.get_string("category")?,
            metadata: read_metadata(reader)?,
        })
    }

    fn into_comic(self, tags: BTreeSet<String>) -> Result<Comic> {
        let metadata = ComicMetadata { tags, ..self.metadata };
        Comic::with_stored_metadata(self.path, self.title, self.author, self.category, metadata)
    }
}

fn read_metadata(reader: &RowReader<'_>) -> Result<ComicMetadata> {
    Ok(ComicMetadata {
        display_title: reader.get_optional_string("display_title")?,
        tags: BTreeSet::new(),
        loved: reader.get_bool("loved")?,
        disliked: reader.get_bool("disliked")?,
        thumbnail_source: reader.get_optional_string("thumbnail_source")?,
        date_added: reader.get_string("date_added")?,
    })
}

/// Domain-facing catalog API
#[derive(Clone, Debug)]
pub struct CatalogManager {
    conn: Connection,
}

impl CatalogManager {
    /// Open the catalog at `db_path`, migrating it to the latest schema.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::migrated(conn).await
    }

    /// Open a fresh in-memory catalog at the latest schema.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::migrated(conn).await
    }

    async fn migrated(conn: Connection) -> Result<Self> {
        let runner = MigrationRunner::catalog()?;
        let applied = runner.open(&conn).await?;
        tracing::info!(
            "Catalog ready at schema version {} ({} migrations applied)",
            runner.latest_version(),
            applied
        );
        Ok(Self { conn })
    }

    /// Wrap a connection whose schema is already current.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// All active comics, fully hydrated.
    pub async fn get_all_comics(&self) -> Result<Vec<Comic>> {
        let mut db = self.conn.acquire().await?;
        ScopedCatalog::new(&mut db).active_comics().await
    }

    /// Stored metadata for `comic`, or `None` if it was never saved.
    pub async fn try_get_metadata(&self, comic: &Comic) -> Result<Option<ComicMetadata>> {
        let mut db = self.conn.acquire().await?;
        ScopedCatalog::new(&mut db)
            .metadata(&comic.unique_identifier())
            .await
    }

    /// Insert new comics and update (reactivating) known ones, all or nothing.
    pub async fn add_or_update_comics(&self, comics: &[Comic]) -> Result<()> {
        tracing::info!("Saving {} comics", comics.len());

        let mut tx = self.conn.begin().await?;
        let result = ScopedCatalog::new(&mut tx).upsert_comics(comics).await;
        finish(tx, result).await
    }

    /// Soft-delete comics. Rows, tags and playlist memberships are kept.
    pub async fn remove_comics(&self, comics: &[Comic]) -> Result<()> {
        tracing::info!("Removing {} comics", comics.len());

        let mut tx = self.conn.begin().await?;
        let result = ScopedCatalog::new(&mut tx).deactivate_comics(comics).await;
        finish(tx, result).await
    }

    /// Save `found` and soft-delete `missing` in a single transaction.
    pub async fn apply_scan(&self, found: &[Comic], missing: &[Comic]) -> Result<()> {
        tracing::info!(
            "Applying scan: {} found, {} missing",
            found.len(),
            missing.len()
        );

        let mut tx = self.conn.begin().await?;
        let result = ScopedCatalog::new(&mut tx).apply_scan(found, missing).await;
        finish(tx, result).await
    }

    /// Merge stored metadata into freshly scanned comics. Storage is untouched.
    pub async fn retrieve_known_metadata(&self, comics: &[Comic]) -> Result<Vec<Comic>> {
        let mut db = self.conn.acquire().await?;
        let mut catalog = ScopedCatalog::new(&mut db);

        let mut enriched = Vec::with_capacity(comics.len());
        for comic in comics {
            match catalog.metadata(&comic.unique_identifier()).await? {
                Some(metadata) => enriched.push(comic.with_metadata(metadata.into())),
                None => enriched.push(comic.clone()),
            }
        }
        Ok(enriched)
    }

    /// Every tag name, sorted.
    pub async fn get_all_tags(&self) -> Result<Vec<String>> {
        let mut db = self.conn.acquire().await?;
        ScopedCatalog::new(&mut db).all_tags().await
    }

    pub async fn add_playlist(&self, name: &str) -> Result<()> {
        validate_playlist_name(name)?;

        let mut tx = self.conn.begin().await?;
        let result = ScopedCatalog::new(&mut tx).create_playlist(name).await;
        finish(tx, result).await?;

        tracing::info!("Created playlist: {}", name);
        Ok(())
    }

    /// Delete a playlist. Removing a missing playlist is a no-op.
    pub async fn remove_playlist(&self, name: &str) -> Result<()> {
        let mut tx = self.conn.begin().await?;
        let result = ScopedCatalog::new(&mut tx).delete_playlist(name).await;
        if finish(tx, result).await? {
            tracing::info!("Removed playlist: {}", name);
        }
        Ok(())
    }

    pub async fn rename_playlist(&self, old_name: &str, new_name: &str) -> Result<()> {
        validate_playlist_name(new_name)?;

        let mut tx = self.conn.begin().await?;
        let result = ScopedCatalog::new(&mut tx)
            .rename_playlist(old_name, new_name)
            .await;
        finish(tx, result).await?;

        tracing::info!("Renamed playlist {} to {}", old_name, new_name);
        Ok(())
    }

    /// All playlists, with membership resolved against `comics`.
    ///
    /// Members missing from `comics` (e.g. inactive ones) are left out.
    pub async fn get_all_playlists(&self, comics: &[Comic]) -> Result<Vec<Playlist>> {
        let mut db = self.conn.acquire().await?;
        let mut catalog = ScopedCatalog::new(&mut db);

        let names = catalog.playlist_names().await?;
        let memberships = catalog.playlist_memberships().await?;

        let by_id: HashMap<String, &Comic> = comics
            .iter()
            .map(|comic| (comic.unique_identifier(), comic))
            .collect();

        let mut playlists: BTreeMap<String, Playlist> = names
            .into_iter()
            .map(|name| (name.clone(), Playlist::new(name)))
            .collect();

        for (playlist, id) in memberships {
            if let (Some(entry), Some(comic)) = (playlists.get_mut(&playlist), by_id.get(&id)) {
                entry.comics.push((*comic).clone());
            }
        }

        Ok(playlists.into_values().collect())
    }

    /// Add comics to a playlist. Existing members are left as they are.
    pub async fn add_comics_to_playlist(&self, name: &str, comics: &[Comic]) -> Result<()> {
        let mut tx = self.conn.begin().await?;
        let result = ScopedCatalog::new(&mut tx).add_to_playlist(name, comics).await;
        let added = finish(tx, result).await?;

        tracing::debug!("Added {} comics to playlist {}", added, name);
        Ok(())
    }

    /// Remove comics from a playlist. Non-members are ignored.
    pub async fn remove_comics_from_playlist(&self, name: &str, comics: &[Comic]) -> Result<()> {
        let mut tx = self.conn.begin().await?;
        let result = ScopedCatalog::new(&mut tx)
            .remove_from_playlist(name, comics)
            .await;
        let removed = finish(tx, result).await?;

        tracing::debug!("Removed {} comics from playlist {}", removed, name);
        Ok(())
    }
}

fn validate_playlist_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Generic("Playlist name must not be empty".to_string()));
    }
    Ok(())
}
