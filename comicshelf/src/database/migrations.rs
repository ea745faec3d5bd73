//! Catalog migration history
//!
//! Versions 2 and 3 are stubs: the catalog inherited its database numbering
//! from an earlier product whose databases were already at version 3, and
//! those files must keep opening. Never edit a released migration; append a
//! new version instead.

use super::catalog::ScopedCatalog;
use super::migration::{Migration, MigrationHook};
use super::models::today;
use crate::error::Result;
use async_trait::async_trait;

/// Row-id based schema: comics, tags and their association.
const V1_INITIAL_SCHEMA: &str = r#"
CREATE TABLE comics (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    category TEXT NOT NULL,
    display_title TEXT,
    thumbnail_source TEXT,
    loved INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE comic_tags (
    comic_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    UNIQUE (comic_id, tag_id)
);
"#;

const V4_DISLIKED_AND_DATE_ADDED: &str = r#"
ALTER TABLE comics ADD COLUMN disliked INTEGER NOT NULL DEFAULT 0;
ALTER TABLE comics ADD COLUMN date_added TEXT;
"#;

const V5_PLAYLISTS: &str = r#"
CREATE TABLE playlists (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE playlist_items (
    playlist_id INTEGER NOT NULL,
    comic_id INTEGER NOT NULL,
    UNIQUE (playlist_id, comic_id)
);
"#;

/// Rebuild every table around natural keys.
const V6_NATURAL_KEYS: &str = r#"
ALTER TABLE comics RENAME TO comics_v5;
ALTER TABLE tags RENAME TO tags_v5;
ALTER TABLE comic_tags RENAME TO comic_tags_v5;
ALTER TABLE playlists RENAME TO playlists_v5;
ALTER TABLE playlist_items RENAME TO playlist_items_v5;

CREATE TABLE comics (
    path TEXT NOT NULL,
    unique_identifier TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    category TEXT NOT NULL,
    display_title TEXT,
    thumbnail_source TEXT,
    date_added TEXT NOT NULL,
    loved INTEGER NOT NULL DEFAULT 0,
    disliked INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE tags (
    name TEXT PRIMARY KEY NOT NULL
);

CREATE TABLE comic_tags (
    comic TEXT NOT NULL REFERENCES comics(unique_identifier) ON DELETE CASCADE,
    tag TEXT NOT NULL REFERENCES tags(name) ON DELETE CASCADE,
    PRIMARY KEY (comic, tag)
);

CREATE TABLE playlists (
    name TEXT PRIMARY KEY NOT NULL
);

CREATE TABLE playlist_items (
    playlist TEXT NOT NULL REFERENCES playlists(name) ON DELETE CASCADE,
    comic TEXT NOT NULL REFERENCES comics(unique_identifier) ON DELETE CASCADE,
    PRIMARY KEY (playlist, comic)
);

-- Row-id databases may hold the same [author]title twice, the newest row wins
INSERT OR REPLACE INTO comics (
    path, unique_identifier, title, author, category, display_title,
    thumbnail_source, date_added, loved, disliked, active
)
SELECT
    path, '[' || author || ']' || title, title, author, category, display_title,
    thumbnail_source, COALESCE(date_added, date('now')), loved, disliked, active
FROM comics_v5
ORDER BY id;

INSERT OR IGNORE INTO tags (name)
SELECT name FROM tags_v5;

INSERT OR IGNORE INTO comic_tags (comic, tag)
SELECT '[' || c.author || ']' || c.title, t.name
FROM comic_tags_v5 ct
JOIN comics_v5 c ON c.id = ct.comic_id
JOIN tags_v5 t ON t.id = ct.tag_id;

INSERT OR IGNORE INTO playlists (name)
SELECT name FROM playlists_v5;

INSERT OR IGNORE INTO playlist_items (playlist, comic)
SELECT p.name, '[' || c.author || ']' || c.title
FROM playlist_items_v5 pi
JOIN playlists_v5 p ON p.id = pi.playlist_id
JOIN comics_v5 c ON c.id = pi.comic_id;

DROP TABLE playlist_items_v5;
DROP TABLE playlists_v5;
DROP TABLE comic_tags_v5;
DROP TABLE tags_v5;
DROP TABLE comics_v5;

CREATE INDEX idx_comics_active ON comics(active);
CREATE INDEX idx_comic_tags_tag ON comic_tags(tag);
CREATE INDEX idx_playlist_items_comic ON playlist_items(comic);
"#;

/// Dates comics that predate the `date_added` column.
struct BackfillDateAdded;

#[async_trait]
impl MigrationHook for BackfillDateAdded {
    fn name(&self) -> &str {
        "backfill_date_added"
    }

    async fn run(&self, catalog: &mut ScopedCatalog<'_>) -> Result<()> {
        let updated = sqlx::query("UPDATE comics SET date_added = ? WHERE date_added IS NULL")
            .bind(today())
            .execute(catalog.connection())
            .await?
            .rows_affected();

        tracing::info!("Backfilled date_added for {} comics", updated);
        Ok(())
    }
}

/// Fails the migration if any association points at a missing row.
struct VerifyAssociations;

#[async_trait]
impl MigrationHook for VerifyAssociations {
    fn name(&self) -> &str {
        "verify_associations"
    }

    async fn run(&self, catalog: &mut ScopedCatalog<'_>) -> Result<()> {
        catalog.verify_associations().await
    }
}

/// Every catalog migration, version 1 first.
pub fn all() -> Vec<Migration> {
    vec![
        Migration::new(1).script(V1_INITIAL_SCHEMA),
        Migration::stub(2),
        Migration::stub(3),
        Migration::new(4)
            .script(V4_DISLIKED_AND_DATE_ADDED)
            .post_hook(BackfillDateAdded),
        Migration::new(5).script(V5_PLAYLISTS),
        Migration::new(6)
            .script(V6_NATURAL_KEYS)
            .post_hook(VerifyAssociations),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Connection, MigrationRunner};

    async fn migrate_to(conn: &Connection, version: usize) {
        let runner = MigrationRunner::new(all().into_iter().take(version).collect()).unwrap();
        runner.open(conn).await.unwrap();
    }

    async fn column_names(conn: &Connection, table: &str) -> Vec<String> {
        let mut db = conn.acquire().await.unwrap();
        sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{}')", table))
            .fetch_all(&mut *db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_reaches_latest_schema() {
        let conn = Connection::open_in_memory().await.unwrap();
        migrate_to(&conn, all().len()).await;

        assert_eq!(
            column_names(&conn, "comics").await,
            vec![
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
                "active"
            ]
        );
        assert_eq!(column_names(&conn, "comic_tags").await, vec!["comic", "tag"]);
        assert_eq!(
            column_names(&conn, "playlist_items").await,
            vec!["playlist", "comic"]
        );
        for legacy in ["comics_v5", "tags_v5", "comic_tags_v5"] {
            assert!(!conn.table_exists(legacy).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_stubs_do_not_touch_schema() {
        let conn = Connection::open_in_memory().await.unwrap();
        migrate_to(&conn, 1).await;
        let v1 = column_names(&conn, "comics").await;

        migrate_to(&conn, 3).await;
        assert_eq!(column_names(&conn, "comics").await, v1);
    }

    #[tokio::test]
    async fn test_version_four_backfills_date_added() {
        let conn = Connection::open_in_memory().await.unwrap();
        migrate_to(&conn, 3).await;

        conn.execute(
            "INSERT INTO comics (path, title, author, category) \
             VALUES ('/lib/Cat/A/T', 'T', 'A', 'Cat')",
        )
        .await
        .unwrap();

        migrate_to(&conn, 4).await;

        let date: String = conn
            .scalar("SELECT date_added FROM comics WHERE title = 'T'")
            .await
            .unwrap();
        assert_eq!(date, today());
    }
}
