//! Error types for the comic catalog
//!
//! All errors use thiserror for structured error handling.
//! Structural errors (bad migration sets, malformed comics) are programming
//! or deployment defects; callers are expected to surface them and stop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ===== Migration set validation =====
    #[error("No migrations were supplied")]
    NoMigrations,

    #[error("Migration version {0} is declared more than once")]
    DuplicateMigrationVersion(u32),

    #[error("Migration version {0} is missing")]
    MissingMigrationVersion(u32),

    #[error("Migration version {0} is invalid, versions start at 1")]
    InvalidMigrationVersion(u32),

    // ===== Schema state =====
    #[error("Database schema version {stored} is newer than the latest known version {latest}")]
    SchemaTooNew { stored: u32, latest: u32 },

    #[error("Database has not been initialized")]
    DatabaseUninitialized,

    #[error("Migration left schema version at {actual}, expected {expected}")]
    MigrationIntegrity { expected: u32, actual: u32 },

    // ===== Catalog integrity =====
    #[error("Comic {comic} references missing tag {tag}")]
    DanglingTag { comic: String, tag: String },

    #[error("Association table {0} references missing rows")]
    DanglingAssociation(String),

    // ===== Domain =====
    #[error("Comic path {path} does not end with {author}/{title}")]
    InvalidComicPath {
        path: String,
        author: String,
        title: String,
    },

    #[error("Invalid comic: {0}")]
    InvalidComic(String),

    #[error("Playlist not found: {0}")]
    PlaylistNotFound(String),

    #[error("Playlist already exists: {0}")]
    PlaylistExists(String),

    // ===== Row mapping =====
    #[error("Column {0} is not part of the result set")]
    UnknownColumn(String),

    #[error("Row reader has no current row")]
    NoCurrentRow,

    #[error("Column {0} is NULL but a value is required")]
    UnexpectedNull(String),

    #[error("{0}")]
    Generic(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
