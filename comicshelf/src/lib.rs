//! comicshelf library
//!
//! This library exposes the comic catalog: the versioned SQLite migration
//! engine, the comic/tag/playlist data-access layer and the library folder
//! scanner that feeds it.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod storage;

pub use app::AppContext;
pub use database::{CatalogManager, Comic, ComicMetadata, MetadataUpdate, Playlist};
pub use error::{AppError, Result};
