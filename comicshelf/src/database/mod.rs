//! Database module
//!
//! This module provides all catalog storage functionality:
//! - Connection handling over a single SQLite connection
//! - Versioned migrations and the runner that applies them
//! - Keyed-column row reading
//! - Model definitions and the catalog manager

pub mod catalog;
pub mod connection;
pub mod migration;
pub mod migrations;
pub mod models;
pub mod row_reader;
pub mod runner;

pub use catalog::{CatalogManager, ScopedCatalog};
pub use connection::Connection;
pub use migration::{Migration, MigrationHook, MigrationStep};
pub use models::*;
pub use row_reader::RowReader;
pub use runner::MigrationRunner;
