//! Services module
//!
//! Business logic services that coordinate between the CLI, the catalog and storage.

pub mod library;
pub mod settings;

pub use library::{sync_library, LibraryService, SyncSummary};
pub use settings::{CatalogSettings, SettingsService};
