//! Application configuration constants
//!
//! Central location for file names, timeouts and formats used
//! throughout the catalog.

use std::time::Duration;

// ===== Data Directory Layout =====

/// File name of the catalog database inside the data directory
pub const DATABASE_FILE_NAME: &str = "catalog.db";

/// File name of the JSON settings file inside the data directory
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Default thumbnail folder name inside the data directory
pub const THUMBNAIL_DIR_NAME: &str = "thumbnails";

/// Extension given to generated thumbnail files
pub const THUMBNAIL_EXTENSION: &str = "jpg";

// ===== Database =====

/// How long a statement waits on a locked database file before failing.
pub const DATABASE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Date format stored in `comics.date_added`
pub const DATE_ADDED_FORMAT: &str = "%Y-%m-%d";
