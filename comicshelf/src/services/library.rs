//! Library service
//!
//! Keeps the catalog in step with the library folders on disk.

use crate::database::{CatalogManager, Comic};
use crate::error::Result;
use crate::storage::library::{absolute_root, scan_library, FolderSource};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of a library synchronization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub added_or_updated: usize,
    pub removed: usize,
}

/// Scan `roots` and reconcile the catalog with what was found.
///
/// Found comics keep their stored metadata and are reactivated. Active comics
/// under the scanned roots that are no longer on disk are soft-deleted.
/// Comics outside the roots are left alone.
pub async fn sync_library<S>(
    catalog: &CatalogManager,
    source: &S,
    roots: &[PathBuf],
) -> Result<SyncSummary>
where
    S: FolderSource + ?Sized,
{
    let mut scanned = Vec::new();
    let mut absolute_roots = Vec::with_capacity(roots.len());
    for root in roots {
        absolute_roots.push(absolute_root(root)?);
        scanned.extend(scan_library(source, root).await?);
    }

    let found: Vec<Comic> = catalog.retrieve_known_metadata(&scanned).await?;
    let found_ids: HashSet<String> = found.iter().map(Comic::unique_identifier).collect();

    let missing: Vec<Comic> = catalog
        .get_all_comics()
        .await?
        .into_iter()
        .filter(|comic| !found_ids.contains(&comic.unique_identifier()))
        .filter(|comic| {
            absolute_roots
                .iter()
                .any(|root| Path::new(comic.path()).starts_with(root))
        })
        .collect();

    catalog.apply_scan(&found, &missing).await?;

    let summary = SyncSummary {
        added_or_updated: found.len(),
        removed: missing.len(),
    };
    tracing::info!(
        "Library synchronized: {} comics saved, {} removed",
        summary.added_or_updated,
        summary.removed
    );

    Ok(summary)
}

/// Service for library synchronization
#[derive(Clone)]
pub struct LibraryService {
    catalog: CatalogManager,
    source: Arc<dyn FolderSource>,
}

impl LibraryService {
    pub fn new(catalog: CatalogManager, source: Arc<dyn FolderSource>) -> Self {
        Self { catalog, source }
    }

    pub async fn sync(&self, roots: &[PathBuf]) -> Result<SyncSummary> {
        tracing::info!("Synchronizing {} library roots", roots.len());
        sync_library(&self.catalog, self.source.as_ref(), roots).await
    }

    pub fn catalog(&self) -> &CatalogManager {
        &self.catalog
    }
}
