//! Catalog backends.
//!
//! Both backends answer the same three queries behind [`Catalog`]:
//!
//! - [`ScanningCatalog`] derives everything from the media directory itself.
//!   Ids are the hex encoding of the entry's path.
//! - [`IndexedCatalog`] serves a SQLite index populated by a one-time walk.
//!   Ids are `<parent>$<detail key>`.
//!
//! Children and search windows are always ordered by title.

mod indexed;
mod scanning;

pub use indexed::{ImportStats, IndexedCatalog};
pub use scanning::ScanningCatalog;

use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use mediacat_common::paths::classify;
use mediacat_common::{
    BrowseResult, BrowseWindow, CatalogEntry, ItemClass, ObjectId, Resource, Result, SearchClass,
};

use crate::config::{BackendKind, CatalogConfig};

/// Read access to a catalog of media entries.
///
/// Implementations are called synchronously from any number of connection
/// tasks at once.
pub trait Catalog: Send + Sync {
    /// Fetch one entry by id.
    ///
    /// Fails with `NoSuchObject` when the id does not resolve and `InvalidId`
    /// when it is malformed for this backend.
    fn lookup(&self, id: &ObjectId) -> Result<CatalogEntry>;

    /// Direct children of `parent`, sorted by title, cut to `window`.
    ///
    /// An item or unknown parent yields an empty result.
    fn children(&self, parent: &ObjectId, window: BrowseWindow) -> Result<BrowseResult>;

    /// Descendants of `parent` (at any depth) whose class matches `class`.
    fn search(
        &self,
        parent: &ObjectId,
        class: SearchClass,
        window: BrowseWindow,
    ) -> Result<BrowseResult>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Build the catalog selected by `config`.
///
/// The indexed backend is (re)populated from `root` when `reset` is set or
/// the store is still empty.
pub fn build_catalog(config: &CatalogConfig) -> anyhow::Result<Arc<dyn Catalog>> {
    match config.backend {
        BackendKind::Scanning => {
            let root = config
                .root
                .as_deref()
                .context("The scanning backend requires catalog.root")?;
            let mut catalog = ScanningCatalog::new(root, config.recursive)
                .with_context(|| format!("Failed to scan {:?}", root))?;
            catalog.normalize();
            Ok(Arc::new(catalog))
        }
        BackendKind::Indexed => {
            let db_path = config.db_path.to_string_lossy();
            let catalog = IndexedCatalog::open(&db_path, config.busy_timeout())
                .with_context(|| format!("Failed to open index {db_path}"))?;

            if config.reset || catalog.is_empty()? {
                let root = config
                    .root
                    .as_deref()
                    .context("Populating the index requires catalog.root")?;
                let stats = catalog.import(root)?;
                tracing::info!(
                    "Indexed {} containers and {} items from {:?} ({} skipped)",
                    stats.containers,
                    stats.items,
                    root,
                    stats.skipped
                );
            }
            Ok(Arc::new(catalog))
        }
    }
}

/// Display title of a filesystem entry: its final component, or the whole
/// path when there is none.
pub(crate) fn title_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Build the item entry for a media file, or `None` for unrecognized types.
pub(crate) fn file_entry(
    path: &Path,
    id: ObjectId,
    parent_id: ObjectId,
    metadata: &Metadata,
) -> Option<CatalogEntry> {
    let format = classify(path)?;
    let mut entry = CatalogEntry::item(
        id,
        parent_id,
        title_of(path),
        ItemClass::for_kind(format.kind),
        Resource::for_file(path.to_path_buf(), format, metadata.len()),
    );
    entry.meta.date = metadata
        .modified()
        .ok()
        .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%d").to_string());
    Some(entry)
}
