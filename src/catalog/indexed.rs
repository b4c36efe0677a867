//! Catalog served from the SQLite index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mediacat_common::{
    BrowseResult, BrowseWindow, CatalogEntry, Error, ObjectId, Result, SearchClass,
};
use mediacat_db::migrations;
use mediacat_db::models::DetailRecord;
use mediacat_db::pool::{get_conn, init_pool, DbPool};
use mediacat_db::queries::objects;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{file_entry, title_of, Catalog};

/// Counters reported by [`IndexedCatalog::import`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub containers: u64,
    pub items: u64,
    pub skipped: u64,
}

/// Catalog backed by the indexed store.
///
/// Concurrent callers each take their own pooled connection; contention is
/// left to SQLite's locking with the configured busy timeout.
#[derive(Clone)]
pub struct IndexedCatalog {
    pool: DbPool,
}

impl IndexedCatalog {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &str, busy_timeout: Duration) -> Result<Self> {
        Ok(Self {
            pool: init_pool(db_path, busy_timeout)?,
        })
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// True when the store holds no objects, not even a root.
    pub fn is_empty(&self) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        Ok(objects::count_objects(&conn)? == 0)
    }

    /// Drop the current index and rebuild it from `root`.
    ///
    /// The directory itself becomes `0`. Entries that vanish or cannot be
    /// read during the walk are skipped, as are paths that are not valid
    /// UTF-8.
    pub fn import(&self, root: &Path) -> Result<ImportStats> {
        let root = root.canonicalize()?;
        let conn = get_conn(&self.pool)?;
        migrations::reset_schema(&conn).map_err(Error::backend)?;

        let tx = conn.unchecked_transaction().map_err(Error::backend)?;
        let root_ref = objects::insert_root(&tx, &title_of(&root))?;
        let mut folders: HashMap<PathBuf, ObjectId> = HashMap::new();
        folders.insert(root.clone(), root_ref.id);

        let mut stats = ImportStats::default();
        for entry in WalkDir::new(&root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    stats.skipped += 1;
                    continue;
                }
            };
            let path = entry.path();
            let Some(parent) = path.parent().and_then(|p| folders.get(p)).cloned() else {
                continue;
            };
            if path.to_str().is_none() {
                warn!("Skipping non UTF-8 path {:?}", path);
                stats.skipped += 1;
                continue;
            }

            if entry.file_type().is_dir() {
                let folder = objects::insert(&tx, &parent, &DetailRecord::container(title_of(path)))?;
                folders.insert(path.to_path_buf(), folder.id);
                stats.containers += 1;
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!("Skipping {:?}: {}", path, e);
                    stats.skipped += 1;
                    continue;
                }
            };
            // The store assigns the real id.
            let Some(item) = file_entry(path, ObjectId::new(""), parent.clone(), &metadata) else {
                continue;
            };
            objects::insert(&tx, &parent, &DetailRecord::from_entry(&item))?;
            stats.items += 1;
        }

        tx.commit().map_err(Error::backend)?;
        info!(
            "Index rebuilt from {:?}: {} containers, {} items",
            root, stats.containers, stats.items
        );
        Ok(stats)
    }

    fn check_id(id: &ObjectId) -> Result<()> {
        if id.is_root() || id.split_indexed().is_some() {
            Ok(())
        } else {
            Err(Error::invalid_id(id.as_str(), "expected <parent>$<key>"))
        }
    }
}

impl Catalog for IndexedCatalog {
    fn lookup(&self, id: &ObjectId) -> Result<CatalogEntry> {
        Self::check_id(id)?;
        let conn = get_conn(&self.pool)?;
        objects::get_object(&conn, id)?.ok_or_else(|| Error::no_such_object(id))
    }

    fn children(&self, parent: &ObjectId, window: BrowseWindow) -> Result<BrowseResult> {
        Self::check_id(parent)?;
        let conn = get_conn(&self.pool)?;
        objects::query_children(&conn, parent, window)
    }

    fn search(
        &self,
        parent: &ObjectId,
        class: SearchClass,
        window: BrowseWindow,
    ) -> Result<BrowseResult> {
        Self::check_id(parent)?;
        let conn = get_conn(&self.pool)?;
        objects::query_search(&conn, parent, class, window)
    }

    fn backend_name(&self) -> &'static str {
        "indexed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use mediacat_db::pool::init_memory_pool;
    use std::fs;

    fn imported() -> (tempfile::TempDir, IndexedCatalog, ImportStats) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Videos/Old")).unwrap();
        fs::write(root.join("Videos/new.mp4"), b"0123456789").unwrap();
        fs::write(root.join("Videos/Old/old.avi"), b"01234").unwrap();
        fs::write(root.join("cover.png"), b"png").unwrap();
        fs::write(root.join("notes.txt"), b"skip").unwrap();

        let catalog = IndexedCatalog::from_pool(init_memory_pool().unwrap());
        let stats = catalog.import(root).unwrap();
        (dir, catalog, stats)
    }

    #[test]
    fn test_import_counts() {
        let (_dir, catalog, stats) = imported();
        assert_eq!(stats.containers, 2);
        assert_eq!(stats.items, 3);
        assert!(!catalog.is_empty().unwrap());
    }

    #[test]
    fn test_root_children_and_aggregates() {
        let (_dir, catalog, _) = imported();
        let root = catalog.lookup(&ObjectId::root()).unwrap();
        let c = root.as_container().unwrap();
        assert_eq!(c.child_count, 2);
        assert_eq!(c.storage_used, 10 + 5 + 3);

        let page = catalog
            .children(&ObjectId::root(), BrowseWindow::new(0, 10))
            .unwrap();
        let titles: Vec<_> = page.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Videos", "cover.png"]);
        assert!(page.entries[0].id.as_str().starts_with("0$"));
    }

    #[test]
    fn test_item_resource_points_at_file() {
        let (dir, catalog, _) = imported();
        let hits = catalog
            .search(&ObjectId::root(), SearchClass::Video, BrowseWindow::all())
            .unwrap();
        assert_eq!(hits.total_matches, 2);
        let new = hits.entries.iter().find(|e| e.title == "new.mp4").unwrap();
        let res = new.resource().unwrap();
        assert_eq!(res.size, 10);
        assert_eq!(res.mime, "video/mp4");
        assert_eq!(
            res.path.as_deref().unwrap(),
            dir.path().canonicalize().unwrap().join("Videos/new.mp4")
        );
    }

    #[test]
    fn test_reimport_replaces_index() {
        let (dir, catalog, _) = imported();
        fs::remove_file(dir.path().join("cover.png")).unwrap();
        let stats = catalog.import(dir.path()).unwrap();
        assert_eq!(stats.items, 2);
        let page = catalog
            .children(&ObjectId::root(), BrowseWindow::all())
            .unwrap();
        assert_eq!(page.total_matches, 1);
    }

    #[test]
    fn test_id_errors() {
        let (_dir, catalog, _) = imported();
        assert_matches!(
            catalog.lookup(&ObjectId::new("0$4242")),
            Err(Error::NoSuchObject(_))
        );
        assert_matches!(
            catalog.lookup(&ObjectId::new("2f6d6564696120")),
            Err(Error::InvalidId { .. })
        );
        let page = catalog
            .children(&ObjectId::new("0$4242"), BrowseWindow::all())
            .unwrap();
        assert_eq!(page.total_matches, 0);
    }
}
