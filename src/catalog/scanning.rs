//! Catalog derived directly from a media directory.
//!
//! In resident mode the whole tree is walked once at construction and kept
//! as a map from id to node; every query afterwards is a read of that map.
//! In on-demand mode nothing is kept: each call decodes the id back into a
//! path and re-reads the filesystem below it.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use mediacat_common::ids::{decode_path, encode_path, parent_id};
use mediacat_common::paths::classify;
use mediacat_common::{
    BrowseResult, BrowseWindow, CatalogEntry, Error, ObjectId, Result, SearchClass,
};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{file_entry, title_of, Catalog};

/// One resident entry plus the ids of its direct children.
#[derive(Debug, Clone)]
struct Node {
    entry: CatalogEntry,
    children: Vec<ObjectId>,
}

#[derive(Debug)]
enum Mode {
    Resident(HashMap<ObjectId, Node>),
    OnDemand,
}

/// Filesystem-backed catalog addressed by hex-encoded paths.
#[derive(Debug)]
pub struct ScanningCatalog {
    root: PathBuf,
    normalized: bool,
    mode: Mode,
}

impl ScanningCatalog {
    /// Open a catalog over `root`.
    ///
    /// With `recursive` the full tree is walked now and kept resident;
    /// otherwise every query re-reads the directory it touches.
    pub fn new(root: &Path, recursive: bool) -> Result<Self> {
        let root = root.canonicalize()?;
        if !root.is_dir() {
            return Err(Error::NotAContainer(root.display().to_string()));
        }

        let mode = if recursive {
            let nodes = build_tree(&root);
            info!("Scanned {:?}: {} entries resident", root, nodes.len());
            Mode::Resident(nodes)
        } else {
            Mode::OnDemand
        };

        Ok(Self {
            root,
            normalized: false,
            mode,
        })
    }

    /// The canonical media directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Address the media directory as `0` instead of by its encoded path.
    ///
    /// The root's own id becomes the root sentinel, its parent becomes the
    /// root-parent sentinel, and each direct child reports `0` as parent.
    /// Calling this again has no effect.
    pub fn normalize(&mut self) {
        if self.normalized {
            return;
        }
        self.normalized = true;

        if let Mode::Resident(nodes) = &mut self.mode {
            let real_id = encode_path(&self.root);
            let Some(mut root) = nodes.remove(&real_id) else {
                return;
            };
            root.entry.id = ObjectId::root();
            root.entry.parent_id = ObjectId::root_parent();
            for child in &root.children {
                if let Some(node) = nodes.get_mut(child) {
                    node.entry.parent_id = ObjectId::root();
                }
            }
            nodes.insert(ObjectId::root(), root);
        }
    }

    fn external_id(&self, path: &Path) -> ObjectId {
        if self.normalized && path == self.root {
            ObjectId::root()
        } else {
            encode_path(path)
        }
    }

    fn external_parent(&self, path: &Path) -> ObjectId {
        if path == self.root && self.normalized {
            return ObjectId::root_parent();
        }
        match path.parent() {
            Some(parent) if path != self.root => self.external_id(parent),
            _ => parent_id(path),
        }
    }

    /// Map an id back to a path inside the media directory.
    fn resolve_path(&self, id: &ObjectId) -> Result<PathBuf> {
        if self.normalized && id.is_root() {
            return Ok(self.root.clone());
        }
        let path = decode_path(id.as_str())?;
        let escapes = path.components().any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(Error::no_such_object(id));
        }
        Ok(path)
    }

    /// Build the entry for `path` from the live filesystem.
    fn read_entry(&self, path: &Path) -> Option<CatalogEntry> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                debug!("Skipping {:?}: {}", path, e);
                return None;
            }
        };
        let id = self.external_id(path);
        let parent = self.external_parent(path);

        if metadata.is_dir() {
            let mut entry = CatalogEntry::container(id, parent, title_of(path));
            let (child_count, storage_used) = aggregate(path);
            if let Some(c) = entry.as_container_mut() {
                c.child_count = child_count;
                c.storage_used = storage_used;
            }
            Some(entry)
        } else {
            file_entry(path, id, parent, &metadata)
        }
    }

    fn resident_descendants(
        nodes: &HashMap<ObjectId, Node>,
        parent: &ObjectId,
        class: SearchClass,
    ) -> Vec<CatalogEntry> {
        let mut found = Vec::new();
        let mut stack: Vec<&ObjectId> = nodes
            .get(parent)
            .map(|n| n.children.iter().collect())
            .unwrap_or_default();

        while let Some(id) = stack.pop() {
            let Some(node) = nodes.get(id) else { continue };
            if class.matches(node.entry.class_name()) {
                found.push(node.entry.clone());
            }
            stack.extend(node.children.iter());
        }
        found
    }
}

impl Catalog for ScanningCatalog {
    fn lookup(&self, id: &ObjectId) -> Result<CatalogEntry> {
        let path = self.resolve_path(id)?;
        match &self.mode {
            Mode::Resident(nodes) => nodes
                .get(id)
                .map(|n| n.entry.clone())
                .ok_or_else(|| Error::no_such_object(id)),
            Mode::OnDemand => self
                .read_entry(&path)
                .ok_or_else(|| Error::no_such_object(id)),
        }
    }

    fn children(&self, parent: &ObjectId, window: BrowseWindow) -> Result<BrowseResult> {
        let path = self.resolve_path(parent)?;
        let entries = match &self.mode {
            Mode::Resident(nodes) => nodes
                .get(parent)
                .map(|node| {
                    node.children
                        .iter()
                        .filter_map(|c| nodes.get(c))
                        .map(|n| n.entry.clone())
                        .collect()
                })
                .unwrap_or_default(),
            Mode::OnDemand => match fs::read_dir(&path) {
                Ok(dir) => dir
                    .filter_map(|e| e.ok())
                    .filter_map(|e| self.read_entry(&e.path()))
                    .collect(),
                Err(e) => {
                    debug!("Cannot list {:?}: {}", path, e);
                    Vec::new()
                }
            },
        };
        Ok(window.slice(entries))
    }

    fn search(
        &self,
        parent: &ObjectId,
        class: SearchClass,
        window: BrowseWindow,
    ) -> Result<BrowseResult> {
        let path = self.resolve_path(parent)?;
        let entries = match &self.mode {
            Mode::Resident(nodes) => Self::resident_descendants(nodes, parent, class),
            Mode::OnDemand => WalkDir::new(&path)
                .min_depth(1)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_dir() || classify(e.path()).is_some())
                .filter_map(|e| self.read_entry(e.path()))
                .filter(|e| class.matches(e.class_name()))
                .collect(),
        };
        Ok(window.slice(entries))
    }

    fn backend_name(&self) -> &'static str {
        "scanning"
    }
}

/// Count eligible children of `dir` and total the media bytes below it.
fn aggregate(dir: &Path) -> (u32, u64) {
    let child_count = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    let path = e.path();
                    path.is_dir() || (classify(&path).is_some() && path.is_file())
                })
                .count()
        })
        .unwrap_or(0);

    let storage_used = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && classify(e.path()).is_some())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();

    (u32::try_from(child_count).unwrap_or(u32::MAX), storage_used)
}

/// Walk `root` once and build the resident node map, aggregates included.
fn build_tree(root: &Path) -> HashMap<ObjectId, Node> {
    let mut nodes = HashMap::new();
    let root_id = encode_path(root);
    nodes.insert(
        root_id.clone(),
        Node {
            entry: CatalogEntry::container(root_id.clone(), parent_id(root), title_of(root)),
            children: Vec::new(),
        },
    );
    // Preorder: every parent precedes its children.
    let mut order = vec![root_id];

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        let Some(parent) = path.parent().map(encode_path) else {
            continue;
        };
        if !nodes.contains_key(&parent) {
            continue;
        }

        let id = encode_path(path);
        let node_entry = if entry.file_type().is_dir() {
            CatalogEntry::container(id.clone(), parent.clone(), title_of(path))
        } else {
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };
            match file_entry(path, id.clone(), parent.clone(), &metadata) {
                Some(e) => e,
                None => continue,
            }
        };

        if let Some(p) = nodes.get_mut(&parent) {
            p.children.push(id.clone());
        }
        nodes.insert(
            id.clone(),
            Node {
                entry: node_entry,
                children: Vec::new(),
            },
        );
        order.push(id);
    }

    for id in order.iter().rev() {
        let Some(node) = nodes.get(id) else { continue };
        if !node.entry.is_container() {
            continue;
        }
        let child_count = u32::try_from(node.children.len()).unwrap_or(u32::MAX);
        let storage_used: u64 = node
            .children
            .iter()
            .filter_map(|c| nodes.get(c))
            .map(|n| n.entry.storage_bytes())
            .sum();
        if let Some(c) = nodes.get_mut(id).and_then(|n| n.entry.as_container_mut()) {
            c.child_count = child_count;
            c.storage_used = storage_used;
        }
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// root/
    ///   Music/ a.mp3 (3 bytes), Live/ b.flac (5 bytes)
    ///   Photos/ p.jpg (7 bytes)
    ///   clip.mkv (11 bytes)
    ///   readme.txt
    fn media_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Music/Live")).unwrap();
        fs::create_dir(root.join("Photos")).unwrap();
        fs::write(root.join("Music/a.mp3"), b"abc").unwrap();
        fs::write(root.join("Music/Live/b.flac"), b"12345").unwrap();
        fs::write(root.join("Photos/p.jpg"), b"1234567").unwrap();
        fs::write(root.join("clip.mkv"), b"01234567890").unwrap();
        fs::write(root.join("readme.txt"), b"ignored").unwrap();
        dir
    }

    fn both_modes(root: &Path) -> Vec<ScanningCatalog> {
        [true, false]
            .into_iter()
            .map(|recursive| {
                let mut c = ScanningCatalog::new(root, recursive).unwrap();
                c.normalize();
                c
            })
            .collect()
    }

    fn titles(page: &BrowseResult) -> Vec<&str> {
        page.entries.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn test_normalized_root_children() {
        let dir = media_tree();
        for catalog in both_modes(dir.path()) {
            let page = catalog
                .children(&ObjectId::root(), BrowseWindow::new(0, 10))
                .unwrap();
            assert_eq!(titles(&page), ["Music", "Photos", "clip.mkv"]);
            assert_eq!(page.total_matches, 3);
            assert!(page.entries.iter().all(|e| e.parent_id.is_root()));

            let root = catalog.lookup(&ObjectId::root()).unwrap();
            assert!(root.parent_id.is_root_parent());
        }
    }

    #[test]
    fn test_aggregates_match_in_both_modes() {
        let dir = media_tree();
        for catalog in both_modes(dir.path()) {
            let root = catalog.lookup(&ObjectId::root()).unwrap();
            let c = root.as_container().unwrap();
            assert_eq!(c.child_count, 3, "{}", catalog.backend_name());
            assert_eq!(c.storage_used, 3 + 5 + 7 + 11);

            let music_id = encode_path(&catalog.root().join("Music"));
            let music = catalog.lookup(&music_id).unwrap();
            assert_eq!(music.as_container().unwrap().child_count, 2);
            assert_eq!(music.as_container().unwrap().storage_used, 8);
            assert!(music.parent_id.is_root());
        }
    }

    #[test]
    fn test_ids_decode_to_paths() {
        let dir = media_tree();
        let catalog = ScanningCatalog::new(dir.path(), true).unwrap();
        let page = catalog
            .children(&encode_path(catalog.root()), BrowseWindow::all())
            .unwrap();
        for entry in &page.entries {
            let path = decode_path(entry.id.as_str()).unwrap();
            assert_eq!(title_of(&path), entry.title);
            assert_eq!(entry.parent_id, encode_path(catalog.root()));
        }
    }

    #[test]
    fn test_search_by_class() {
        let dir = media_tree();
        for catalog in both_modes(dir.path()) {
            let audio = catalog
                .search(&ObjectId::root(), SearchClass::Audio, BrowseWindow::all())
                .unwrap();
            assert_eq!(titles(&audio), ["a.mp3", "b.flac"]);

            let images = catalog
                .search(&ObjectId::root(), SearchClass::Image, BrowseWindow::new(0, 1))
                .unwrap();
            assert_eq!(images.total_matches, 1);

            let any = catalog
                .search(&ObjectId::root(), SearchClass::Any, BrowseWindow::all())
                .unwrap();
            assert_eq!(any.total_matches, 7);
        }
    }

    #[test]
    fn test_item_has_no_children() {
        let dir = media_tree();
        for catalog in both_modes(dir.path()) {
            let id = encode_path(&catalog.root().join("clip.mkv"));
            let entry = catalog.lookup(&id).unwrap();
            assert!(!entry.is_container());
            let page = catalog.children(&id, BrowseWindow::all()).unwrap();
            assert_eq!(page, BrowseResult::empty());
        }
    }

    #[test]
    fn test_rejects_ids_outside_root() {
        let dir = media_tree();
        for catalog in both_modes(dir.path()) {
            let outside = encode_path(Path::new("/etc"));
            assert_matches!(catalog.lookup(&outside), Err(Error::NoSuchObject(_)));

            let sneaky = encode_path(&catalog.root().join("../"));
            assert_matches!(catalog.lookup(&sneaky), Err(Error::NoSuchObject(_)));

            assert_matches!(
                catalog.lookup(&ObjectId::new("abc")),
                Err(Error::InvalidId { .. })
            );
        }
    }

    #[test]
    fn test_unknown_id_is_no_such_object() {
        let dir = media_tree();
        for catalog in both_modes(dir.path()) {
            let missing = encode_path(&catalog.root().join("gone.mp3"));
            assert_matches!(catalog.lookup(&missing), Err(Error::NoSuchObject(_)));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_entries_are_skipped() {
        let dir = media_tree();
        std::os::unix::fs::symlink(dir.path().join("nowhere.mp3"), dir.path().join("dead.mp3"))
            .unwrap();
        for catalog in both_modes(dir.path()) {
            let page = catalog
                .children(&ObjectId::root(), BrowseWindow::all())
                .unwrap();
            assert_eq!(page.total_matches, 3);
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let dir = media_tree();
        let mut catalog = ScanningCatalog::new(dir.path(), true).unwrap();
        catalog.normalize();
        catalog.normalize();
        assert!(catalog.lookup(&ObjectId::root()).is_ok());
        assert_matches!(
            catalog.lookup(&encode_path(catalog.root())),
            Err(Error::NoSuchObject(_))
        );
    }
}
