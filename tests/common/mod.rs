//! Shared test harness for integration tests.
//!
//! [`TestHarness`] lays out a small media tree in a temp directory, builds
//! the requested catalog over it and starts a [`MediaService`] on a random
//! loopback port.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use mediacat::catalog::build_catalog;
use mediacat::config::{BackendKind, Config, NonContainerBrowse};
use mediacat::service::MediaService;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Size of `Music/track.mp3`.
pub const TRACK_SIZE: usize = 1000;

/// Deterministic, position-dependent file body.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Create the standard media tree under `root`:
///
/// ```text
/// Music/track.mp3   TRACK_SIZE bytes
/// Music/b-side.flac 64 bytes
/// Videos/clip.mp4   32 bytes
/// cover.jpg         16 bytes
/// notes.txt         (not media)
/// ```
pub fn media_tree(root: &Path) {
    fs::create_dir_all(root.join("Music")).unwrap();
    fs::create_dir_all(root.join("Videos")).unwrap();
    fs::write(root.join("Music/track.mp3"), pattern(TRACK_SIZE)).unwrap();
    fs::write(root.join("Music/b-side.flac"), pattern(64)).unwrap();
    fs::write(root.join("Videos/clip.mp4"), pattern(32)).unwrap();
    fs::write(root.join("cover.jpg"), pattern(16)).unwrap();
    fs::write(root.join("notes.txt"), b"not media").unwrap();
}

pub struct TestHarness {
    pub dir: TempDir,
    pub config: Config,
    pub service: MediaService,
}

impl TestHarness {
    pub async fn scanning() -> Self {
        Self::start(BackendKind::Scanning, NonContainerBrowse::Error).await
    }

    pub async fn indexed() -> Self {
        Self::start(BackendKind::Indexed, NonContainerBrowse::Error).await
    }

    pub async fn start(backend: BackendKind, policy: NonContainerBrowse) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let media = dir.path().join("media");
        media_tree(&media);

        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.friendly_name = "den".to_string();
        config.catalog.backend = backend;
        config.catalog.root = Some(media);
        config.catalog.db_path = dir.path().join("index.db");
        config.catalog.non_container_browse = policy;
        config.transfer.chunk_size = 128;

        let catalog = build_catalog(&config.catalog).expect("failed to build catalog");
        let service = MediaService::start(&config, catalog, CancellationToken::new())
            .await
            .expect("failed to start service");

        Self {
            dir,
            config,
            service,
        }
    }

    pub fn media_root(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.service.base_url(), path)
    }
}

/// Published resource URL of the item titled `title`.
pub fn item_url(harness: &TestHarness, title: &str) -> String {
    use mediacat::didl::from_result_document;
    use mediacat_common::{BrowseWindow, ObjectId};

    let resp = harness
        .service
        .directory()
        .search(&ObjectId::root(), "*", BrowseWindow::all())
        .expect("search failed");
    from_result_document(&resp.result)
        .expect("unparsable result")
        .into_iter()
        .find(|e| e.title == title)
        .and_then(|e| e.resource().and_then(|r| r.url.clone()))
        .unwrap_or_else(|| panic!("no item titled {title}"))
}
