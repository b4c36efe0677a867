//! Path resolution and file handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use mediacat_common::{CatalogEntry, Error, ObjectId, Result};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::cache::{GatewayCacheEntry, PathCache};
use super::reader::RangeReader;
use crate::browse::{ActionArgs, ActionError, ContentDirectory};
use crate::config::GatewayConfig;
use crate::didl::from_result_document;

/// The two browse calls resolution is built from.
#[async_trait]
pub trait BrowseClient: Send + Sync {
    /// Full metadata of one entry.
    async fn browse_metadata(&self, id: &ObjectId) -> Result<CatalogEntry>;

    /// Every direct child of a container.
    async fn browse_children(&self, id: &ObjectId) -> Result<Vec<CatalogEntry>>;
}

/// Browses an in-process [`ContentDirectory`] through its action interface.
pub struct LocalBrowseClient {
    directory: Arc<ContentDirectory>,
}

impl LocalBrowseClient {
    pub fn new(directory: Arc<ContentDirectory>) -> Self {
        Self { directory }
    }

    async fn browse(&self, id: &ObjectId, flag: &'static str) -> Result<Vec<CatalogEntry>> {
        let args: ActionArgs = [
            ("ObjectID", id.as_str()),
            ("BrowseFlag", flag),
            ("StartingIndex", "0"),
            ("RequestedCount", "0"),
            ("Filter", "*"),
            ("SortCriteria", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let directory = Arc::clone(&self.directory);
        let outputs = tokio::task::spawn_blocking(move || directory.dispatch("Browse", &args))
            .await
            .map_err(|e| Error::internal(format!("browse task failed: {e}")))?
            .map_err(action_failure)?;

        let result = outputs
            .iter()
            .find(|(name, _)| *name == "Result")
            .map(|(_, doc)| doc.as_str())
            .unwrap_or_default();
        from_result_document(result)
    }
}

fn action_failure(err: ActionError) -> Error {
    match err.code {
        701 => Error::NoSuchObject(err.description),
        710 => Error::NotAContainer(err.description),
        _ => Error::internal(err.to_string()),
    }
}

#[async_trait]
impl BrowseClient for LocalBrowseClient {
    async fn browse_metadata(&self, id: &ObjectId) -> Result<CatalogEntry> {
        self.browse(id, "BrowseMetadata")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::no_such_object(id))
    }

    async fn browse_children(&self, id: &ObjectId) -> Result<Vec<CatalogEntry>> {
        self.browse(id, "BrowseDirectChildren").await
    }
}

/// What `getattr` reports for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    pub is_dir: bool,
    pub size: u64,
}

/// Handle number never issued by [`Gateway::open`].
pub const RESERVED_HANDLE: u64 = 0;

/// Projects one or more devices' catalogs as a path hierarchy
/// `/<device>/<title>/<title>/...`.
pub struct Gateway {
    devices: HashMap<String, Arc<dyn BrowseClient>>,
    cache: PathCache,
    http: reqwest::Client,
    read_timeout: Duration,
    handles: DashMap<u64, Arc<Mutex<RangeReader>>>,
    next_handle: AtomicU64,
}

impl Gateway {
    pub fn new(config: &GatewayConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeouts: {e}");
                reqwest::Client::new()
            });

        Self {
            devices: HashMap::new(),
            cache: PathCache::new(config.cache_capacity),
            http,
            read_timeout: config.read_timeout(),
            handles: DashMap::new(),
            next_handle: AtomicU64::new(RESERVED_HANDLE + 1),
        }
    }

    pub fn with_device(mut self, name: impl Into<String>, client: Arc<dyn BrowseClient>) -> Self {
        self.devices.insert(name.into(), client);
        self
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    /// Resolve a virtual path to its catalog entry.
    ///
    /// Each prefix resolved along the way is cached, so later lookups under
    /// the same directories skip those browse calls.
    pub async fn resolve(&self, path: &str) -> Result<GatewayCacheEntry> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let (device, rest) = components
            .split_first()
            .ok_or_else(|| Error::ResolutionFailure(path.to_string()))?;
        let full = format!("/{}", components.join("/"));

        if let Some(hit) = self.cache.get(&full) {
            trace!("Cache hit for {}", full);
            return Ok(hit);
        }

        let client = self
            .devices
            .get(*device)
            .ok_or_else(|| Error::ResolutionFailure(format!("unknown device '{device}'")))?;

        let mut prefix = format!("/{device}");
        let mut current = match self.cache.get(&prefix) {
            Some(hit) => hit,
            None => {
                let root = client.browse_metadata(&ObjectId::root()).await?;
                self.remember(&prefix, device, &root)
            }
        };

        for component in rest {
            prefix.push('/');
            prefix.push_str(component);
            if let Some(hit) = self.cache.get(&prefix) {
                current = hit;
                continue;
            }
            if !current.is_container {
                return Err(Error::ResolutionFailure(prefix));
            }

            let found = client
                .browse_children(&current.id)
                .await?
                .into_iter()
                .find(|e| e.title == *component)
                .ok_or_else(|| Error::ResolutionFailure(prefix.clone()))?;
            let entry = client.browse_metadata(&found.id).await?;
            current = self.remember(&prefix, device, &entry);
        }

        debug!("Resolved {} to {}", full, current.id);
        Ok(current)
    }

    fn remember(&self, path: &str, device: &str, entry: &CatalogEntry) -> GatewayCacheEntry {
        let resource = entry.resource();
        let cached = GatewayCacheEntry {
            virtual_path: path.to_string(),
            device: device.to_string(),
            id: entry.id.clone(),
            is_container: entry.is_container(),
            url: resource.and_then(|r| r.url.clone()),
            size: resource.map(|r| r.size),
        };
        self.cache.insert(cached.clone());
        cached
    }

    /// Titles of the children of the container at `path`.
    ///
    /// The root path lists the configured devices.
    pub async fn readdir(&self, path: &str) -> Result<Vec<String>> {
        if path.trim_matches('/').is_empty() {
            let mut names: Vec<String> = self.devices.keys().cloned().collect();
            names.sort();
            return Ok(names);
        }

        let entry = self.resolve(path).await?;
        if !entry.is_container {
            return Err(Error::NotAContainer(path.to_string()));
        }
        let client = self
            .devices
            .get(&entry.device)
            .ok_or_else(|| Error::ResolutionFailure(path.to_string()))?;
        Ok(client
            .browse_children(&entry.id)
            .await?
            .into_iter()
            .map(|e| e.title)
            .collect())
    }

    pub async fn getattr(&self, path: &str) -> Result<FileAttr> {
        if path.trim_matches('/').is_empty() {
            return Ok(FileAttr { is_dir: true, size: 0 });
        }
        let entry = self.resolve(path).await?;
        Ok(FileAttr {
            is_dir: entry.is_container,
            size: if entry.is_container {
                0
            } else {
                entry.size.unwrap_or(0)
            },
        })
    }

    /// Open the item at `path`. No connection is made until the first read.
    pub async fn open(&self, path: &str) -> Result<u64> {
        let entry = self.resolve(path).await?;
        if entry.is_container {
            return Err(Error::InvalidArgs(format!("{path} is a directory")));
        }
        let url = entry
            .url
            .ok_or_else(|| Error::ResolutionFailure(format!("{path} has no resource")))?;

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let reader = RangeReader::new(self.http.clone(), url, entry.size)
            .with_read_timeout(self.read_timeout);
        self.handles.insert(handle, Arc::new(Mutex::new(reader)));
        debug!("Opened {} as handle {}", path, handle);
        Ok(handle)
    }

    /// Read from an open handle at `offset`.
    pub async fn read(&self, handle: u64, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let reader = self
            .handles
            .get(&handle)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| Error::InvalidArgs(format!("unknown handle {handle}")))?;
        let mut reader = reader.lock().await;
        reader.read_at(offset, buf).await
    }

    /// Requests issued so far on `handle`, if it is open.
    pub async fn connections(&self, handle: u64) -> Option<u64> {
        let reader = self.handles.get(&handle).map(|r| Arc::clone(r.value()))?;
        let connections = reader.lock().await.connections();
        Some(connections)
    }

    /// Close `handle`. Returns false if it was not open.
    pub fn release(&self, handle: u64) -> bool {
        self.handles.remove(&handle).is_some()
    }
}
