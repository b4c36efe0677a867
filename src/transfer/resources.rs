//! Virtual resources the transfer server reads from.
//!
//! The server never touches the filesystem itself: every request path goes
//! through a [`VirtualResources`] implementation. [`FileResources`] serves
//! catalog items from their backing files, [`MemoryResources`] serves
//! documents generated at runtime, and [`MountTable`] routes by path prefix.

use std::io::Cursor;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use mediacat_common::paths::{classify, MediaFormat};
use mediacat_common::{CatalogEntry, Error, ObjectId, Result};
use tokio::io::{AsyncRead, AsyncSeek};
use tracing::trace;

use crate::browse::ContentDirectory;
use crate::didl::CONTENT_PREFIX;

/// What the server needs to know before sending any body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub size: u64,
    pub mtime: Option<SystemTime>,
    pub mime: String,
    /// Set for catalog media; drives the DLNA response headers.
    pub dlna: Option<MediaFormat>,
}

/// A readable, seekable open resource. Dropping it closes it.
pub trait ResourceReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> ResourceReader for T {}

pub type ResourceHandle = Box<dyn ResourceReader>;

#[async_trait]
pub trait VirtualResources: Send + Sync {
    /// Size, modification time and type of the resource at `path`.
    async fn info(&self, path: &str) -> Result<ResourceInfo>;

    /// Open `path` for reading from its first byte.
    async fn open(&self, path: &str) -> Result<ResourceHandle>;
}

/// Catalog items served from their backing files under `/content/<id>`.
///
/// Lookups go through the directory's current catalog, so a replaced
/// catalog is picked up by the next request.
pub struct FileResources {
    directory: Arc<ContentDirectory>,
}

impl FileResources {
    pub fn new(directory: Arc<ContentDirectory>) -> Self {
        Self { directory }
    }

    async fn entry(&self, path: &str) -> Result<CatalogEntry> {
        let encoded = path
            .strip_prefix(CONTENT_PREFIX)
            .ok_or_else(|| Error::no_such_object(path))?;
        let id = urlencoding::decode(encoded)
            .map_err(|_| Error::invalid_id(encoded, "not valid percent-encoded UTF-8"))?;
        let id = ObjectId::new(id.into_owned());

        let catalog = self.directory.catalog();
        tokio::task::spawn_blocking(move || catalog.lookup(&id))
            .await
            .map_err(|e| Error::internal(format!("lookup task failed: {e}")))?
    }

    async fn backing_file(&self, path: &str) -> Result<(CatalogEntry, std::path::PathBuf)> {
        let entry = self.entry(path).await?;
        let file = entry
            .resource()
            .and_then(|r| r.path.clone())
            .ok_or_else(|| Error::no_such_object(&entry.id))?;
        Ok((entry, file))
    }
}

#[async_trait]
impl VirtualResources for FileResources {
    async fn info(&self, path: &str) -> Result<ResourceInfo> {
        let (entry, file) = self.backing_file(path).await?;
        let metadata = tokio::fs::metadata(&file)
            .await
            .map_err(|e| missing_as_no_such_object(e, &entry.id))?;
        let mime = entry
            .resource()
            .map(|r| r.mime.clone())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        trace!("Resolved {} to {:?}", path, file);
        Ok(ResourceInfo {
            size: metadata.len(),
            mtime: metadata.modified().ok(),
            mime,
            dlna: classify(&file),
        })
    }

    async fn open(&self, path: &str) -> Result<ResourceHandle> {
        let (_, file) = self.backing_file(path).await?;
        let file = tokio::fs::File::open(&file)
            .await
            .map_err(|e| missing_as_no_such_object(e, path))?;
        Ok(Box::new(file))
    }
}

fn missing_as_no_such_object(err: std::io::Error, what: impl std::fmt::Display) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::no_such_object(what)
    } else {
        Error::from(err)
    }
}

#[derive(Debug, Clone)]
struct Document {
    mime: String,
    body: Bytes,
    mtime: SystemTime,
}

/// Documents generated at runtime, keyed by their full request path.
#[derive(Debug, Default)]
pub struct MemoryResources {
    documents: DashMap<String, Document>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish (or replace) the document at `path`.
    pub fn insert(&self, path: impl Into<String>, mime: impl Into<String>, body: impl Into<Bytes>) {
        self.documents.insert(
            path.into(),
            Document {
                mime: mime.into(),
                body: body.into(),
                mtime: SystemTime::now(),
            },
        );
    }

    fn get(&self, path: &str) -> Result<Document> {
        self.documents
            .get(path)
            .map(|d| d.value().clone())
            .ok_or_else(|| Error::no_such_object(path))
    }
}

#[async_trait]
impl VirtualResources for MemoryResources {
    async fn info(&self, path: &str) -> Result<ResourceInfo> {
        let doc = self.get(path)?;
        Ok(ResourceInfo {
            size: doc.body.len() as u64,
            mtime: Some(doc.mtime),
            mime: doc.mime,
            dlna: None,
        })
    }

    async fn open(&self, path: &str) -> Result<ResourceHandle> {
        Ok(Box::new(Cursor::new(self.get(path)?.body)))
    }
}

/// Routes each request to the provider mounted at the longest matching
/// path prefix.
#[derive(Default)]
pub struct MountTable {
    mounts: Vec<(String, Arc<dyn VirtualResources>)>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(mut self, prefix: impl Into<String>, resources: Arc<dyn VirtualResources>) -> Self {
        self.mounts.push((prefix.into(), resources));
        self.mounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    fn route(&self, path: &str) -> Result<&Arc<dyn VirtualResources>> {
        self.mounts
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, r)| r)
            .ok_or_else(|| Error::no_such_object(path))
    }
}

#[async_trait]
impl VirtualResources for MountTable {
    async fn info(&self, path: &str) -> Result<ResourceInfo> {
        self.route(path)?.info(path).await
    }

    async fn open(&self, path: &str) -> Result<ResourceHandle> {
        self.route(path)?.open(path).await
    }
}
