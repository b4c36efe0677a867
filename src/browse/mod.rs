//! Browse and search engine.
//!
//! [`ContentDirectory`] sits between the action-dispatch layer and whichever
//! [`Catalog`] backend is configured. Every call goes through the same steps:
//! validate the target, query the backend, then serialize the window into a
//! result document.

mod actions;

pub use actions::{ActionArgs, ActionError, ActionOutputs};

use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use mediacat_common::{BrowseResult, BrowseWindow, Error, ObjectId, Result, SearchClass};
use parking_lot::RwLock;
use tracing::debug;

use crate::catalog::Catalog;
use crate::config::NonContainerBrowse;
use crate::didl::to_result_document;

/// What a Browse call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseFlag {
    /// The target entry alone.
    Metadata,
    /// A window over the target's direct children.
    DirectChildren,
}

impl FromStr for BrowseFlag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BrowseMetadata" => Ok(BrowseFlag::Metadata),
            "BrowseDirectChildren" => Ok(BrowseFlag::DirectChildren),
            other => Err(Error::InvalidArgs(format!("unknown BrowseFlag '{other}'"))),
        }
    }
}

/// A serialized answer to Browse or Search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseResponse {
    /// Result document.
    pub result: String,
    pub number_returned: u32,
    pub total_matches: u32,
    /// System update id at the time of the call.
    pub update_id: u32,
}

/// The browse/search engine shared by every caller.
pub struct ContentDirectory {
    catalog: RwLock<Arc<dyn Catalog>>,
    non_container_browse: NonContainerBrowse,
    base_url: String,
    update_id: AtomicU32,
}

impl ContentDirectory {
    /// `base_url` is the transfer server's own address; item resources are
    /// published under it.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        non_container_browse: NonContainerBrowse,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            non_container_browse,
            base_url: base_url.into(),
            update_id: AtomicU32::new(1),
        }
    }

    pub fn catalog(&self) -> Arc<dyn Catalog> {
        self.catalog.read().clone()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn system_update_id(&self) -> u32 {
        self.update_id.load(Ordering::SeqCst)
    }

    /// Swap in a rebuilt catalog and bump the system update id.
    ///
    /// Calls already running finish against the catalog they started with.
    pub fn replace_catalog(&self, catalog: Arc<dyn Catalog>) -> u32 {
        *self.catalog.write() = catalog;
        let id = self.update_id.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        debug!("Catalog replaced, system update id now {}", id);
        id
    }

    /// Browse with an explicit flag. `window` is ignored for metadata.
    pub fn browse(
        &self,
        id: &ObjectId,
        flag: BrowseFlag,
        window: BrowseWindow,
    ) -> Result<BrowseResponse> {
        match flag {
            BrowseFlag::Metadata => self.browse_metadata(id),
            BrowseFlag::DirectChildren => self.browse_children(id, window),
        }
    }

    /// The single entry `id`, with every descriptive field.
    pub fn browse_metadata(&self, id: &ObjectId) -> Result<BrowseResponse> {
        let entry = self.catalog().lookup(id)?;
        Ok(BrowseResponse {
            result: to_result_document(std::slice::from_ref(&entry), true, &self.base_url),
            number_returned: 1,
            total_matches: 1,
            update_id: self.system_update_id(),
        })
    }

    /// Direct children of `id`, ordered by title.
    pub fn browse_children(&self, id: &ObjectId, window: BrowseWindow) -> Result<BrowseResponse> {
        let catalog = self.catalog();
        let page = match self.check_container(catalog.as_ref(), id)? {
            true => catalog.children(id, window)?,
            false => BrowseResult::empty(),
        };
        Ok(self.respond(page))
    }

    /// Descendants of `container` whose class satisfies `criteria`.
    pub fn search(
        &self,
        container: &ObjectId,
        criteria: &str,
        window: BrowseWindow,
    ) -> Result<BrowseResponse> {
        let catalog = self.catalog();
        if !self.check_container(catalog.as_ref(), container)? {
            return Ok(self.respond(BrowseResult::empty()));
        }
        let class = SearchClass::from_criteria(criteria);
        debug!("Search under {} for class {}", container, class);
        let page = catalog.search(container, class, window)?;
        Ok(self.respond(page))
    }

    /// `Ok(true)` when `id` is a container, `Ok(false)` when it is an item
    /// and the policy asks for an empty answer.
    fn check_container(&self, catalog: &dyn Catalog, id: &ObjectId) -> Result<bool> {
        if catalog.lookup(id)?.is_container() {
            return Ok(true);
        }
        match self.non_container_browse {
            NonContainerBrowse::Error => Err(Error::NotAContainer(id.to_string())),
            NonContainerBrowse::Empty => Ok(false),
        }
    }

    fn respond(&self, page: BrowseResult) -> BrowseResponse {
        BrowseResponse {
            result: to_result_document(&page.entries, false, &self.base_url),
            number_returned: page.number_returned(),
            total_matches: page.total_matches,
            update_id: self.system_update_id(),
        }
    }
}
