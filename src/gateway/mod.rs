//! Filesystem-style gateway over remote catalogs.
//!
//! Paths look like `/<device>/<title>/.../<title>`. Each component is found
//! by browsing the parent's children and matching titles; resolved prefixes
//! are kept in a bounded [`PathCache`]. File reads become ranged transfers
//! through [`RangeReader`].

mod cache;
mod reader;
mod resolver;

pub use cache::{GatewayCacheEntry, PathCache};
pub use reader::{RangeReader, DEFAULT_READ_TIMEOUT};
pub use resolver::{BrowseClient, FileAttr, Gateway, LocalBrowseClient, RESERVED_HANDLE};
