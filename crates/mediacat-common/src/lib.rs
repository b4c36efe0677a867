//! Mediacat-Common: Shared types, addressing, and utilities.
//!
//! This crate provides common functionality used across mediacat:
//!
//! - **Addressing**: Entry ids and the reversible path <-> id encoding used by
//!   the scanning catalog, plus the `<parent>$<key>` ids of the indexed store
//! - **Entry Model**: Containers and typed items with their resource descriptor
//! - **Path Utilities**: Media classification (class, MIME type, DLNA profile)
//!   by file extension
//! - **Error Handling**: The shared error taxonomy and result alias
//!
//! # Examples
//!
//! ```
//! use mediacat_common::ids::{decode_path, encode_path};
//! use mediacat_common::paths::{classify, MediaKind};
//! use std::path::Path;
//!
//! let id = encode_path(Path::new("/media/music"));
//! assert_eq!(decode_path(id.as_str()).unwrap(), Path::new("/media/music"));
//!
//! let format = classify(Path::new("track.mp3")).unwrap();
//! assert_eq!(format.kind, MediaKind::Audio);
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::ObjectId;
pub use types::*;
