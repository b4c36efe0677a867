//! Entry ids and the addressing schemes of the two catalog backends.
//!
//! The scanning backend needs no lookup table: an id is the lowercase hex of
//! the entry's path bytes, so [`decode_path`] recovers the exact path from any
//! well-formed id. The indexed backend assigns `<parent>$<detail key>` once at
//! insert time.
//!
//! Two ids are reserved: [`ROOT_ID`] addresses the externally visible root
//! container, [`ROOT_PARENT_ID`] is the parent of that root.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Id of the externally visible root container.
pub const ROOT_ID: &str = "0";

/// Parent id reported for the root container.
pub const ROOT_PARENT_ID: &str = "-1";

/// Separator between a parent id and a detail key in indexed ids.
pub const INDEX_SEPARATOR: char = '$';

/// Opaque identifier of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap a raw id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The root container id.
    #[must_use]
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// The parent id of the root container.
    #[must_use]
    pub fn root_parent() -> Self {
        Self(ROOT_PARENT_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    pub fn is_root_parent(&self) -> bool {
        self.0 == ROOT_PARENT_ID
    }

    /// Id of an indexed-store object whose details row has `detail_key`.
    #[must_use]
    pub fn indexed(parent: &ObjectId, detail_key: i64) -> Self {
        Self(format!("{}{}{}", parent.0, INDEX_SEPARATOR, detail_key))
    }

    /// Split an indexed id into its parent id and detail key.
    ///
    /// Returns `None` for ids without a trailing `$<integer>` component.
    pub fn split_indexed(&self) -> Option<(ObjectId, i64)> {
        let (parent, key) = self.0.rsplit_once(INDEX_SEPARATOR)?;
        let key = key.parse().ok()?;
        Some((ObjectId::new(parent), key))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ObjectId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ObjectId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> std::result::Result<PathBuf, String> {
    use std::os::unix::ffi::OsStringExt;
    Ok(PathBuf::from(OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> std::result::Result<PathBuf, String> {
    String::from_utf8(bytes)
        .map(|s| PathBuf::from(OsString::from(s)))
        .map_err(|e| e.to_string())
}

/// Encode a filesystem path as a scanning-backend id.
///
/// # Examples
///
/// ```
/// use mediacat_common::ids::encode_path;
/// use std::path::Path;
///
/// assert_eq!(encode_path(Path::new("/a")).as_str(), "2f61");
/// ```
#[must_use]
pub fn encode_path(path: &Path) -> ObjectId {
    ObjectId(hex::encode(path_bytes(path)))
}

/// Decode a scanning-backend id back into the exact path it was built from.
///
/// Fails with [`Error::InvalidId`] on odd length or a non-hex digit.
pub fn decode_path(id: &str) -> Result<PathBuf> {
    let bytes = hex::decode(id).map_err(|e| Error::invalid_id(id, e))?;
    path_from_bytes(bytes).map_err(|e| Error::invalid_id(id, e))
}

/// Id of the container holding `path` in the scanning backend.
///
/// A path with no parent component reports [`ROOT_PARENT_ID`].
#[must_use]
pub fn parent_id(path: &Path) -> ObjectId {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => encode_path(parent),
        _ => ObjectId::root_parent(),
    }
}
