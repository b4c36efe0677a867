//! Unified error type for mediacat.
//!
//! Every failure in the catalog, transfer, and gateway layers funnels into
//! [`Error`]. Callers at the protocol edge translate it either into a numeric
//! action error code via [`Error::action_code`] or into a transfer status via
//! [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in mediacat.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The entry id could not be resolved in the catalog.
    #[error("No such object: {0}")]
    NoSuchObject(String),

    /// A children browse was requested on something that is not a container.
    #[error("Not a container: {0}")]
    NotAContainer(String),

    /// The id is syntactically invalid for the backend that received it.
    #[error("Invalid object id '{id}': {reason}")]
    InvalidId {
        /// The offending id.
        id: String,
        /// Why it could not be decoded.
        reason: String,
    },

    /// A byte range starts at or beyond the end of the resource.
    #[error("Range not satisfiable: start {start} beyond size {size}")]
    InvalidRange {
        /// Requested first byte.
        start: u64,
        /// Total size of the resource.
        size: u64,
    },

    /// The storage engine could not be opened or did not yield a connection.
    #[error("Backend unavailable: {source}")]
    BackendUnavailable {
        /// The underlying storage error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A transfer request line or header could not be parsed.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The gateway could not resolve a virtual path.
    #[error("Cannot resolve path: {0}")]
    ResolutionFailure(String),

    /// An action was called with missing or invalid arguments.
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// An action name that no handler is registered for.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Numeric error code reported through the action-dispatch layer.
    pub fn action_code(&self) -> u16 {
        match self {
            Error::NoSuchObject(_) | Error::InvalidId { .. } => 701,
            Error::NotAContainer(_) => 710,
            Error::InvalidArgs(_) => 402,
            Error::InvalidAction(_) => 401,
            Error::BackendUnavailable { .. } => 720,
            Error::InvalidRange { .. }
            | Error::MalformedRequest(_)
            | Error::ResolutionFailure(_)
            | Error::Io { .. }
            | Error::Internal(_) => 501,
        }
    }

    /// Map this error to a transfer-protocol status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NoSuchObject(_)
            | Error::NotAContainer(_)
            | Error::InvalidId { .. }
            | Error::ResolutionFailure(_) => 404,
            Error::InvalidRange { .. } => 416,
            Error::MalformedRequest(_) | Error::InvalidArgs(_) => 400,
            Error::InvalidAction(_) => 501,
            Error::BackendUnavailable { .. } | Error::Io { .. } | Error::Internal(_) => 500,
        }
    }

    /// True for every variant a filesystem-facing caller reports as ENOENT.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NoSuchObject(_) | Error::ResolutionFailure(_) | Error::InvalidId { .. } => true,
            Error::Io { source } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Convenience constructor for [`Error::NoSuchObject`].
    pub fn no_such_object(id: impl fmt::Display) -> Self {
        Error::NoSuchObject(id.to_string())
    }

    /// Convenience constructor for [`Error::InvalidId`].
    pub fn invalid_id(id: impl Into<String>, reason: impl fmt::Display) -> Self {
        Error::InvalidId {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Convenience constructor for [`Error::BackendUnavailable`].
    pub fn backend(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::BackendUnavailable {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::MalformedRequest`].
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedRequest(msg.into())
    }

    /// Convenience constructor for [`Error::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
