//! Result documents.
//!
//! Browse and Search answers are wrapped in a `DIDL-Lite` envelope holding
//! one `<container>` or `<item>` element per entry. [`to_result_document`]
//! writes that envelope and [`from_result_document`] reads it back on the
//! consuming side.

mod reader;
mod writer;

pub use reader::from_result_document;
pub use writer::{content_url, to_result_document};

const DIDL_OPEN: &str = concat!(
    r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/""#,
    r#" xmlns:dc="http://purl.org/dc/elements/1.1/""#,
    r#" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/""#,
    r#" xmlns:dlna="urn:schemas-dlna-org:metadata-1-0/">"#,
);
const DIDL_CLOSE: &str = "</DIDL-Lite>";

/// Path prefix content resources are served under.
pub const CONTENT_PREFIX: &str = "/content/";
