//! Media classification by file extension.
//!
//! The scanner uses these tables to decide whether a file enters the catalog
//! at all, which item class it gets, and which MIME type and DLNA profile its
//! resource advertises.

use std::path::Path;

/// Broad media category of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
    Image,
}

/// How a file extension is advertised to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFormat {
    pub kind: MediaKind,
    pub mime: &'static str,
    /// DLNA profile name, when one applies.
    pub dlna_profile: Option<&'static str>,
}

const fn media_format(
    kind: MediaKind,
    mime: &'static str,
    dlna_profile: Option<&'static str>,
) -> MediaFormat {
    MediaFormat {
        kind,
        mime,
        dlna_profile,
    }
}

/// Extension table. Lookups are case-insensitive.
const FORMATS: &[(&str, MediaFormat)] = &[
    ("mp3", media_format(MediaKind::Audio, "audio/mpeg", Some("MP3"))),
    ("flac", media_format(MediaKind::Audio, "audio/x-flac", None)),
    ("ogg", media_format(MediaKind::Audio, "application/ogg", None)),
    ("oga", media_format(MediaKind::Audio, "audio/ogg", None)),
    ("m4a", media_format(MediaKind::Audio, "audio/mp4", Some("AAC_ISO_320"))),
    ("aac", media_format(MediaKind::Audio, "audio/aac", Some("AAC_ADTS_320"))),
    ("wav", media_format(MediaKind::Audio, "audio/wav", Some("LPCM"))),
    ("wma", media_format(MediaKind::Audio, "audio/x-ms-wma", Some("WMABASE"))),
    ("mp4", media_format(MediaKind::Video, "video/mp4", Some("AVC_MP4_MP_SD_AAC_MULT5"))),
    ("m4v", media_format(MediaKind::Video, "video/mp4", Some("AVC_MP4_MP_SD_AAC_MULT5"))),
    ("mkv", media_format(MediaKind::Video, "video/x-matroska", None)),
    ("avi", media_format(MediaKind::Video, "video/x-msvideo", None)),
    ("mpg", media_format(MediaKind::Video, "video/mpeg", Some("MPEG_PS_PAL"))),
    ("mpeg", media_format(MediaKind::Video, "video/mpeg", Some("MPEG_PS_PAL"))),
    ("ts", media_format(MediaKind::Video, "video/mp2t", Some("MPEG_TS_SD_EU_ISO"))),
    ("mov", media_format(MediaKind::Video, "video/quicktime", None)),
    ("webm", media_format(MediaKind::Video, "video/webm", None)),
    ("wmv", media_format(MediaKind::Video, "video/x-ms-wmv", Some("WMVMED_BASE"))),
    ("flv", media_format(MediaKind::Video, "video/x-flv", None)),
    ("jpg", media_format(MediaKind::Image, "image/jpeg", Some("JPEG_LRG"))),
    ("jpeg", media_format(MediaKind::Image, "image/jpeg", Some("JPEG_LRG"))),
    ("png", media_format(MediaKind::Image, "image/png", Some("PNG_LRG"))),
    ("gif", media_format(MediaKind::Image, "image/gif", Some("GIF_LRG"))),
    ("bmp", media_format(MediaKind::Image, "image/bmp", None)),
    ("webp", media_format(MediaKind::Image, "image/webp", None)),
];

/// DLNA flags for streamable audio/video resources.
const STREAMING_FLAGS: &str = "01700000000000000000000000000000";

/// DLNA flags for interactive (image) resources.
const INTERACTIVE_FLAGS: &str = "00f00000000000000000000000000000";

/// Look up how a file is classified from its extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use mediacat_common::paths::{classify, MediaKind};
///
/// let format = classify(Path::new("/music/song.MP3")).unwrap();
/// assert_eq!(format.kind, MediaKind::Audio);
/// assert_eq!(format.mime, "audio/mpeg");
/// assert!(classify(Path::new("notes.txt")).is_none());
/// ```
pub fn classify(path: &Path) -> Option<MediaFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    FORMATS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, format)| *format)
}

impl MediaFormat {
    /// The `contentFeatures.dlna.org` value (fourth protocol-info field).
    pub fn content_features(&self) -> String {
        let flags = match self.kind {
            MediaKind::Image => INTERACTIVE_FLAGS,
            MediaKind::Audio | MediaKind::Video => STREAMING_FLAGS,
        };
        match self.dlna_profile {
            Some(profile) => format!(
                "DLNA.ORG_PN={profile};DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS={flags}"
            ),
            None => format!("DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS={flags}"),
        }
    }

    /// The full `http-get:*:<mime>:<features>` protocol-info string.
    pub fn protocol_info(&self) -> String {
        format!("http-get:*:{}:{}", self.mime, self.content_features())
    }

    /// The `transferMode.dlna.org` header value for this kind of media.
    pub fn transfer_mode(&self) -> &'static str {
        match self.kind {
            MediaKind::Image => "Interactive",
            MediaKind::Audio | MediaKind::Video => "Streaming",
        }
    }
}

/// Extract the MIME type (third field) from a protocol-info string.
///
/// # Examples
///
/// ```
/// use mediacat_common::paths::mime_from_protocol_info;
///
/// assert_eq!(
///     mime_from_protocol_info("http-get:*:audio/mpeg:DLNA.ORG_PN=MP3"),
///     Some("audio/mpeg")
/// );
/// assert_eq!(mime_from_protocol_info("garbage"), None);
/// ```
pub fn mime_from_protocol_info(protocol_info: &str) -> Option<&str> {
    protocol_info.split(':').nth(2).filter(|m| !m.is_empty())
}
