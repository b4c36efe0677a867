use mediacat_common::paths::mime_from_protocol_info;
use mediacat_common::types::CLASS_STORAGE_FOLDER;
use mediacat_common::{
    CatalogEntry, Container, Descriptive, EntryKind, Error, Item, ItemClass, ObjectId, Resource,
    Result,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

/// Fields collected for one `<container>` / `<item>` element.
#[derive(Default)]
struct Pending {
    is_container: bool,
    id: String,
    parent_id: String,
    child_count: u32,
    storage_used: u64,
    class: String,
    title: String,
    meta: Descriptive,
    artist: Option<String>,
    album: Option<String>,
    genre: Option<String>,
    track_number: Option<u32>,
    actor: Option<String>,
    director: Option<String>,
    resource: Option<Resource>,
}

impl Pending {
    fn set_field(&mut self, field: &str, value: String) {
        match field {
            "title" => self.title = value,
            "class" => self.class = value,
            "date" => self.meta.date = Some(value),
            "creator" => self.meta.creator = Some(value),
            "contributor" => self.meta.contributor = Some(value),
            "description" => self.meta.description = Some(value),
            "publisher" => self.meta.publisher = Some(value),
            "language" => self.meta.language = Some(value),
            "rights" => self.meta.rights = Some(value),
            "artist" => self.artist = Some(value),
            "album" => self.album = Some(value),
            "genre" => self.genre = Some(value),
            "originalTrackNumber" => self.track_number = value.trim().parse().ok(),
            "actor" => self.actor = Some(value),
            "director" => self.director = Some(value),
            "storageUsed" => self.storage_used = value.trim().parse().unwrap_or(0),
            "res" => {
                if let (Some(res), false) = (&mut self.resource, value.is_empty()) {
                    res.url = Some(value);
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Option<CatalogEntry> {
        let kind = if self.is_container || self.class.starts_with("object.container") {
            EntryKind::Container(Container {
                child_count: self.child_count,
                storage_used: self.storage_used,
            })
        } else {
            let Some(mut class) = ItemClass::from_class_name(&self.class) else {
                debug!("Skipping '{}' with unrecognized class '{}'", self.id, self.class);
                return None;
            };
            if let Some(tags) = class.audio_tags_mut() {
                tags.artist = self.artist;
                tags.album = self.album;
                tags.genre = self.genre;
                tags.track_number = self.track_number;
            } else if let Some(tags) = class.video_tags_mut() {
                tags.actor = self.actor;
                tags.director = self.director;
                tags.genre = self.genre;
            } else if let Some(tags) = class.image_tags_mut() {
                tags.album = self.album;
            }
            EntryKind::Item(Item {
                class,
                resource: self.resource.unwrap_or_else(|| Resource {
                    path: None,
                    url: None,
                    mime: "application/octet-stream".into(),
                    size: 0,
                    duration: None,
                    protocol_info: String::new(),
                }),
            })
        };

        Some(CatalogEntry {
            id: ObjectId::new(self.id),
            parent_id: ObjectId::new(self.parent_id),
            title: self.title,
            meta: self.meta,
            kind,
        })
    }
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::malformed(format!("result document: {e}"))
}

fn attributes(element: &BytesStart) -> Result<Vec<(String, String)>> {
    element
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn open_entry(element: &BytesStart, is_container: bool) -> Result<Pending> {
    let mut pending = Pending {
        is_container,
        class: if is_container {
            CLASS_STORAGE_FOLDER.to_string()
        } else {
            String::new()
        },
        ..Pending::default()
    };
    for (key, value) in attributes(element)? {
        match key.as_str() {
            "id" => pending.id = value,
            "parentID" => pending.parent_id = value,
            "childCount" => pending.child_count = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    Ok(pending)
}

fn open_resource(element: &BytesStart) -> Result<Resource> {
    let mut res = Resource {
        path: None,
        url: None,
        mime: String::new(),
        size: 0,
        duration: None,
        protocol_info: String::new(),
    };
    for (key, value) in attributes(element)? {
        match key.as_str() {
            "protocolInfo" => {
                res.mime = mime_from_protocol_info(&value)
                    .unwrap_or("application/octet-stream")
                    .to_string();
                res.protocol_info = value;
            }
            "size" => res.size = value.parse().unwrap_or(0),
            "duration" => res.duration = Some(value),
            _ => {}
        }
    }
    if res.mime.is_empty() {
        res.mime = "application/octet-stream".into();
    }
    Ok(res)
}

/// Parse a result document back into entries.
///
/// Missing optional fields stay unset. An element whose class is not one
/// of the known item classes is skipped; the rest of the document is still
/// returned.
///
/// Text content is taken verbatim; only the whitespace between elements is
/// dropped.
pub fn from_result_document(doc: &str) -> Result<Vec<CatalogEntry>> {
    let mut reader = Reader::from_str(doc);

    let mut entries = Vec::new();
    let mut current: Option<Pending> = None;
    let mut field: Option<String> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"container" => {
                    current = Some(open_entry(&e, true)?);
                    field = None;
                }
                b"item" => {
                    current = Some(open_entry(&e, false)?);
                    field = None;
                }
                b"res" => {
                    if let Some(p) = &mut current {
                        p.resource = Some(open_resource(&e)?);
                    }
                    field = Some("res".into());
                }
                name => field = Some(String::from_utf8_lossy(name).into_owned()),
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"container" | b"item" => {
                    let is_container = e.local_name().as_ref() == b"container";
                    if let Some(entry) = open_entry(&e, is_container)?.finish() {
                        entries.push(entry);
                    }
                }
                b"res" => {
                    if let Some(p) = &mut current {
                        p.resource = Some(open_resource(&e)?);
                    }
                }
                // An empty field element still means an empty value.
                name => {
                    if let Some(p) = &mut current {
                        p.set_field(&String::from_utf8_lossy(name), String::new());
                    }
                }
            },
            Event::Text(t) => {
                if let (Some(p), Some(name)) = (&mut current, field.take()) {
                    let value = t.unescape().map_err(xml_error)?.into_owned();
                    p.set_field(&name, value);
                }
            }
            Event::End(e) => {
                // A field closed without any text holds the empty string.
                if let (Some(p), Some(name)) = (&mut current, field.take()) {
                    p.set_field(&name, String::new());
                }
                if matches!(e.local_name().as_ref(), b"container" | b"item") {
                    if let Some(entry) = current.take().and_then(Pending::finish) {
                        entries.push(entry);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecognized_class_is_skipped() {
        let doc = r#"<DIDL-Lite>
            <item id="a" parentID="0"><dc:title>Text</dc:title><upnp:class>object.item.textItem</upnp:class></item>
            <item id="b" parentID="0"><dc:title>Song</dc:title><upnp:class>object.item.audioItem</upnp:class></item>
        </DIDL-Lite>"#;
        let entries = from_result_document(doc).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id.as_str(), "b");
        assert_eq!(entries[0].resource().unwrap().mime, "application/octet-stream");
    }

    #[test]
    fn test_missing_optional_fields() {
        let doc = r#"<DIDL-Lite><container id="0$9" parentID="0"><dc:title>Bare</dc:title></container></DIDL-Lite>"#;
        let entries = from_result_document(doc).unwrap();
        assert_eq!(entries.len(), 1);
        let c = entries[0].as_container().unwrap();
        assert_eq!(c.child_count, 0);
        assert_eq!(entries[0].meta, Descriptive::default());
        assert_eq!(entries[0].class_name(), CLASS_STORAGE_FOLDER);
    }

    #[test]
    fn test_resource_mime_from_protocol_info() {
        let doc = r#"<DIDL-Lite><item id="1" parentID="0"><dc:title>v</dc:title>
            <upnp:class>object.item.videoItem</upnp:class>
            <res protocolInfo="http-get:*:video/x-matroska:*" size="77">http://h/content/1</res>
        </item></DIDL-Lite>"#;
        let entries = from_result_document(doc).unwrap();
        let res = entries[0].resource().unwrap();
        assert_eq!(res.mime, "video/x-matroska");
        assert_eq!(res.size, 77);
        assert_eq!(res.url.as_deref(), Some("http://h/content/1"));
    }

    #[test]
    fn test_edge_whitespace_in_text_is_kept() {
        use crate::didl::to_result_document;

        let mut folder = CatalogEntry::container(ObjectId::new("0$3"), ObjectId::root(), " Intro ");
        folder.meta.description = Some("  two  spaces ".into());
        folder.meta.rights = Some(String::new());
        let doc = to_result_document(std::slice::from_ref(&folder), true, "http://h:1");

        let parsed = from_result_document(&doc).unwrap();
        assert_eq!(parsed, [folder]);
        assert_eq!(parsed[0].title, " Intro ");
    }

    #[test]
    fn test_indented_document() {
        let doc = "<DIDL-Lite>\n  <container id=\"0$9\" parentID=\"0\">\n    <dc:title>\tTabbed</dc:title>\n  </container>\n</DIDL-Lite>\n";
        let entries = from_result_document(doc).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "\tTabbed");
        assert_eq!(entries[0].meta, Descriptive::default());
    }

    #[test]
    fn test_malformed_document_is_error() {
        let err = from_result_document("<DIDL-Lite><item id=\"1\"></container>").unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));
    }
}
