use mediacat_common::{CatalogEntry, Descriptive, EntryKind, Item, ObjectId};
use quick_xml::escape::escape;

use super::{CONTENT_PREFIX, DIDL_CLOSE, DIDL_OPEN};

/// URL a client fetches the entry's bytes from.
///
/// ```
/// use mediacat::didl::content_url;
/// use mediacat_common::ObjectId;
///
/// assert_eq!(
///     content_url("http://10.0.0.2:49152", &ObjectId::new("0$4$12")),
///     "http://10.0.0.2:49152/content/0%244%2412"
/// );
/// ```
pub fn content_url(base_url: &str, id: &ObjectId) -> String {
    format!(
        "{}{}{}",
        base_url.trim_end_matches('/'),
        CONTENT_PREFIX,
        urlencoding::encode(id.as_str())
    )
}

/// Serialize `entries` into a result document.
///
/// `metadata_only` marks a single-entry metadata answer, which carries every
/// descriptive field. Children and search pages leave out the extended ones
/// (contributor, description, publisher, language, rights).
///
/// Item resources point at their own `url` when set, otherwise at
/// [`content_url`] under `base_url`.
pub fn to_result_document(entries: &[CatalogEntry], metadata_only: bool, base_url: &str) -> String {
    let mut doc = String::with_capacity(256 + entries.len() * 512);
    doc.push_str(DIDL_OPEN);
    for entry in entries {
        match &entry.kind {
            EntryKind::Container(c) => {
                doc.push_str(&format!(
                    r#"<container id="{}" parentID="{}" childCount="{}" restricted="1" searchable="1">"#,
                    escape(entry.id.as_str()),
                    escape(entry.parent_id.as_str()),
                    c.child_count
                ));
                write_common(&mut doc, entry, metadata_only);
                element(&mut doc, "upnp:storageUsed", &c.storage_used.to_string());
                doc.push_str("</container>");
            }
            EntryKind::Item(item) => {
                doc.push_str(&format!(
                    r#"<item id="{}" parentID="{}" restricted="1">"#,
                    escape(entry.id.as_str()),
                    escape(entry.parent_id.as_str())
                ));
                write_common(&mut doc, entry, metadata_only);
                write_tags(&mut doc, item);
                write_resource(&mut doc, entry, item, base_url);
                doc.push_str("</item>");
            }
        }
    }
    doc.push_str(DIDL_CLOSE);
    doc
}

fn element(doc: &mut String, name: &str, value: &str) {
    doc.push('<');
    doc.push_str(name);
    doc.push('>');
    doc.push_str(&escape(value));
    doc.push_str("</");
    doc.push_str(name);
    doc.push('>');
}

fn optional(doc: &mut String, name: &str, value: Option<&String>) {
    if let Some(v) = value {
        element(doc, name, v);
    }
}

fn write_common(doc: &mut String, entry: &CatalogEntry, metadata_only: bool) {
    element(doc, "dc:title", &entry.title);
    element(doc, "upnp:class", entry.class_name());

    let Descriptive {
        date,
        creator,
        contributor,
        description,
        publisher,
        language,
        rights,
    } = &entry.meta;
    optional(doc, "dc:date", date.as_ref());
    optional(doc, "dc:creator", creator.as_ref());
    if metadata_only {
        optional(doc, "dc:contributor", contributor.as_ref());
        optional(doc, "dc:description", description.as_ref());
        optional(doc, "dc:publisher", publisher.as_ref());
        optional(doc, "dc:language", language.as_ref());
        optional(doc, "dc:rights", rights.as_ref());
    }
}

fn write_tags(doc: &mut String, item: &Item) {
    if let Some(tags) = item.class.audio_tags() {
        optional(doc, "upnp:artist", tags.artist.as_ref());
        optional(doc, "upnp:album", tags.album.as_ref());
        optional(doc, "upnp:genre", tags.genre.as_ref());
        if let Some(n) = tags.track_number {
            element(doc, "upnp:originalTrackNumber", &n.to_string());
        }
    } else if let Some(tags) = item.class.video_tags() {
        optional(doc, "upnp:actor", tags.actor.as_ref());
        optional(doc, "upnp:director", tags.director.as_ref());
        optional(doc, "upnp:genre", tags.genre.as_ref());
    } else if let Some(tags) = item.class.image_tags() {
        optional(doc, "upnp:album", tags.album.as_ref());
    }
}

fn write_resource(doc: &mut String, entry: &CatalogEntry, item: &Item, base_url: &str) {
    let res = &item.resource;
    let url = res
        .url
        .clone()
        .unwrap_or_else(|| content_url(base_url, &entry.id));

    doc.push_str(&format!(
        r#"<res protocolInfo="{}" size="{}""#,
        escape(res.protocol_info.as_str()),
        res.size
    ));
    if let Some(duration) = &res.duration {
        doc.push_str(&format!(r#" duration="{}""#, escape(duration.as_str())));
    }
    doc.push('>');
    doc.push_str(&escape(url.as_str()));
    doc.push_str("</res>");
}
