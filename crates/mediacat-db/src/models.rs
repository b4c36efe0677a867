//! Row models for the catalog tables.
//!
//! [`DetailRecord`] is the flattened form of a [`CatalogEntry`]: the class
//! string plus every column of the `details` table. Variant-specific tags
//! share columns across classes and are only read back for the class that
//! owns them.

use std::path::PathBuf;

use mediacat_common::types::CLASS_STORAGE_FOLDER;
use mediacat_common::{
    CatalogEntry, Container, Descriptive, EntryKind, Error, Item, ItemClass, ObjectId, Resource,
    Result,
};
use serde::{Deserialize, Serialize};

/// Handle returned by an insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// The synthesized object id, used as the parent of nested inserts.
    pub id: ObjectId,
    /// Rowid of the `details` row.
    pub detail_key: i64,
}

/// All stored fields of one entry except its addressing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub class: String,
    pub path: Option<String>,
    pub title: String,
    pub size: i64,
    pub duration: Option<String>,
    pub date: Option<String>,
    pub mime: Option<String>,
    pub profile: Option<String>,
    pub creator: Option<String>,
    pub contributor: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub rights: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<i64>,
    pub actor: Option<String>,
    pub director: Option<String>,
}

/// A joined `objects` + `details` row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub id: ObjectId,
    pub parent: ObjectId,
    pub detail_key: i64,
    pub record: DetailRecord,
}

impl DetailRecord {
    /// A storage folder with nothing but a title.
    pub fn container(title: impl Into<String>) -> Self {
        Self {
            class: CLASS_STORAGE_FOLDER.to_string(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn is_container(&self) -> bool {
        self.class.starts_with("object.container")
    }

    /// Flatten an entry. Its id and parent are ignored; the store assigns
    /// those.
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        let meta = &entry.meta;
        let mut record = Self {
            class: entry.class_name().to_string(),
            title: entry.title.clone(),
            date: meta.date.clone(),
            creator: meta.creator.clone(),
            contributor: meta.contributor.clone(),
            description: meta.description.clone(),
            publisher: meta.publisher.clone(),
            language: meta.language.clone(),
            rights: meta.rights.clone(),
            ..Self::default()
        };

        if let EntryKind::Item(item) = &entry.kind {
            let res = &item.resource;
            record.path = res
                .path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned());
            record.size = i64::try_from(res.size).unwrap_or(i64::MAX);
            record.duration = res.duration.clone();
            record.mime = Some(res.mime.clone());
            record.profile = Some(res.protocol_info.clone());

            if let Some(tags) = item.class.audio_tags() {
                record.artist = tags.artist.clone();
                record.album = tags.album.clone();
                record.genre = tags.genre.clone();
                record.track_number = tags.track_number.map(i64::from);
            } else if let Some(tags) = item.class.video_tags() {
                record.actor = tags.actor.clone();
                record.director = tags.director.clone();
                record.genre = tags.genre.clone();
            } else if let Some(tags) = item.class.image_tags() {
                record.album = tags.album.clone();
            }
        }

        record
    }

    /// Rebuild the entry this record was flattened from.
    ///
    /// `child_count` and `storage_used` only apply to containers. An unknown
    /// item class is reported as [`Error::Internal`].
    pub fn into_entry(
        self,
        id: ObjectId,
        parent_id: ObjectId,
        child_count: u32,
        storage_used: u64,
    ) -> Result<CatalogEntry> {
        let meta = Descriptive {
            date: self.date,
            creator: self.creator,
            contributor: self.contributor,
            description: self.description,
            publisher: self.publisher,
            language: self.language,
            rights: self.rights,
        };

        let kind = if self.class.starts_with("object.container") {
            EntryKind::Container(Container {
                child_count,
                storage_used,
            })
        } else {
            let mut class = ItemClass::from_class_name(&self.class)
                .ok_or_else(|| Error::internal(format!("unknown class '{}' for {id}", self.class)))?;
            if let Some(tags) = class.audio_tags_mut() {
                tags.artist = self.artist;
                tags.album = self.album;
                tags.genre = self.genre;
                tags.track_number = self.track_number.and_then(|n| u32::try_from(n).ok());
            } else if let Some(tags) = class.video_tags_mut() {
                tags.actor = self.actor;
                tags.director = self.director;
                tags.genre = self.genre;
            } else if let Some(tags) = class.image_tags_mut() {
                tags.album = self.album;
            }

            EntryKind::Item(Item {
                class,
                resource: Resource {
                    path: self.path.map(PathBuf::from),
                    url: None,
                    mime: self.mime.unwrap_or_else(|| "application/octet-stream".into()),
                    size: u64::try_from(self.size).unwrap_or(0),
                    duration: self.duration,
                    protocol_info: self.profile.unwrap_or_default(),
                },
            })
        };

        Ok(CatalogEntry {
            id,
            parent_id,
            title: self.title,
            meta,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediacat_common::paths::classify;
    use mediacat_common::{AudioTags, ImageTags};
    use std::path::Path;

    fn track() -> CatalogEntry {
        let format = classify(Path::new("song.mp3")).unwrap();
        let mut entry = CatalogEntry::item(
            ObjectId::new("0$4"),
            ObjectId::root(),
            "Song",
            ItemClass::MusicTrack(AudioTags {
                artist: Some("Artist".into()),
                album: Some("Album".into()),
                genre: Some("Rock".into()),
                track_number: Some(3),
            }),
            Resource::for_file(PathBuf::from("/m/song.mp3"), format, 4096),
        );
        entry.meta.date = Some("2001-02-03".into());
        entry
    }

    #[test]
    fn test_item_round_trip() {
        let entry = track();
        let record = DetailRecord::from_entry(&entry);
        assert_eq!(record.class, "object.item.audioItem.musicTrack");
        assert_eq!(record.track_number, Some(3));
        assert_eq!(record.size, 4096);

        let back = record
            .into_entry(entry.id.clone(), entry.parent_id.clone(), 0, 0)
            .unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_photo_keeps_only_album() {
        let format = classify(Path::new("p.jpg")).unwrap();
        let entry = CatalogEntry::item(
            ObjectId::new("0$9"),
            ObjectId::root(),
            "Pic",
            ItemClass::Photo(ImageTags {
                album: Some("Holiday".into()),
            }),
            Resource::for_file(PathBuf::from("/p.jpg"), format, 10),
        );
        let record = DetailRecord::from_entry(&entry);
        assert_eq!(record.album.as_deref(), Some("Holiday"));
        assert!(record.artist.is_none());
    }

    #[test]
    fn test_container_aggregates_applied() {
        let record = DetailRecord::container("Music");
        assert!(record.is_container());
        let entry = record
            .into_entry(ObjectId::new("0$1"), ObjectId::root(), 3, 900)
            .unwrap();
        assert_eq!(
            entry.as_container(),
            Some(&Container {
                child_count: 3,
                storage_used: 900
            })
        );
    }

    #[test]
    fn test_unknown_class_is_internal_error() {
        let record = DetailRecord {
            class: "object.item.textItem".into(),
            title: "notes".into(),
            ..DetailRecord::default()
        };
        let err = record
            .into_entry(ObjectId::new("0$2"), ObjectId::root(), 0, 0)
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
