//! Catalog entry model.
//!
//! An entry is either a container (folder) or a typed item. The item's class
//! decides which optional tag set it carries; every item has exactly one
//! resource descriptor pointing at its bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::ids::ObjectId;
use crate::paths::{MediaFormat, MediaKind};

/// Class string of storage folders.
pub const CLASS_STORAGE_FOLDER: &str = "object.container.storageFolder";
pub const CLASS_AUDIO_ITEM: &str = "object.item.audioItem";
pub const CLASS_MUSIC_TRACK: &str = "object.item.audioItem.musicTrack";
pub const CLASS_VIDEO_ITEM: &str = "object.item.videoItem";
pub const CLASS_MOVIE: &str = "object.item.videoItem.movie";
pub const CLASS_IMAGE_ITEM: &str = "object.item.imageItem";
pub const CLASS_PHOTO: &str = "object.item.imageItem.photo";

/// One addressable media object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: ObjectId,
    pub parent_id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub meta: Descriptive,
    pub kind: EntryKind,
}

/// Free-text descriptive metadata shared by every entry kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptive {
    pub date: Option<String>,
    pub creator: Option<String>,
    pub contributor: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub rights: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum EntryKind {
    Container(Container),
    Item(Item),
}

/// Aggregates a container exposes about its direct children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub child_count: u32,
    /// Recursive byte total of every item below this container.
    pub storage_used: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub class: ItemClass,
    pub resource: Resource,
}

/// Item variants. The specific classes refine the generic ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemClass {
    MusicTrack(AudioTags),
    AudioItem(AudioTags),
    Movie(VideoTags),
    VideoItem(VideoTags),
    Photo(ImageTags),
    ImageItem(ImageTags),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTags {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTags {
    pub actor: Option<String>,
    pub director: Option<String>,
    pub genre: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTags {
    pub album: Option<String>,
}

/// Where an item's bytes live and how they are advertised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Backing file on the serving side. Never serialized into documents.
    pub path: Option<PathBuf>,
    /// Fetch location. Set on the consuming side, or to override the URL the
    /// serializer would build from the server address.
    pub url: Option<String>,
    pub mime: String,
    pub size: u64,
    /// `H:MM:SS.mmm`, when known.
    pub duration: Option<String>,
    pub protocol_info: String,
}

impl CatalogEntry {
    /// Build a storage folder entry with zeroed aggregates.
    pub fn container(id: ObjectId, parent_id: ObjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            title: title.into(),
            meta: Descriptive::default(),
            kind: EntryKind::Container(Container::default()),
        }
    }

    /// Build an item entry.
    pub fn item(
        id: ObjectId,
        parent_id: ObjectId,
        title: impl Into<String>,
        class: ItemClass,
        resource: Resource,
    ) -> Self {
        Self {
            id,
            parent_id,
            title: title.into(),
            meta: Descriptive::default(),
            kind: EntryKind::Item(Item { class, resource }),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, EntryKind::Container(_))
    }

    /// The class string this entry is advertised with.
    pub fn class_name(&self) -> &'static str {
        match &self.kind {
            EntryKind::Container(_) => CLASS_STORAGE_FOLDER,
            EntryKind::Item(item) => item.class.class_name(),
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match &self.kind {
            EntryKind::Container(c) => Some(c),
            EntryKind::Item(_) => None,
        }
    }

    pub fn as_container_mut(&mut self) -> Option<&mut Container> {
        match &mut self.kind {
            EntryKind::Container(c) => Some(c),
            EntryKind::Item(_) => None,
        }
    }

    pub fn resource(&self) -> Option<&Resource> {
        match &self.kind {
            EntryKind::Container(_) => None,
            EntryKind::Item(item) => Some(&item.resource),
        }
    }

    /// Bytes this entry contributes to its parent's `storage_used`.
    pub fn storage_bytes(&self) -> u64 {
        match &self.kind {
            EntryKind::Container(c) => c.storage_used,
            EntryKind::Item(item) => item.resource.size,
        }
    }
}

impl ItemClass {
    /// The specific item class for a file of the given media kind.
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => ItemClass::MusicTrack(AudioTags::default()),
            MediaKind::Video => ItemClass::Movie(VideoTags::default()),
            MediaKind::Image => ItemClass::Photo(ImageTags::default()),
        }
    }

    /// Parse a class string. Unknown classes yield `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mediacat_common::ItemClass;
    ///
    /// assert!(matches!(
    ///     ItemClass::from_class_name("object.item.audioItem.musicTrack"),
    ///     Some(ItemClass::MusicTrack(_))
    /// ));
    /// assert!(ItemClass::from_class_name("object.item.textItem").is_none());
    /// ```
    pub fn from_class_name(class: &str) -> Option<Self> {
        let class = match class {
            CLASS_MUSIC_TRACK => ItemClass::MusicTrack(AudioTags::default()),
            CLASS_AUDIO_ITEM => ItemClass::AudioItem(AudioTags::default()),
            CLASS_MOVIE => ItemClass::Movie(VideoTags::default()),
            CLASS_VIDEO_ITEM => ItemClass::VideoItem(VideoTags::default()),
            CLASS_PHOTO => ItemClass::Photo(ImageTags::default()),
            CLASS_IMAGE_ITEM => ItemClass::ImageItem(ImageTags::default()),
            _ => return None,
        };
        Some(class)
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ItemClass::MusicTrack(_) => CLASS_MUSIC_TRACK,
            ItemClass::AudioItem(_) => CLASS_AUDIO_ITEM,
            ItemClass::Movie(_) => CLASS_MOVIE,
            ItemClass::VideoItem(_) => CLASS_VIDEO_ITEM,
            ItemClass::Photo(_) => CLASS_PHOTO,
            ItemClass::ImageItem(_) => CLASS_IMAGE_ITEM,
        }
    }

    pub fn audio_tags(&self) -> Option<&AudioTags> {
        match self {
            ItemClass::MusicTrack(t) | ItemClass::AudioItem(t) => Some(t),
            _ => None,
        }
    }

    pub fn video_tags(&self) -> Option<&VideoTags> {
        match self {
            ItemClass::Movie(t) | ItemClass::VideoItem(t) => Some(t),
            _ => None,
        }
    }

    pub fn image_tags(&self) -> Option<&ImageTags> {
        match self {
            ItemClass::Photo(t) | ItemClass::ImageItem(t) => Some(t),
            _ => None,
        }
    }

    pub fn audio_tags_mut(&mut self) -> Option<&mut AudioTags> {
        match self {
            ItemClass::MusicTrack(t) | ItemClass::AudioItem(t) => Some(t),
            _ => None,
        }
    }

    pub fn video_tags_mut(&mut self) -> Option<&mut VideoTags> {
        match self {
            ItemClass::Movie(t) | ItemClass::VideoItem(t) => Some(t),
            _ => None,
        }
    }

    pub fn image_tags_mut(&mut self) -> Option<&mut ImageTags> {
        match self {
            ItemClass::Photo(t) | ItemClass::ImageItem(t) => Some(t),
            _ => None,
        }
    }
}

impl Resource {
    /// Describe a backing file of known format and size.
    pub fn for_file(path: PathBuf, format: MediaFormat, size: u64) -> Self {
        Self {
            path: Some(path),
            url: None,
            mime: format.mime.to_string(),
            size,
            duration: None,
            protocol_info: format.protocol_info(),
        }
    }
}

/// Class filter a Search is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SearchClass {
    Audio,
    Video,
    Image,
    /// No class restriction.
    #[default]
    Any,
}

impl SearchClass {
    /// Derive the class filter from a search criteria string.
    ///
    /// Only the three `derivedfrom` predicates on audio, video and image items
    /// are recognized; anything else matches every entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use mediacat_common::SearchClass;
    ///
    /// let c = SearchClass::from_criteria(r#"upnp:class derivedfrom "object.item.audioItem""#);
    /// assert_eq!(c, SearchClass::Audio);
    /// assert_eq!(SearchClass::from_criteria("*"), SearchClass::Any);
    /// ```
    pub fn from_criteria(criteria: &str) -> Self {
        let lowered = criteria.to_ascii_lowercase();
        if !lowered.contains("derivedfrom") {
            return SearchClass::Any;
        }
        if lowered.contains("object.item.audioitem") {
            SearchClass::Audio
        } else if lowered.contains("object.item.videoitem") {
            SearchClass::Video
        } else if lowered.contains("object.item.imageitem") {
            SearchClass::Image
        } else {
            SearchClass::Any
        }
    }

    /// The class prefix this filter requires, if any.
    pub fn class_prefix(&self) -> Option<&'static str> {
        match self {
            SearchClass::Audio => Some(CLASS_AUDIO_ITEM),
            SearchClass::Video => Some(CLASS_VIDEO_ITEM),
            SearchClass::Image => Some(CLASS_IMAGE_ITEM),
            SearchClass::Any => None,
        }
    }

    pub fn matches(&self, class_name: &str) -> bool {
        self.class_prefix()
            .map_or(true, |prefix| class_name.starts_with(prefix))
    }
}

impl fmt::Display for SearchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// A paging request over an ordered entry list.
///
/// `count == 0` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseWindow {
    pub start: u32,
    pub count: u32,
}

/// One page of results plus the size of the full match set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowseResult {
    pub entries: Vec<CatalogEntry>,
    pub total_matches: u32,
}

impl BrowseWindow {
    pub fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }

    /// Every match, from the first.
    pub fn all() -> Self {
        Self::default()
    }

    /// Sort `entries` by title and cut out this window.
    ///
    /// # Examples
    ///
    /// ```
    /// use mediacat_common::{BrowseWindow, CatalogEntry, ObjectId};
    ///
    /// let entries = ["c", "a", "b"]
    ///     .iter()
    ///     .map(|t| CatalogEntry::container(ObjectId::new(*t), ObjectId::root(), *t))
    ///     .collect();
    /// let page = BrowseWindow::new(1, 5).slice(entries);
    /// assert_eq!(page.total_matches, 3);
    /// assert_eq!(page.number_returned(), 2);
    /// assert_eq!(page.entries[0].title, "b");
    /// ```
    pub fn slice(&self, mut entries: Vec<CatalogEntry>) -> BrowseResult {
        let total_matches = u32::try_from(entries.len()).unwrap_or(u32::MAX);
        entries.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));

        let start = self.start as usize;
        if start >= entries.len() {
            return BrowseResult {
                entries: Vec::new(),
                total_matches,
            };
        }
        let mut page = entries.split_off(start);
        if self.count > 0 {
            page.truncate(self.count as usize);
        }
        BrowseResult {
            entries: page,
            total_matches,
        }
    }

    /// SQL `LIMIT` value: `-1` for unbounded.
    pub fn sql_limit(&self) -> i64 {
        if self.count == 0 {
            -1
        } else {
            i64::from(self.count)
        }
    }
}

impl BrowseResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn number_returned(&self) -> u32 {
        u32::try_from(self.entries.len()).unwrap_or(u32::MAX)
    }
}
