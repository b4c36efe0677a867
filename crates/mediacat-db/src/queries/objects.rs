//! Catalog object queries.
//!
//! Children and search windows are computed in two steps: a count scoped to
//! the parent predicate, then (only when something matched) the joined page
//! ordered by title. Container rows in a page get their aggregates from
//! nested queries.

use mediacat_common::{
    BrowseResult, BrowseWindow, CatalogEntry, Error, ObjectId, Result, SearchClass,
};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{DetailRecord, ObjectRef, StoredObject};

const SELECT_JOINED: &str = "SELECT o.id, o.parent, o.detail, o.class,
        d.path, d.title, d.size, d.duration, d.date, d.mime, d.profile,
        d.creator, d.contributor, d.description, d.publisher, d.language, d.rights,
        d.artist, d.album, d.genre, d.track_number, d.actor, d.director
     FROM objects o JOIN details d ON d.id = o.detail";

/// Parent predicate matching every descendant of `:parent`.
const DESCENDANT_OF: &str = "(o.parent = :parent OR o.parent GLOB :parent_glob)";

fn parse_object_row(row: &rusqlite::Row) -> rusqlite::Result<StoredObject> {
    Ok(StoredObject {
        id: ObjectId::new(row.get::<_, String>(0)?),
        parent: ObjectId::new(row.get::<_, String>(1)?),
        detail_key: row.get(2)?,
        record: DetailRecord {
            class: row.get(3)?,
            path: row.get(4)?,
            title: row.get(5)?,
            size: row.get(6)?,
            duration: row.get(7)?,
            date: row.get(8)?,
            mime: row.get(9)?,
            profile: row.get(10)?,
            creator: row.get(11)?,
            contributor: row.get(12)?,
            description: row.get(13)?,
            publisher: row.get(14)?,
            language: row.get(15)?,
            rights: row.get(16)?,
            artist: row.get(17)?,
            album: row.get(18)?,
            genre: row.get(19)?,
            track_number: row.get(20)?,
            actor: row.get(21)?,
            director: row.get(22)?,
        },
    })
}

fn descendant_glob(parent: &ObjectId) -> String {
    format!("{}$*", parent.as_str())
}

fn insert_details(conn: &Connection, record: &DetailRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO details (
            path, title, size, duration, date, mime, profile,
            creator, contributor, description, publisher, language, rights,
            artist, album, genre, track_number, actor, director
         ) VALUES (
            :path, :title, :size, :duration, :date, :mime, :profile,
            :creator, :contributor, :description, :publisher, :language, :rights,
            :artist, :album, :genre, :track_number, :actor, :director
         )",
        rusqlite::named_params! {
            ":path": record.path,
            ":title": record.title,
            ":size": record.size,
            ":duration": record.duration,
            ":date": record.date,
            ":mime": record.mime,
            ":profile": record.profile,
            ":creator": record.creator,
            ":contributor": record.contributor,
            ":description": record.description,
            ":publisher": record.publisher,
            ":language": record.language,
            ":rights": record.rights,
            ":artist": record.artist,
            ":album": record.album,
            ":genre": record.genre,
            ":track_number": record.track_number,
            ":actor": record.actor,
            ":director": record.director,
        },
    )
    .map_err(Error::backend)?;
    Ok(conn.last_insert_rowid())
}

fn insert_object(
    conn: &Connection,
    id: &ObjectId,
    class: &str,
    parent: &ObjectId,
    detail_key: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO objects (id, class, parent, detail)
         VALUES (:id, :class, :parent, :detail)",
        rusqlite::named_params! {
            ":id": id.as_str(),
            ":class": class,
            ":parent": parent.as_str(),
            ":detail": detail_key,
        },
    )
    .map_err(Error::backend)?;
    Ok(())
}

/// Insert the root container (`0`, parent `-1`).
pub fn insert_root(conn: &Connection, title: &str) -> Result<ObjectRef> {
    let record = DetailRecord::container(title);
    let detail_key = insert_details(conn, &record)?;
    let id = ObjectId::root();
    insert_object(conn, &id, &record.class, &ObjectId::root_parent(), detail_key)?;
    Ok(ObjectRef { id, detail_key })
}

/// Append a details row, then the object row addressing it.
///
/// The new id is `<parent>$<detail key>`. The returned handle's `id` is the
/// parent to pass for the entry's own children.
pub fn insert(conn: &Connection, parent: &ObjectId, record: &DetailRecord) -> Result<ObjectRef> {
    let detail_key = insert_details(conn, record)?;
    let id = ObjectId::indexed(parent, detail_key);
    insert_object(conn, &id, &record.class, parent, detail_key)?;
    Ok(ObjectRef { id, detail_key })
}

/// Number of direct children of `parent`.
pub fn count_children(conn: &Connection, parent: &ObjectId) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM objects WHERE parent = :parent",
        rusqlite::named_params! { ":parent": parent.as_str() },
        |row| row.get(0),
    )
    .map_err(Error::backend)
}

/// Total size of every item below `parent`, at any depth.
pub fn storage_used(conn: &Connection, parent: &ObjectId) -> Result<u64> {
    let sql = format!(
        "SELECT COALESCE(SUM(d.size), 0) FROM objects o JOIN details d ON d.id = o.detail
         WHERE {DESCENDANT_OF} AND o.class NOT GLOB 'object.container*'"
    );
    let total: i64 = conn
        .query_row(
            &sql,
            rusqlite::named_params! {
                ":parent": parent.as_str(),
                ":parent_glob": descendant_glob(parent),
            },
            |row| row.get(0),
        )
        .map_err(Error::backend)?;
    Ok(u64::try_from(total).unwrap_or(0))
}

fn to_entry(conn: &Connection, stored: StoredObject) -> Result<CatalogEntry> {
    let (child_count, storage) = if stored.record.is_container() {
        (
            count_children(conn, &stored.id)?,
            storage_used(conn, &stored.id)?,
        )
    } else {
        (0, 0)
    };
    stored
        .record
        .into_entry(stored.id, stored.parent, child_count, storage)
}

/// Look up a single entry.
pub fn get_object(conn: &Connection, id: &ObjectId) -> Result<Option<CatalogEntry>> {
    let sql = format!("{SELECT_JOINED} WHERE o.id = :id");
    let stored = conn
        .query_row(
            &sql,
            rusqlite::named_params! { ":id": id.as_str() },
            parse_object_row,
        )
        .optional()
        .map_err(Error::backend)?;

    stored.map(|s| to_entry(conn, s)).transpose()
}

/// Direct children of `parent`, ordered by title.
///
/// A parent without children (including one that does not exist) yields an
/// empty result with `total_matches == 0`.
pub fn query_children(
    conn: &Connection,
    parent: &ObjectId,
    window: BrowseWindow,
) -> Result<BrowseResult> {
    let total_matches = count_children(conn, parent)?;
    if total_matches == 0 {
        return Ok(BrowseResult::empty());
    }

    let sql = format!(
        "{SELECT_JOINED} WHERE o.parent = :parent
         ORDER BY d.title, o.id LIMIT :limit OFFSET :offset"
    );
    let mut stmt = conn.prepare(&sql).map_err(Error::backend)?;
    let rows = stmt
        .query_map(
            rusqlite::named_params! {
                ":parent": parent.as_str(),
                ":limit": window.sql_limit(),
                ":offset": window.start,
            },
            parse_object_row,
        )
        .map_err(Error::backend)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::backend)?;

    let entries = rows
        .into_iter()
        .map(|s| to_entry(conn, s))
        .collect::<Result<Vec<_>>>()?;

    Ok(BrowseResult {
        entries,
        total_matches,
    })
}

/// Descendants of `parent` whose class matches `class`, ordered by title.
pub fn query_search(
    conn: &Connection,
    parent: &ObjectId,
    class: SearchClass,
    window: BrowseWindow,
) -> Result<BrowseResult> {
    let class_glob = class
        .class_prefix()
        .map_or_else(|| "*".to_string(), |prefix| format!("{prefix}*"));
    let parent_glob = descendant_glob(parent);

    let count_sql = format!(
        "SELECT COUNT(*) FROM objects o WHERE {DESCENDANT_OF} AND o.class GLOB :class_glob"
    );
    let total_matches: u32 = conn
        .query_row(
            &count_sql,
            rusqlite::named_params! {
                ":parent": parent.as_str(),
                ":parent_glob": parent_glob,
                ":class_glob": class_glob,
            },
            |row| row.get(0),
        )
        .map_err(Error::backend)?;
    if total_matches == 0 {
        return Ok(BrowseResult::empty());
    }

    let sql = format!(
        "{SELECT_JOINED} WHERE {DESCENDANT_OF} AND o.class GLOB :class_glob
         ORDER BY d.title, o.id LIMIT :limit OFFSET :offset"
    );
    let mut stmt = conn.prepare(&sql).map_err(Error::backend)?;
    let rows = stmt
        .query_map(
            rusqlite::named_params! {
                ":parent": parent.as_str(),
                ":parent_glob": parent_glob,
                ":class_glob": class_glob,
                ":limit": window.sql_limit(),
                ":offset": window.start,
            },
            parse_object_row,
        )
        .map_err(Error::backend)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::backend)?;

    let entries = rows
        .into_iter()
        .map(|s| to_entry(conn, s))
        .collect::<Result<Vec<_>>>()?;

    Ok(BrowseResult {
        entries,
        total_matches,
    })
}

/// Number of objects in the store, root included.
pub fn count_objects(conn: &Connection) -> Result<u64> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))
        .map_err(Error::backend)?;
    Ok(u64::try_from(n).unwrap_or(0))
}
