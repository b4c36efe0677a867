//! Mediacat-DB: the indexed catalog store.
//!
//! Entries live in two tables: `objects` carries the addressing (id, class,
//! parent) and `details` carries everything describing the entry. Object ids
//! are `<parent>$<details rowid>`, assigned once at insert time.
//!
//! # Modules
//!
//! - `migrations` - Embedded schema migrations
//! - `pool` - Connection pool management
//! - `models` - Row models and their conversion to catalog entries
//! - `queries` - Insert, lookup, children and search queries
//!
//! # Example
//!
//! ```
//! use mediacat_common::BrowseWindow;
//! use mediacat_db::models::DetailRecord;
//! use mediacat_db::pool::{get_conn, init_memory_pool};
//! use mediacat_db::queries::objects;
//!
//! let pool = init_memory_pool().unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let root = objects::insert_root(&conn, "Media").unwrap();
//! objects::insert(&conn, &root.id, &DetailRecord::container("Music")).unwrap();
//!
//! let page = objects::query_children(&conn, &root.id, BrowseWindow::new(0, 10)).unwrap();
//! assert_eq!(page.total_matches, 1);
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
