//! Database query modules.
//!
//! - objects: insert, lookup by id, paginated children and class search

pub mod objects;
