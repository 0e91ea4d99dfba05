//! Catalog state
//!
//! - `data`: record types shared by the index, sync and edits
//! - `library`: the SQLite index and its read queries
//! - `edit`: manual edits that lock a project against sync

pub mod data;
pub mod edit;
pub mod library;

pub use data::{split_tags, Image, Project, ProjectUpdate, SyncSummary, Tag};
pub use library::Library;
