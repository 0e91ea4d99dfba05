//! Filesystem-backed case library
//!
//! A media root full of project folders is classified, enumerated and
//! reconciled into a SQLite catalog. Thumbnails are produced on demand into
//! per-project `_thumbs` folders.

pub mod config;
pub mod error;
pub mod scan;
pub mod state;
pub mod sync;
pub mod thumbnail;

pub use config::Config;
pub use error::{ConfigError, LibraryError, MetaError, SyncError, ThumbnailError};
pub use state::{Library, Project, SyncSummary};
pub use sync::{sync_blocking_task, SyncEngine};
pub use thumbnail::{ensure_thumbnail_task, ThumbnailCache};
