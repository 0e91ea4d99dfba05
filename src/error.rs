//! Error types for the case library
//!
//! Each concern gets its own enum so callers can tell the isolated,
//! log-and-continue failures (metadata, thumbnails) apart from the ones
//! that must abort a sync pass (index writes).

use std::path::PathBuf;
use thiserror::Error;

/// Failure reading or writing a `project.json` file
///
/// Read failures never escape the metadata reader; they are logged and
/// the reader falls back to an empty record.
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is empty")]
    Empty(PathBuf),

    #[error("{path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} does not contain a JSON object")]
    NotAnObject(PathBuf),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize metadata for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure producing a thumbnail
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("{source_path} is not inside project directory {project_dir}")]
    PathOutsideProject {
        source_path: PathBuf,
        project_dir: PathBuf,
    },

    #[error("source image {0} does not exist")]
    SourceMissing(PathBuf),

    #[error("failed to encode or decode {path}: {source}")]
    EncodeDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("thumbnail I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure in the SQLite index
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize project metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("project {0} not found")]
    ProjectNotFound(i64),

    #[error("image {file_path} does not belong to project {project_id}")]
    ImageNotInProject { project_id: i64, file_path: String },
}

/// Fatal outcome of a reconciliation pass
///
/// Both variants leave the previously committed index untouched.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("media root {0} does not exist or is not a directory")]
    MediaRootMissing(PathBuf),

    #[error("index write failed, pass rolled back: {0}")]
    Index(#[from] LibraryError),

    #[error("sync task failed to complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Index(LibraryError::Sqlite(err))
    }
}

/// Failure loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not determine a user data directory for the database")]
    NoDataDir,
}
