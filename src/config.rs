//! Runtime configuration
//!
//! Values come from an optional JSON file, then environment overrides:
//! - `CASELIB_MEDIA_ROOT` - root of the project/media tree
//! - `CASELIB_DB_PATH` - SQLite catalog location

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::thumbnail::DEFAULT_LONG_EDGE;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "caselib.json";

const ENV_MEDIA_ROOT: &str = "CASELIB_MEDIA_ROOT";
const ENV_DB_PATH: &str = "CASELIB_DB_PATH";

/// Shape of the on-disk config file; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    media_root: Option<PathBuf>,
    db_path: Option<PathBuf>,
    thumb_long_edge: Option<u32>,
}

/// Resolved configuration shared by the indexer and the serving layer
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root every stored relative path is computed against
    pub media_root: PathBuf,
    /// SQLite catalog file
    pub db_path: PathBuf,
    /// Longer edge of generated thumbnails, in pixels
    pub thumb_long_edge: u32,
}

impl Config {
    /// Load configuration from `path` (or `caselib.json` if present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => Some(read_config_file(path)?),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Some(read_config_file(default)?)
                } else {
                    None
                }
            }
        }
        .unwrap_or_default();

        let media_root = std::env::var_os(ENV_MEDIA_ROOT)
            .map(PathBuf::from)
            .or(file.media_root)
            .unwrap_or_else(|| PathBuf::from("media"));

        let db_path = match std::env::var_os(ENV_DB_PATH).map(PathBuf::from).or(file.db_path) {
            Some(path) => path,
            None => default_db_path()?,
        };

        Ok(Config {
            media_root: resolve_media_root(&media_root),
            db_path,
            thumb_long_edge: file.thumb_long_edge.unwrap_or(DEFAULT_LONG_EDGE),
        })
    }

    /// Configuration rooted at `media_root` with the database stored beside it
    pub fn with_media_root(media_root: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Config {
            media_root: resolve_media_root(&media_root.into()),
            db_path: db_path.into(),
            thumb_long_edge: DEFAULT_LONG_EDGE,
        }
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Get the path where the catalog should be stored
///
/// - Linux: ~/.local/share/caselib/caselib.db
/// - macOS: ~/Library/Application Support/caselib/caselib.db
/// - Windows: %APPDATA%\caselib\caselib.db
fn default_db_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or(ConfigError::NoDataDir)?;
    path.push("caselib");
    path.push("caselib.db");
    Ok(path)
}

/// Canonicalize when the root exists so relative paths are computed
/// against one spelling of it; a missing root is kept as given and
/// reported by the sync pass.
fn resolve_media_root(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_fields_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caselib.json");
        std::fs::write(&path, r#"{"thumb_long_edge": 320, "db_path": "/tmp/x.db"}"#).unwrap();

        let parsed = read_config_file(&path).unwrap();
        assert_eq!(parsed.thumb_long_edge, Some(320));
        assert_eq!(parsed.db_path, Some(PathBuf::from("/tmp/x.db")));
        assert!(parsed.media_root.is_none());
    }

    #[test]
    fn test_malformed_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caselib.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(read_config_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_with_media_root_canonicalizes_existing_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_media_root(dir.path(), dir.path().join("db.sqlite"));
        assert_eq!(config.media_root, std::fs::canonicalize(dir.path()).unwrap());
        assert_eq!(config.thumb_long_edge, DEFAULT_LONG_EDGE);
    }
}
