//! `project.json` reading and writing
//!
//! Two layouts are accepted on read:
//! - current: `{"version":1,"meta":{...},"display":{"order":N}}`
//! - legacy: descriptive keys at the top level
//!
//! Extraction is best-effort: a field with the wrong type is treated as
//! absent, and an unreadable file yields an empty record.

use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::META_FILE_NAME;
use crate::error::MetaError;
use crate::state::data::{split_tags, Project};

/// Fields extracted from `project.json`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectMeta {
    pub name: Option<String>,
    pub architect: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub year: Option<i64>,
    pub display_order: Option<i64>,
    pub tags: Vec<String>,
}

/// Read `project.json` from `project_dir`, never failing
///
/// Missing, empty, malformed and non-object files all produce an empty
/// record; everything except absence is logged.
pub fn read_project_meta(project_dir: &Path) -> ProjectMeta {
    match load_meta_object(project_dir) {
        Ok(Some(object)) => parse_project_meta(&object),
        Ok(None) => ProjectMeta::default(),
        Err(e) => {
            warn!("Ignoring project metadata: {}", e);
            ProjectMeta::default()
        }
    }
}

/// Load the raw JSON object, or `None` if the file does not exist
pub fn load_meta_object(project_dir: &Path) -> Result<Option<Map<String, Value>>, MetaError> {
    let path = project_dir.join(META_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(&path).map_err(|source| MetaError::Io {
        path: path.clone(),
        source,
    })?;
    let raw = raw.trim_start_matches('\u{feff}').trim();
    if raw.is_empty() {
        return Err(MetaError::Empty(path));
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => Ok(Some(object)),
        Ok(_) => Err(MetaError::NotAnObject(path)),
        Err(source) => Err(MetaError::Malformed { path, source }),
    }
}

/// Extract fields from an already-parsed object
///
/// A `meta` sub-object takes precedence over top-level keys; the display
/// order always comes from the top-level `display` object.
pub fn parse_project_meta(object: &Map<String, Value>) -> ProjectMeta {
    let source = match object.get("meta") {
        Some(Value::Object(meta)) => meta,
        _ => object,
    };

    let display_order = match object.get("display") {
        Some(Value::Object(display)) => display.get("order").and_then(Value::as_i64),
        _ => None,
    };

    ProjectMeta {
        name: text_field(source, "name"),
        architect: text_field(source, "architect"),
        location: text_field(source, "location"),
        category: text_field(source, "category"),
        description: text_field(source, "description"),
        year: source.get("year").and_then(coerce_int),
        display_order,
        tags: source.get("tags").map(tag_list).unwrap_or_default(),
    }
}

/// Non-blank string value, trimmed
fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Integer coercion: integers, finite floats (truncated), booleans and
/// integer strings are accepted
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Tags given either as an array of strings or as one delimited string
fn tag_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => split_tags(s),
        Value::Array(items) => {
            let joined: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            split_tags(&joined.join(","))
        }
        _ => Vec::new(),
    }
}

/// Write a project's fields back to `<project_dir>/project.json`
///
/// Read-merge-write: unknown keys, and unknown keys inside `meta` and
/// `display`, keep their values and positions. The file is replaced via
/// a temp file in the same directory.
pub fn write_project_meta(project_dir: &Path, project: &Project, tags: &[String]) -> Result<PathBuf, MetaError> {
    let path = project_dir.join(META_FILE_NAME);

    let mut data = match load_meta_object(project_dir) {
        Ok(Some(object)) => object,
        Ok(None) => Map::new(),
        Err(e) => {
            warn!("Rewriting unreadable project metadata from scratch: {}", e);
            Map::new()
        }
    };

    data.insert("version".to_string(), Value::from(1));

    let mut meta = section(&data, "meta");
    meta.insert("name".into(), Value::from(project.name.clone()));
    meta.insert("architect".into(), Value::from(project.architect.clone().unwrap_or_default()));
    meta.insert("location".into(), Value::from(project.location.clone().unwrap_or_default()));
    meta.insert("category".into(), Value::from(project.category.clone().unwrap_or_default()));
    meta.insert("year".into(), project.year.map(Value::from).unwrap_or(Value::Null));
    meta.insert(
        "description".into(),
        Value::from(project.description.clone().unwrap_or_default()),
    );
    meta.insert("tags".into(), Value::from(tags.to_vec()));
    data.insert("meta".into(), Value::Object(meta));

    let mut display = section(&data, "display");
    display.insert(
        "order".into(),
        project.display_order.map(Value::from).unwrap_or(Value::Null),
    );
    data.insert("display".into(), Value::Object(display));

    let body = serde_json::to_string_pretty(&Value::Object(data)).map_err(|source| MetaError::Serialize {
        path: path.clone(),
        source,
    })?;

    let write_err = |source: std::io::Error| MetaError::Write {
        path: path.clone(),
        source,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(project_dir).map_err(write_err)?;
    tmp.write_all(body.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(&path).map_err(|e| write_err(e.error))?;

    Ok(path)
}

/// Copy of a sub-object, or an empty one if absent or not an object.
/// Re-inserting under the same key keeps its position.
fn section(data: &Map<String, Value>, key: &str) -> Map<String, Value> {
    match data.get(key) {
        Some(Value::Object(object)) => object.clone(),
        _ => Map::new(),
    }
}
