//! Shared data structures for the catalog
//!
//! These structs represent the data model that flows between the
//! SQLite index, the sync pass and the manual edit operations.

use chrono::{DateTime, Utc};

/// A directory recognized as one case-study unit
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// Unique database ID
    pub id: i64,
    /// Display name (directory name unless metadata or an edit says otherwise)
    pub name: String,
    /// Path relative to the media root, `/`-separated; the matching key across scans
    pub folder_path: String,
    pub description: Option<String>,
    /// Architect / design firm
    pub architect: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub year: Option<i64>,
    /// Larger sorts first
    pub display_order: Option<i64>,
    /// Root-relative path of the cover image
    pub cover_path: Option<String>,
    /// Click counter owned by the API layer; sync never writes it
    pub heat: i64,
    /// Set by any manual edit; protects descriptive fields and cover from sync
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Descriptive fields the sync pass compares against `project.json`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectFields {
    pub name: String,
    pub architect: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub year: Option<i64>,
    pub description: Option<String>,
    pub display_order: Option<i64>,
}

impl Project {
    /// Current descriptive fields
    pub fn fields(&self) -> ProjectFields {
        ProjectFields {
            name: self.name.clone(),
            architect: self.architect.clone(),
            location: self.location.clone(),
            category: self.category.clone(),
            year: self.year,
            description: self.description.clone(),
            display_order: self.display_order,
        }
    }

    /// Overwrite descriptive fields, returning true if anything changed
    pub fn apply_fields(&mut self, fields: ProjectFields) -> bool {
        if self.fields() == fields {
            return false;
        }
        self.name = fields.name;
        self.architect = fields.architect;
        self.location = fields.location;
        self.category = fields.category;
        self.year = fields.year;
        self.description = fields.description;
        self.display_order = fields.display_order;
        true
    }
}

/// Represents a single image file in the library
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Unique database ID
    pub id: i64,
    /// Owning project
    pub project_id: i64,
    /// Filename only (e.g., "01.jpg")
    pub file_name: String,
    /// Path relative to the media root; unique across the whole index
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A free-text project label, stored lowercase
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Partial edit of a project's descriptive fields
///
/// `None` leaves a field untouched. For the optional fields, `Some(None)`
/// clears the value.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub architect: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub year: Option<Option<i64>>,
    pub display_order: Option<Option<i64>>,
    /// Delimited tag text; an empty string clears all tags
    pub tags_text: Option<String>,
}

/// Counts reported by a sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created_projects: usize,
    pub updated_projects: usize,
    pub deleted_projects: usize,
    pub created_images: usize,
    /// Images re-parented or renamed
    pub updated_images: usize,
    pub deleted_images: usize,
}

impl SyncSummary {
    /// True when the pass changed nothing
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Split user tag text into normalized tag names
///
/// Separators are whitespace and `,` `，` `;` `；` `、`. Names are
/// lowercased and de-duplicated, keeping first-seen order.
pub fn split_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for part in raw.split(|c: char| c.is_whitespace() || matches!(c, ',' | '，' | ';' | '；' | '、')) {
        let tag = part.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
