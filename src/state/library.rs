use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::info;

use super::data::{Image, Project, Tag};
use crate::error::LibraryError;

/// The Library manages the SQLite catalog database.
/// It stores projects, their images and tags, keyed by paths relative to
/// the media root.
pub struct Library {
    conn: Connection,
    db_path: PathBuf,
}

const PROJECT_COLUMNS: &str = "id, name, folder_path, description, architect, location, category, \
     year, display_order, cover_path, heat, is_locked, created_at, updated_at";

const IMAGE_COLUMNS: &str = "id, project_id, file_name, file_path, created_at, updated_at";

impl Library {
    /// Open (or create) the catalog at `db_path` and initialize the schema
    pub fn open(db_path: &Path) -> Result<Self, LibraryError> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;",
        )?;

        let library = Library {
            conn,
            db_path: db_path.to_path_buf(),
        };
        library.init_schema()?;

        info!("Catalog initialized at {}", db_path.display());
        Ok(library)
    }

    /// In-memory catalog, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self, LibraryError> {
        let library = Library {
            conn: Connection::open_in_memory()?,
            db_path: PathBuf::from(":memory:"),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&self) -> Result<(), LibraryError> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS projects (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                folder_path     TEXT NOT NULL UNIQUE,
                description     TEXT,
                architect       TEXT,
                location        TEXT,
                category        TEXT,
                year            INTEGER,
                display_order   INTEGER,
                cover_path      TEXT,
                heat            INTEGER NOT NULL DEFAULT 0,
                is_locked       INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS images (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id      INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                file_name       TEXT NOT NULL,
                file_path       TEXT NOT NULL UNIQUE,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tags (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS project_tags (
                project_id      INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                tag_id          INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (project_id, tag_id)
            );

            CREATE INDEX IF NOT EXISTS idx_images_project_id ON images(project_id);
            CREATE INDEX IF NOT EXISTS idx_projects_heat ON projects(heat DESC);",
        )?;
        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Get a count of projects in the library
    pub fn project_count(&self) -> Result<i64, LibraryError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?)
    }

    /// Get a count of images in the library
    pub fn image_count(&self) -> Result<i64, LibraryError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?)
    }

    /// All projects ordered by folder path
    pub fn projects(&self) -> Result<Vec<Project>, LibraryError> {
        Ok(load_projects(&self.conn)?)
    }

    /// All images ordered by file path
    pub fn images(&self) -> Result<Vec<Image>, LibraryError> {
        Ok(load_images(&self.conn)?)
    }

    pub fn project(&self, id: i64) -> Result<Option<Project>, LibraryError> {
        Ok(load_project(&self.conn, id)?)
    }

    pub fn project_by_folder(&self, folder_path: &str) -> Result<Option<Project>, LibraryError> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE folder_path = ?1");
        Ok(self
            .conn
            .query_row(&sql, [folder_path], project_from_row)
            .optional()?)
    }

    /// Images of one project ordered by file path
    pub fn project_images(&self, project_id: i64) -> Result<Vec<Image>, LibraryError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE project_id = ?1 ORDER BY file_path");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([project_id], image_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn image_by_path(&self, file_path: &str) -> Result<Option<Image>, LibraryError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE file_path = ?1");
        Ok(self
            .conn
            .query_row(&sql, [file_path], image_from_row)
            .optional()?)
    }

    /// Image plus its owning project, the lookup behind thumbnail serving
    pub fn image_with_project(&self, file_path: &str) -> Result<Option<(Image, Project)>, LibraryError> {
        let Some(image) = self.image_by_path(file_path)? else {
            return Ok(None);
        };
        Ok(self.project(image.project_id)?.map(|project| (image, project)))
    }

    /// Every tag ever created, sorted by name; unused tags are kept
    pub fn tags(&self) -> Result<Vec<Tag>, LibraryError> {
        let mut stmt = self.conn.prepare("SELECT id, name, created_at FROM tags ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Tag names of one project, sorted
    pub fn project_tags(&self, project_id: i64) -> Result<Vec<String>, LibraryError> {
        Ok(load_project_tags(&self.conn, project_id)?)
    }

    /// Bump a project's heat counter, returning the new value
    pub fn record_click(&self, project_id: i64) -> Result<i64, LibraryError> {
        let changed = self
            .conn
            .execute("UPDATE projects SET heat = heat + 1 WHERE id = ?1", [project_id])?;
        if changed == 0 {
            return Err(LibraryError::ProjectNotFound(project_id));
        }
        Ok(self
            .conn
            .query_row("SELECT heat FROM projects WHERE id = ?1", [project_id], |row| row.get(0))?)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        folder_path: row.get(2)?,
        description: row.get(3)?,
        architect: row.get(4)?,
        location: row.get(5)?,
        category: row.get(6)?,
        year: row.get(7)?,
        display_order: row.get(8)?,
        cover_path: row.get(9)?,
        heat: row.get(10)?,
        is_locked: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        project_id: row.get(1)?,
        file_name: row.get(2)?,
        file_path: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

// Row-level helpers below take a plain `Connection` so they run the same
// way on the library connection and inside a transaction.

pub(crate) fn load_projects(conn: &Connection) -> rusqlite::Result<Vec<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY folder_path");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], project_from_row)?;
    rows.collect()
}

pub(crate) fn load_project(conn: &Connection, id: i64) -> rusqlite::Result<Option<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
    conn.query_row(&sql, [id], project_from_row).optional()
}

pub(crate) fn load_images(conn: &Connection) -> rusqlite::Result<Vec<Image>> {
    let sql = format!("SELECT {IMAGE_COLUMNS} FROM images ORDER BY file_path");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], image_from_row)?;
    rows.collect()
}

pub(crate) fn load_project_tags(conn: &Connection, project_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM tags t
         JOIN project_tags pt ON pt.tag_id = t.id
         WHERE pt.project_id = ?1
         ORDER BY t.name",
    )?;
    let rows = stmt.query_map([project_id], |row| row.get(0))?;
    rows.collect()
}

/// Insert a project, ignoring `project.id`; returns the new ID
pub(crate) fn insert_project(conn: &Connection, project: &Project) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO projects (name, folder_path, description, architect, location, category,
                               year, display_order, cover_path, heat, is_locked, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            project.name,
            project.folder_path,
            project.description,
            project.architect,
            project.location,
            project.category,
            project.year,
            project.display_order,
            project.cover_path,
            project.heat,
            project.is_locked,
            project.created_at,
            project.updated_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Write descriptive fields, cover, lock and `updated_at`; heat is left alone
pub(crate) fn update_project_row(conn: &Connection, project: &Project) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE projects SET name = ?1, description = ?2, architect = ?3, location = ?4,
                category = ?5, year = ?6, display_order = ?7, cover_path = ?8,
                is_locked = ?9, updated_at = ?10
         WHERE id = ?11",
        params![
            project.name,
            project.description,
            project.architect,
            project.location,
            project.category,
            project.year,
            project.display_order,
            project.cover_path,
            project.is_locked,
            project.updated_at,
            project.id,
        ],
    )?;
    Ok(())
}

pub(crate) fn set_project_heat(conn: &Connection, project_id: i64, heat: i64) -> rusqlite::Result<()> {
    conn.execute("UPDATE projects SET heat = ?1 WHERE id = ?2", params![heat, project_id])?;
    Ok(())
}

pub(crate) fn delete_project(conn: &Connection, project_id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM projects WHERE id = ?1", [project_id])?;
    Ok(())
}

pub(crate) fn insert_image(
    conn: &Connection,
    project_id: i64,
    file_name: &str,
    file_path: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO images (project_id, file_name, file_path, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![project_id, file_name, file_path, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn update_image_row(conn: &Connection, image: &Image) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE images SET project_id = ?1, file_name = ?2, updated_at = ?3 WHERE id = ?4",
        params![image.project_id, image.file_name, image.updated_at, image.id],
    )?;
    Ok(())
}

pub(crate) fn reparent_images(conn: &Connection, from_project: i64, to_project: i64, now: DateTime<Utc>) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE images SET project_id = ?1, updated_at = ?2 WHERE project_id = ?3",
        params![to_project, now, from_project],
    )
}

pub(crate) fn delete_image(conn: &Connection, image_id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM images WHERE id = ?1", [image_id])?;
    Ok(())
}

/// Replace a project's tag set, creating missing tags
pub(crate) fn replace_project_tags(
    conn: &Connection,
    project_id: i64,
    names: &[String],
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM project_tags WHERE project_id = ?1", [project_id])?;
    add_project_tags(conn, project_id, names, now)
}

/// Attach tags to a project without removing existing ones
pub(crate) fn add_project_tags(
    conn: &Connection,
    project_id: i64,
    names: &[String],
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    for name in names {
        conn.execute(
            "INSERT OR IGNORE INTO tags (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO project_tags (project_id, tag_id)
             SELECT ?1, id FROM tags WHERE name = ?2",
            params![project_id, name],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_project(folder: &str) -> Project {
        let now = Utc::now();
        Project {
            id: 0,
            name: folder.rsplit('/').next().unwrap().to_string(),
            folder_path: folder.to_string(),
            description: None,
            architect: None,
            location: None,
            category: None,
            year: None,
            display_order: None,
            cover_path: None,
            heat: 0,
            is_locked: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested/dir/caselib.db");
        let library = Library::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(library.path(), db_path.as_path());
        assert_eq!(library.project_count().unwrap(), 0);
    }

    #[test]
    fn test_project_roundtrip_and_lookup_by_folder() {
        let library = Library::open_in_memory().unwrap();
        let mut project = new_project("Sports/Stadium");
        project.year = Some(2008);
        project.architect = Some("Studio".into());
        let id = insert_project(library.connection(), &project).unwrap();

        let stored = library.project_by_folder("Sports/Stadium").unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.year, Some(2008));
        assert_eq!(stored.architect.as_deref(), Some("Studio"));
        assert!(!stored.is_locked);
        assert!(library.project_by_folder("Sports").unwrap().is_none());
    }

    #[test]
    fn test_image_paths_are_globally_unique() {
        let library = Library::open_in_memory().unwrap();
        let a = insert_project(library.connection(), &new_project("A")).unwrap();
        let b = insert_project(library.connection(), &new_project("B")).unwrap();
        let now = Utc::now();

        insert_image(library.connection(), a, "x.jpg", "A/x.jpg", now).unwrap();
        assert!(insert_image(library.connection(), b, "x.jpg", "A/x.jpg", now).is_err());
        assert_eq!(library.image_count().unwrap(), 1);
    }

    #[test]
    fn test_deleting_project_cascades_images_and_tag_links() {
        let library = Library::open_in_memory().unwrap();
        let id = insert_project(library.connection(), &new_project("A")).unwrap();
        let now = Utc::now();
        insert_image(library.connection(), id, "x.jpg", "A/x.jpg", now).unwrap();
        add_project_tags(library.connection(), id, &["museum".to_string()], now).unwrap();

        delete_project(library.connection(), id).unwrap();
        assert_eq!(library.image_count().unwrap(), 0);
        let links: i64 = library
            .connection()
            .query_row("SELECT COUNT(*) FROM project_tags", [], |r| r.get(0))
            .unwrap();
        assert_eq!(links, 0);
        // tags themselves are never removed automatically
        let tags: i64 = library
            .connection()
            .query_row("SELECT COUNT(*) FROM tags", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tags, 1);
    }

    #[test]
    fn test_replace_tags_and_record_click() {
        let library = Library::open_in_memory().unwrap();
        let id = insert_project(library.connection(), &new_project("A")).unwrap();
        let now = Utc::now();
        replace_project_tags(library.connection(), id, &["b".into(), "a".into()], now).unwrap();
        replace_project_tags(library.connection(), id, &["c".into(), "a".into()], now).unwrap();
        assert_eq!(library.project_tags(id).unwrap(), vec!["a", "c"]);

        // Dropped links leave the tag rows in place
        let names: Vec<String> = library.tags().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        assert_eq!(library.record_click(id).unwrap(), 1);
        assert_eq!(library.record_click(id).unwrap(), 2);
        assert!(matches!(library.record_click(999), Err(LibraryError::ProjectNotFound(999))));
    }

    #[test]
    fn test_image_with_project() {
        let library = Library::open_in_memory().unwrap();
        let id = insert_project(library.connection(), &new_project("A")).unwrap();
        insert_image(library.connection(), id, "x.jpg", "A/x.jpg", Utc::now()).unwrap();

        let (image, project) = library.image_with_project("A/x.jpg").unwrap().unwrap();
        assert_eq!(image.file_name, "x.jpg");
        assert_eq!(project.folder_path, "A");
        assert!(library.image_with_project("A/y.jpg").unwrap().is_none());
    }
}
