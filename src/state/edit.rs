//! Manual edits to the catalog
//!
//! Every operation here that touches descriptive fields or the cover sets
//! `is_locked`, after which sync leaves those fields alone. Edits that change
//! a project's metadata are written back to its `project.json` so the folder
//! stays the source of truth; a failed write-back is logged, never rolled back.

use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info, warn};

use super::data::{split_tags, Project, ProjectUpdate};
use super::library::{self, Library};
use crate::error::LibraryError;
use crate::scan::write_project_meta;

impl Library {
    /// Apply a partial edit, lock the project and write its metadata back
    pub fn update_project(
        &mut self,
        media_root: &Path,
        project_id: i64,
        update: ProjectUpdate,
    ) -> Result<Project, LibraryError> {
        let tx = self.connection_mut().transaction()?;
        let mut project = library::load_project(&tx, project_id)?.ok_or(LibraryError::ProjectNotFound(project_id))?;
        let now = Utc::now();

        let ProjectUpdate {
            name,
            architect,
            description,
            location,
            category,
            year,
            display_order,
            tags_text,
        } = update;

        if let Some(name) = name {
            project.name = name;
        }
        if let Some(architect) = architect {
            project.architect = architect;
        }
        if let Some(description) = description {
            project.description = description;
        }
        if let Some(location) = location {
            project.location = location;
        }
        if let Some(category) = category {
            project.category = category;
        }
        if let Some(year) = year {
            project.year = year;
        }
        if let Some(display_order) = display_order {
            project.display_order = display_order;
        }
        if let Some(text) = tags_text {
            library::replace_project_tags(&tx, project.id, &split_tags(&text), now)?;
        }

        project.is_locked = true;
        project.updated_at = now;
        library::update_project_row(&tx, &project)?;
        tx.commit()?;

        info!("Updated project {} ({})", project.id, project.folder_path);
        self.write_back(media_root, &project);
        Ok(project)
    }

    /// Use one of the project's own images as its cover, locking the project
    pub fn set_project_cover(&mut self, project_id: i64, file_path: &str) -> Result<Project, LibraryError> {
        let mut project = self.project(project_id)?.ok_or(LibraryError::ProjectNotFound(project_id))?;

        match self.image_by_path(file_path)? {
            Some(image) if image.project_id == project.id => {}
            _ => {
                return Err(LibraryError::ImageNotInProject {
                    project_id,
                    file_path: file_path.to_string(),
                })
            }
        }

        project.cover_path = Some(file_path.to_string());
        project.is_locked = true;
        project.updated_at = Utc::now();
        library::update_project_row(self.connection(), &project)?;

        debug!("Cover of {} set to {}", project.folder_path, file_path);
        Ok(project)
    }

    /// Replace a project's tags from delimited text; empty text clears them
    pub fn set_project_tags(&mut self, project_id: i64, text: &str) -> Result<Vec<String>, LibraryError> {
        if self.project(project_id)?.is_none() {
            return Err(LibraryError::ProjectNotFound(project_id));
        }

        let tags = split_tags(text);
        let tx = self.connection_mut().transaction()?;
        library::replace_project_tags(&tx, project_id, &tags, Utc::now())?;
        tx.commit()?;
        Ok(tags)
    }

    /// Fold `source_ids` into `target_id` (database only, no files move)
    ///
    /// Images move to the target, tags are unioned, heat is summed and the
    /// target takes the first source cover if it has none. Sources are then
    /// deleted and the target is locked. Either all of it happens or none.
    pub fn merge_projects(
        &mut self,
        media_root: &Path,
        target_id: i64,
        source_ids: &[i64],
    ) -> Result<Project, LibraryError> {
        let tx = self.connection_mut().transaction()?;
        let mut target = library::load_project(&tx, target_id)?.ok_or(LibraryError::ProjectNotFound(target_id))?;

        let mut sources = Vec::new();
        for &id in source_ids {
            if id == target_id || sources.iter().any(|s: &Project| s.id == id) {
                continue;
            }
            sources.push(library::load_project(&tx, id)?.ok_or(LibraryError::ProjectNotFound(id))?);
        }
        if sources.is_empty() {
            return Ok(target);
        }

        let now = Utc::now();
        for source in &sources {
            let moved = library::reparent_images(&tx, source.id, target.id, now)?;
            let tags = library::load_project_tags(&tx, source.id)?;
            library::add_project_tags(&tx, target.id, &tags, now)?;

            target.heat += source.heat;
            if target.cover_path.is_none() {
                target.cover_path = source.cover_path.clone();
            }

            library::delete_project(&tx, source.id)?;
            debug!("Merged {} ({} images) into {}", source.folder_path, moved, target.folder_path);
        }

        target.is_locked = true;
        target.updated_at = now;
        library::update_project_row(&tx, &target)?;
        library::set_project_heat(&tx, target.id, target.heat)?;
        tx.commit()?;

        info!("Merged {} projects into {}", sources.len(), target.folder_path);
        self.write_back(media_root, &target);
        Ok(target)
    }

    /// Rewrite `project.json` for an edited project; failures are logged only
    fn write_back(&self, media_root: &Path, project: &Project) {
        if let Err(e) = write_project_json(self.connection(), media_root, project) {
            warn!("Failed to write project.json for project {}: {}", project.id, e);
        }
    }
}

fn write_project_json(conn: &Connection, media_root: &Path, project: &Project) -> anyhow::Result<()> {
    let tags = library::load_project_tags(conn, project.id)?;
    let project_dir = media_root.join(&project.folder_path);
    let path = write_project_meta(&project_dir, project, &tags)?;
    debug!("Wrote {}", path.display());
    Ok(())
}
