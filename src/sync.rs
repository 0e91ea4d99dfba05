//! Filesystem-to-catalog reconciliation
//!
//! One pass classifies the media tree, upserts every project and image it
//! finds, then deletes whatever was not seen. All writes happen inside a
//! single `BEGIN IMMEDIATE` transaction: a pass that fails leaves the
//! previously committed catalog untouched, and two passes against the same
//! database file serialize on SQLite's write lock. A pass is not
//! cancellable; once started it runs to commit or rollback.
//!
//! Thumbnails are never generated here.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::scan::{classify, enumerate, read_project_meta, relative_path, ProjectMeta};
use crate::state::data::{Image, Project, ProjectFields, SyncSummary};
use crate::state::library::{self, Library};

/// Runs reconciliation passes for one media root
#[derive(Debug, Clone)]
pub struct SyncEngine {
    media_root: PathBuf,
}

impl SyncEngine {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    /// Reconcile the catalog with the current state of the media root
    ///
    /// Per-directory and per-file problems (bad `project.json`, unreadable
    /// entries) are logged and skipped. Any database error aborts the pass
    /// and rolls it back.
    pub fn sync(&self, library: &mut Library) -> Result<SyncSummary, SyncError> {
        if !self.media_root.is_dir() {
            return Err(SyncError::MediaRootMissing(self.media_root.clone()));
        }

        let started = Instant::now();
        info!("Syncing catalog with {}", self.media_root.display());

        let tx = library
            .connection_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let summary = {
            let mut pass = SyncPass::load(&tx, &self.media_root)?;
            let project_dirs = classify(&self.media_root);
            debug!("Found {} project directories", project_dirs.len());

            for project_dir in &project_dirs {
                pass.sync_project(project_dir, &project_dirs)?;
            }
            pass.remove_ghosts()?
        };

        tx.commit()?;

        info!(
            "Sync complete in {:.2?}: projects +{} ~{} -{}; images +{} ~{} -{}",
            started.elapsed(),
            summary.created_projects,
            summary.updated_projects,
            summary.deleted_projects,
            summary.created_images,
            summary.updated_images,
            summary.deleted_images,
        );
        Ok(summary)
    }
}

/// Async wrapper: open a dedicated connection and run a pass on the
/// blocking pool
///
/// Dropping the returned future does not stop the pass; it still runs to
/// completion on the blocking thread.
pub async fn sync_blocking_task(db_path: PathBuf, media_root: PathBuf) -> Result<SyncSummary, SyncError> {
    tokio::task::spawn_blocking(move || {
        let mut library = Library::open(&db_path)?;
        SyncEngine::new(media_root).sync(&mut library)
    })
    .await?
}

/// State of one pass, built fresh from the catalog every time
struct SyncPass<'a> {
    conn: &'a Connection,
    media_root: &'a Path,
    now: DateTime<Utc>,
    /// Keyed by `folder_path`
    projects: HashMap<String, Project>,
    /// Keyed by `file_path`, across all projects
    images: HashMap<String, Image>,
    seen_folders: HashSet<String>,
    seen_files: HashSet<String>,
    summary: SyncSummary,
}

impl<'a> SyncPass<'a> {
    fn load(conn: &'a Connection, media_root: &'a Path) -> Result<Self, SyncError> {
        let projects = library::load_projects(conn)?
            .into_iter()
            .map(|p| (p.folder_path.clone(), p))
            .collect();
        let images = library::load_images(conn)?
            .into_iter()
            .map(|i| (i.file_path.clone(), i))
            .collect();

        Ok(Self {
            conn,
            media_root,
            now: Utc::now(),
            projects,
            images,
            seen_folders: HashSet::new(),
            seen_files: HashSet::new(),
            summary: SyncSummary::default(),
        })
    }

    /// Upsert one project directory and the images it owns
    fn sync_project(&mut self, project_dir: &Path, all_project_dirs: &[PathBuf]) -> Result<(), SyncError> {
        let Some(folder_path) = relative_path(self.media_root, project_dir) else {
            return Ok(());
        };
        if !project_dir.is_dir() {
            return Ok(());
        }
        self.seen_folders.insert(folder_path.clone());

        let meta = read_project_meta(project_dir);
        let fields = fields_from_meta(&meta, project_dir);

        let (mut project, is_new) = match self.projects.remove(&folder_path) {
            Some(project) => (project, false),
            None => (self.create_project(&folder_path, fields.clone(), &meta)?, true),
        };

        let mut changed = false;
        if !is_new && !project.is_locked {
            changed |= project.apply_fields(fields);
        }

        let first_image = self.sync_images(&project, project_dir, all_project_dirs)?;

        if !project.is_locked && project.cover_path != first_image {
            debug!(
                "Cover of {} -> {}",
                folder_path,
                first_image.as_deref().unwrap_or("<none>")
            );
            project.cover_path = first_image;
            changed = true;
        }

        if changed {
            project.updated_at = self.now;
            library::update_project_row(self.conn, &project)?;
            if !is_new {
                self.summary.updated_projects += 1;
            }
        }

        self.projects.insert(folder_path, project);
        Ok(())
    }

    fn create_project(&mut self, folder_path: &str, fields: ProjectFields, meta: &ProjectMeta) -> Result<Project, SyncError> {
        let mut project = Project {
            id: 0,
            name: fields.name,
            folder_path: folder_path.to_string(),
            description: fields.description,
            architect: fields.architect,
            location: fields.location,
            category: fields.category,
            year: fields.year,
            display_order: fields.display_order,
            cover_path: None,
            heat: 0,
            is_locked: false,
            created_at: self.now,
            updated_at: self.now,
        };
        project.id = library::insert_project(self.conn, &project)?;
        if !meta.tags.is_empty() {
            library::add_project_tags(self.conn, project.id, &meta.tags, self.now)?;
        }

        debug!("Created project {} ({})", folder_path, project.name);
        self.summary.created_projects += 1;
        Ok(project)
    }

    /// Upsert the project's images, returning the first path seen
    fn sync_images(
        &mut self,
        project: &Project,
        project_dir: &Path,
        all_project_dirs: &[PathBuf],
    ) -> Result<Option<String>, SyncError> {
        let mut first_image: Option<String> = None;

        for file in enumerate(project_dir, all_project_dirs) {
            let Some(file_path) = relative_path(self.media_root, &file) else {
                continue;
            };
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            self.seen_files.insert(file_path.clone());
            if first_image.is_none() {
                first_image = Some(file_path.clone());
            }

            match self.images.get_mut(&file_path) {
                None => {
                    let id = library::insert_image(self.conn, project.id, &file_name, &file_path, self.now)?;
                    self.images.insert(
                        file_path.clone(),
                        Image {
                            id,
                            project_id: project.id,
                            file_name,
                            file_path,
                            created_at: self.now,
                            updated_at: self.now,
                        },
                    );
                    self.summary.created_images += 1;
                }
                Some(image) => {
                    if image.project_id != project.id || image.file_name != file_name {
                        // Same path under a different project: move it, never duplicate
                        debug!("Re-parenting {} to {}", image.file_path, project.folder_path);
                        image.project_id = project.id;
                        image.file_name = file_name;
                        image.updated_at = self.now;
                        library::update_image_row(self.conn, image)?;
                        self.summary.updated_images += 1;
                    }
                }
            }
        }

        Ok(first_image)
    }

    /// Delete images and projects the pass did not see
    fn remove_ghosts(mut self) -> Result<SyncSummary, SyncError> {
        for (file_path, image) in &self.images {
            if !self.seen_files.contains(file_path) {
                debug!("Removing ghost image {}", file_path);
                library::delete_image(self.conn, image.id)?;
                self.summary.deleted_images += 1;
            }
        }

        for (folder_path, project) in &self.projects {
            let on_disk = self.media_root.join(folder_path).exists();
            if !on_disk || !self.seen_folders.contains(folder_path) {
                debug!("Removing ghost project {}", folder_path);
                library::delete_project(self.conn, project.id)?;
                self.summary.deleted_projects += 1;
            }
        }

        Ok(self.summary)
    }
}

/// Descriptive fields for a project, falling back to the directory name
fn fields_from_meta(meta: &ProjectMeta, project_dir: &Path) -> ProjectFields {
    let dir_name = project_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    ProjectFields {
        name: meta.name.clone().unwrap_or(dir_name),
        architect: meta.architect.clone(),
        location: meta.location.clone(),
        category: meta.category.clone(),
        year: meta.year,
        description: meta.description.clone(),
        display_order: meta.display_order,
    }
}
