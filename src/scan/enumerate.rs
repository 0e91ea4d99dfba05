//! Image enumeration for one project directory
//!
//! Walks the project recursively, yielding recognized images. Two kinds of
//! subtree are pruned before descending: `_thumbs`, and any other project
//! directory nested inside this one (it enumerates its own files).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use super::{is_image_file, is_thumb_dir};

/// Lazily list the images belonging to `project_dir`
///
/// `all_project_dirs` is the classifier output; entries that are strict
/// descendants of `project_dir` become the skip-set. Files are yielded in
/// a depth-first walk sorted by name, so the first item is stable across
/// runs on an unchanged tree.
pub fn enumerate(project_dir: &Path, all_project_dirs: &[PathBuf]) -> impl Iterator<Item = PathBuf> {
    let skip: HashSet<PathBuf> = subproject_roots(project_dir, all_project_dirs);

    WalkDir::new(project_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            !(is_thumb_dir(e.path()) || skip.contains(e.path()))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry during enumeration: {}", e);
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir() && entry.path().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_image_file(path))
}

/// Project directories strictly below `project_dir`
fn subproject_roots(project_dir: &Path, all_project_dirs: &[PathBuf]) -> HashSet<PathBuf> {
    all_project_dirs
        .iter()
        .filter(|dir| dir.as_path() != project_dir && dir.starts_with(project_dir))
        .cloned()
        .collect()
}
