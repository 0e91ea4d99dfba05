//! Project directory classification
//!
//! A directory is a project when:
//! 1. it directly contains `project.json` (always, even if projects exist below it), or
//! 2. it directly contains an image, no directory below it is a project, and
//!    no ancestor carries `project.json` (a metadata project claims plain
//!    image folders inside it, such as `images/`).
//!
//! `_thumbs` directories and everything under them are ignored. The media
//! root itself is never a project.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{is_image_file, is_thumb_dir, META_FILE_NAME};

/// What the collect pass learned about one directory
#[derive(Debug, Default)]
struct DirInfo {
    depth: usize,
    has_meta: bool,
    has_image: bool,
    children: Vec<PathBuf>,
}

/// Find every project directory under `root`, in lexicographic path order
///
/// Paths are returned joined onto `root` exactly as given, so callers can
/// compare them against paths produced by other walks from the same root.
pub fn classify(root: &Path) -> Vec<PathBuf> {
    let dirs = collect_dirs(root);
    let projects = decide_projects(&dirs);
    debug!(
        "Classified {} of {} directories under {} as projects",
        projects.len(),
        dirs.len(),
        root.display()
    );
    projects.into_iter().collect()
}

/// First pass: record metadata/image presence and children for every directory
fn collect_dirs(root: &Path) -> HashMap<PathBuf, DirInfo> {
    let mut dirs: HashMap<PathBuf, DirInfo> = HashMap::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && is_thumb_dir(e.path())));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry during classification: {}", e);
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            dirs.insert(
                path.to_path_buf(),
                DirInfo {
                    depth: entry.depth(),
                    ..DirInfo::default()
                },
            );
            if entry.depth() > 0 {
                if let Some(parent) = path.parent().and_then(|p| dirs.get_mut(p)) {
                    parent.children.push(path.to_path_buf());
                }
            }
            continue;
        }

        // Symlinked files count the way a stat of the path would see them
        if !(entry.file_type().is_file() || path.is_file()) {
            continue;
        }
        let Some(parent) = path.parent().and_then(|p| dirs.get_mut(p)) else {
            continue;
        };
        if path.file_name().is_some_and(|name| name == META_FILE_NAME) {
            parent.has_meta = true;
        } else if is_image_file(path) {
            parent.has_image = true;
        }
    }

    dirs
}

/// Second pass: decide deepest directories first so a parent can see
/// whether any descendant already claimed project status
fn decide_projects(dirs: &HashMap<PathBuf, DirInfo>) -> BTreeSet<PathBuf> {
    let mut order: Vec<(&PathBuf, &DirInfo)> = dirs.iter().collect();
    order.sort_by(|a, b| a.1.depth.cmp(&b.1.depth));
    let claimed = claimed_by_meta_ancestor(dirs, &order);
    order.reverse();

    let mut subtree_has_project: HashMap<&Path, bool> = HashMap::with_capacity(dirs.len());
    let mut projects = BTreeSet::new();

    for (path, info) in order {
        let has_project_below = info
            .children
            .iter()
            .any(|child| subtree_has_project.get(child.as_path()).copied().unwrap_or(false));

        let is_project = if info.depth == 0 {
            false
        } else if info.has_meta {
            true
        } else {
            info.has_image && !has_project_below && !claimed.contains(path.as_path())
        };

        if is_project {
            projects.insert(path.clone());
        }
        subtree_has_project.insert(path.as_path(), is_project || has_project_below);
    }

    projects
}

/// Directories with a `project.json` somewhere above them (root excluded).
/// `order` must be shallowest first.
fn claimed_by_meta_ancestor<'a>(
    dirs: &HashMap<PathBuf, DirInfo>,
    order: &[(&'a PathBuf, &DirInfo)],
) -> HashSet<&'a Path> {
    let mut claimed: HashSet<&'a Path> = HashSet::new();
    for &(path, info) in order {
        if info.depth < 2 {
            continue;
        }
        let Some(parent) = path.parent() else {
            continue;
        };
        let parent_has_meta = dirs.get(parent).is_some_and(|p| p.has_meta);
        if parent_has_meta || claimed.contains(parent) {
            claimed.insert(path.as_path());
        }
    }
    claimed
}
