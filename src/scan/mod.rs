//! Filesystem side of the indexer
//!
//! - `classify.rs` - decides which directories are projects
//! - `enumerate.rs` - lists the images that belong to one project
//! - `meta.rs` - reads and writes `project.json`

pub mod classify;
pub mod enumerate;
pub mod meta;

pub use classify::classify;
pub use enumerate::enumerate;
pub use meta::{read_project_meta, write_project_meta, ProjectMeta};

use std::path::{Component, Path};

/// Reserved directory name holding derived thumbnails; never scanned
pub const THUMB_DIR_NAME: &str = "_thumbs";

/// Per-project metadata file
pub const META_FILE_NAME: &str = "project.json";

/// Supported image extensions (lowercase)
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "tif", "tiff"];

/// Check if a file is a recognized image by extension
pub fn is_image_file(path: &Path) -> bool {
    match path.extension() {
        Some(extension) => {
            let ext = extension.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Check if a directory entry name is the thumbnail cache sentinel
pub fn is_thumb_dir(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == THUMB_DIR_NAME)
}

/// Path of `path` relative to `root`, with `/` separators on every platform
///
/// Returns `None` when `path` is not under `root` or is `root` itself.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension_is_case_insensitive() {
        assert!(is_image_file(Path::new("a/B.JPG")));
        assert!(is_image_file(Path::new("c.webp")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("jpg")));
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/media");
        assert_eq!(
            relative_path(root, &root.join("体育建筑").join("某项目")),
            Some("体育建筑/某项目".to_string())
        );
        assert_eq!(relative_path(root, root), None);
        assert_eq!(relative_path(root, Path::new("/elsewhere/x")), None);
    }
}
