//! On-demand thumbnail cache
//!
//! Thumbnails live inside each project, mirroring the source layout:
//!
//! ```text
//! source:    <project_dir>/<sub/path>/xxx.jpg
//! thumbnail: <project_dir>/_thumbs/<sub/path>/xxx.jpg
//! ```
//!
//! Nothing here is called by the sync pass. Existing thumbnails are
//! decoded before being trusted; a corrupt one is deleted and rebuilt.

use image::{imageops::FilterType, DynamicImage, ImageFormat, ImageReader};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ThumbnailError;
use crate::scan::THUMB_DIR_NAME;

/// Longer edge of generated thumbnails, in pixels
pub const DEFAULT_LONG_EDGE: u32 = 800;

/// Generates and validates thumbnails under `_thumbs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailCache {
    long_edge: u32,
}

impl Default for ThumbnailCache {
    fn default() -> Self {
        Self::new(DEFAULT_LONG_EDGE)
    }
}

impl ThumbnailCache {
    pub fn new(long_edge: u32) -> Self {
        Self {
            long_edge: long_edge.max(1),
        }
    }

    pub fn long_edge(&self) -> u32 {
        self.long_edge
    }

    /// Make sure a thumbnail exists for `source`, returning its path
    ///
    /// Never fails: every error is logged and reported as `None`, in which
    /// case callers serve the original file instead.
    pub fn ensure(&self, source: &Path, project_dir: &Path) -> Option<PathBuf> {
        match self.try_ensure(source, project_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("No thumbnail available: {}", e);
                None
            }
        }
    }

    /// Same as [`ensure`](Self::ensure) but with the failure reason
    pub fn try_ensure(&self, source: &Path, project_dir: &Path) -> Result<PathBuf, ThumbnailError> {
        let thumb_path = thumbnail_path(source, project_dir)?;

        if thumb_path.is_file() {
            match verify_image(&thumb_path) {
                Ok(()) => return Ok(thumb_path),
                Err(e) => {
                    warn!("Corrupt thumbnail {}, regenerating: {}", thumb_path.display(), e);
                    if let Err(del_err) = fs::remove_file(&thumb_path) {
                        warn!("Failed to delete corrupt thumbnail {}: {}", thumb_path.display(), del_err);
                    }
                }
            }
        }

        let source = resolve(source);
        if !source.is_file() {
            return Err(ThumbnailError::SourceMissing(source));
        }

        self.generate(&source, &thumb_path)?;
        Ok(thumb_path)
    }

    /// Thumbnail if one can be produced, else the original if it exists
    pub fn thumbnail_or_original(&self, source: &Path, project_dir: &Path) -> Option<PathBuf> {
        self.ensure(source, project_dir)
            .or_else(|| source.is_file().then(|| source.to_path_buf()))
    }

    /// Decode, shrink and atomically write one thumbnail
    fn generate(&self, source: &Path, thumb_path: &Path) -> Result<(), ThumbnailError> {
        let img = decode(source)?;

        let img = if img.width().max(img.height()) > self.long_edge {
            img.resize(self.long_edge, self.long_edge, FilterType::Lanczos3)
        } else {
            img
        };
        let format = ImageFormat::from_path(thumb_path).unwrap_or(ImageFormat::Jpeg);
        let img = normalize_color(img, format);

        let parent = thumb_path.parent().unwrap_or_else(|| Path::new("."));
        let io_err = |source: std::io::Error| ThumbnailError::Io {
            path: thumb_path.to_path_buf(),
            source,
        };
        fs::create_dir_all(parent).map_err(io_err)?;

        // Concurrent requests each write their own temp file; the last
        // rename wins and readers never see a partial image.
        let tmp = tempfile::Builder::new()
            .prefix(".thumb-")
            .tempfile_in(parent)
            .map_err(io_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            img.write_to(&mut writer, format)
                .map_err(|source| ThumbnailError::EncodeDecode {
                    path: thumb_path.to_path_buf(),
                    source,
                })?;
            writer.flush().map_err(io_err)?;
        }
        tmp.persist(thumb_path).map_err(|e| io_err(e.error))?;

        debug!(
            "Generated thumbnail {} ({}x{})",
            thumb_path.display(),
            img.width(),
            img.height()
        );
        Ok(())
    }
}

/// Where the thumbnail for `source` lives
///
/// Both paths are resolved first (symlinks, `..`, relative to the working
/// directory), and the result is rooted at the resolved project directory.
/// Fails with `PathOutsideProject` when `source` is not inside `project_dir`.
pub fn thumbnail_path(source: &Path, project_dir: &Path) -> Result<PathBuf, ThumbnailError> {
    let project_dir = resolve(project_dir);
    let source_real = resolve(source);

    match source_real.strip_prefix(&project_dir) {
        Ok(rel) if !rel.as_os_str().is_empty() => Ok(project_dir.join(THUMB_DIR_NAME).join(rel)),
        _ => Err(ThumbnailError::PathOutsideProject {
            source_path: source.to_path_buf(),
            project_dir,
        }),
    }
}

/// Full decode used as the integrity check for an existing thumbnail
fn verify_image(path: &Path) -> Result<(), ThumbnailError> {
    decode(path).map(|_| ())
}

fn decode(path: &Path) -> Result<DynamicImage, ThumbnailError> {
    let reader = ImageReader::open(path)
        .map_err(|source| ThumbnailError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| ThumbnailError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    reader.decode().map_err(|source| ThumbnailError::EncodeDecode {
        path: path.to_path_buf(),
        source,
    })
}

/// Convert to a color mode the target encoder accepts
///
/// JPEG has no alpha and no 16-bit support, so anything other than 8-bit
/// gray or RGB becomes RGB. Other formats get 8-bit RGBA unless the image
/// is already 8-bit.
fn normalize_color(img: DynamicImage, format: ImageFormat) -> DynamicImage {
    match (format, &img) {
        (ImageFormat::Jpeg, DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_)) => img,
        (ImageFormat::Jpeg, _) => DynamicImage::ImageRgb8(img.to_rgb8()),
        (
            _,
            DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_),
        ) => img,
        _ => DynamicImage::ImageRgba8(img.to_rgba8()),
    }
}

/// Canonical form of `path`
///
/// A missing file is resolved through its parent directory so it still
/// reaches the `SourceMissing` check; if the parent is missing too, the
/// absolute path is cleaned up lexically.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(real) = fs::canonicalize(path) {
        return real;
    }
    let lexical = normalize(&absolute(path));
    let parent = lexical.parent().and_then(|p| fs::canonicalize(p).ok());
    match (parent, lexical.file_name()) {
        (Some(parent), Some(name)) => parent.join(name),
        _ => lexical,
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Async wrapper: run [`ThumbnailCache::ensure`] on the blocking pool
pub async fn ensure_thumbnail_task(
    cache: ThumbnailCache,
    source: PathBuf,
    project_dir: PathBuf,
) -> Option<PathBuf> {
    match tokio::task::spawn_blocking(move || cache.ensure(&source, &project_dir)).await {
        Ok(path) => path,
        Err(e) => {
            warn!("Thumbnail task join error: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn write_jpeg(path: &Path, width: u32, height: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        img.save(path).unwrap();
    }

    /// Temp dir plus its canonical path, the form thumbnail paths are built on
    fn project_tempdir() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = fs::canonicalize(tmp.path()).unwrap();
        (tmp, dir)
    }

    #[test]
    fn test_thumbnail_path_mirrors_source_layout() {
        let project = Path::new("/no-such-media-root/Sports/Stadium");
        let source = project.join("images/night/01.jpg");
        assert_eq!(
            thumbnail_path(&source, project).unwrap(),
            project.join("_thumbs/images/night/01.jpg")
        );
    }

    #[test]
    fn test_source_outside_project_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("P");
        let other = tmp.path().join("Q/a.jpg");
        write_jpeg(&other, 10, 10);

        let cache = ThumbnailCache::default();
        assert!(matches!(
            cache.try_ensure(&other, &project),
            Err(ThumbnailError::PathOutsideProject { .. })
        ));
        // `..` must not escape the project
        let sneaky = project.join("../Q/a.jpg");
        assert!(matches!(
            cache.try_ensure(&sneaky, &project),
            Err(ThumbnailError::PathOutsideProject { .. })
        ));
        assert!(cache.ensure(&other, &project).is_none());
    }

    #[test]
    fn test_missing_source_reports_source_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ThumbnailCache::default();
        let result = cache.try_ensure(&tmp.path().join("gone.jpg"), tmp.path());
        assert!(matches!(result, Err(ThumbnailError::SourceMissing(_))));
    }

    #[test]
    fn test_generates_scaled_thumbnail_preserving_aspect() {
        let (_tmp, dir) = project_tempdir();
        let project = dir.as_path();
        let source = project.join("sub/wide.jpg");
        write_jpeg(&source, 400, 200);

        let cache = ThumbnailCache::new(100);
        let thumb = cache.ensure(&source, project).unwrap();
        assert_eq!(thumb, project.join("_thumbs/sub/wide.jpg"));

        let decoded = image::open(&thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_small_images_are_not_upscaled() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("tiny.jpg");
        write_jpeg(&source, 30, 20);

        let thumb = ThumbnailCache::new(100).ensure(&source, tmp.path()).unwrap();
        let decoded = image::open(&thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 20));
    }

    #[test]
    fn test_valid_thumbnail_is_returned_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("a.jpg");
        write_jpeg(&source, 300, 300);
        let cache = ThumbnailCache::new(64);

        let thumb = cache.ensure(&source, tmp.path()).unwrap();
        let before = fs::read(&thumb).unwrap();
        let modified = fs::metadata(&thumb).unwrap().modified().unwrap();

        assert_eq!(cache.ensure(&source, tmp.path()).unwrap(), thumb);
        assert_eq!(fs::read(&thumb).unwrap(), before);
        assert_eq!(fs::metadata(&thumb).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_corrupt_thumbnail_is_regenerated_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("a.jpg");
        write_jpeg(&source, 300, 150);
        let cache = ThumbnailCache::new(64);

        let thumb = cache.ensure(&source, tmp.path()).unwrap();
        fs::write(&thumb, b"definitely not a jpeg").unwrap();
        assert!(verify_image(&thumb).is_err());

        let healed = cache.ensure(&source, tmp.path()).unwrap();
        assert_eq!(healed, thumb);
        let decoded = image::open(&healed).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 32));
    }

    #[test]
    fn test_undecodable_source_falls_back_to_original() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("broken.jpg");
        fs::write(&source, b"garbage").unwrap();
        let cache = ThumbnailCache::default();

        assert!(matches!(
            cache.try_ensure(&source, tmp.path()),
            Err(ThumbnailError::EncodeDecode { .. })
        ));
        assert!(!tmp.path().join("_thumbs/broken.jpg").exists());
        assert_eq!(cache.thumbnail_or_original(&source, tmp.path()), Some(source.clone()));
    }

    #[test]
    fn test_alpha_source_becomes_rgb_jpeg_thumbnail() {
        let (_tmp, dir) = project_tempdir();
        let png = dir.join("logo.png");
        RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 128])).save(&png).unwrap();

        let thumb = ThumbnailCache::default().ensure(&png, &dir).unwrap();
        assert_eq!(thumb, dir.join("_thumbs/logo.png"));
        assert!(image::open(&thumb).is_ok());

        let img = normalize_color(DynamicImage::ImageRgba8(RgbaImage::new(2, 2)), ImageFormat::Jpeg);
        assert!(matches!(img, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_ensure_task_runs_on_blocking_pool() {
        let (_tmp, dir) = project_tempdir();
        let source = dir.join("a.jpg");
        write_jpeg(&source, 50, 50);

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let thumb = rt.block_on(ensure_thumbnail_task(ThumbnailCache::default(), source, dir.clone()));
        assert_eq!(thumb, Some(dir.join("_thumbs/a.jpg")));
    }

    #[test]
    fn test_relative_source_inside_absolute_project() {
        let (_tmp, dir) = project_tempdir();
        let project = dir.join("P");
        write_jpeg(&project.join("a.jpg"), 40, 40);

        // Same file, spelled relative to the working directory
        let cwd = fs::canonicalize(std::env::current_dir().unwrap()).unwrap();
        let mut relative = PathBuf::new();
        for _ in cwd.components().skip(1) {
            relative.push("..");
        }
        let relative = relative.join(project.join("a.jpg").strip_prefix("/").unwrap());
        assert!(relative.is_relative());

        let thumb = ThumbnailCache::default().try_ensure(&relative, &project).unwrap();
        assert_eq!(thumb, project.join("_thumbs/a.jpg"));
        assert!(image::open(&thumb).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_source_through_symlinked_directory() {
        let (_tmp, dir) = project_tempdir();
        let project = dir.join("P");
        write_jpeg(&project.join("a.jpg"), 40, 40);
        std::os::unix::fs::symlink(&project, dir.join("L")).unwrap();

        let cache = ThumbnailCache::default();
        let thumb = cache.try_ensure(&dir.join("L/a.jpg"), &project).unwrap();
        assert_eq!(thumb, project.join("_thumbs/a.jpg"));

        // The project may also be named through the link
        let via_link = cache.try_ensure(&project.join("a.jpg"), &dir.join("L")).unwrap();
        assert_eq!(via_link, thumb);

        // A missing file under a linked directory still reports SourceMissing
        assert!(matches!(
            cache.try_ensure(&dir.join("L/gone.jpg"), &project),
            Err(ThumbnailError::SourceMissing(_))
        ));
    }

    #[test]
    fn test_concurrent_ensure_leaves_one_complete_thumbnail() {
        let (_tmp, dir) = project_tempdir();
        let source = dir.join("a.jpg");
        write_jpeg(&source, 600, 400);
        let cache = ThumbnailCache::new(120);

        let results: Vec<Option<PathBuf>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.ensure(&source, &dir)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let expected = dir.join("_thumbs/a.jpg");
        assert!(results.iter().all(|r| r.as_deref() == Some(expected.as_path())));
        let decoded = image::open(&expected).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 80));

        // No temp files left behind next to the thumbnail
        let names: Vec<String> = fs::read_dir(dir.join("_thumbs"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg"]);
    }
}
