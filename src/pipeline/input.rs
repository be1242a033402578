//! Input resolution: validate the source document and discover page images.
//!
//! Both stages fail fast on bad input so no paid API call or long render is
//! started for a job that cannot succeed. We check the PDF magic bytes
//! (`%PDF`) up front so callers get a meaningful error rather than a
//! renderer crash.

use crate::error::ScribeError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File extensions accepted as page images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Validate a local source document: it exists, is readable, and is a PDF.
pub fn resolve_document(path: &Path) -> Result<PathBuf, ScribeError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(ScribeError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(ScribeError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ScribeError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ScribeError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// `true` when the path has one of the [`IMAGE_EXTENSIONS`].
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| e.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Expand image files and directories into a sorted, de-duplicated list of
/// page images.
///
/// Directories are scanned one level deep. Arguments that are neither an
/// image nor a directory are skipped with a warning; a path that does not
/// exist is an error. An empty result is returned as-is (the batch runner
/// reports it as "nothing to do").
pub fn collect_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>, ScribeError> {
    let mut images = Vec::new();

    for path in paths {
        if !path.exists() {
            return Err(ScribeError::FileNotFound { path: path.clone() });
        }

        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    ScribeError::PermissionDenied { path: path.clone() }
                }
                _ => ScribeError::Internal(format!("read_dir {}: {e}", path.display())),
            })?;
            for entry in entries {
                let entry = entry
                    .map_err(|e| ScribeError::Internal(format!("read_dir {}: {e}", path.display())))?;
                let p = entry.path();
                if p.is_file() && is_image(&p) {
                    images.push(p);
                }
            }
        } else if is_image(path) {
            images.push(path.clone());
        } else {
            warn!("Skipping {}: not a page image", path.display());
        }
    }

    images.sort();
    images.dedup();
    info!("Found {} page images", images.len());
    Ok(images)
}
