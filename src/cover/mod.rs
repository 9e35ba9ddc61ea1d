//! Album thumbnail resolution.
//!
//! Resolves a thumbnail source for an album directory with a fixed
//! precedence, first match wins:
//! 1. The stored path, when it still exists on disk (avoids re-resolving
//!    every pass)
//! 2. A file literally named `image.jpg` or `image.png` in the directory
//! 3. The first `.mp3` in the directory with embedded picture data - the
//!    consumer extracts the image from that file's tags
//!
//! A missing album directory resolves to none, which also clears any
//! previously stored reference.

use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use std::path::{Path, PathBuf};

/// Standalone image files recognized directly in the album directory.
const IMAGE_FILENAMES: &[&str] = &["image.jpg", "image.png"];

/// Resolve the thumbnail source for an album directory.
///
/// `stored` is the previously persisted thumbnail path, if any; it wins
/// while it still exists on disk. Returns `None` when the directory is
/// missing or holds no usable art, in which case the caller clears the
/// stored reference.
pub fn resolve_thumbnail(album_dir: &Path, stored: Option<&Path>) -> Option<PathBuf> {
    if !album_dir.is_dir() {
        return None;
    }

    if let Some(existing) = stored
        && existing.is_file()
    {
        return Some(existing.to_path_buf());
    }

    for name in IMAGE_FILENAMES {
        let candidate = album_dir.join(name);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "Resolved thumbnail from image file");
            return Some(candidate);
        }
    }

    // Fall back to the first audio file carrying embedded art. Sort the
    // listing so the pick is stable across passes.
    let mut audio_files: Vec<PathBuf> = std::fs::read_dir(album_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_mp3(p))
        .collect();
    audio_files.sort();

    for file in audio_files {
        if has_embedded_art(&file) {
            tracing::debug!(path = %file.display(), "Resolved thumbnail from embedded tag art");
            return Some(file);
        }
    }

    None
}

/// Whether the file's tag frame embeds at least one picture.
pub fn has_embedded_art(path: &Path) -> bool {
    crate::metadata::read(path)
        .map(|tags| tags.has_cover)
        .unwrap_or(false)
}

/// Extract the first embedded picture from an audio file's tags.
///
/// Returns the raw image bytes and a MIME type. Consumers use this when
/// the resolved thumbnail path points at an audio file rather than a
/// standalone image.
pub fn embedded_art(path: &Path) -> Option<(Vec<u8>, &'static str)> {
    let tagged_file = Probe::open(path).ok()?.read().ok()?;
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())?;

    let picture = tag.pictures().first()?;

    let mime = match picture.mime_type() {
        Some(lofty::picture::MimeType::Jpeg) => "image/jpeg",
        Some(lofty::picture::MimeType::Png) => "image/png",
        Some(lofty::picture::MimeType::Gif) => "image/gif",
        Some(lofty::picture::MimeType::Bmp) => "image/bmp",
        Some(lofty::picture::MimeType::Tiff) => "image/tiff",
        _ => "image/jpeg", // Default assumption
    };

    Some((picture.data().to_vec(), mime))
}

/// Check if a path is an mp3 file by extension (case-insensitive).
pub fn is_mp3(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false)
}
