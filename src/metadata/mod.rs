//! Audio file tag reading.
//!
//! Uses the lofty crate for format-independent metadata access. The
//! synchronizer records every file it sees: when a file cannot be parsed
//! as audio, [`read`] fails and the caller falls back to [`fallback`],
//! so a single corrupt file never blocks a catalog sync.

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use std::path::Path;

use crate::error::{Error, Result};

/// Tag data extracted from one audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    /// Tag title if non-blank, else the file stem
    pub title: String,
    /// First album-artist entry, else the plain artist tag, else none
    pub artist: Option<String>,
    /// Track number from tags, 0 when unset
    pub track_number: u32,
    /// Duration in whole seconds
    pub duration_secs: Option<u64>,
    /// Whether the tag frame embeds at least one picture
    pub has_cover: bool,
}

/// Read tags and audio properties from a file.
///
/// # Errors
///
/// Returns [`Error::Metadata`] when the file cannot be probed or parsed
/// as audio. Callers recording the file anyway should use [`fallback`].
pub fn read(path: &Path) -> Result<TrackTags> {
    let tagged_file = Probe::open(path)
        .map_err(|e| Error::metadata(path, e.to_string()))?
        .read()
        .map_err(|e| Error::metadata(path, e.to_string()))?;

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let title = tag
        .and_then(|t| t.title().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| file_stem(path));

    let artist = tag.and_then(|t| {
        t.get_string(&ItemKey::AlbumArtist)
            .or_else(|| t.get_string(&ItemKey::TrackArtist))
            .map(|s| s.to_string())
    });

    let track_number = tag.and_then(|t| t.track()).unwrap_or(0);

    let has_cover = tag.map(|t| !t.pictures().is_empty()).unwrap_or(false);

    let duration_secs = Some(tagged_file.properties().duration().as_secs());

    Ok(TrackTags {
        title,
        artist,
        track_number,
        duration_secs,
        has_cover,
    })
}

/// Filename-derived defaults for a file whose tags are unreadable.
pub fn fallback(path: &Path) -> TrackTags {
    TrackTags {
        title: file_stem(path),
        artist: None,
        track_number: 0,
        duration_secs: None,
        has_cover: false,
    }
}

/// File name without its extension, used as the default display name.
fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}
