//! Core data models for the media catalog.
//!
//! Defines the primary entities: [`Album`] and [`Track`], derived from
//! SQLx for database mapping, plus the [`MediaKind`] category that
//! partitions root directories and catalog queries.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `albums` - One record per media folder (audiobook, music album, or
//!   sleep-sound set), keyed for reconciliation by its directory path
//! - `tracks` - Individual audio files owned by exactly one album

use sqlx::FromRow;

/// Column limits enforced on write.
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_PATH_LEN: usize = 250;
pub const MAX_THUMBNAIL_LEN: usize = 350;

/// Media category. Each kind has its own configured root directory.
///
/// Stored in the database as the ordinal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i32)]
pub enum MediaKind {
    Audiobook = 0,
    Music = 1,
    Sleep = 2,
}

impl MediaKind {
    /// All kinds, in ordinal order.
    pub const ALL: [MediaKind; 3] = [MediaKind::Audiobook, MediaKind::Music, MediaKind::Sleep];

    /// Human-readable label for logs and CLI output.
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Audiobook => "audiobook",
            MediaKind::Music => "music",
            MediaKind::Sleep => "sleep",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audiobook" | "audiobooks" => Ok(MediaKind::Audiobook),
            "music" => Ok(MediaKind::Music),
            "sleep" => Ok(MediaKind::Sleep),
            other => Err(crate::error::Error::config(format!(
                "unknown media kind '{other}' (expected audiobook, music, or sleep)"
            ))),
        }
    }
}

/// An album in the catalog: one directory of tracks under a configured root.
///
/// `path` is the reconciliation key - renaming a directory on disk deletes
/// this row and creates a new one. `last_played_track_id` is a weak
/// reference; the delete paths in `db` null it out rather than cascading.
#[derive(Debug, Clone, FromRow)]
pub struct Album {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Media category
    pub kind: MediaKind,
    /// Display name (directory name)
    pub name: String,
    /// Absolute source directory path
    pub path: String,
    /// Optional artist (first track artist found during sync)
    pub artist: Option<String>,
    /// Resolved thumbnail source: a standalone image file, or an audio
    /// file whose tags embed the cover picture
    pub thumbnail_path: Option<String>,
    /// Weak reference to the last played track
    pub last_played_track_id: Option<i64>,
    /// Fractional playback position, 0..1
    pub last_played_position: Option<f64>,
    /// RFC3339 UTC timestamp of the last playback update
    pub last_played_at: Option<String>,
}

/// A track (audio file) owned by exactly one album.
#[derive(Debug, Clone, FromRow)]
pub struct Track {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Owning album (cascade delete)
    pub album_id: i64,
    /// Display name (tag title or file stem)
    pub name: String,
    /// File name relative to the album directory (reconciliation key,
    /// unique within the album)
    pub file_name: String,
    /// Optional artist
    pub artist: Option<String>,
    /// Track number from tags, 0 when untagged
    pub track_number: i64,
    /// RFC3339 UTC filesystem modification time at last extraction
    pub last_modified: String,
    /// Duration in whole seconds, when tags were readable
    pub duration_secs: Option<i64>,
}

/// Truncate a string to a column limit, respecting char boundaries.
pub fn clamp_len(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
