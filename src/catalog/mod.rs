//! Read-oriented catalog facade for playback and UI consumers.
//!
//! Wraps the store with the consumer contract: browse albums by kind,
//! fetch one album with ordered tracks and absolute file paths, find the
//! most recently played album, and record playback progress. Lookups by
//! id fail with a typed `NotFound`; list queries return empty results by
//! design.

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;

use crate::db;
use crate::error::{Error, Result};
use crate::model::{Album, MediaKind, Track};
use crate::time::now_rfc3339;

/// Album row shaped for browse lists.
#[derive(Debug, Clone)]
pub struct AlbumSummary {
    pub id: i64,
    pub kind: MediaKind,
    pub name: String,
    pub artist: Option<String>,
    pub thumbnail_path: Option<String>,
}

impl From<Album> for AlbumSummary {
    fn from(album: Album) -> Self {
        Self {
            id: album.id,
            kind: album.kind,
            name: album.name,
            artist: album.artist,
            thumbnail_path: album.thumbnail_path,
        }
    }
}

/// One track with its absolute file path resolved for playback.
#[derive(Debug, Clone)]
pub struct PlayableTrack {
    pub id: i64,
    pub name: String,
    pub artist: Option<String>,
    pub track_number: i64,
    pub duration_secs: Option<i64>,
    /// Album directory + track file name
    pub path: PathBuf,
}

/// A full album as served to the player: ordered tracks and the resolved
/// last-played state.
#[derive(Debug, Clone)]
pub struct AlbumDetail {
    pub album: Album,
    pub tracks: Vec<PlayableTrack>,
    /// The album's last-played track, when the weak reference still
    /// resolves to one of its tracks
    pub last_played_track_id: Option<i64>,
    pub last_played_position: Option<f64>,
}

/// Read/write facade over the catalog store.
#[derive(Clone)]
pub struct CatalogService {
    pool: SqlitePool,
}

impl CatalogService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Albums of one kind, ordered by display name.
    pub async fn list_by_kind(&self, kind: MediaKind) -> Result<Vec<AlbumSummary>> {
        let mut conn = self.pool.acquire().await?;
        let albums = db::albums_by_kind(&mut conn, kind).await?;
        Ok(albums.into_iter().map(AlbumSummary::from).collect())
    }

    /// One album with its tracks in presentation order.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no album has this id.
    pub async fn get_by_id(&self, id: i64) -> Result<AlbumDetail> {
        let mut conn = self.pool.acquire().await?;

        let album = db::album_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| Error::not_found(format!("album {id}")))?;

        let tracks = db::tracks_for_album(&mut conn, id).await?;
        let album_dir = Path::new(&album.path);
        let tracks: Vec<PlayableTrack> = tracks
            .into_iter()
            .map(|t| playable(album_dir, t))
            .collect();

        // A reference to a track that no longer belongs to the album is
        // not served (the row may even be gone; deletes null eagerly)
        let last_played_track_id = album
            .last_played_track_id
            .filter(|tid| tracks.iter().any(|t| t.id == *tid));

        Ok(AlbumDetail {
            last_played_track_id,
            last_played_position: album.last_played_position,
            tracks,
            album,
        })
    }

    /// The most recently played album, if any playback was ever recorded.
    pub async fn get_last_played(&self) -> Result<Option<AlbumSummary>> {
        let album = db::last_played_album(&self.pool).await?;
        Ok(album.map(AlbumSummary::from))
    }

    /// Record playback progress (fractional position 0..1) for a track,
    /// updating its owning album's last-played state.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the track id does not exist.
    pub async fn record_playback(&self, track_id: i64, position: f64) -> Result<()> {
        let position = position.clamp(0.0, 1.0);
        let updated = db::record_playback(&self.pool, track_id, position, &now_rfc3339()).await?;
        if !updated {
            return Err(Error::not_found(format!("track {track_id}")));
        }
        Ok(())
    }
}

fn playable(album_dir: &Path, track: Track) -> PlayableTrack {
    PlayableTrack {
        id: track.id,
        path: album_dir.join(&track.file_name),
        name: track.name,
        artist: track.artist,
        track_number: track.track_number,
        duration_secs: track.duration_secs,
    }
}
