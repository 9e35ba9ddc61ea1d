//! Catalog store: album and track persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. The
//! synchronizer runs all writes for one root directory through a single
//! transaction (one commit per root per pass), so most functions here
//! take `&mut SqliteConnection` and work equally against a pool
//! connection or an open transaction.
//!
//! Referential integrity is owned here: deleting tracks or albums first
//! nulls out any `last_played_track_id` that points at a removed track.
//! The weak last-played reference is never allowed to dangle.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::metadata::TrackTags;
use crate::model::{clamp_len, Album, MediaKind, Track, MAX_NAME_LEN, MAX_PATH_LEN, MAX_THUMBNAIL_LEN};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "mediashelf.db";

/// Build a SQLite database URL from an optional path.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, enables foreign key
/// enforcement, and runs all pending migrations.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Look up an album by its source directory path (the reconciliation key).
pub async fn album_by_path(
    conn: &mut SqliteConnection,
    path: &str,
) -> sqlx::Result<Option<Album>> {
    sqlx::query_as::<_, Album>("SELECT * FROM albums WHERE path = ?")
        .bind(path)
        .fetch_optional(conn)
        .await
}

/// Look up an album by id.
pub async fn album_by_id(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<Option<Album>> {
    sqlx::query_as::<_, Album>("SELECT * FROM albums WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// All albums of one kind, ordered by display name.
pub async fn albums_by_kind(
    conn: &mut SqliteConnection,
    kind: MediaKind,
) -> sqlx::Result<Vec<Album>> {
    sqlx::query_as::<_, Album>("SELECT * FROM albums WHERE kind = ? ORDER BY name ASC")
        .bind(kind)
        .fetch_all(conn)
        .await
}

/// (id, path) pairs for every album of one kind. Used by the synchronizer
/// to find rows whose directory no longer exists on disk.
pub async fn album_paths_by_kind(
    conn: &mut SqliteConnection,
    kind: MediaKind,
) -> sqlx::Result<Vec<(i64, String)>> {
    sqlx::query_as("SELECT id, path FROM albums WHERE kind = ?")
        .bind(kind)
        .fetch_all(conn)
        .await
}

/// Tracks of one album in presentation order: ascending track number,
/// ties broken by ascending id (insertion order).
pub async fn tracks_for_album(
    conn: &mut SqliteConnection,
    album_id: i64,
) -> sqlx::Result<Vec<Track>> {
    sqlx::query_as::<_, Track>(
        "SELECT * FROM tracks WHERE album_id = ? ORDER BY track_number ASC, id ASC",
    )
    .bind(album_id)
    .fetch_all(conn)
    .await
}

/// Look up a track by id.
pub async fn track_by_id(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Insert a new album discovered under a configured root.
pub async fn insert_album(
    conn: &mut SqliteConnection,
    kind: MediaKind,
    name: &str,
    path: &str,
) -> sqlx::Result<i64> {
    let result = sqlx::query("INSERT INTO albums (kind, name, path) VALUES (?, ?, ?)")
        .bind(kind)
        .bind(clamp_len(name, MAX_NAME_LEN))
        .bind(clamp_len(path, MAX_PATH_LEN))
        .execute(conn)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Refresh the sync-maintained album fields (artist, thumbnail).
pub async fn update_album_meta(
    conn: &mut SqliteConnection,
    album_id: i64,
    artist: Option<&str>,
    thumbnail_path: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET artist = ?, thumbnail_path = ? WHERE id = ?")
        .bind(artist.map(|a| clamp_len(a, MAX_NAME_LEN)))
        .bind(thumbnail_path.map(|t| clamp_len(t, MAX_THUMBNAIL_LEN)))
        .bind(album_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Insert a new track discovered in an album directory.
pub async fn insert_track(
    conn: &mut SqliteConnection,
    album_id: i64,
    file_name: &str,
    tags: &TrackTags,
    last_modified: &str,
) -> sqlx::Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO tracks (album_id, name, file_name, artist, track_number, last_modified, duration_secs)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(album_id)
    .bind(clamp_len(&tags.title, MAX_NAME_LEN))
    .bind(clamp_len(file_name, MAX_NAME_LEN))
    .bind(tags.artist.as_deref().map(|a| clamp_len(a, MAX_NAME_LEN)))
    .bind(tags.track_number as i64)
    .bind(last_modified)
    .bind(tags.duration_secs.map(|d| d as i64))
    .execute(conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Re-write a track's extracted fields after its file changed on disk.
pub async fn update_track(
    conn: &mut SqliteConnection,
    track_id: i64,
    tags: &TrackTags,
    last_modified: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE tracks
        SET name = ?, artist = ?, track_number = ?, last_modified = ?, duration_secs = ?
        WHERE id = ?
        "#,
    )
    .bind(clamp_len(&tags.title, MAX_NAME_LEN))
    .bind(tags.artist.as_deref().map(|a| clamp_len(a, MAX_NAME_LEN)))
    .bind(tags.track_number as i64)
    .bind(last_modified)
    .bind(tags.duration_secs.map(|d| d as i64))
    .bind(track_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Delete tracks by id, clearing any last-played references to them first.
pub async fn delete_tracks(conn: &mut SqliteConnection, ids: &[i64]) -> sqlx::Result<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let mut clear = QueryBuilder::<Sqlite>::new(
        "UPDATE albums SET last_played_track_id = NULL WHERE last_played_track_id IN (",
    );
    push_ids(&mut clear, ids);
    clear.build().execute(&mut *conn).await?;

    let mut delete = QueryBuilder::<Sqlite>::new("DELETE FROM tracks WHERE id IN (");
    push_ids(&mut delete, ids);
    delete.build().execute(&mut *conn).await?;

    Ok(())
}

/// Bulk-delete albums and their tracks by id.
///
/// Clears last-played references to any track of the doomed albums before
/// deleting, covering references held by other albums as well.
pub async fn delete_albums(conn: &mut SqliteConnection, ids: &[i64]) -> sqlx::Result<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let mut clear = QueryBuilder::<Sqlite>::new(
        "UPDATE albums SET last_played_track_id = NULL \
         WHERE last_played_track_id IN (SELECT id FROM tracks WHERE album_id IN (",
    );
    push_ids(&mut clear, ids);
    clear.push(")");
    clear.build().execute(&mut *conn).await?;

    let mut tracks = QueryBuilder::<Sqlite>::new("DELETE FROM tracks WHERE album_id IN (");
    push_ids(&mut tracks, ids);
    tracks.build().execute(&mut *conn).await?;

    let mut albums = QueryBuilder::<Sqlite>::new("DELETE FROM albums WHERE id IN (");
    push_ids(&mut albums, ids);
    albums.build().execute(&mut *conn).await?;

    Ok(())
}

/// Record playback progress for a track.
///
/// Resolves the track's owning album and sets its last-played fields.
/// Returns `false` when the track id does not exist; the catalog service
/// turns that into a typed `NotFound`.
pub async fn record_playback(
    pool: &SqlitePool,
    track_id: i64,
    position: f64,
    now_utc: &str,
) -> sqlx::Result<bool> {
    let mut conn = pool.acquire().await?;

    let Some(track) = track_by_id(&mut conn, track_id).await? else {
        return Ok(false);
    };

    sqlx::query(
        r#"
        UPDATE albums
        SET last_played_track_id = ?, last_played_position = ?, last_played_at = ?
        WHERE id = ?
        "#,
    )
    .bind(track_id)
    .bind(position)
    .bind(now_utc)
    .bind(track.album_id)
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

/// The album most recently touched by [`record_playback`], if any.
pub async fn last_played_album(pool: &SqlitePool) -> sqlx::Result<Option<Album>> {
    sqlx::query_as::<_, Album>(
        "SELECT * FROM albums WHERE last_played_at IS NOT NULL \
         ORDER BY last_played_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await
}

/// Append a comma-separated bind list and the closing parenthesis.
fn push_ids(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    qb.push(")");
}
