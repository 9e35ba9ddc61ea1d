//! Library synchronization: reconciles the on-disk directory tree for each
//! configured root with the catalog store.
//!
//! One immediate subdirectory of a root is one album; `*.mp3` files
//! directly inside it are its tracks, keyed by file name. The synchronizer
//! guarantees at most one pass runs at a time: triggers never block, and
//! every trigger either starts a pass or flags a rerun that the running
//! pass picks up before going idle (any number of triggers while busy
//! collapse to a single rerun).
//!
//! Failure containment: an unreadable file is recorded with
//! filename-derived defaults, a missing or failing root is logged and
//! skipped, and a failed pass still releases the gate.

pub mod watcher;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqliteConnection, SqlitePool};

use crate::cover;
use crate::db;
use crate::error::Result;
use crate::metadata::{self, TrackTags};
use crate::model::MediaKind;
use crate::time::mtime_rfc3339;

const IDLE: u8 = 0;
const SYNCING: u8 = 1;
const SYNCING_RERUN_PENDING: u8 = 2;

/// Non-blocking sync gate: Idle / Syncing / SyncingRerunPending, driven
/// entirely by compare-and-swap so triggers never wait on a lock.
struct SyncGate(AtomicU8);

impl SyncGate {
    fn new() -> Self {
        Self(AtomicU8::new(IDLE))
    }

    /// Idle -> Syncing. Returns whether this caller won the gate.
    fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(IDLE, SYNCING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Flag a rerun while a pass is running. Idempotent; returns false if
    /// the gate is idle (the caller should try to begin instead).
    fn flag_rerun(&self) -> bool {
        loop {
            match self.0.load(Ordering::Acquire) {
                IDLE => return false,
                SYNCING_RERUN_PENDING => return true,
                _ => {
                    if self
                        .0
                        .compare_exchange(
                            SYNCING,
                            SYNCING_RERUN_PENDING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return true;
                    }
                }
            }
        }
    }

    /// Called by the pass loop after each pass. Consumes a pending rerun
    /// flag (returns true: run another pass) or releases the gate to idle
    /// (returns false).
    fn finish_one(&self) -> bool {
        loop {
            if self
                .0
                .compare_exchange(
                    SYNCING_RERUN_PENDING,
                    SYNCING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
            if self
                .0
                .compare_exchange(SYNCING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return false;
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.0.load(Ordering::Acquire) == IDLE
    }
}

/// The synchronizer. Cheap to clone; all clones share one gate.
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
}

struct Inner {
    pool: SqlitePool,
    roots: Vec<(PathBuf, MediaKind)>,
    gate: SyncGate,
    passes: AtomicU64,
}

impl Synchronizer {
    pub fn new(pool: SqlitePool, roots: Vec<(PathBuf, MediaKind)>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                roots,
                gate: SyncGate::new(),
                passes: AtomicU64::new(0),
            }),
        }
    }

    /// Request a synchronization pass. Never blocks: either starts the
    /// pass loop on a background task, or flags a rerun for the pass that
    /// is already running. Requires a tokio runtime.
    pub fn trigger(&self) {
        loop {
            if self.inner.gate.try_begin() {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    pass_loop(&inner).await;
                });
                return;
            }
            // A pass is running: flag a rerun. If the pass finished in the
            // meantime the gate is idle again and we retry the begin.
            if self.inner.gate.flag_rerun() {
                return;
            }
        }
    }

    /// Whether no pass is running or pending.
    pub fn is_idle(&self) -> bool {
        self.inner.gate.is_idle()
    }

    /// Number of completed passes since construction.
    pub fn passes_completed(&self) -> u64 {
        self.inner.passes.load(Ordering::Acquire)
    }

    /// Trigger and wait for the synchronizer to go idle. For one-shot CLI
    /// use and tests; concurrent triggers still coalesce as usual.
    pub async fn run_once(&self) {
        self.trigger();
        self.wait_idle().await;
    }

    /// Wait until no pass is running or pending.
    pub async fn wait_idle(&self) {
        while !self.is_idle() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Run passes until one completes with no rerun flagged during it.
async fn pass_loop(inner: &Inner) {
    loop {
        run_pass(inner).await;
        inner.passes.fetch_add(1, Ordering::AcqRel);
        if !inner.gate.finish_one() {
            return;
        }
        tracing::info!(target: "sync", "Rerun requested during pass, syncing again");
    }
}

/// One full pass over all configured roots. Per-root failures are logged
/// and do not stop the remaining roots.
async fn run_pass(inner: &Inner) {
    tracing::info!(target: "sync", "Synchronization pass started");
    for (root, kind) in &inner.roots {
        if !root.is_dir() {
            tracing::warn!(target: "sync", root = %root.display(), kind = %kind, "Root directory missing, skipping");
            continue;
        }
        if let Err(e) = sync_root(&inner.pool, root, *kind).await {
            tracing::error!(target: "sync", root = %root.display(), kind = %kind, error = %e, "Root sync failed");
        }
    }
    tracing::info!(target: "sync", "Synchronization pass finished");
}

/// Reconcile one root: every immediate subdirectory against the store,
/// then remove albums whose directory vanished. All writes for the root
/// commit together.
async fn sync_root(pool: &SqlitePool, root: &Path, kind: MediaKind) -> Result<()> {
    let mut tx = pool.begin().await?;

    let mut seen_paths = HashSet::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        sync_album_dir(&mut tx, kind, &dir).await?;
        seen_paths.insert(dir.to_string_lossy().into_owned());
    }

    // Albums whose source directory no longer exists under this root
    let persisted = db::album_paths_by_kind(&mut tx, kind).await?;
    let obsolete: Vec<i64> = persisted
        .into_iter()
        .filter(|(_, path)| !seen_paths.contains(path))
        .map(|(id, _)| id)
        .collect();
    if !obsolete.is_empty() {
        tracing::info!(target: "sync", kind = %kind, count = obsolete.len(), "Removing albums with vanished directories");
        db::delete_albums(&mut tx, &obsolete).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Reconcile a single album directory against its persisted row.
async fn sync_album_dir(conn: &mut SqliteConnection, kind: MediaKind, dir: &Path) -> Result<()> {
    let path_str = dir.to_string_lossy().into_owned();

    let files = match list_mp3_files(dir) {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(target: "sync", dir = %dir.display(), error = %e, "Cannot list album directory, skipping");
            return Ok(());
        }
    };

    let existing = db::album_by_path(conn, &path_str).await?;

    // Empty directories are not catalog entries
    if files.is_empty() {
        if let Some(album) = &existing {
            tracing::info!(target: "sync", album = %album.name, "Album directory emptied, removing");
            db::delete_albums(conn, &[album.id]).await?;
        }
        return Ok(());
    }

    let album_id = match &existing {
        Some(album) => album.id,
        None => {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path_str.clone());
            tracing::info!(target: "sync", name = %name, kind = %kind, "New album discovered");
            db::insert_album(conn, kind, &name, &path_str).await?
        }
    };

    reconcile_tracks(conn, album_id, &files).await?;

    // All files may have been skipped (e.g. unreadable mtimes); an album
    // that ends the pass with zero tracks must not survive
    let tracks = db::tracks_for_album(conn, album_id).await?;
    if tracks.is_empty() {
        db::delete_albums(conn, &[album_id]).await?;
        return Ok(());
    }

    let artist = tracks.iter().find_map(|t| t.artist.clone());
    let stored_thumb = existing
        .as_ref()
        .and_then(|a| a.thumbnail_path.as_deref().map(PathBuf::from));
    let thumbnail = cover::resolve_thumbnail(dir, stored_thumb.as_deref())
        .map(|p| p.to_string_lossy().into_owned());

    db::update_album_meta(conn, album_id, artist.as_deref(), thumbnail.as_deref()).await?;
    Ok(())
}

/// Reconcile the album's persisted tracks against the current `*.mp3`
/// listing: insert new files, re-extract files whose mtime changed, and
/// delete tracks whose file vanished.
async fn reconcile_tracks(
    conn: &mut SqliteConnection,
    album_id: i64,
    files: &[PathBuf],
) -> Result<()> {
    let persisted = db::tracks_for_album(conn, album_id).await?;
    let by_name: HashMap<String, &crate::model::Track> = persisted
        .iter()
        .map(|t| (t.file_name.to_lowercase(), t))
        .collect();

    let mut kept: HashSet<i64> = HashSet::new();

    for file in files {
        let Some(file_name) = file.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        let mtime = match mtime_rfc3339(file) {
            Ok(mtime) => mtime,
            Err(e) => {
                tracing::warn!(target: "sync", file = %file.display(), error = %e, "Cannot stat file, skipping");
                continue;
            }
        };

        match by_name.get(&file_name.to_lowercase()) {
            Some(track) => {
                kept.insert(track.id);
                if track.last_modified != mtime {
                    let tags = read_or_fallback(file);
                    tracing::debug!(target: "sync", file = %file_name, "File changed, re-extracting tags");
                    db::update_track(conn, track.id, &tags, &mtime).await?;
                }
            }
            None => {
                let tags = read_or_fallback(file);
                db::insert_track(conn, album_id, &file_name, &tags, &mtime).await?;
            }
        }
    }

    // Vanished files: any persisted track not re-matched above
    let doomed: Vec<i64> = persisted
        .iter()
        .filter(|t| !kept.contains(&t.id))
        .map(|t| t.id)
        .collect();
    db::delete_tracks(conn, &doomed).await?;

    Ok(())
}

/// Read tags, falling back to filename-derived defaults so a single bad
/// file never blocks the rest of the library.
fn read_or_fallback(file: &Path) -> TrackTags {
    match metadata::read(file) {
        Ok(tags) => tags,
        Err(e) => {
            tracing::warn!(target: "sync", file = %file.display(), error = %e, "Tags unreadable, using filename defaults");
            metadata::fallback(file)
        }
    }
}

/// `*.mp3` files directly in the directory (non-recursive).
fn list_mp3_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && cover::is_mp3(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Strip characters that are invalid in directory names on common
/// filesystems. This is the file-placement convention for uploads: folder
/// name = album name, sanitized.
pub fn sanitize_album_dir_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') && !c.is_control())
        .collect();
    let trimmed = cleaned.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "Untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_db;
    use proptest::prelude::*;

    #[test]
    fn test_gate_single_winner() {
        let gate = SyncGate::new();
        assert!(gate.is_idle());
        assert!(gate.try_begin());
        assert!(!gate.try_begin());
        assert!(!gate.is_idle());
    }

    #[test]
    fn test_gate_rerun_is_idempotent() {
        let gate = SyncGate::new();
        assert!(!gate.flag_rerun(), "idle gate cannot take a rerun flag");

        assert!(gate.try_begin());
        // N triggers while busy collapse to a single pending rerun
        for _ in 0..10 {
            assert!(gate.flag_rerun());
        }
        assert!(gate.finish_one(), "one rerun consumed");
        assert!(!gate.finish_one(), "gate released");
        assert!(gate.is_idle());
    }

    #[test]
    fn test_gate_finish_without_rerun_goes_idle() {
        let gate = SyncGate::new();
        assert!(gate.try_begin());
        assert!(!gate.finish_one());
        assert!(gate.is_idle());
        // The cycle can start over
        assert!(gate.try_begin());
    }

    fn write_mp3(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"not really an mp3").unwrap();
    }

    async fn synced(root: &Path, kind: MediaKind) -> (Synchronizer, sqlx::SqlitePool, tempfile::TempDir) {
        let (pool, db_dir) = temp_db().await;
        let sync = Synchronizer::new(pool.clone(), vec![(root.to_path_buf(), kind)]);
        sync.run_once().await;
        (sync, pool, db_dir)
    }

    #[tokio::test]
    async fn test_scan_creates_album_with_tracks() {
        let root = tempfile::tempdir().unwrap();
        let album_dir = root.path().join("Abbey Road");
        std::fs::create_dir(&album_dir).unwrap();
        write_mp3(&album_dir, "01 - Come Together.mp3");
        write_mp3(&album_dir, "02 - Something.mp3");

        let (_sync, pool, _db) = synced(root.path(), MediaKind::Music).await;

        let mut conn = pool.acquire().await.unwrap();
        let albums = db::albums_by_kind(&mut conn, MediaKind::Music).await.unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].name, "Abbey Road");
        assert_eq!(albums[0].kind, MediaKind::Music);

        let tracks = db::tracks_for_album(&mut conn, albums[0].id).await.unwrap();
        assert_eq!(tracks.len(), 2);
        // Tags are unreadable on the fixture bytes: filename defaults apply
        let names: Vec<&str> = tracks.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"01 - Come Together"));
        assert!(names.contains(&"02 - Something"));
        assert!(tracks.iter().all(|t| t.track_number == 0));
        assert!(tracks.iter().all(|t| t.duration_secs.is_none()));
    }

    #[tokio::test]
    async fn test_removed_file_drops_track_on_resync() {
        let root = tempfile::tempdir().unwrap();
        let album_dir = root.path().join("Abbey Road");
        std::fs::create_dir(&album_dir).unwrap();
        write_mp3(&album_dir, "01 - Come Together.mp3");
        write_mp3(&album_dir, "02 - Something.mp3");

        let (sync, pool, _db) = synced(root.path(), MediaKind::Music).await;

        std::fs::remove_file(album_dir.join("02 - Something.mp3")).unwrap();
        sync.run_once().await;

        let mut conn = pool.acquire().await.unwrap();
        let albums = db::albums_by_kind(&mut conn, MediaKind::Music).await.unwrap();
        let tracks = db::tracks_for_album(&mut conn, albums[0].id).await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].name, "01 - Come Together");
    }

    #[tokio::test]
    async fn test_resync_without_changes_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let album_dir = root.path().join("Dune");
        std::fs::create_dir(&album_dir).unwrap();
        write_mp3(&album_dir, "ch1.mp3");
        write_mp3(&album_dir, "ch2.mp3");

        let (sync, pool, _db) = synced(root.path(), MediaKind::Audiobook).await;

        let mut conn = pool.acquire().await.unwrap();
        let before_albums = db::albums_by_kind(&mut conn, MediaKind::Audiobook).await.unwrap();
        let before_tracks = db::tracks_for_album(&mut conn, before_albums[0].id).await.unwrap();
        drop(conn);

        sync.run_once().await;

        let mut conn = pool.acquire().await.unwrap();
        let after_albums = db::albums_by_kind(&mut conn, MediaKind::Audiobook).await.unwrap();
        let after_tracks = db::tracks_for_album(&mut conn, after_albums[0].id).await.unwrap();

        assert_eq!(before_albums[0].id, after_albums[0].id);
        assert_eq!(
            before_tracks.iter().map(|t| t.id).collect::<Vec<_>>(),
            after_tracks.iter().map(|t| t.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_empty_directory_never_becomes_album() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("Empty Folder")).unwrap();
        // A folder with only non-mp3 content is empty too
        let notes = root.path().join("Notes");
        std::fs::create_dir(&notes).unwrap();
        std::fs::write(notes.join("readme.txt"), b"hi").unwrap();

        let (_sync, pool, _db) = synced(root.path(), MediaKind::Sleep).await;

        let mut conn = pool.acquire().await.unwrap();
        let albums = db::albums_by_kind(&mut conn, MediaKind::Sleep).await.unwrap();
        assert!(albums.is_empty());
    }

    #[tokio::test]
    async fn test_album_emptied_on_disk_is_removed() {
        let root = tempfile::tempdir().unwrap();
        let album_dir = root.path().join("Rain");
        std::fs::create_dir(&album_dir).unwrap();
        write_mp3(&album_dir, "rain.mp3");

        let (sync, pool, _db) = synced(root.path(), MediaKind::Sleep).await;

        std::fs::remove_file(album_dir.join("rain.mp3")).unwrap();
        sync.run_once().await;

        let mut conn = pool.acquire().await.unwrap();
        let albums = db::albums_by_kind(&mut conn, MediaKind::Sleep).await.unwrap();
        assert!(albums.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_directory_deletes_album() {
        let root = tempfile::tempdir().unwrap();
        let album_dir = root.path().join("Gone");
        std::fs::create_dir(&album_dir).unwrap();
        write_mp3(&album_dir, "t.mp3");

        let (sync, pool, _db) = synced(root.path(), MediaKind::Music).await;

        std::fs::remove_dir_all(&album_dir).unwrap();
        sync.run_once().await;

        let mut conn = pool.acquire().await.unwrap();
        let albums = db::albums_by_kind(&mut conn, MediaKind::Music).await.unwrap();
        assert!(albums.is_empty());
    }

    #[tokio::test]
    async fn test_renamed_directory_recreates_album() {
        let root = tempfile::tempdir().unwrap();
        let album_dir = root.path().join("Old Name");
        std::fs::create_dir(&album_dir).unwrap();
        write_mp3(&album_dir, "t.mp3");

        let (sync, pool, _db) = synced(root.path(), MediaKind::Music).await;

        let mut conn = pool.acquire().await.unwrap();
        let old = db::albums_by_kind(&mut conn, MediaKind::Music).await.unwrap();
        let old_id = old[0].id;
        drop(conn);

        std::fs::rename(&album_dir, root.path().join("New Name")).unwrap();
        sync.run_once().await;

        let mut conn = pool.acquire().await.unwrap();
        let albums = db::albums_by_kind(&mut conn, MediaKind::Music).await.unwrap();
        assert_eq!(albums.len(), 1);
        assert_ne!(albums[0].id, old_id, "path is the reconciliation key");
        assert_eq!(albums[0].name, "New Name");
    }

    #[tokio::test]
    async fn test_stale_mtime_is_refreshed() {
        let root = tempfile::tempdir().unwrap();
        let album_dir = root.path().join("A");
        std::fs::create_dir(&album_dir).unwrap();
        write_mp3(&album_dir, "t.mp3");

        let (sync, pool, _db) = synced(root.path(), MediaKind::Music).await;

        // Forge a stale stored mtime; the next pass must re-extract
        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("UPDATE tracks SET last_modified = '1999-01-01T00:00:00.000000Z'")
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        sync.run_once().await;

        let mut conn = pool.acquire().await.unwrap();
        let albums = db::albums_by_kind(&mut conn, MediaKind::Music).await.unwrap();
        let tracks = db::tracks_for_album(&mut conn, albums[0].id).await.unwrap();
        assert_ne!(tracks[0].last_modified, "1999-01-01T00:00:00.000000Z");
    }

    #[tokio::test]
    async fn test_thumbnail_image_file_is_attached() {
        let root = tempfile::tempdir().unwrap();
        let album_dir = root.path().join("Art");
        std::fs::create_dir(&album_dir).unwrap();
        write_mp3(&album_dir, "t.mp3");
        std::fs::write(album_dir.join("image.png"), b"fake png").unwrap();

        let (_sync, pool, _db) = synced(root.path(), MediaKind::Music).await;

        let mut conn = pool.acquire().await.unwrap();
        let albums = db::albums_by_kind(&mut conn, MediaKind::Music).await.unwrap();
        let thumb = albums[0].thumbnail_path.as_deref().unwrap();
        assert!(thumb.ends_with("image.png"));
    }

    #[tokio::test]
    async fn test_missing_root_is_skipped_without_failing() {
        let (pool, _db) = temp_db().await;
        let sync = Synchronizer::new(
            pool.clone(),
            vec![(PathBuf::from("/no/such/root"), MediaKind::Music)],
        );
        sync.run_once().await;
        assert!(sync.is_idle());
        assert_eq!(sync.passes_completed(), 1);
    }

    #[tokio::test]
    async fn test_triggers_coalesce() {
        let root = tempfile::tempdir().unwrap();
        let album_dir = root.path().join("A");
        std::fs::create_dir(&album_dir).unwrap();
        for i in 0..20 {
            write_mp3(&album_dir, &format!("{i:02}.mp3"));
        }

        let (pool, _db) = temp_db().await;
        let sync = Synchronizer::new(pool, vec![(root.path().to_path_buf(), MediaKind::Music)]);

        // Many rapid triggers: every one either runs a pass or guarantees
        // a rerun, and they collapse to at most one pending rerun each
        for _ in 0..10 {
            sync.trigger();
        }
        sync.wait_idle().await;

        let passes = sync.passes_completed();
        assert!(passes >= 1, "at least one pass must run");
        assert!(passes <= 10, "triggers must not multiply passes");
    }

    #[test]
    fn test_sanitize_strips_invalid_characters() {
        assert_eq!(sanitize_album_dir_name("AC/DC: Back?"), "ACDC Back");
        assert_eq!(sanitize_album_dir_name("  dotted... "), "dotted");
        assert_eq!(sanitize_album_dir_name("***"), "Untitled");
        assert_eq!(sanitize_album_dir_name("Plain Name"), "Plain Name");
    }

    proptest! {
        #[test]
        fn prop_sanitized_name_is_always_a_valid_directory_name(name in ".*") {
            let sanitized = sanitize_album_dir_name(&name);
            prop_assert!(!sanitized.is_empty());
            prop_assert!(!sanitized.contains(['/', '\\', ':', '*', '?', '"', '<', '>', '|']));
            prop_assert!(!sanitized.chars().any(|c| c.is_control()));
            prop_assert!(!sanitized.ends_with('.'));
            prop_assert!(!sanitized.ends_with(' '));
        }
    }
}
