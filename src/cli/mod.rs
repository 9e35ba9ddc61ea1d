//! Command-line interface.
//!
//! `watch` (the default) runs the long-lived service: startup sync after a
//! warm-up delay, then re-sync on debounced file system changes until
//! ctrl-c. The other commands are one-shot: a manual sync pass, catalog
//! browsing via the query service, and `import`, which stands in for the
//! upload endpoint by depositing files into a root and triggering a sync.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::catalog::CatalogService;
use crate::config::{self, Config};
use crate::db;
use crate::model::MediaKind;
use crate::sync::watcher::LibraryWatcher;
use crate::sync::{sanitize_album_dir_name, Synchronizer};

#[derive(Parser)]
#[command(name = "mediashelf", about = "Home media catalog with library synchronization")]
pub struct Cli {
    /// Database file (overrides the configured path)
    #[arg(long, env = "MEDIASHELF_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one synchronization pass and exit
    Sync,
    /// Watch the library roots and keep the catalog in sync (default)
    Watch,
    /// List albums of one kind
    List {
        /// audiobook, music, or sleep
        kind: MediaKind,
    },
    /// Show one album with its tracks
    Show {
        /// Album id
        id: i64,
    },
    /// Show the most recently played album
    Last,
    /// Record playback progress for a track (for the playback engine)
    Played {
        /// Track id
        track_id: i64,
        /// Fractional position, 0..1
        position: f64,
    },
    /// Copy a folder of mp3 files into a library root and sync
    Import {
        /// Source directory containing mp3 files
        source: PathBuf,
        /// Target media kind
        #[arg(long)]
        kind: MediaKind,
        /// Album name (defaults to the source directory name)
        #[arg(long)]
        name: Option<String>,
    },
}

/// Parse config, open the database, and dispatch the command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load();

    let db_path = cli.db.or_else(|| cfg.database.path.clone());
    let pool = db::init_db(&db::db_url(db_path.as_deref()))
        .await
        .context("Failed to open database")?;

    match cli.command.unwrap_or(Command::Watch) {
        Command::Sync => {
            let sync = Synchronizer::new(pool, cfg.roots());
            sync.run_once().await;
            println!("Sync complete.");
        }
        Command::Watch => watch(pool, &cfg).await?,
        Command::List { kind } => {
            let service = CatalogService::new(pool);
            let albums = service.list_by_kind(kind).await?;
            if albums.is_empty() {
                println!("No {kind} albums in the catalog.");
            }
            for album in albums {
                let artist = album.artist.as_deref().unwrap_or("-");
                println!("{:>5}  {}  ({})", album.id, album.name, artist);
            }
        }
        Command::Show { id } => {
            let service = CatalogService::new(pool);
            let detail = service.get_by_id(id).await?;
            println!("{} [{}]", detail.album.name, detail.album.kind);
            if let Some(artist) = &detail.album.artist {
                println!("Artist: {artist}");
            }
            for track in &detail.tracks {
                let marker = if detail.last_played_track_id == Some(track.id) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {:>3}  {}  {}", track.track_number, track.name, track.path.display());
            }
        }
        Command::Last => {
            let service = CatalogService::new(pool);
            match service.get_last_played().await? {
                Some(album) => println!("{:>5}  {}  [{}]", album.id, album.name, album.kind),
                None => println!("No playback recorded yet."),
            }
        }
        Command::Played { track_id, position } => {
            let service = CatalogService::new(pool);
            service.record_playback(track_id, position).await?;
            println!("Recorded playback for track {track_id}.");
        }
        Command::Import { source, kind, name } => {
            let sync = Synchronizer::new(pool, cfg.roots());
            let dest = import_album(&cfg, &source, kind, name.as_deref())?;
            println!("Imported into {}", dest.display());
            // Upload completion issues a manual sync trigger
            sync.run_once().await;
        }
    }

    Ok(())
}

/// Long-running watch mode: startup sync after a warm-up delay, then one
/// sync per debounced change signal, until ctrl-c.
async fn watch(pool: sqlx::SqlitePool, cfg: &Config) -> anyhow::Result<()> {
    let roots = cfg.roots();
    let sync = Synchronizer::new(pool, roots.clone());

    let mut watcher = LibraryWatcher::new(Duration::from_secs(cfg.sync.debounce_secs));
    let root_paths: Vec<PathBuf> = roots.into_iter().map(|(path, _)| path).collect();
    let mut changes = watcher
        .initialize(&root_paths)
        .context("Failed to start file watcher")?;

    println!("Watching library roots. Press Ctrl+C to stop.");

    tokio::time::sleep(Duration::from_secs(cfg.sync.startup_delay_secs)).await;
    sync.trigger();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            signal = changes.recv() => match signal {
                Some(()) => sync.trigger(),
                None => break,
            },
        }
    }

    Ok(())
}

/// Copy the mp3 files of `source` into the root for `kind`, under a
/// sanitized album directory name. Returns the destination directory.
fn import_album(
    cfg: &Config,
    source: &std::path::Path,
    kind: MediaKind,
    name: Option<&str>,
) -> anyhow::Result<PathBuf> {
    let album_name = name
        .map(str::to_string)
        .or_else(|| source.file_name().map(|n| n.to_string_lossy().into_owned()))
        .context("Source directory has no usable name")?;

    let dest = cfg.root_for(kind).join(sanitize_album_dir_name(&album_name));
    std::fs::create_dir_all(&dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    let mut copied = 0usize;
    for entry in std::fs::read_dir(source)
        .with_context(|| format!("Failed to read {}", source.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && crate::cover::is_mp3(&path) {
            if let Some(file_name) = path.file_name() {
                std::fs::copy(&path, dest.join(file_name))?;
                copied += 1;
            }
        }
    }

    if copied == 0 {
        anyhow::bail!("No mp3 files found in {}", source.display());
    }
    tracing::info!(count = copied, dest = %dest.display(), "Imported album files");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_db;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["mediashelf", "list", "music"]);
        assert!(matches!(
            cli.command,
            Some(Command::List {
                kind: MediaKind::Music
            })
        ));

        let cli = Cli::parse_from(["mediashelf", "show", "7"]);
        assert!(matches!(cli.command, Some(Command::Show { id: 7 })));

        let cli = Cli::parse_from(["mediashelf"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["mediashelf", "list", "podcast"]).is_err());
    }

    #[tokio::test]
    async fn test_import_copies_and_sync_catalogs() {
        let (pool, _db_dir) = temp_db().await;

        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("01.mp3"), b"fake").unwrap();
        std::fs::write(source.path().join("notes.txt"), b"skip me").unwrap();

        let library = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.library.audiobooks = library.path().join("audiobooks");
        cfg.library.music = library.path().to_path_buf();
        cfg.library.sleep = library.path().join("sleep");

        let dest = import_album(&cfg, source.path(), MediaKind::Music, Some("My: Album?")).unwrap();
        assert_eq!(dest, library.path().join("My Album"));
        assert!(dest.join("01.mp3").exists());
        assert!(!dest.join("notes.txt").exists());

        let sync = Synchronizer::new(pool.clone(), cfg.roots());
        sync.run_once().await;

        let service = CatalogService::new(pool);
        let albums = service.list_by_kind(MediaKind::Music).await.unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].name, "My Album");
    }

    #[test]
    fn test_import_with_no_mp3s_fails() {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("cover.jpg"), b"img").unwrap();

        let library = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.library.sleep = library.path().to_path_buf();

        let result = import_album(&cfg, source.path(), MediaKind::Sleep, None);
        assert!(result.is_err());
    }
}
