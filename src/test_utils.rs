//! Test utilities and fixtures.
//!
//! Provides a temporary migrated database and tag fixtures to reduce
//! boilerplate in tests.

use sqlx::sqlite::SqlitePool;
use std::path::Path;
use tempfile::TempDir;

use crate::metadata::TrackTags;

/// Creates a temporary database for testing.
///
/// The database lives in a temporary directory that is cleaned up when
/// the returned `TempDir` is dropped; keep it alive for the duration of
/// the test. Migrations are run automatically.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Tag fixture derived from a file name, matching what the extractor
/// falls back to for files with unreadable tags.
pub fn fake_tags(file_name: &str) -> TrackTags {
    crate::metadata::fallback(Path::new(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaKind;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        let mut conn = pool.acquire().await.unwrap();
        let albums = crate::db::albums_by_kind(&mut conn, MediaKind::Music)
            .await
            .unwrap();
        assert!(albums.is_empty());
    }

    #[test]
    fn test_fake_tags_derive_from_file_name() {
        let tags = fake_tags("07 - Here Comes the Sun.mp3");
        assert_eq!(tags.title, "07 - Here Comes the Sun");
        assert_eq!(tags.track_number, 0);
    }
}
