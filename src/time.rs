//! UTC timestamp helpers.
//!
//! Timestamps are persisted as RFC3339 text with fixed microsecond
//! precision, so lexicographic order on the column matches chronological
//! order and filesystem mtimes compare by simple string equality.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time as fixed-width RFC3339.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A file's modification time as fixed-width RFC3339 UTC.
pub fn mtime_rfc3339(path: &Path) -> std::io::Result<String> {
    let modified = std::fs::metadata(path)?.modified()?;
    let utc: DateTime<Utc> = modified.into();
    Ok(utc.to_rfc3339_opts(SecondsFormat::Micros, true))
}
