//! Mediashelf - a home media catalog for a small always-on player device.
//!
//! Scans configured root directories of audiobooks, music, and sleep
//! sounds into a SQLite catalog, keeps the catalog in sync with the file
//! system, and serves album/track queries to playback consumers.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod cover;
pub mod db;
pub mod error;
pub mod metadata;
pub mod model;
pub mod sync;
#[cfg(test)]
pub mod test_utils;
pub mod time;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("mediashelf=info".parse()?))
        .init();

    cli::run(args).await
}
