//! ShowShelf - Keep a local shelf of TV series metadata
//!
//! This library maintains a persistent local cache of series, episode and
//! artwork metadata mirrored from a remote catalog. Entries are fetched on
//! demand, flagged stale through the provider's incremental change feed,
//! and re-fetched selectively; the whole shelf survives restarts as one
//! human-diffable JSON document.

mod cache;
mod persist;
mod provider;
mod seen;
mod series;
mod specifier;
mod sync;

// Re-export the cache core
pub use cache::{CacheError, SeriesCache};
pub use persist::PersistError;
pub use series::{Banner, Episode, RecordState, Season, SeriesInfo};
pub use specifier::{ProviderKind, SeriesSpecifier, UNSET_ID};

// Re-export the provider seam
pub use provider::{ProviderError, RemoteProvider, TvMazeProvider};

// Re-export sync operations
pub use sync::{
    CancelFlag, SyncError, SyncEvent, SyncOutcome, ensure_updated, get_updates, refresh_dirty,
};

// Re-export the companion seen-movies list
pub use seen::{SeenMovies, SeenMoviesError};

use std::path::PathBuf;
use thiserror::Error;

/// File name of the serialized series cache inside the data directory.
pub const CACHE_FILE_NAME: &str = "tvmaze.json";

/// File name of the previously-seen movie list inside the data directory.
pub const SEEN_FILE_NAME: &str = "seen_movies.json";

/// Top-level error type for ShowShelf operations
#[derive(Debug, Error)]
pub enum ShowShelfError {
    /// Failed to determine the platform data directory
    #[error("Failed to determine data directory location")]
    DataDirectoryNotFound,

    /// Error in the cache store or its persistence
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Error while syncing with the remote catalog
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Error in the seen-movies list
    #[error("Seen movies error: {0}")]
    SeenMovies(#[from] SeenMoviesError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves the platform data directory for ShowShelf files.
///
/// This is where the CLI keeps [`CACHE_FILE_NAME`] and [`SEEN_FILE_NAME`]
/// unless overridden. Library users are free to pass any paths they like to
/// [`SeriesCache::setup`] and [`SeenMovies::load`] instead.
pub fn default_data_dir() -> Result<PathBuf, ShowShelfError> {
    let project_dirs = directories::ProjectDirs::from("de", "showshelf", "showshelf")
        .ok_or(ShowShelfError::DataDirectoryNotFound)?;
    Ok(project_dirs.data_dir().to_path_buf())
}
