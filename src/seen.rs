//! Record of movies the user has already seen.
//!
//! A small ordered list of positive catalog ids, persisted as a bare JSON
//! array next to the series cache. First occurrence order is what the user
//! saw, so it is preserved; duplicates and non-positive ids are dropped.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use ulid::Ulid;

/// Errors that can occur while reading or writing the seen-movies list.
#[derive(Debug, Error)]
pub enum SeenMoviesError {
    /// Failed to read the list file
    #[error("Failed to read seen movies from {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the list file
    #[error("Failed to write seen movies to {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to move the freshly written file into place
    #[error("Failed to replace seen movies file {path}: {source}")]
    ReplaceFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The list file is not a JSON array of ids
    #[error("Failed to parse seen movies from {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize the list
    #[error("Failed to serialize seen movies: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Ordered set of movie ids the user marked as seen.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeenMovies {
    ids: Vec<i64>,
}

impl SeenMovies {
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Appends an id unless it is non-positive or already recorded.
    /// Returns whether the list changed.
    pub fn ensure_added(&mut self, movie_id: i64) -> bool {
        if movie_id <= 0 || self.ids.contains(&movie_id) {
            return false;
        }
        self.ids.push(movie_id);
        true
    }

    pub fn includes(&self, movie_id: i64) -> bool {
        self.ids.contains(&movie_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in the order they were first recorded.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Reads a list from `path`. A missing file is an empty list; invalid
    /// entries in an existing file are dropped, keeping the order of the
    /// rest.
    pub fn load(path: &Path) -> Result<Self, SeenMoviesError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path).map_err(|e| SeenMoviesError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let raw: Vec<i64> =
            serde_json::from_str(&content).map_err(|e| SeenMoviesError::ParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let total = raw.len();
        let mut list = Self::new();
        for id in raw {
            list.ensure_added(id);
        }
        let dropped = total - list.len();
        if dropped > 0 {
            debug!(dropped, path = %path.display(), "dropped invalid seen-movie entries");
        }
        Ok(list)
    }

    /// Writes the list to `path`, using the same write-then-rename swap as
    /// the series cache.
    pub fn save(&self, path: &Path) -> Result<(), SeenMoviesError> {
        let content = serde_json::to_string_pretty(&self.ids)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| SeenMoviesError::WriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let tmp_path = path.with_extension(format!("{}.tmp", Ulid::new()));
        fs::write(&tmp_path, content).map_err(|e| SeenMoviesError::WriteFailed {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, path).map_err(|e| SeenMoviesError::ReplaceFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_list_path() -> PathBuf {
        std::env::temp_dir().join(format!("show_shelf_seen_test_{}.json", Ulid::new()))
    }

    #[test]
    fn ensure_added_keeps_first_occurrence_order() {
        let mut seen = SeenMovies::new();
        assert!(seen.ensure_added(3));
        assert!(seen.ensure_added(1));
        assert!(!seen.ensure_added(3));
        assert!(seen.ensure_added(2));
        assert!(!seen.ensure_added(0));
        assert!(!seen.ensure_added(-5));

        assert_eq!(seen.ids(), &[3, 1, 2]);
        assert!(seen.includes(1));
        assert!(!seen.includes(5));
    }

    #[test]
    fn loading_a_missing_file_is_empty() {
        let seen = SeenMovies::load(&temp_list_path()).expect("missing file tolerated");
        assert!(seen.is_empty());
    }

    #[test]
    fn save_then_load_round_trips_order() {
        let path = temp_list_path();
        let mut seen = SeenMovies::new();
        seen.ensure_added(42);
        seen.ensure_added(7);
        seen.ensure_added(1000);

        seen.save(&path).expect("list written");
        let loaded = SeenMovies::load(&path).expect("list readable");
        assert_eq!(loaded.ids(), &[42, 7, 1000]);

        fs::remove_file(&path).expect("test file cleaned up");
    }

    #[test]
    fn loading_drops_duplicates_and_non_positive_ids() {
        let path = temp_list_path();
        fs::write(&path, "[5, 5, -1, 0, 9]").expect("handcrafted file written");

        let loaded = SeenMovies::load(&path).expect("list readable");
        assert_eq!(loaded.ids(), &[5, 9]);

        fs::remove_file(&path).expect("test file cleaned up");
    }

    #[test]
    fn loading_rejects_garbage() {
        let path = temp_list_path();
        fs::write(&path, "{\"not\": \"a list\"}").expect("garbage written");

        let err = SeenMovies::load(&path).expect_err("garbage is an error");
        assert!(matches!(err, SeenMoviesError::ParseFailed { .. }));

        fs::remove_file(&path).expect("test file cleaned up");
    }
}
