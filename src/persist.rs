//! On-disk format for the series cache.
//!
//! The whole store is one pretty-printed JSON document: a small header with
//! format version and provider, then every series record ordered by id. The
//! header keeps a file written by a different provider or format from being
//! merged into the wrong store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::series::SeriesInfo;
use crate::specifier::ProviderKind;

/// Version stamp written into every cache file.
const FORMAT_VERSION: u32 = 1;

/// Errors that can occur while reading or writing the cache file.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Failed to read the cache file
    #[error("Failed to read cache file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the cache file
    #[error("Failed to write cache file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to move the freshly written file into place
    #[error("Failed to replace cache file {path}: {source}")]
    ReplaceFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to deserialize the cache file
    #[error("Failed to deserialize cache file {path}: {source}")]
    DeserializationFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize the cache contents
    #[error("Failed to serialize cache data: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// The file was written by an unknown format revision
    #[error("Cache file {path} has format version {found}, expected {expected}")]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    /// The file belongs to a different catalog provider
    #[error("Cache file {path} belongs to provider {found}, expected {expected}")]
    ProviderMismatch {
        path: PathBuf,
        found: ProviderKind,
        expected: ProviderKind,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    format_version: u32,
    provider: ProviderKind,
    series: Vec<SeriesInfo>,
}

/// Serializes the store to `path`.
///
/// The document is written next to the target and swapped in with a rename,
/// so a crash mid-write never leaves a truncated cache behind. Records are
/// emitted in id order; saving the same store twice produces identical bytes.
pub(crate) fn save_cache(
    path: &Path,
    provider: ProviderKind,
    series: &BTreeMap<i64, SeriesInfo>,
) -> Result<(), PersistError> {
    let document = CacheDocument {
        format_version: FORMAT_VERSION,
        provider,
        series: series.values().cloned().collect(),
    };
    let content = serde_json::to_string_pretty(&document)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PersistError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }

    let tmp_path = path.with_extension(format!("{}.tmp", Ulid::new()));
    fs::write(&tmp_path, content).map_err(|e| PersistError::WriteFailed {
        path: tmp_path.clone(),
        source: e,
    })?;
    fs::rename(&tmp_path, path).map_err(|e| PersistError::ReplaceFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

/// Reads a store previously written by [`save_cache`].
///
/// Returns `Ok(None)` when no file exists at `path`. A file that cannot be
/// read or decoded, or whose header names a different format version or
/// provider, is an error; callers decide whether that is fatal.
pub(crate) fn load_cache(
    path: &Path,
    expected: ProviderKind,
) -> Result<Option<BTreeMap<i64, SeriesInfo>>, PersistError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| PersistError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let document: CacheDocument =
        serde_json::from_str(&content).map_err(|e| PersistError::DeserializationFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    if document.format_version != FORMAT_VERSION {
        return Err(PersistError::VersionMismatch {
            path: path.to_path_buf(),
            found: document.format_version,
            expected: FORMAT_VERSION,
        });
    }
    if document.provider != expected {
        return Err(PersistError::ProviderMismatch {
            path: path.to_path_buf(),
            found: document.provider,
            expected,
        });
    }

    let mut series = BTreeMap::new();
    for record in document.series {
        series.insert(record.tvmaze_id, record);
    }
    Ok(Some(series))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{Banner, Episode, RecordState};
    use crate::specifier::UNSET_ID;

    fn temp_cache_path() -> PathBuf {
        std::env::temp_dir().join(format!("show_shelf_persist_test_{}.json", Ulid::new()))
    }

    fn sample_store() -> BTreeMap<i64, SeriesInfo> {
        let mut series = SeriesInfo::placeholder(UNSET_ID, 5, "Five Alive", None);
        series.state = RecordState::Loaded;
        series.dirty = false;
        series.srv_last_updated = 1234;
        series.overview = Some("A show about the number five.".to_string());
        series.add_or_update_episode(Episode {
            episode_id: 501,
            series_id: 5,
            season_number: 1,
            episode_number: 1,
            name: "Pilot".to_string(),
            overview: None,
            air_date: Some("2020-01-01".to_string()),
            runtime: Some(30),
            rating: Some(7.5),
        });
        series.add_or_update_banner(Banner {
            banner_id: 9000,
            series_id: 5,
            kind: "poster".to_string(),
            url: "https://example.invalid/9000.jpg".to_string(),
            main: true,
        });

        let placeholder = SeriesInfo::placeholder(7, 42, "Pending", Some("de".to_string()));

        let mut store = BTreeMap::new();
        store.insert(series.tvmaze_id, series);
        store.insert(placeholder.tvmaze_id, placeholder);
        store
    }

    #[test]
    fn save_then_load_round_trips_records() {
        let path = temp_cache_path();
        let store = sample_store();

        save_cache(&path, ProviderKind::TvMaze, &store).expect("cache written");
        let loaded = load_cache(&path, ProviderKind::TvMaze)
            .expect("cache readable")
            .expect("cache file present");

        assert_eq!(loaded.len(), 2);
        let series = &loaded[&5];
        assert_eq!(series.name, "Five Alive");
        assert_eq!(series.state, RecordState::Loaded);
        assert_eq!(series.srv_last_updated, 1234);
        assert_eq!(series.episode_count(), 1);
        assert_eq!(series.banners.len(), 1);
        assert!(series.banners[0].main);

        let placeholder = &loaded[&42];
        assert!(placeholder.is_placeholder());
        assert!(placeholder.dirty);
        assert_eq!(placeholder.tvdb_id, 7);
        assert_eq!(placeholder.custom_language.as_deref(), Some("de"));

        fs::remove_file(&path).expect("test file cleaned up");
    }

    #[test]
    fn saving_twice_produces_identical_bytes() {
        let path = temp_cache_path();
        let store = sample_store();

        save_cache(&path, ProviderKind::TvMaze, &store).expect("first save");
        let first = fs::read_to_string(&path).expect("first contents");
        save_cache(&path, ProviderKind::TvMaze, &store).expect("second save");
        let second = fs::read_to_string(&path).expect("second contents");

        assert_eq!(first, second);

        fs::remove_file(&path).expect("test file cleaned up");
    }

    #[test]
    fn saving_leaves_no_temp_files_behind() {
        let path = temp_cache_path();
        save_cache(&path, ProviderKind::TvMaze, &sample_store()).expect("cache written");

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .expect("stem is utf-8")
            .to_string();
        let leftovers: Vec<String> = fs::read_dir(path.parent().expect("parent dir"))
            .expect("temp dir listed")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(&stem) && name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "stray temp files: {leftovers:?}");

        fs::remove_file(&path).expect("test file cleaned up");
    }

    #[test]
    fn loading_a_missing_file_is_none() {
        let path = temp_cache_path();
        let loaded = load_cache(&path, ProviderKind::TvMaze).expect("missing file tolerated");
        assert!(loaded.is_none());
    }

    #[test]
    fn loading_rejects_a_different_provider() {
        let path = temp_cache_path();
        save_cache(&path, ProviderKind::TvMaze, &sample_store()).expect("cache written");

        let err = load_cache(&path, ProviderKind::TheTvdb).expect_err("provider must match");
        assert!(matches!(err, PersistError::ProviderMismatch { .. }));

        fs::remove_file(&path).expect("test file cleaned up");
    }

    #[test]
    fn loading_rejects_an_unknown_format_version() {
        let path = temp_cache_path();
        fs::write(
            &path,
            r#"{"format_version": 99, "provider": "tvmaze", "series": []}"#,
        )
        .expect("handcrafted file written");

        let err = load_cache(&path, ProviderKind::TvMaze).expect_err("version must match");
        assert!(matches!(
            err,
            PersistError::VersionMismatch { found: 99, .. }
        ));

        fs::remove_file(&path).expect("test file cleaned up");
    }

    #[test]
    fn loading_rejects_garbage() {
        let path = temp_cache_path();
        fs::write(&path, "not json at all").expect("garbage written");

        let err = load_cache(&path, ProviderKind::TvMaze).expect_err("garbage is an error");
        assert!(matches!(err, PersistError::DeserializationFailed { .. }));

        fs::remove_file(&path).expect("test file cleaned up");
    }
}
