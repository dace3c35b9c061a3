//! In-memory series store with exclusive-access concurrency.
//!
//! All reads and writes go through one lock, so every operation observes a
//! consistent map. Reads hand out clones; mutations merge in place so a
//! cached record keeps its identity across updates. Saving serializes the
//! whole store to disk under the same lock.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::persist::{self, PersistError};
use crate::series::{Banner, Episode, SeriesInfo};
use crate::specifier::{ProviderKind, SeriesSpecifier, UNSET_ID};

/// Errors reported by cache store operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// An operation referenced a series the store does not hold
    #[error("series {series_id} is not in the cache ({context})")]
    UnknownSeries { series_id: i64, context: String },

    /// Reading or writing the cache file failed
    #[error(transparent)]
    Persist(#[from] PersistError),
}

struct Inner {
    series: BTreeMap<i64, SeriesInfo>,
    force_reload: HashSet<i64>,
}

/// Thread-safe store of cached series records, keyed by TVmaze id.
///
/// The store never talks to the network itself; the sync layer fetches and
/// feeds results back in through [`SeriesCache::add_or_merge_series`].
pub struct SeriesCache {
    inner: Mutex<Inner>,
    cache_file: Option<PathBuf>,
    provider: ProviderKind,
    load_ok: bool,
}

impl SeriesCache {
    /// Creates an empty store with no backing file. Saves become no-ops.
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            inner: Mutex::new(Inner {
                series: BTreeMap::new(),
                force_reload: HashSet::new(),
            }),
            cache_file: None,
            provider,
            load_ok: true,
        }
    }

    /// Opens a store that saves to `cache_file`, seeded from `load_from` if
    /// a readable cache file exists there.
    ///
    /// A missing file is a normal cold start. An unreadable or mismatched
    /// file is logged and treated as a cold start as well; [`Self::load_ok`]
    /// reports `false` so callers can surface the problem.
    pub fn setup(
        load_from: Option<&Path>,
        cache_file: impl Into<PathBuf>,
        provider: ProviderKind,
    ) -> Self {
        let mut series = BTreeMap::new();
        let mut load_ok = true;

        if let Some(path) = load_from {
            match persist::load_cache(path, provider) {
                Ok(Some(loaded)) => {
                    info!(
                        series = loaded.len(),
                        path = %path.display(),
                        "loaded series cache"
                    );
                    series = loaded;
                }
                Ok(None) => {
                    debug!(path = %path.display(), "no cache file yet, starting empty");
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "could not load series cache, starting empty"
                    );
                    load_ok = false;
                }
            }
        }

        Self {
            inner: Mutex::new(Inner {
                series,
                force_reload: HashSet::new(),
            }),
            cache_file: Some(cache_file.into()),
            provider,
            load_ok,
        }
    }

    /// Whether the last load attempt succeeded. A missing file counts as
    /// success; only an unreadable or mismatched file does not.
    pub fn load_ok(&self) -> bool {
        self.load_ok
    }

    /// The catalog this cache mirrors.
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Where saves are written, if a backing file is configured.
    pub fn cache_file(&self) -> Option<&Path> {
        self.cache_file.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock means another thread panicked mid-operation; the
        // map itself is still structurally sound, so keep serving.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the cached record, if present.
    pub fn get(&self, tvmaze_id: i64) -> Option<SeriesInfo> {
        self.lock().series.get(&tvmaze_id).cloned()
    }

    /// Whether a record for this id exists, placeholder or loaded.
    pub fn has_series(&self, tvmaze_id: i64) -> bool {
        self.lock().series.contains_key(&tvmaze_id)
    }

    pub fn series_count(&self) -> usize {
        self.lock().series.len()
    }

    /// Copies of every cached record, ordered by id.
    pub fn snapshot(&self) -> Vec<SeriesInfo> {
        self.lock().series.values().cloned().collect()
    }

    /// Inserts a record, or merges it into the existing record for the same
    /// id. Returns a copy of the stored result.
    ///
    /// A pending force-reload marker for the id is consumed here, since the
    /// arrival of fresh data is exactly what the marker was waiting for.
    pub fn add_or_merge_series(&self, incoming: SeriesInfo) -> SeriesInfo {
        let mut inner = self.lock();
        let id = incoming.tvmaze_id;
        inner.force_reload.remove(&id);

        let slot = inner
            .series
            .entry(id)
            .or_insert_with(|| SeriesInfo::placeholder(UNSET_ID, id, "", None));
        slot.merge(incoming);
        debug!(series_id = id, name = %slot.name, "stored series record");
        slot.clone()
    }

    /// Registers intent to cache a series without fetching anything yet.
    /// Overwrites whatever record is present for the id.
    pub fn add_placeholder(&self, spec: &SeriesSpecifier) {
        let placeholder = SeriesInfo::placeholder(
            spec.tvdb_id,
            spec.tvmaze_id,
            spec.name.clone(),
            spec.custom_language.clone(),
        );
        self.lock().series.insert(spec.tvmaze_id, placeholder);
    }

    /// Drops the record for this id, if any. Nothing is scheduled in its
    /// place.
    pub fn forget_show(&self, tvmaze_id: i64) {
        let mut inner = self.lock();
        if inner.series.remove(&tvmaze_id).is_some() {
            debug!(series_id = tvmaze_id, "forgot series");
        }
        inner.force_reload.remove(&tvmaze_id);
    }

    /// Drops the cached data for a series while keeping it scheduled for a
    /// fresh download.
    ///
    /// If a record was present it is replaced by a dirty placeholder that
    /// keeps the old display name, and the id is force-marked so the next
    /// sync bypasses freshness checks. If nothing was cached and the
    /// specifier has a usable id, an empty-named placeholder is recorded
    /// without a force marker.
    pub fn forget_show_for_refresh(&self, spec: &SeriesSpecifier) {
        let mut inner = self.lock();
        let id = spec.tvmaze_id;
        match inner.series.remove(&id) {
            Some(old) => {
                let placeholder = SeriesInfo::placeholder(
                    spec.tvdb_id,
                    id,
                    old.name,
                    spec.custom_language.clone(),
                );
                inner.series.insert(id, placeholder);
                inner.force_reload.insert(id);
                debug!(series_id = id, "reset series for refresh");
            }
            None if id > 0 => {
                let placeholder =
                    SeriesInfo::placeholder(spec.tvdb_id, id, "", spec.custom_language.clone());
                inner.series.insert(id, placeholder);
            }
            None => {}
        }
    }

    /// Clears the whole store and persists the empty state.
    pub fn forget_everything(&self) -> Result<(), CacheError> {
        {
            let mut inner = self.lock();
            inner.series.clear();
            inner.force_reload.clear();
        }
        info!("forgot all cached series");
        self.save()
    }

    /// Attaches an episode to its owning series.
    ///
    /// The owning series must already be cached; otherwise the store is left
    /// untouched and an error names the missing id.
    pub fn add_or_update_episode(&self, episode: Episode) -> Result<(), CacheError> {
        let mut inner = self.lock();
        let series_id = episode.series_id;
        match inner.series.get_mut(&series_id) {
            Some(series) => {
                series.add_or_update_episode(episode);
                Ok(())
            }
            None => Err(CacheError::UnknownSeries {
                series_id,
                context: format!("episode {}", episode.episode_id),
            }),
        }
    }

    /// Attaches a batch of artwork records and marks artwork as loaded for
    /// `series_id`.
    ///
    /// Every banner must reference a cached series. The batch is validated
    /// before anything is applied, so a bad reference leaves the store
    /// exactly as it was.
    pub fn add_banners(&self, series_id: i64, banners: Vec<Banner>) -> Result<(), CacheError> {
        let mut inner = self.lock();

        if !inner.series.contains_key(&series_id) {
            return Err(CacheError::UnknownSeries {
                series_id,
                context: "banner batch".to_string(),
            });
        }
        if let Some(bad) = banners
            .iter()
            .find(|banner| !inner.series.contains_key(&banner.series_id))
        {
            return Err(CacheError::UnknownSeries {
                series_id: bad.series_id,
                context: format!("banner {}", bad.banner_id),
            });
        }

        for banner in banners {
            if let Some(series) = inner.series.get_mut(&banner.series_id) {
                series.add_or_update_banner(banner);
            }
        }
        if let Some(series) = inner.series.get_mut(&series_id) {
            series.banners_loaded = true;
        }
        Ok(())
    }

    /// Prunes every record whose id is not in `keep`, then persists.
    pub fn tidy(&self, keep: impl IntoIterator<Item = i64>) -> Result<(), CacheError> {
        let keep: HashSet<i64> = keep.into_iter().collect();
        {
            let mut inner = self.lock();
            let before = inner.series.len();
            inner.series.retain(|id, _| keep.contains(id));
            inner.force_reload.retain(|id| keep.contains(id));
            let removed = before - inner.series.len();
            if removed > 0 {
                info!(removed, "tidied series cache");
            }
        }
        self.save()
    }

    /// Flags a cached record as stale when the server reports a change newer
    /// than what we hold. Unknown ids are ignored.
    ///
    /// Returns whether the record was marked.
    pub fn mark_dirty_if_newer(&self, tvmaze_id: i64, server_time: i64) -> bool {
        let mut inner = self.lock();
        match inner.series.get_mut(&tvmaze_id) {
            Some(series) if series.srv_last_updated < server_time => {
                series.dirty = true;
                true
            }
            _ => false,
        }
    }

    /// Whether the next sync must fetch this series regardless of how fresh
    /// the cached record looks. True when the id is force-marked or not
    /// cached at all.
    pub fn needs_force_reload(&self, tvmaze_id: i64) -> bool {
        let inner = self.lock();
        inner.force_reload.contains(&tvmaze_id) || !inner.series.contains_key(&tvmaze_id)
    }

    /// Writes the store to the configured cache file. A store without a
    /// backing file skips the write.
    pub fn save(&self) -> Result<(), CacheError> {
        let Some(path) = &self.cache_file else {
            debug!("no cache file configured, skipping save");
            return Ok(());
        };
        let inner = self.lock();
        persist::save_cache(path, self.provider, &inner.series)?;
        info!(
            series = inner.series.len(),
            path = %path.display(),
            "saved series cache"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::RecordState;

    fn loaded_series(id: i64, name: &str) -> SeriesInfo {
        let mut series = SeriesInfo::placeholder(UNSET_ID, id, name, None);
        series.state = RecordState::Loaded;
        series.dirty = false;
        series.srv_last_updated = 500;
        series
    }

    fn episode(series_id: i64, episode_id: i64) -> Episode {
        Episode {
            episode_id,
            series_id,
            season_number: 1,
            episode_number: 1,
            name: "Pilot".to_string(),
            overview: None,
            air_date: None,
            runtime: None,
            rating: None,
        }
    }

    fn banner(series_id: i64, banner_id: i64) -> Banner {
        Banner {
            banner_id,
            series_id,
            kind: "poster".to_string(),
            url: format!("https://example.invalid/{banner_id}.jpg"),
            main: false,
        }
    }

    #[test]
    fn get_hands_out_independent_copies() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        cache.add_or_merge_series(loaded_series(1, "Archive"));

        let mut copy = cache.get(1).expect("series cached");
        copy.name = "Scribbled over".to_string();

        assert_eq!(cache.get(1).expect("still cached").name, "Archive");
        assert!(cache.has_series(1));
        assert!(!cache.has_series(2));
    }

    #[test]
    fn add_or_merge_is_idempotent() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        let first = cache.add_or_merge_series(loaded_series(1, "Archive"));
        let second = cache.add_or_merge_series(loaded_series(1, "Archive"));

        assert_eq!(cache.series_count(), 1);
        assert_eq!(first.name, second.name);
        assert_eq!(first.srv_last_updated, second.srv_last_updated);
        assert_eq!(first.state, second.state);
    }

    #[test]
    fn add_or_merge_upgrades_placeholder_in_place() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        let spec = SeriesSpecifier::tvmaze(42, "Show").with_tvdb_id(7);
        cache.add_placeholder(&spec);

        let stored = cache.add_or_merge_series(loaded_series(42, "Show"));
        assert_eq!(stored.state, RecordState::Loaded);
        assert!(!stored.dirty);
        assert_eq!(stored.tvdb_id, 7);
        assert_eq!(cache.series_count(), 1);
    }

    #[test]
    fn placeholder_overwrites_existing_record() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        cache.add_or_merge_series(loaded_series(42, "Show"));

        cache.add_placeholder(&SeriesSpecifier::tvmaze(42, "Show"));
        let stored = cache.get(42).expect("placeholder cached");
        assert!(stored.is_placeholder());
        assert!(stored.dirty);
    }

    #[test]
    fn episode_update_for_unknown_series_changes_nothing() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);

        let err = cache
            .add_or_update_episode(episode(9, 901))
            .expect_err("series 9 is not cached");
        assert!(matches!(err, CacheError::UnknownSeries { series_id: 9, .. }));
        assert_eq!(cache.series_count(), 0);
    }

    #[test]
    fn banner_batch_with_unknown_reference_changes_nothing() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        cache.add_or_merge_series(loaded_series(1, "Archive"));

        let err = cache
            .add_banners(1, vec![banner(1, 10), banner(2, 11)])
            .expect_err("series 2 is not cached");
        assert!(matches!(err, CacheError::UnknownSeries { series_id: 2, .. }));

        let stored = cache.get(1).expect("series cached");
        assert!(stored.banners.is_empty());
        assert!(!stored.banners_loaded);
    }

    #[test]
    fn banner_batch_marks_artwork_loaded() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        cache.add_or_merge_series(loaded_series(1, "Archive"));

        cache
            .add_banners(1, vec![banner(1, 10), banner(1, 11)])
            .expect("both banners reference series 1");

        let stored = cache.get(1).expect("series cached");
        assert_eq!(stored.banners.len(), 2);
        assert!(stored.banners_loaded);
    }

    #[test]
    fn unknown_banner_batch_target_is_rejected() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);

        let err = cache
            .add_banners(5, Vec::new())
            .expect_err("series 5 is not cached");
        assert!(matches!(err, CacheError::UnknownSeries { series_id: 5, .. }));
    }

    #[test]
    fn forget_show_for_refresh_keeps_name_and_marks_for_reload() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        cache.add_or_merge_series(loaded_series(42, "Show"));

        let spec = SeriesSpecifier::tvmaze(42, "Renamed Elsewhere").with_tvdb_id(7);
        cache.forget_show_for_refresh(&spec);

        let stored = cache.get(42).expect("placeholder cached");
        assert!(stored.is_placeholder());
        assert!(stored.dirty);
        assert_eq!(stored.name, "Show");
        assert_eq!(stored.tvdb_id, 7);
        assert!(cache.needs_force_reload(42));

        cache.add_or_merge_series(loaded_series(42, "Show"));
        assert!(!cache.needs_force_reload(42));
    }

    #[test]
    fn forget_show_for_refresh_of_uncached_id_schedules_unnamed_placeholder() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);

        let spec = SeriesSpecifier::tvmaze(42, "Show").with_tvdb_id(7);
        cache.forget_show_for_refresh(&spec);

        let stored = cache.get(42).expect("placeholder cached");
        assert!(stored.is_placeholder());
        assert_eq!(stored.name, "");
        assert_eq!(stored.tvdb_id, 7);
        // Present and not force-marked: the dirty flag alone schedules it.
        assert!(!cache.needs_force_reload(42));
        assert!(stored.dirty);
    }

    #[test]
    fn forget_show_for_refresh_without_id_is_a_no_op() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        cache.forget_show_for_refresh(&SeriesSpecifier::tvmaze_by_name("Show"));
        assert_eq!(cache.series_count(), 0);
    }

    #[test]
    fn forget_show_drops_record_without_replacement() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        cache.add_or_merge_series(loaded_series(42, "Show"));

        cache.forget_show(42);
        assert!(!cache.has_series(42));
        assert_eq!(cache.series_count(), 0);
    }

    #[test]
    fn tidy_keeps_exactly_the_requested_ids() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        cache.add_or_merge_series(loaded_series(1, "One"));
        cache.add_or_merge_series(loaded_series(2, "Two"));
        cache.add_or_merge_series(loaded_series(3, "Three"));

        cache.tidy([1, 3]).expect("tidy without a file succeeds");

        assert!(cache.has_series(1));
        assert!(!cache.has_series(2));
        assert!(cache.has_series(3));
    }

    #[test]
    fn mark_dirty_respects_server_time() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        cache.add_or_merge_series(loaded_series(100, "Tracked"));

        assert!(!cache.mark_dirty_if_newer(100, 400));
        assert!(!cache.mark_dirty_if_newer(100, 500));
        assert!(!cache.get(100).expect("cached").dirty);

        assert!(cache.mark_dirty_if_newer(100, 600));
        assert!(cache.get(100).expect("cached").dirty);
    }

    #[test]
    fn mark_dirty_ignores_unknown_ids() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        assert!(!cache.mark_dirty_if_newer(999, 600));
        assert_eq!(cache.series_count(), 0);
    }

    #[test]
    fn forget_everything_empties_the_store() {
        let cache = SeriesCache::new(ProviderKind::TvMaze);
        cache.add_or_merge_series(loaded_series(1, "One"));
        cache.add_or_merge_series(loaded_series(2, "Two"));

        cache.forget_everything().expect("no file configured");
        assert_eq!(cache.series_count(), 0);
    }

    #[test]
    fn setup_round_trips_through_the_cache_file() {
        let path = std::env::temp_dir().join(format!(
            "show_shelf_cache_test_{}.json",
            ulid::Ulid::new()
        ));

        let cache = SeriesCache::setup(Some(&path), &path, ProviderKind::TvMaze);
        assert!(cache.load_ok());
        assert_eq!(cache.series_count(), 0);

        cache.add_or_merge_series(loaded_series(5, "Five"));
        cache.add_placeholder(&SeriesSpecifier::tvmaze(42, "Pending").with_tvdb_id(7));
        cache.save().expect("cache file written");

        let reloaded = SeriesCache::setup(Some(&path), &path, ProviderKind::TvMaze);
        assert!(reloaded.load_ok());
        assert_eq!(reloaded.series_count(), 2);
        assert_eq!(reloaded.get(5).expect("loaded record").name, "Five");
        let pending = reloaded.get(42).expect("placeholder record");
        assert!(pending.is_placeholder());
        assert!(pending.dirty);

        std::fs::remove_file(&path).expect("test file cleaned up");
    }

    #[test]
    fn setup_with_unreadable_file_starts_cold() {
        let path = std::env::temp_dir().join(format!(
            "show_shelf_cache_test_{}.json",
            ulid::Ulid::new()
        ));
        std::fs::write(&path, "definitely not a cache document").expect("garbage written");

        let cache = SeriesCache::setup(Some(&path), &path, ProviderKind::TvMaze);
        assert!(!cache.load_ok());
        assert_eq!(cache.series_count(), 0);

        std::fs::remove_file(&path).expect("test file cleaned up");
    }
}
