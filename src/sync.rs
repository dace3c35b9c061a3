//! Reconciliation between the local store and a remote catalog.
//!
//! Three entry points: [`ensure_updated`] brings one series up to date,
//! [`get_updates`] walks the provider's change feed and flags stale cache
//! entries, and [`refresh_dirty`] re-fetches everything flagged. The
//! provider and cache are always passed in explicitly; progress is reported
//! through a callback so callers decide how to surface it. Batch
//! operations stop cooperatively at checkpoints via [`CancelFlag`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{error, warn};

use crate::cache::SeriesCache;
use crate::provider::{ProviderError, RemoteProvider};
use crate::specifier::{ProviderKind, SeriesSpecifier, UNSET_ID};

/// Cooperative cancellation handle.
///
/// Clones share one flag; any clone can request a stop and in-flight batch
/// operations give up at their next checkpoint. Cancellation between two
/// checkpoints never rolls back work already applied.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that in-flight operations stop at the next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress event emitted while syncing
///
/// These events allow callers to track what the reconciler is doing and
/// surface it however they like.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A series download started
    FetchingSeries { name: String },

    /// A freshly fetched series landed in the cache
    SeriesStored { tvmaze_id: i64, name: String },

    /// A series could not be brought up to date, but the batch continues
    SeriesFailed { name: String, message: String },

    /// The provider's change feed is being downloaded
    FetchingUpdateList,

    /// The change feed has been applied to the cache
    UpdatesApplied {
        marked_dirty: usize,
        total_rows: usize,
    },

    /// Stale entries have been re-fetched
    DirtyRefreshed { refreshed: usize, failed: usize },

    /// The operation stopped early at a cancellation checkpoint
    Cancelled,
}

/// How a batch operation ended when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Ran to the end of its work list
    Completed,
    /// Stopped early at a cancellation checkpoint
    Cancelled,
}

/// Errors reported by sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The specifier belongs to a different catalog than the provider serves
    #[error("series {name} belongs to provider {found}, but this cache syncs {expected}")]
    WrongProvider {
        name: String,
        found: ProviderKind,
        expected: ProviderKind,
    },

    /// The provider could not deliver series details
    #[error("provider failed for {name}: {source}")]
    Provider {
        name: String,
        #[source]
        source: ProviderError,
    },

    /// Downloading the change feed failed
    #[error("could not fetch the update list: {0}")]
    UpdateList(#[source] ProviderError),
}

/// Brings one series up to date in the cache.
///
/// A cached entry that is neither dirty nor force-marked is considered
/// fresh and skipped, unless `banners_too` asks for artwork, which always
/// re-fetches. A name-only specifier (unset id) is resolved by the
/// provider; the sentinel entry the placeholder pass may have left under
/// the unset id is retired once the canonical id is known.
///
/// With `banners_too` false, artwork is stripped from the fetched snapshot
/// before merging, leaving any previously cached artwork untouched.
///
/// A series the provider no longer knows, or answers with unusable data,
/// is logged and reported through the callback but returns `Ok`: one bad
/// series must not abort a batch. Transport failures are returned as
/// errors for the caller to decide.
///
/// # Examples
///
/// ```no_run
/// use show_shelf::{ensure_updated, ProviderKind, SeriesCache, SeriesSpecifier, TvMazeProvider};
///
/// let cache = SeriesCache::new(ProviderKind::TvMaze);
/// let provider = TvMazeProvider::new();
/// let spec = SeriesSpecifier::tvmaze(82, "Game of Thrones");
///
/// ensure_updated(&provider, &cache, &spec, false, |event| {
///     println!("{event:?}");
/// })
/// .unwrap();
/// ```
pub fn ensure_updated<P, F>(
    provider: &P,
    cache: &SeriesCache,
    spec: &SeriesSpecifier,
    banners_too: bool,
    mut progress: F,
) -> Result<(), SyncError>
where
    P: RemoteProvider,
    F: FnMut(SyncEvent),
{
    if spec.provider != provider.kind() {
        return Err(SyncError::WrongProvider {
            name: spec.name.clone(),
            found: spec.provider,
            expected: provider.kind(),
        });
    }

    let fresh_enough = !banners_too
        && !cache.needs_force_reload(spec.tvmaze_id)
        && cache.get(spec.tvmaze_id).is_some_and(|series| !series.dirty);
    if fresh_enough {
        return Ok(());
    }

    progress(SyncEvent::FetchingSeries {
        name: spec.name.clone(),
    });

    let mut fetched = match provider.fetch_series_details(spec) {
        Ok(fetched) => fetched,
        Err(err) if err.is_consistency() => {
            error!(series = %spec.name, error = %err, "series is unusable at the provider");
            progress(SyncEvent::SeriesFailed {
                name: spec.name.clone(),
                message: err.to_string(),
            });
            return Ok(());
        }
        Err(err) => {
            return Err(SyncError::Provider {
                name: spec.name.clone(),
                source: err,
            });
        }
    };

    if spec.tvmaze_id == UNSET_ID && fetched.tvmaze_id != UNSET_ID {
        // The record was resolved by name; whatever sat under the unset id
        // was a stand-in for exactly this series.
        cache.forget_show(UNSET_ID);
    }

    if fetched.tvdb_id == UNSET_ID {
        fetched.tvdb_id = spec.tvdb_id;
    }
    fetched.custom_language = spec.custom_language.clone();
    if !banners_too {
        fetched.banners.clear();
        fetched.banners_loaded = false;
    }

    let stored = cache.add_or_merge_series(fetched);
    progress(SyncEvent::SeriesStored {
        tvmaze_id: stored.tvmaze_id,
        name: stored.name,
    });
    Ok(())
}

/// Applies the provider's change feed to the cache.
///
/// Library specifiers with no cache entry yet get a dirty placeholder, so
/// the next refresh downloads them. Then one call fetches the feed of
/// (id, last-change time) rows, and every cached series the feed reports as
/// newer than what we hold is flagged dirty. No series details are fetched
/// here; [`refresh_dirty`] does that separately.
///
/// Cancellation is honored before any work, between specifiers, before the
/// feed download, and between rows. Flags applied before a cancellation
/// stick.
pub fn get_updates<P, F>(
    provider: &P,
    cache: &SeriesCache,
    library: &[SeriesSpecifier],
    cancel: &CancelFlag,
    mut progress: F,
) -> Result<SyncOutcome, SyncError>
where
    P: RemoteProvider,
    F: FnMut(SyncEvent),
{
    if cancel.is_cancelled() {
        progress(SyncEvent::Cancelled);
        return Ok(SyncOutcome::Cancelled);
    }

    for spec in library {
        if cancel.is_cancelled() {
            progress(SyncEvent::Cancelled);
            return Ok(SyncOutcome::Cancelled);
        }
        if spec.provider != provider.kind() {
            warn!(
                series = %spec.name,
                provider = %spec.provider,
                "skipping specifier for a different provider"
            );
            continue;
        }
        if !cache.has_series(spec.tvmaze_id) {
            cache.add_placeholder(spec);
        }
    }

    if cancel.is_cancelled() {
        progress(SyncEvent::Cancelled);
        return Ok(SyncOutcome::Cancelled);
    }

    progress(SyncEvent::FetchingUpdateList);
    let rows = provider.fetch_update_list().map_err(SyncError::UpdateList)?;
    let total_rows = rows.len();

    let mut marked_dirty = 0usize;
    for (raw_id, updated_at) in rows {
        if cancel.is_cancelled() {
            progress(SyncEvent::Cancelled);
            return Ok(SyncOutcome::Cancelled);
        }
        let Ok(series_id) = raw_id.parse::<i64>() else {
            warn!(raw = %raw_id, "skipping update row with unparsable id");
            continue;
        };
        if updated_at <= 0 {
            warn!(series_id, updated_at, "skipping update row with invalid time");
            continue;
        }
        if cache.mark_dirty_if_newer(series_id, updated_at) {
            marked_dirty += 1;
        }
    }

    progress(SyncEvent::UpdatesApplied {
        marked_dirty,
        total_rows,
    });
    Ok(SyncOutcome::Completed)
}

/// Re-fetches every cached series that is dirty or force-marked.
///
/// Failures are isolated per series: a failed download is logged and
/// reported, and the walk moves on. Cancellation is checked between
/// series; a series already re-fetched stays updated.
pub fn refresh_dirty<P, F>(
    provider: &P,
    cache: &SeriesCache,
    banners_too: bool,
    cancel: &CancelFlag,
    mut progress: F,
) -> Result<SyncOutcome, SyncError>
where
    P: RemoteProvider,
    F: FnMut(SyncEvent),
{
    let mut refreshed = 0usize;
    let mut failed = 0usize;

    for series in cache.snapshot() {
        if cancel.is_cancelled() {
            progress(SyncEvent::Cancelled);
            return Ok(SyncOutcome::Cancelled);
        }
        if !series.dirty && !cache.needs_force_reload(series.tvmaze_id) {
            continue;
        }

        let spec = series.to_specifier(provider.kind());
        match ensure_updated(provider, cache, &spec, banners_too, &mut progress) {
            Ok(()) => refreshed += 1,
            Err(err) => {
                warn!(
                    series_id = series.tvmaze_id,
                    error = %err,
                    "series refresh failed, continuing with the rest"
                );
                progress(SyncEvent::SeriesFailed {
                    name: spec.name,
                    message: err.to_string(),
                });
                failed += 1;
            }
        }
    }

    progress(SyncEvent::DirtyRefreshed { refreshed, failed });
    Ok(SyncOutcome::Completed)
}
