//! Series, season and episode metadata entities
//!
//! The in-memory model mirrored from a remote catalog. A series owns its
//! seasons and each season its episodes (keyed by episode id); artwork
//! hangs off the series. Entries are mutated in place by merge operations so
//! the cache never swaps an entry out wholesale; callers holding a series id
//! keep referring to the same logical entry across merges.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::specifier::{ProviderKind, SeriesSpecifier, UNSET_ID};

/// Whether a cache entry holds fetched metadata or only stands in for it.
///
/// A placeholder is inserted when a series is referenced before its metadata
/// has been fetched. The tag makes a legitimately empty loaded series
/// distinguishable from a stub that was never fetched at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    /// Minimal stub carrying identity only; always starts out dirty
    Placeholder,
    /// Populated from a remote fetch (possibly stale since, see `dirty`)
    Loaded,
}

/// A single episode of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Provider-assigned episode id
    pub episode_id: i64,
    /// Id of the owning series; a back-reference, not ownership
    pub series_id: i64,
    pub season_number: u32,
    pub episode_number: u32,
    pub name: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub rating: Option<f64>,
}

/// One season of a series, with episodes keyed by episode id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub number: u32,
    #[serde(default)]
    pub episodes: BTreeMap<i64, Episode>,
}

impl Season {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            episodes: BTreeMap::new(),
        }
    }
}

/// A piece of series artwork (poster, background, banner strip).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    /// Provider-assigned image id
    pub banner_id: i64,
    /// Id of the series this artwork belongs to
    pub series_id: i64,
    /// Artwork category as reported by the provider ("poster", "background", ...)
    pub kind: String,
    pub url: String,
    /// Marked by the provider as the primary image of its category
    #[serde(default)]
    pub main: bool,
}

/// Cached metadata for one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInfo {
    /// Primary cache key (TVmaze id)
    pub tvmaze_id: i64,
    /// Cross-provider TheTVDB id, [`UNSET_ID`] when unknown
    pub tvdb_id: i64,
    pub name: String,
    #[serde(default)]
    pub custom_language: Option<String>,
    pub state: RecordState,
    /// Cached data is known or suspected stale; refetch before relying on it
    pub dirty: bool,
    #[serde(default)]
    pub banners_loaded: bool,
    /// Provider-side last-modification time (unix seconds, 0 = never seen)
    #[serde(default)]
    pub srv_last_updated: i64,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub premiered: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub seasons: BTreeMap<u32, Season>,
    #[serde(default)]
    pub banners: Vec<Banner>,
}

impl SeriesInfo {
    /// Creates a minimal placeholder standing in for a series whose metadata
    /// has not been fetched yet.
    pub fn placeholder(
        tvdb_id: i64,
        tvmaze_id: i64,
        name: impl Into<String>,
        custom_language: Option<String>,
    ) -> Self {
        Self {
            tvmaze_id,
            tvdb_id,
            name: name.into(),
            custom_language,
            state: RecordState::Placeholder,
            dirty: true,
            banners_loaded: false,
            srv_last_updated: 0,
            network: None,
            overview: None,
            status: None,
            rating: None,
            runtime: None,
            premiered: None,
            url: None,
            seasons: BTreeMap::new(),
            banners: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.state == RecordState::Placeholder
    }

    /// Merges an incoming snapshot into this entry in place.
    ///
    /// Scalar fields are overwritten by incoming values that are actually
    /// set (`Some`, non-empty name, positive id); the provider-side update
    /// time keeps the newer of the two. Children merge additively, episodes
    /// keyed by episode id and artwork by banner id, so a merge never
    /// deletes a child. Merging a loaded snapshot marks this entry loaded
    /// and adopts the snapshot's dirty flag; merging a placeholder never
    /// downgrades a loaded entry.
    pub fn merge(&mut self, incoming: SeriesInfo) {
        if incoming.tvdb_id > 0 {
            self.tvdb_id = incoming.tvdb_id;
        }
        if !incoming.name.is_empty() {
            self.name = incoming.name;
        }
        replace_if_some(&mut self.custom_language, incoming.custom_language);
        replace_if_some(&mut self.network, incoming.network);
        replace_if_some(&mut self.overview, incoming.overview);
        replace_if_some(&mut self.status, incoming.status);
        replace_if_some(&mut self.rating, incoming.rating);
        replace_if_some(&mut self.runtime, incoming.runtime);
        replace_if_some(&mut self.premiered, incoming.premiered);
        replace_if_some(&mut self.url, incoming.url);
        self.srv_last_updated = self.srv_last_updated.max(incoming.srv_last_updated);

        for (_, season) in incoming.seasons {
            for (_, episode) in season.episodes {
                self.add_or_update_episode(episode);
            }
        }
        for banner in incoming.banners {
            self.add_or_update_banner(banner);
        }
        self.banners_loaded |= incoming.banners_loaded;

        if incoming.state == RecordState::Loaded {
            self.state = RecordState::Loaded;
            self.dirty = incoming.dirty;
        }
    }

    /// Inserts or replaces an episode, keyed by its episode id.
    ///
    /// An episode that moved seasons between fetches is removed from its old
    /// season first, so the id stays unique across the whole series.
    pub fn add_or_update_episode(&mut self, episode: Episode) {
        for season in self.seasons.values_mut() {
            if season.number != episode.season_number {
                season.episodes.remove(&episode.episode_id);
            }
        }
        self.seasons.retain(|_, s| !s.episodes.is_empty() || s.number == episode.season_number);

        self.seasons
            .entry(episode.season_number)
            .or_insert_with(|| Season::new(episode.season_number))
            .episodes
            .insert(episode.episode_id, episode);
    }

    /// Inserts or replaces a piece of artwork, keyed by its banner id.
    pub fn add_or_update_banner(&mut self, banner: Banner) {
        match self.banners.iter_mut().find(|b| b.banner_id == banner.banner_id) {
            Some(existing) => *existing = banner,
            None => self.banners.push(banner),
        }
    }

    /// Builds the specifier that names this record at `provider`.
    pub fn to_specifier(&self, provider: ProviderKind) -> SeriesSpecifier {
        SeriesSpecifier {
            provider,
            tvmaze_id: self.tvmaze_id,
            tvdb_id: self.tvdb_id,
            name: self.name.clone(),
            custom_language: self.custom_language.clone(),
        }
    }

    /// Looks up an episode anywhere in the series by its id.
    pub fn episode(&self, episode_id: i64) -> Option<&Episode> {
        self.seasons
            .values()
            .find_map(|s| s.episodes.get(&episode_id))
    }

    pub fn episode_count(&self) -> usize {
        self.seasons.values().map(|s| s.episodes.len()).sum()
    }
}

fn replace_if_some<T>(target: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *target = incoming;
    }
}
