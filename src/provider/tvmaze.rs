//! TVmaze API client.

use std::collections::BTreeMap;

use nanohtml2text::html2text;

use super::tvmaze_types::{TvMazeEpisode, TvMazeImage, TvMazeShow};
use super::{ProviderError, RemoteProvider};
use crate::series::{Banner, Episode, RecordState, SeriesInfo};
use crate::specifier::{ProviderKind, SeriesSpecifier, UNSET_ID};

/// Base URL for the TVmaze API.
const TVMAZE_API_URL: &str = "https://api.tvmaze.com";

/// Base URL for TVmaze's static image hosting.
const TVMAZE_STATIC_URL: &str = "https://static.tvmaze.com";

/// Client for the TVmaze REST API.
///
/// All requests are blocking; construction is cheap and never touches the
/// network.
pub struct TvMazeProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl TvMazeProvider {
    pub fn new() -> Self {
        Self::with_base_url(TVMAZE_API_URL)
    }

    /// Points the client at a different host, e.g. a local test server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Performs a GET request and decodes the JSON body.
    ///
    /// When `not_found` names a subject, a 404 becomes `SeriesNotFound` for
    /// it; otherwise any non-success status is a request failure.
    fn fetch_json<T>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        not_found: Option<&str>,
    ) -> Result<T, ProviderError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            if let Some(subject) = not_found {
                return Err(ProviderError::SeriesNotFound(subject.to_string()));
            }
        }
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!(
                "HTTP {} for {url}",
                response.status()
            )));
        }

        response
            .json()
            .map_err(|err| ProviderError::Parse(err.to_string()))
    }

    /// Converts a TVmaze show payload into a loaded cache record.
    fn convert_show(&self, show: TvMazeShow) -> SeriesInfo {
        let series_id = show.id;
        let (episodes, images) = match show.embedded {
            Some(embedded) => (embedded.episodes, embedded.images),
            None => (None, None),
        };

        let mut series = SeriesInfo {
            tvmaze_id: series_id,
            tvdb_id: show
                .externals
                .and_then(|ext| ext.thetvdb)
                .unwrap_or(UNSET_ID),
            name: show.name,
            custom_language: None,
            state: RecordState::Loaded,
            dirty: false,
            banners_loaded: images.is_some(),
            srv_last_updated: show.updated.unwrap_or(0),
            network: show.network.or(show.web_channel).map(|n| n.name),
            overview: show
                .summary
                .map(|html| html2text(&html).trim().to_string())
                .filter(|text| !text.is_empty()),
            status: show.status,
            rating: show.rating.and_then(|r| r.average),
            runtime: show.runtime,
            premiered: show.premiered,
            url: show.url,
            seasons: BTreeMap::new(),
            banners: Vec::new(),
        };

        for episode in episodes.into_iter().flatten() {
            series.add_or_update_episode(convert_episode(series_id, episode));
        }
        for image in images.into_iter().flatten() {
            let banner = self.convert_image(series_id, image);
            series.add_or_update_banner(banner);
        }
        series
    }

    fn convert_image(&self, series_id: i64, image: TvMazeImage) -> Banner {
        let url = image
            .resolutions
            .and_then(|res| res.original.or(res.medium))
            .map(|rendition| rendition.url)
            .unwrap_or_else(|| self.image_url(image.id));
        Banner {
            banner_id: image.id,
            series_id,
            kind: image.kind.unwrap_or_else(|| "unknown".to_string()),
            url,
            main: image.main,
        }
    }
}

fn convert_episode(series_id: i64, episode: TvMazeEpisode) -> Episode {
    Episode {
        episode_id: episode.id,
        series_id,
        season_number: episode.season,
        // Specials come back without a number; slot them in as episode 0.
        episode_number: episode.number.unwrap_or(0),
        name: episode.name.unwrap_or_else(|| "TBA".to_string()),
        overview: episode
            .summary
            .map(|html| html2text(&html).trim().to_string())
            .filter(|text| !text.is_empty()),
        air_date: episode.airdate,
        runtime: episode.runtime,
        rating: episode.rating.and_then(|r| r.average),
    }
}

impl RemoteProvider for TvMazeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::TvMaze
    }

    fn fetch_series_details(
        &self,
        spec: &SeriesSpecifier,
    ) -> Result<SeriesInfo, ProviderError> {
        let show: TvMazeShow = if spec.tvmaze_id > 0 {
            let url = format!("{}/shows/{}", self.base_url, spec.tvmaze_id);
            self.fetch_json(
                &url,
                &[("embed[]", "episodes"), ("embed[]", "images")],
                Some(&format!("tvmaze id {}", spec.tvmaze_id)),
            )?
        } else {
            // No usable id yet, resolve by name. The canonical id assigned
            // by TVmaze comes back on the record.
            let url = format!("{}/singlesearch/shows", self.base_url);
            self.fetch_json(
                &url,
                &[
                    ("q", spec.name.as_str()),
                    ("embed[]", "episodes"),
                    ("embed[]", "images"),
                ],
                Some(&spec.name),
            )?
        };
        Ok(self.convert_show(show))
    }

    fn fetch_update_list(&self) -> Result<Vec<(String, i64)>, ProviderError> {
        let url = format!("{}/updates/shows", self.base_url);
        let updates: BTreeMap<String, i64> = self.fetch_json(&url, &[], None)?;
        Ok(updates.into_iter().collect())
    }

    fn image_url(&self, image_id: i64) -> String {
        format!(
            "{}/uploads/images/original_untouched/{}/{}.jpg",
            TVMAZE_STATIC_URL,
            image_id / 1000,
            image_id
        )
    }
}
