//! Data structures matching the TVmaze API response format.

use serde::Deserialize;

/// Show record as returned by `/shows/{id}` and `/singlesearch/shows`,
/// with episodes and images embedded.
#[derive(Debug, Deserialize)]
pub(super) struct TvMazeShow {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    pub status: Option<String>,
    pub runtime: Option<u32>,
    pub premiered: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub updated: Option<i64>,
    pub rating: Option<TvMazeRating>,
    pub network: Option<TvMazeNetwork>,
    #[serde(rename = "webChannel")]
    pub web_channel: Option<TvMazeNetwork>,
    pub externals: Option<TvMazeExternals>,
    #[serde(rename = "_embedded")]
    pub embedded: Option<TvMazeEmbedded>,
}

/// Aggregate rating. TVmaze reports `null` for unrated shows and episodes.
#[derive(Debug, Deserialize)]
pub(super) struct TvMazeRating {
    pub average: Option<f64>,
}

/// Broadcast network or streaming channel. Only the name is of interest.
#[derive(Debug, Deserialize)]
pub(super) struct TvMazeNetwork {
    pub name: String,
}

/// Cross-references to other catalogs.
#[derive(Debug, Deserialize)]
pub(super) struct TvMazeExternals {
    pub thetvdb: Option<i64>,
}

/// Container for the `?embed[]=` payloads.
#[derive(Debug, Deserialize)]
pub(super) struct TvMazeEmbedded {
    pub episodes: Option<Vec<TvMazeEpisode>>,
    pub images: Option<Vec<TvMazeImage>>,
}

/// Episode data as returned by the TVmaze API.
///
/// Specials carry `number: null`; regular episodes always have one.
#[derive(Debug, Deserialize)]
pub(super) struct TvMazeEpisode {
    pub id: i64,
    pub name: Option<String>,
    pub season: u32,
    pub number: Option<u32>,
    pub airdate: Option<String>,
    pub runtime: Option<u32>,
    pub rating: Option<TvMazeRating>,
    pub summary: Option<String>,
}

/// Artwork record from the images embed.
#[derive(Debug, Deserialize)]
pub(super) struct TvMazeImage {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub main: bool,
    pub resolutions: Option<TvMazeResolutions>,
}

/// Available renditions of one artwork record.
#[derive(Debug, Deserialize)]
pub(super) struct TvMazeResolutions {
    pub original: Option<TvMazeResolution>,
    pub medium: Option<TvMazeResolution>,
}

/// One concrete rendition.
#[derive(Debug, Deserialize)]
pub(super) struct TvMazeResolution {
    pub url: String,
}
