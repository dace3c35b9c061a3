//! Provider identifiers and series specifiers
//!
//! A specifier names a series as seen by a remote catalog provider before any
//! metadata has been fetched for it: which provider, which remote id (possibly
//! still unknown), and the display name to resolve with.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel value for a provider id that has not been assigned yet.
///
/// A specifier carrying this value for its primary id is resolved by name
/// first; the provider then reports the canonical id.
pub const UNSET_ID: i64 = -1;

/// Remote catalog providers a series can be resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// The TVmaze catalog (<https://www.tvmaze.com>)
    TvMaze,
    /// TheTVDB catalog
    TheTvdb,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::TvMaze => write!(f, "tvmaze"),
            ProviderKind::TheTvdb => write!(f, "thetvdb"),
        }
    }
}

/// A request descriptor naming which provider and which remote series to
/// resolve.
///
/// Both ids use [`UNSET_ID`] when unknown. `tvmaze_id` is the primary key of
/// the TVmaze-backed cache; `tvdb_id` is carried along as a cross-provider
/// reference so a placeholder can keep it through forget/re-add cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSpecifier {
    /// Which provider the ids below belong to
    pub provider: ProviderKind,
    /// TVmaze series id ([`UNSET_ID`] if not yet known)
    pub tvmaze_id: i64,
    /// TheTVDB series id ([`UNSET_ID`] if not yet known)
    pub tvdb_id: i64,
    /// Display name, also used for name-based resolution when the id is unset
    pub name: String,
    /// Optional language override for metadata requests
    pub custom_language: Option<String>,
}

impl SeriesSpecifier {
    /// Creates a specifier for a series with a known TVmaze id.
    pub fn tvmaze(tvmaze_id: i64, name: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::TvMaze,
            tvmaze_id,
            tvdb_id: UNSET_ID,
            name: name.into(),
            custom_language: None,
        }
    }

    /// Creates a TVmaze specifier that only knows the series name.
    ///
    /// The id stays [`UNSET_ID`] until a fetch resolves the canonical id.
    pub fn tvmaze_by_name(name: impl Into<String>) -> Self {
        Self::tvmaze(UNSET_ID, name)
    }

    /// Attaches the cross-provider TheTVDB id.
    pub fn with_tvdb_id(mut self, tvdb_id: i64) -> Self {
        self.tvdb_id = tvdb_id;
        self
    }

    /// Attaches a language override.
    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.custom_language = Some(code.into());
        self
    }

    /// Whether the primary id is still the unset sentinel.
    pub fn id_unset(&self) -> bool {
        self.tvmaze_id == UNSET_ID
    }
}

impl fmt::Display for SeriesSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id_unset() {
            write!(f, "'{}' ({}, id pending)", self.name, self.provider)
        } else {
            write!(f, "'{}' ({} {})", self.name, self.provider, self.tvmaze_id)
        }
    }
}
