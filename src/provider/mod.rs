//! Remote catalog provider abstraction
//!
//! This module defines the trait the sync layer uses to talk to a remote
//! catalog (series details, incremental update lists, image addressing),
//! plus the TVmaze implementation. The cache core never constructs a
//! provider itself; one is injected by the caller.

mod tvmaze;
mod tvmaze_types;

pub use tvmaze::TvMazeProvider;

use thiserror::Error;

use crate::series::SeriesInfo;
use crate::specifier::{ProviderKind, SeriesSpecifier};

/// Errors that can occur while talking to a remote catalog provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request to the provider failed (network fault, timeout, bad status)
    #[error("request failed: {0}")]
    Request(String),

    /// Failed to parse the provider's response
    #[error("failed to parse provider response: {0}")]
    Parse(String),

    /// The requested series does not exist at the provider
    #[error("series not found: {0}")]
    SeriesNotFound(String),

    /// The provider answered, but with structurally unusable data
    #[error("provider returned invalid data: {0}")]
    InvalidData(String),
}

impl ProviderError {
    /// Whether this error describes a data problem rather than a transport
    /// fault.
    ///
    /// Data problems (a series that does not exist, an unusable payload)
    /// will not go away on retry; the sync layer logs them and reports the
    /// affected series as handled instead of failing a whole batch.
    pub fn is_consistency(&self) -> bool {
        matches!(
            self,
            ProviderError::SeriesNotFound(_) | ProviderError::InvalidData(_)
        )
    }
}

/// A remote catalog that a local series cache mirrors.
///
/// Implementations block the calling thread for the duration of network I/O;
/// callers must not invoke them while holding the cache lock.
pub trait RemoteProvider {
    /// The catalog this adapter talks to. Specifiers for a different
    /// provider are rejected by the sync layer before any request is made.
    fn kind(&self) -> ProviderKind;

    /// Fetches full metadata for one series: descriptive fields, all
    /// episodes, and artwork.
    ///
    /// A specifier whose primary id is unset is resolved by name; the
    /// returned entry carries the canonical id the provider assigned.
    fn fetch_series_details(&self, spec: &SeriesSpecifier)
    -> Result<SeriesInfo, ProviderError>;

    /// Fetches the provider's list of recently changed series as
    /// (series id, last-updated unix time) pairs.
    ///
    /// Ids are returned in the provider's own string form; the sync layer
    /// parses and filters them.
    fn fetch_update_list(&self) -> Result<Vec<(String, i64)>, ProviderError>;

    /// Resolves the canonical asset URL for an image id.
    ///
    /// Deterministic, performs no I/O; used when an image record carries no
    /// resolution URLs of its own.
    fn image_url(&self, image_id: i64) -> String;
}
