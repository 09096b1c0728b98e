//! Crate-wide error type.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds for the ABR control core (see spec §7).
#[derive(Debug, Error)]
pub enum Error {
    /// A representation is missing the chunk-size list BBA-2 needs for
    /// reservoir sizing. Fatal: the policy cannot be run on this manifest.
    #[error("representation {index} has no chunk-size list, required by {policy}")]
    ManifestUnsupported { policy: &'static str, index: usize },

    /// The segment fetcher reported a network or HTTP-status failure not
    /// caused by cancellation. Terminates the stream.
    #[error("segment fetch failed: {0}")]
    FetchFailed(String),

    /// The fetch was cancelled by the cross-layer accountant. Recovered
    /// locally by the playback loop; never surfaced past it.
    #[error("segment fetch cancelled by cross-layer accountant")]
    FetchCancelled,

    /// An unrecognized ABR policy identifier was supplied in configuration.
    #[error("unknown ABR policy identifier: {0}")]
    PolicyUnknown(String),

    /// The event tracer failed to encode or write an event.
    #[error("tracer encode error: {0}")]
    TracerEncode(String),

    /// Configuration failed validation (see [`crate::config::StreamConfig::validate`]).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn manifest_unsupported(policy: &'static str, index: usize) -> Self {
        Self::ManifestUnsupported { policy, index }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
