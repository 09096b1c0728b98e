//! Segment fetching contract (C4). Executing the actual GET, manifest URL
//! templating and file persistence are out of scope; this module only
//! defines the seam the playback loop and accountant need.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// An inclusive byte range for a byte-range-addressed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// One segment fetch request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub byte_range: Option<ByteRange>,
}

/// Result of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub bytes: u64,
    pub rtt: std::time::Duration,
    pub http_status: u16,
    /// e.g. "h3", "http/1.1" — reported to the tracer/metrics as-is.
    pub protocol: String,
}

/// Errors a [`SegmentFetcher`] may return. Cancellation must be
/// distinguishable from any other failure so the playback loop can treat it
/// as a recoverable [`crate::Error::FetchCancelled`] rather than fatal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("fetch cancelled")]
    Cancelled,
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("network error: {0}")]
    Network(String),
}

/// Performs a cancellable GET for one segment.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    async fn fetch(
        &self,
        request: FetchRequest,
        cancel: CancellationToken,
    ) -> Result<FetchResponse, FetchError>;
}
