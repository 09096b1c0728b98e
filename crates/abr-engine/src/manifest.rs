//! Read-only projection of a manifest (C3).
//!
//! Parsing an actual MPD or HLS playlist is out of scope (spec.md §1); this
//! module only defines the shape the rest of the core consumes and an
//! in-memory implementation ([`StaticManifest`]) usable by tests and by the
//! `abr-cli` demo.

use serde::{Deserialize, Serialize};

/// One encoding of an adaptation set. Representations within an
/// [`AdaptationSet`] are sorted by `bandwidth_bps` descending: index 0 is
/// always the highest-quality representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Representation {
    pub bandwidth_bps: u64,
    pub codec: String,
    pub height: u32,
    pub width: u32,
    pub frame_rate: f64,
    pub mime_type: String,
    /// Per-segment chunk sizes in bits, ordered by segment number (1-based,
    /// so `chunk_sizes_bits[0]` is segment 1). Empty when the manifest does
    /// not advertise chunk-level sizes; BBA-2 then fails with
    /// [`crate::Error::ManifestUnsupported`].
    pub chunk_sizes_bits: Vec<u64>,
}

impl Representation {
    /// `max(chunk) / avg(chunk)` over [`Self::chunk_sizes_bits`], per spec §3.
    /// Returns `1.0` for an empty or single-entry chunk list.
    pub fn max_avg_ratio(&self) -> f64 {
        if self.chunk_sizes_bits.is_empty() {
            return 1.0;
        }
        let max = *self.chunk_sizes_bits.iter().max().unwrap() as f64;
        let sum: u64 = self.chunk_sizes_bits.iter().sum();
        let avg = sum as f64 / self.chunk_sizes_bits.len() as f64;
        if avg == 0.0 { 1.0 } else { max / avg }
    }

    /// Chunk size (bits) for a 1-based segment number, if advertised.
    pub fn chunk_bits(&self, segment_number: u32) -> Option<u64> {
        segment_number
            .checked_sub(1)
            .and_then(|idx| self.chunk_sizes_bits.get(idx as usize).copied())
    }
}

/// A group of representations encoding the same media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationSet {
    pub mime_type: String,
    /// Nominal per-segment duration, stable for the stream's lifetime.
    pub segment_duration_ms: u64,
    /// Sorted descending by bandwidth; index 0 = highest quality.
    pub representations: Vec<Representation>,
}

impl AdaptationSet {
    pub fn highest_index(&self) -> usize {
        0
    }

    pub fn lowest_index(&self) -> usize {
        self.representations.len().saturating_sub(1)
    }

    pub fn bandwidth_list(&self) -> Vec<u64> {
        self.representations.iter().map(|r| r.bandwidth_bps).collect()
    }

    pub fn representation(&self, index: usize) -> Option<&Representation> {
        self.representations.get(index)
    }
}

/// A period groups adaptation sets that are active concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    pub adaptation_sets: Vec<AdaptationSet>,
}

/// Read-only manifest projection consumed by the playback loop and ABR
/// engine. Parsing is the host's responsibility; this trait is the seam.
pub trait ManifestView: Send + Sync {
    fn periods(&self) -> &[Period];

    /// Total nominal stream duration in milliseconds.
    fn stream_duration_ms(&self) -> u64;

    fn adaptation_set(&self, period: usize, set: usize) -> Option<&AdaptationSet> {
        self.periods().get(period)?.adaptation_sets.get(set)
    }

    fn representation(&self, period: usize, set: usize, rep: usize) -> Option<&Representation> {
        self.adaptation_set(period, set)?.representation(rep)
    }
}

/// In-memory manifest, constructible from a small JSON fixture format.
/// Not a DASH MPD/HLS playlist parser — see module docs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticManifest {
    pub stream_duration_ms: u64,
    pub periods: Vec<Period>,
}

impl StaticManifest {
    pub fn from_json(data: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

impl ManifestView for StaticManifest {
    fn periods(&self) -> &[Period] {
        &self.periods
    }

    fn stream_duration_ms(&self) -> u64 {
        self.stream_duration_ms
    }
}
