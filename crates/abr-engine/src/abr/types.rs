//! Shared types for the ABR policy family (C6).

use std::str::FromStr;

/// Stall-abort mode for cross-layer `bba2XL-*` policies, per spec §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortLogic {
    Base,
    Rate,
    Double,
}

/// Identifier enumeration from spec §6.6. `Display`/`FromStr` round-trip the
/// exact wire strings the host configuration uses, the same pattern
/// `mesio_engine::EngineType` follows for its own closed identifier set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Conventional,
    /// Same selection rule as `Conventional`; kept as a distinct identifier
    /// because the source configuration surface names it separately.
    Progressive,
    Elastic,
    Logistic,
    MeanAverage,
    GeomAverage,
    Emwa,
    MeanAverageXl,
    MeanAverageRecentXl,
    Arbiter,
    /// Alias of `Bba1` kept for the `"bba"` wire identifier.
    Bba,
    Bba1,
    Bba1Xl,
    /// `abort_logic: None` is the non-cross-layer `"bba2"` identifier;
    /// `Some(_)` selects one of the `bba2XL-{base,rate,double}` variants.
    Bba2 { abort_logic: Option<AbortLogic> },
    /// No-op policy used for plumbing tests: always holds the previous
    /// representation.
    Test,
}

impl PolicyKind {
    pub fn uses_cross_layer(&self) -> bool {
        matches!(
            self,
            Self::MeanAverageXl | Self::MeanAverageRecentXl | Self::Bba1Xl
        ) || matches!(self, Self::Bba2 { abort_logic: Some(_) })
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "conventional" => Self::Conventional,
            "progressive" => Self::Progressive,
            "elastic" => Self::Elastic,
            "logistic" => Self::Logistic,
            "average" => Self::MeanAverage,
            "geometric" => Self::GeomAverage,
            "exponential" => Self::Emwa,
            "averageXL" => Self::MeanAverageXl,
            "averageRecentXL" => Self::MeanAverageRecentXl,
            "arbiter" => Self::Arbiter,
            "bba" => Self::Bba,
            "bba1" => Self::Bba1,
            "bba1XL" => Self::Bba1Xl,
            "bba2" => Self::Bba2 { abort_logic: None },
            "bba2XL-base" => Self::Bba2 { abort_logic: Some(AbortLogic::Base) },
            "bba2XL-rate" => Self::Bba2 { abort_logic: Some(AbortLogic::Rate) },
            "bba2XL-double" => Self::Bba2 { abort_logic: Some(AbortLogic::Double) },
            "test" => Self::Test,
            other => return Err(format!("unknown ABR policy identifier: {other}")),
        })
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Conventional => "conventional",
            Self::Progressive => "progressive",
            Self::Elastic => "elastic",
            Self::Logistic => "logistic",
            Self::MeanAverage => "average",
            Self::GeomAverage => "geometric",
            Self::Emwa => "exponential",
            Self::MeanAverageXl => "averageXL",
            Self::MeanAverageRecentXl => "averageRecentXL",
            Self::Arbiter => "arbiter",
            Self::Bba => "bba",
            Self::Bba1 => "bba1",
            Self::Bba1Xl => "bba1XL",
            Self::Bba2 { abort_logic: None } => "bba2",
            Self::Bba2 { abort_logic: Some(AbortLogic::Base) } => "bba2XL-base",
            Self::Bba2 { abort_logic: Some(AbortLogic::Rate) } => "bba2XL-rate",
            Self::Bba2 { abort_logic: Some(AbortLogic::Double) } => "bba2XL-double",
            Self::Test => "test",
        };
        f.write_str(s)
    }
}

/// Per-representation chunk-level metadata lookup. Implemented by an
/// adapter over [`crate::manifest::AdaptationSet`] in the playback loop.
pub trait ChunkSizeSource {
    fn chunk_bits(&self, rep_index: usize, segment_number: u32) -> Option<u64>;
    fn chunk_count(&self, rep_index: usize) -> usize;
    fn max_avg_ratio(&self, rep_index: usize) -> f64;
}

/// Named policy parameter resolving the §9 Open Question about the rate
/// candidate's fallback threshold constant.
#[derive(Debug, Clone, Copy)]
pub struct RateCandidateParams {
    pub fallback_threshold: f64,
}

impl Default for RateCandidateParams {
    fn default() -> Self {
        Self { fallback_threshold: 0.5 }
    }
}

/// Inputs common to every selector (spec §4.1).
pub struct DecisionInput<'a> {
    pub bandwidth_list: &'a [u64],
    pub lowest_index: usize,
    pub highest_index: usize,
    pub buffer_ms: u64,
    pub max_buffer_ms: u64,
    pub previous_index: usize,
    pub segment_duration_ms: u64,
    pub segment_number: u32,
    pub new_throughput_bps: f64,
    pub last_delivery_ms: u64,
    pub cross_layer_throughput_bps: f64,
    pub cross_layer_recent_throughput_bps: f64,
    pub lowest_bitrate_bps: u64,
    pub chunks: &'a dyn ChunkSizeSource,
}

/// Result of one `decide()` call. The diagnostic fields are populated by
/// the buffer-based policies and surfaced to the metric logger (spec §6.5
/// `PERCENTAGE`/`DESIREDBITRATE`/`LOWERRESERVOIR`); throughput policies
/// leave them `None`.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub index: usize,
    pub percentage: Option<f64>,
    pub desired_bitrate_bps: Option<f64>,
    pub lower_reservoir_ms: Option<f64>,
}

impl Decision {
    pub fn simple(index: usize) -> Self {
        Self { index, percentage: None, desired_bitrate_bps: None, lower_reservoir_ms: None }
    }
}

/// `SelectRepRateWithThroughtput`: highest-bandwidth representation whose
/// bandwidth is ≤ `target_bps`; falls back to `lowest_index` if none
/// qualifies. `bandwidth_list` must be sorted descending.
pub fn select_by_throughput(target_bps: f64, bandwidth_list: &[u64], lowest_index: usize) -> usize {
    for (i, &bw) in bandwidth_list.iter().enumerate() {
        if (bw as f64) <= target_bps {
            return i;
        }
    }
    lowest_index
}

/// Clamp a chosen index to at most one rung away from `previous_index`,
/// comparing bandwidths through the index uniformly for BBA-1 and BBA-2
/// (spec §9 Open Question resolution).
pub fn clamp_one_rung(
    chosen: usize,
    previous_index: usize,
    bandwidth_list: &[u64],
    highest_index: usize,
    lowest_index: usize,
) -> usize {
    use std::cmp::Ordering;
    match bandwidth_list[chosen].cmp(&bandwidth_list[previous_index]) {
        Ordering::Greater => previous_index.saturating_sub(1).max(highest_index.min(previous_index)),
        Ordering::Less => (previous_index + 1).min(lowest_index),
        Ordering::Equal => chosen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_by_throughput_picks_highest_qualifying() {
        let bw = [4_000_000u64, 2_000_000, 1_000_000, 500_000];
        assert_eq!(select_by_throughput(500_000.0, &bw, 3), 3);
        assert_eq!(select_by_throughput(1_500_000.0, &bw, 3), 2);
        assert_eq!(select_by_throughput(600_000.0, &bw, 3), 3);
        assert_eq!(select_by_throughput(10.0, &bw, 3), 3); // below all -> lowest
    }

    #[test]
    fn clamp_limits_to_one_rung_in_either_direction() {
        let bw = [4_000_000u64, 2_000_000, 1_000_000, 500_000];
        // previous = index 2 (1M); a jump to index 0 (4M) must clamp to index 1.
        assert_eq!(clamp_one_rung(0, 2, &bw, 0, 3), 1);
        // a drop to index 3 (500k) must clamp to index 3 (one rung down from 2).
        assert_eq!(clamp_one_rung(3, 2, &bw, 0, 3), 3);
        // same index: no movement.
        assert_eq!(clamp_one_rung(2, 2, &bw, 0, 3), 2);
    }

    #[test]
    fn policy_kind_round_trips_wire_identifiers() {
        for s in [
            "conventional", "progressive", "elastic", "logistic", "average", "geometric",
            "exponential", "averageXL", "averageRecentXL", "arbiter", "bba", "bba1", "bba1XL",
            "bba2", "bba2XL-base", "bba2XL-rate", "bba2XL-double", "test",
        ] {
            let kind: PolicyKind = s.parse().unwrap();
            assert_eq!(kind.to_string(), s);
        }
        assert!("nonsense".parse::<PolicyKind>().is_err());
    }
}
