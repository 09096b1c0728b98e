//! The ABR decision engine (C6): one closed `Policy` enum dispatching to a
//! selector per spec §4.1/§6.6, rather than a trait-object hierarchy — each
//! policy's state (throughput history, BBA-2 latch, ...) lives in its own
//! variant and `decide()` is the single contract the playback loop calls
//! against.

mod arbiter;
mod bba;
mod bba2;
mod elastic;
mod logistic;
mod throughput;
mod types;

pub use bba2::Bba2State;
pub use elastic::{ElasticParams, ElasticState};
pub use throughput::EmwaState;
pub use types::{
    clamp_one_rung, select_by_throughput, AbortLogic, ChunkSizeSource, Decision, DecisionInput,
    PolicyKind, RateCandidateParams,
};

/// A configured, stateful ABR policy instance.
pub enum Policy {
    Conventional { history: Vec<f64> },
    Progressive { history: Vec<f64> },
    MeanAverage { history: Vec<f64> },
    GeomAverage { history: Vec<f64> },
    Emwa { history: Vec<f64>, state: EmwaState },
    MeanAverageXl { history: Vec<f64> },
    MeanAverageRecentXl { history: Vec<f64> },
    Elastic { history: Vec<f64>, state: ElasticState },
    Logistic,
    Arbiter { history: Vec<f64> },
    Bba,
    Bba1,
    Bba1Xl,
    Bba2(Bba2State),
    Test,
}

impl Policy {
    pub fn new(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::Conventional => Self::Conventional { history: Vec::new() },
            PolicyKind::Progressive => Self::Progressive { history: Vec::new() },
            PolicyKind::MeanAverage => Self::MeanAverage { history: Vec::new() },
            PolicyKind::GeomAverage => Self::GeomAverage { history: Vec::new() },
            PolicyKind::Emwa => Self::Emwa { history: Vec::new(), state: EmwaState::new(0.5) },
            PolicyKind::MeanAverageXl => Self::MeanAverageXl { history: Vec::new() },
            PolicyKind::MeanAverageRecentXl => Self::MeanAverageRecentXl { history: Vec::new() },
            PolicyKind::Elastic => {
                Self::Elastic { history: Vec::new(), state: ElasticState::new(ElasticParams::default()) }
            }
            PolicyKind::Logistic => Self::Logistic,
            PolicyKind::Arbiter => Self::Arbiter { history: Vec::new() },
            PolicyKind::Bba => Self::Bba,
            PolicyKind::Bba1 => Self::Bba1,
            PolicyKind::Bba1Xl => Self::Bba1Xl,
            PolicyKind::Bba2 { abort_logic } => Self::Bba2(Bba2State::new(abort_logic)),
            PolicyKind::Test => Self::Test,
        }
    }

    /// The single decision contract every variant implements.
    pub fn decide(&mut self, input: &DecisionInput<'_>) -> Decision {
        match self {
            Self::Conventional { history } | Self::Progressive { history } => {
                throughput::conventional(input, history)
            }
            Self::MeanAverage { history } => throughput::mean_average(input, history),
            Self::GeomAverage { history } => throughput::geom_average(input, history),
            Self::Emwa { history, state } => state.decide(input, history),
            Self::MeanAverageXl { history } => throughput::mean_average_xl(input, history, false),
            Self::MeanAverageRecentXl { history } => throughput::mean_average_xl(input, history, true),
            Self::Elastic { history, state } => state.decide(input, history),
            Self::Logistic => logistic::decide(input),
            Self::Arbiter { history } => arbiter::decide(input, history),
            Self::Bba | Self::Bba1 | Self::Bba1Xl => bba::decide(input),
            Self::Bba2(state) => state.decide(input),
            Self::Test => Decision::simple(input.previous_index),
        }
    }

    /// Re-arms a BBA-2 rate phase after the cross-layer accountant aborts an
    /// in-flight fetch; a no-op for every other policy.
    pub fn abort_reset(&mut self, buffer_ms: u64) {
        if let Self::Bba2(state) = self {
            state.reset_after_abort(buffer_ms);
        }
    }

    pub fn uses_cross_layer(&self) -> bool {
        matches!(self, Self::MeanAverageXl { .. } | Self::MeanAverageRecentXl { .. } | Self::Bba1Xl)
            || matches!(self, Self::Bba2(state) if state.abort_logic.is_some())
    }

    /// `Some` only for `bba2XL-*`: the only policies with an abort mode, and
    /// therefore the only ones for which the Playback Loop arms stall
    /// prediction at `SegmentStart` (spec §4.2 step 1, §9 guard).
    pub fn abort_logic(&self) -> Option<AbortLogic> {
        match self {
            Self::Bba2(state) => state.abort_logic,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoChunks;
    impl ChunkSizeSource for NoChunks {
        fn chunk_bits(&self, _: usize, _: u32) -> Option<u64> {
            None
        }
        fn chunk_count(&self, _: usize) -> usize {
            0
        }
        fn max_avg_ratio(&self, _: usize) -> f64 {
            1.0
        }
    }

    #[test]
    fn test_policy_always_holds_previous_index() {
        let mut policy = Policy::new(PolicyKind::Test);
        let bw = [4_000_000u64, 2_000_000, 1_000_000];
        let chunks = NoChunks;
        let input = DecisionInput {
            bandwidth_list: &bw,
            lowest_index: 2,
            highest_index: 0,
            buffer_ms: 5000,
            max_buffer_ms: 20_000,
            previous_index: 1,
            segment_duration_ms: 2000,
            segment_number: 3,
            new_throughput_bps: 1_000_000.0,
            last_delivery_ms: 1000,
            cross_layer_throughput_bps: 1_000_000.0,
            cross_layer_recent_throughput_bps: 1_000_000.0,
            lowest_bitrate_bps: 1_000_000,
            chunks: &chunks,
        };
        assert_eq!(policy.decide(&input).index, 1);
    }

    #[test]
    fn progressive_is_behavior_equivalent_to_conventional() {
        let bw = [4_000_000u64, 2_000_000, 1_000_000, 500_000];
        let chunks = NoChunks;
        let mut conventional = Policy::new(PolicyKind::Conventional);
        let mut progressive = Policy::new(PolicyKind::Progressive);
        for thr in [500_000.0, 1_500_000.0, 600_000.0] {
            let input = DecisionInput {
                bandwidth_list: &bw,
                lowest_index: 3,
                highest_index: 0,
                buffer_ms: 5000,
                max_buffer_ms: 20_000,
                previous_index: 3,
                segment_duration_ms: 2000,
                segment_number: 1,
                new_throughput_bps: thr,
                last_delivery_ms: 1000,
                cross_layer_throughput_bps: thr,
                cross_layer_recent_throughput_bps: thr,
                lowest_bitrate_bps: 500_000,
                chunks: &chunks,
            };
            assert_eq!(conventional.decide(&input).index, progressive.decide(&input).index);
        }
    }

    #[test]
    fn cross_layer_flag_matches_policy_kind() {
        assert!(!Policy::new(PolicyKind::Conventional).uses_cross_layer());
        assert!(Policy::new(PolicyKind::MeanAverageXl).uses_cross_layer());
        assert!(Policy::new(PolicyKind::Bba2 { abort_logic: Some(AbortLogic::Base) }).uses_cross_layer());
        assert!(!Policy::new(PolicyKind::Bba2 { abort_logic: None }).uses_cross_layer());
    }
}
