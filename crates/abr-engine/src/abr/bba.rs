//! `bba` / `bba1` / `bba1XL`: buffer-based rate selection with static
//! reservoirs, each sized to 10% of the buffer capacity (spec §4.1, grounded
//! on `algorithms/bba.go`'s `BBA`/`BBA1Alg_AV` family).
//!
//! `bba` is kept as a distinct wire identifier but is behavior-identical to
//! `bba1` — the original dispatches both through the same selection
//! function. `bba1XL` differs only in which throughput feed the cross-layer
//! accountant reports upstream; the selection itself never reads
//! cross-layer throughput, so it shares this implementation too.

use super::types::{clamp_one_rung, select_by_throughput, Decision, DecisionInput};

/// Fraction of `max_buffer_ms` reserved at each end of the buffer range.
const RESERVOIR_FRACTION: f64 = 0.1;

pub fn decide(input: &DecisionInput<'_>) -> Decision {
    let reservoir = input.max_buffer_ms as f64 * RESERVOIR_FRACTION;
    let upper_bound = input.max_buffer_ms as f64 - reservoir;

    let chosen = if (input.buffer_ms as f64) <= reservoir {
        input.lowest_index
    } else if (input.buffer_ms as f64) >= upper_bound {
        input.highest_index
    } else {
        let cushion = upper_bound - reservoir;
        let percentage = (input.buffer_ms as f64 - reservoir) / cushion;
        let r_max = input.bandwidth_list[input.highest_index] as f64;
        let r_min = input.bandwidth_list[input.lowest_index] as f64;
        let desired = percentage * r_max + r_min;
        let idx = select_by_throughput(desired, input.bandwidth_list, input.lowest_index);

        if input.segment_duration_ms as f64 > reservoir / 2.0 {
            tracing::warn!(
                segment_duration_ms = input.segment_duration_ms,
                lower_reservoir_ms = reservoir,
                "segment duration exceeds half the lower reservoir; BBA cushion math may be unstable"
            );
        }
        return Decision {
            index: clamp_one_rung(idx, input.previous_index, input.bandwidth_list, input.highest_index, input.lowest_index),
            percentage: Some(percentage),
            desired_bitrate_bps: Some(desired),
            lower_reservoir_ms: Some(reservoir),
        };
    };

    Decision {
        index: clamp_one_rung(chosen, input.previous_index, input.bandwidth_list, input.highest_index, input.lowest_index),
        percentage: None,
        desired_bitrate_bps: None,
        lower_reservoir_ms: Some(reservoir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abr::types::ChunkSizeSource;

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

    fn input(buffer_ms: u64, max_buffer_ms: u64, previous_index: usize) -> DecisionInput<'static> {
        static BW: [u64; 4] = [4_000_000, 2_000_000, 1_000_000, 500_000];
        static CHUNKS: NoChunks = NoChunks;
        DecisionInput {
            bandwidth_list: &BW,
            lowest_index: 3,
            highest_index: 0,
            buffer_ms,
            max_buffer_ms,
            previous_index,
            segment_duration_ms: 2000,
            segment_number: 5,
            new_throughput_bps: 1_000_000.0,
            last_delivery_ms: 1500,
            cross_layer_throughput_bps: 1_000_000.0,
            cross_layer_recent_throughput_bps: 1_000_000.0,
            lowest_bitrate_bps: 500_000,
            chunks: &CHUNKS,
        }
    }

    #[test]
    fn at_lower_reservoir_boundary_picks_lowest() {
        // max_buffer=20000 -> reservoir=2000; buffer exactly at boundary.
        let d = decide(&input(2000, 20_000, 3));
        assert_eq!(d.index, 3);
    }

    #[test]
    fn at_upper_reservoir_boundary_picks_highest_but_clamped_one_rung() {
        // previous at lowest index 3; upper boundary picks highest (0) but
        // the one-rung clamp limits the jump to index 2.
        let d = decide(&input(18_000, 20_000, 3));
        assert_eq!(d.index, 2);
    }

    #[test]
    fn mid_buffer_produces_percentage_and_desired_bitrate() {
        let d = decide(&input(10_000, 20_000, 2));
        assert!(d.percentage.is_some());
        assert!(d.desired_bitrate_bps.is_some());
    }
}
