//! `bba2` / `bba2XL-{base,rate,double}`: BBA-2 with a dynamic lower
//! reservoir and a rate-based startup phase (spec §4.1, grounded on
//! `algorithms/bba.go`'s `BBA2`/`calculateBBA2Reservoir`/`rate` family).
//!
//! The rate phase runs until it first declines to hand control to the
//! buffer-based selection, at which point it latches off for the rest of
//! the session (`ResetBBAData_afterAbort` is the only way back in, invoked
//! by the cross-layer accountant after a stall-triggered abort).

use super::types::{clamp_one_rung, select_by_throughput, AbortLogic, ChunkSizeSource, Decision, DecisionInput, RateCandidateParams};

const UPPER_RESERVOIR_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct Bba2State {
    pub abort_logic: Option<AbortLogic>,
    params: RateCandidateParams,
    using_rate: bool,
    previous_buffer_level_ms: u64,
}

impl Bba2State {
    pub fn new(abort_logic: Option<AbortLogic>) -> Self {
        Self { abort_logic, params: RateCandidateParams::default(), using_rate: true, previous_buffer_level_ms: 0 }
    }

    /// Invoked by the cross-layer accountant after it cancels an in-flight
    /// fetch: re-arms the rate phase and resets its latched buffer level.
    pub fn reset_after_abort(&mut self, buffer_ms: u64) {
        self.using_rate = true;
        self.previous_buffer_level_ms = buffer_ms;
    }

    pub fn decide(&mut self, input: &DecisionInput<'_>) -> Decision {
        if input.segment_number <= 1 {
            self.previous_buffer_level_ms = input.buffer_ms;
            return Decision {
                index: input.lowest_index,
                percentage: None,
                desired_bitrate_bps: None,
                lower_reservoir_ms: None,
            };
        }

        let lower_reservoir_ms = calculate_reservoir(input);
        let upper_reservoir_ms = input.max_buffer_ms as f64 * UPPER_RESERVOIR_FRACTION;
        let upper_bound = input.max_buffer_ms as f64 - upper_reservoir_ms;
        let under_upper_reservoir = (input.buffer_ms as f64) < upper_reservoir_ms;

        let mut chosen = if (input.buffer_ms as f64) <= lower_reservoir_ms {
            input.lowest_index
        } else if (input.buffer_ms as f64) >= upper_bound {
            input.highest_index
        } else {
            let cushion = upper_bound - lower_reservoir_ms;
            let percentage = (input.buffer_ms as f64 - lower_reservoir_ms) / cushion.max(1.0);
            let r_max = input.bandwidth_list[input.highest_index] as f64;
            select_by_throughput(percentage * r_max, input.bandwidth_list, input.lowest_index)
        };

        chosen = clamp_one_rung(chosen, input.previous_index, input.bandwidth_list, input.highest_index, input.lowest_index);

        if self.using_rate {
            let candidate = rate_candidate(input, under_upper_reservoir, self.params);
            if input.bandwidth_list[candidate] >= input.bandwidth_list[chosen]
                && self.previous_buffer_level_ms <= input.buffer_ms
            {
                chosen = candidate;
            } else {
                self.using_rate = false;
            }
        }

        self.previous_buffer_level_ms = input.buffer_ms;

        Decision {
            index: chosen,
            percentage: None,
            desired_bitrate_bps: None,
            lower_reservoir_ms: Some(lower_reservoir_ms),
        }
    }
}

/// `calculateBBA2Reservoir`: sums, over the lowest-bitrate representation's
/// own chunk list starting at the segment about to be fetched, the slack
/// between each chunk's nominal download time (at the lowest bitrate) and
/// the segment duration, out to a horizon of `2 * max_buffer_segments`.
fn calculate_reservoir(input: &DecisionInput<'_>) -> f64 {
    if input.segment_duration_ms == 0 || input.lowest_bitrate_bps == 0 {
        return 0.0;
    }
    let segment_duration_s = input.segment_duration_ms as f64 / 1000.0;
    let max_buffer_segments = input.max_buffer_ms as f64 / input.segment_duration_ms as f64;
    let horizon = (max_buffer_segments * 2.0) as u32;
    let chunk_count = input.chunks.chunk_count(input.lowest_index) as u32;

    // Mirrors the Go loop's 0-based `i`, bounded absolutely by `horizon` from
    // the start of the stream rather than relative to where this sum begins.
    let zero_based_start = input.segment_number.saturating_sub(1);
    let end = chunk_count.min(horizon);

    let mut sum_s = 0.0;
    for zero_based in zero_based_start..end {
        let segment_number = zero_based + 1;
        if let Some(bits) = input.chunks.chunk_bits(input.lowest_index, segment_number) {
            sum_s += bits as f64 / input.lowest_bitrate_bps as f64 - segment_duration_s;
        }
    }

    let sum_ms = (sum_s * 1000.0).max(0.0);
    sum_ms.clamp(segment_duration_s * 3.0 * 1000.0, input.max_buffer_ms as f64)
}

/// `rate`: the startup-phase candidate, tracking the highest representation
/// whose recent download pace would not have starved the buffer.
fn rate_candidate(input: &DecisionInput<'_>, under_upper_reservoir: bool, params: RateCandidateParams) -> usize {
    if input.previous_index == input.highest_index && input.segment_number != 1 {
        return input.previous_index;
    }
    if input.segment_number == 1 {
        return input.lowest_index;
    }

    let segment_duration_s = input.segment_duration_ms as f64 / 1000.0;
    let prev_segment_number = input.segment_number.saturating_sub(1).max(1);
    let prev_chunk_bits = input.chunks.chunk_bits(input.previous_index, prev_segment_number).unwrap_or(0) as f64;
    let delta_b = segment_duration_s - prev_chunk_bits / input.new_throughput_bps.max(1.0);

    let y = input.bandwidth_list[input.previous_index] as f64 / input.bandwidth_list[input.previous_index - 1] as f64;
    let ratio = input.chunks.max_avg_ratio(input.previous_index - 1).max(1e-9);

    let threshold = if under_upper_reservoir {
        segment_duration_s * (1.0 - 0.5 * y / ratio)
    } else {
        params.fallback_threshold
    };

    if delta_b > threshold * segment_duration_s {
        input.previous_index - 1
    } else {
        input.previous_index
    }
}
