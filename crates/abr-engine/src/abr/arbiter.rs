//! `arbiter`: hybrid selector mixing throughput prediction with buffer
//! level. Per spec §4.1 this is "pluggable, behavior-equivalent to its
//! source" — the Go implementation (`CalculateSelectedIndexArbiter`) did not
//! survive distillation, so this blends the harmonic-mean throughput
//! estimate with a buffer-occupancy bitrate cap, weighted evenly. See
//! `DESIGN.md` for the resolved Open Question.

use super::types::{select_by_throughput, Decision, DecisionInput};

pub fn decide(input: &DecisionInput<'_>, history: &mut Vec<f64>) -> Decision {
    history.push(input.new_throughput_bps);
    let reciprocal_sum: f64 = history.iter().map(|v| 1.0 / v.max(1.0)).sum();
    let harmonic_mean = history.len() as f64 / reciprocal_sum;

    let occupancy = (input.buffer_ms as f64 / input.max_buffer_ms.max(1) as f64).clamp(0.0, 1.0);
    let highest_bw = input.bandwidth_list[input.highest_index] as f64;
    let buffer_cap = occupancy * highest_bw;

    let target = 0.5 * harmonic_mean + 0.5 * buffer_cap;
    Decision::simple(select_by_throughput(target, input.bandwidth_list, input.lowest_index))
}
