//! `logistic`: a sigmoid of the buffer deviation from a mid-buffer setpoint
//! chooses a step direction rather than an absolute target bitrate (spec
//! §4.1). Bounded to one rung per decision like the BBA family, and clamped
//! to `[highest_index, lowest_index]`.
//!
//! No chunk-level Go source survived distillation for this policy; the
//! setpoint and deadband below are a documented implementation of the spec's
//! prose (see `DESIGN.md`).

use super::types::{Decision, DecisionInput};

const DEADBAND: f64 = 0.05;

pub fn decide(input: &DecisionInput<'_>) -> Decision {
    let target_buffer_ms = input.max_buffer_ms as f64 * 0.5;
    let x = (input.buffer_ms as f64 - target_buffer_ms) / input.max_buffer_ms.max(1) as f64;
    let sigmoid = 1.0 / (1.0 + (-6.0 * x).exp());

    let index = if sigmoid > 0.5 + DEADBAND {
        input.previous_index.saturating_sub(1).max(input.highest_index)
    } else if sigmoid < 0.5 - DEADBAND {
        (input.previous_index + 1).min(input.lowest_index)
    } else {
        input.previous_index
    };

    Decision::simple(index)
}
