//! `elastic`: a PI controller over a harmonic-mean throughput estimate,
//! correcting its target toward a mid-buffer setpoint (spec §4.1).
//!
//! No chunk-level Go source for this policy survived distillation; the
//! constants and setpoint below are a direct, documented implementation of
//! the spec's prose description (see `DESIGN.md`), not a literal port.

use super::types::{select_by_throughput, Decision, DecisionInput};

#[derive(Debug, Clone, Copy)]
pub struct ElasticParams {
    pub kp: f64,
    pub ki: f64,
}

impl Default for ElasticParams {
    fn default() -> Self {
        Self { kp: 0.5, ki: 0.05 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ElasticState {
    params: ElasticParams,
    integral: f64,
}

impl ElasticState {
    pub fn new(params: ElasticParams) -> Self {
        Self { params, integral: 0.0 }
    }

    pub fn decide(&mut self, input: &DecisionInput<'_>, history: &mut Vec<f64>) -> Decision {
        history.push(input.new_throughput_bps);
        let harmonic_mean = {
            let reciprocal_sum: f64 = history.iter().map(|v| 1.0 / v.max(1.0)).sum();
            history.len() as f64 / reciprocal_sum
        };

        let target_buffer_ms = input.max_buffer_ms as f64 * 0.5;
        let error = (input.buffer_ms as f64 - target_buffer_ms) / input.max_buffer_ms.max(1) as f64;
        self.integral += error;

        let delivery_factor = if input.segment_duration_ms == 0 {
            1.0
        } else {
            (input.last_delivery_ms as f64 / input.segment_duration_ms as f64).max(0.1)
        };

        let static_param =
            harmonic_mean * (1.0 + self.params.kp * error + self.params.ki * self.integral) / delivery_factor;

        Decision::simple(select_by_throughput(static_param, input.bandwidth_list, input.lowest_index))
    }
}
