//! Throughput-driven selectors: `conventional`/`progressive`, `average`,
//! `geometric`, `exponential`, `averageXL`, `averageRecentXL`.
//!
//! Each selector appends the segment's observed throughput to the running
//! history, derives a single target bitrate from it, and hands the target to
//! [`select_by_throughput`]. The cross-layer variants prefer the
//! accountant's packet-level average once at least two segments have been
//! observed, falling back to the segment-level throughput before that
//! (mirrors the original's warm-up guard on `thrList`).

use super::types::{select_by_throughput, Decision, DecisionInput};

pub fn conventional(input: &DecisionInput<'_>, history: &mut Vec<f64>) -> Decision {
    history.push(input.new_throughput_bps);
    let index = select_by_throughput(input.new_throughput_bps, input.bandwidth_list, input.lowest_index);
    Decision::simple(index)
}

pub fn mean_average(input: &DecisionInput<'_>, history: &mut Vec<f64>) -> Decision {
    history.push(input.new_throughput_bps);
    let avg = history.iter().sum::<f64>() / history.len() as f64;
    Decision::simple(select_by_throughput(avg, input.bandwidth_list, input.lowest_index))
}

pub fn geom_average(input: &DecisionInput<'_>, history: &mut Vec<f64>) -> Decision {
    history.push(input.new_throughput_bps);
    let log_sum: f64 = history.iter().map(|v| v.max(1.0).ln()).sum();
    let geo_mean = (log_sum / history.len() as f64).exp();
    Decision::simple(select_by_throughput(geo_mean, input.bandwidth_list, input.lowest_index))
}

/// Exponentially-weighted moving average. Seeds from the arithmetic mean of
/// the first three samples (the original's `k=3` warm-up window), then
/// updates `ewma = ratio*new + (1-ratio)*ewma` for every sample after.
#[derive(Debug, Clone, Copy)]
pub struct EmwaState {
    pub ratio: f64,
    ewma: Option<f64>,
}

impl EmwaState {
    pub fn new(ratio: f64) -> Self {
        Self { ratio, ewma: None }
    }

    pub fn decide(&mut self, input: &DecisionInput<'_>, history: &mut Vec<f64>) -> Decision {
        history.push(input.new_throughput_bps);
        let value = if history.len() < 3 {
            history.iter().sum::<f64>() / history.len() as f64
        } else if history.len() == 3 {
            let seed = history.iter().sum::<f64>() / 3.0;
            self.ewma = Some(seed);
            seed
        } else {
            let prev = self.ewma.unwrap_or(input.new_throughput_bps);
            let next = self.ratio * input.new_throughput_bps + (1.0 - self.ratio) * prev;
            self.ewma = Some(next);
            next
        };
        Decision::simple(select_by_throughput(value, input.bandwidth_list, input.lowest_index))
    }
}

/// `averageXL` / `averageRecentXL`: uses the segment-level throughput until
/// two samples have been observed, then switches to the accountant's
/// cross-layer average (`use_recent` selects the last-3000-packets variant).
pub fn mean_average_xl(input: &DecisionInput<'_>, history: &mut Vec<f64>, use_recent: bool) -> Decision {
    history.push(input.new_throughput_bps);
    let value = if history.len() < 2 {
        input.new_throughput_bps
    } else if use_recent {
        input.cross_layer_recent_throughput_bps
    } else {
        input.cross_layer_throughput_bps
    };
    Decision::simple(select_by_throughput(value, input.bandwidth_list, input.lowest_index))
}
