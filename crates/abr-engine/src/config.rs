//! Recognized configuration options (spec §6.7).

use crate::abr::PolicyKind;
use crate::error::{Error, Result};

/// Configuration for one streaming session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub max_buffer_ms: u64,
    pub init_buffer_segments: u32,
    pub stream_duration_ms: u64,
    pub stream_speed: f64,
    pub abr_policy: PolicyKind,
    pub prediction_window_fraction: f64,
    pub poll_interval_ms: u64,
    pub cross_layer_enabled: bool,
}

impl StreamConfig {
    pub fn new(max_buffer_ms: u64, stream_duration_ms: u64, abr_policy: PolicyKind) -> Self {
        Self {
            max_buffer_ms,
            init_buffer_segments: 2,
            stream_duration_ms,
            stream_speed: 1.0,
            abr_policy,
            prediction_window_fraction: 0.15,
            poll_interval_ms: 100,
            cross_layer_enabled: abr_policy.uses_cross_layer(),
        }
    }

    /// Validates the configuration, per the `PolicyUnknown`/`ManifestUnsupported`
    /// error kinds in spec §7. Manifest compatibility (chunk lists for BBA-2)
    /// is checked separately once a manifest is available, by
    /// `PlaybackLoop::new`'s internal manifest validation.
    pub fn validate(&self) -> Result<()> {
        if self.max_buffer_ms == 0 {
            return Err(Error::configuration("max_buffer_ms must be > 0"));
        }
        if self.stream_speed <= 0.0 || !self.stream_speed.is_finite() {
            return Err(Error::configuration("stream_speed must be a positive finite number"));
        }
        if !(0.0..=1.0).contains(&self.prediction_window_fraction) {
            return Err(Error::configuration("prediction_window_fraction must be in [0, 1]"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::configuration("poll_interval_ms must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_buffer() {
        let cfg = StreamConfig::new(0, 60_000, PolicyKind::Conventional);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_defaults() {
        let cfg = StreamConfig::new(20_000, 60_000, PolicyKind::Bba2 { abort_logic: None });
        assert!(cfg.validate().is_ok());
    }
}
