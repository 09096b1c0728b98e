//! Event categories and the closed event-payload enum (spec §4.4).

use serde_json::{json, Value};

/// Event category. Determines both the qlog `category:name` prefix and the
/// tracer's drop policy under back-pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Playback,
    Abr,
    Buffer,
    Network,
    Generic,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Abr => "abr",
            Self::Buffer => "buffer",
            Self::Network => "network",
            Self::Generic => "generic",
        }
    }

    /// `buffer` and `generic` events may be dropped under back-pressure;
    /// `playback`, `abr` and `network` are structural and never are.
    pub fn droppable(&self) -> bool {
        matches!(self, Self::Buffer | Self::Generic)
    }
}

/// One required event payload from spec §4.4, as a closed enum so payload
/// keys are checked at compile time instead of living in a sparse map.
#[derive(Debug, Clone)]
pub enum EventData {
    StreamInitialised { autoplay: bool },
    PlayerInteraction { state: &'static str, playhead_ms: u64, playhead_frame: Option<u64>, speed: f64 },
    Rebuffer { playhead_ms: u64 },
    StreamEnd { playhead_ms: u64 },
    PlayheadProgress { playhead_ms: u64 },
    AbrSwitch { media_type: String, from_id: Option<usize>, from_bitrate: Option<u64>, to_id: usize, to_bitrate: u64 },
    AbrReadyStateChange { state: &'static str },
    BufferOccupancyUpdate {
        media_type: String,
        playout_ms: u64,
        max_ms: u64,
        byte_count: Option<u64>,
        frame_count: Option<u64>,
    },
    NetworkRequest { media_type: String, resource_url: String, range: Option<(u64, u64)> },
    NetworkRequestUpdate { resource_url: String, bytes_received: u64 },
    NetworkAbort { resource_url: String },
    /// Only the fields that changed since the previous metrics event should
    /// be `Some` (spec §4.4 "emit only keys whose value changed").
    MetricsUpdated {
        min_rtt_ms: Option<f64>,
        smoothed_rtt_ms: Option<f64>,
        latest_rtt_ms: Option<f64>,
        rtt_variance_ms: Option<f64>,
    },
}

impl EventData {
    pub fn category(&self) -> Category {
        match self {
            Self::StreamInitialised { .. }
            | Self::PlayerInteraction { .. }
            | Self::Rebuffer { .. }
            | Self::StreamEnd { .. }
            | Self::PlayheadProgress { .. } => Category::Playback,
            Self::AbrSwitch { .. } | Self::AbrReadyStateChange { .. } => Category::Abr,
            Self::BufferOccupancyUpdate { .. } => Category::Buffer,
            Self::NetworkRequest { .. } | Self::NetworkRequestUpdate { .. } | Self::NetworkAbort { .. } => {
                Category::Network
            }
            Self::MetricsUpdated { .. } => Category::Generic,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamInitialised { .. } => "stream_initialised",
            Self::PlayerInteraction { .. } => "player_interaction",
            Self::Rebuffer { .. } => "rebuffer",
            Self::StreamEnd { .. } => "stream_end",
            Self::PlayheadProgress { .. } => "playhead_progress",
            Self::AbrSwitch { .. } => "switch",
            Self::AbrReadyStateChange { .. } => "readystate_change",
            Self::BufferOccupancyUpdate { .. } => "occupancy_update",
            Self::NetworkRequest { .. } => "request",
            Self::NetworkRequestUpdate { .. } => "request_update",
            Self::NetworkAbort { .. } => "abort",
            Self::MetricsUpdated { .. } => "metrics_updated",
        }
    }

    /// Projects this variant to the sparse JSON object the qlog format
    /// expects, omitting unset optional fields entirely rather than
    /// serializing them as `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::StreamInitialised { autoplay } => json!({ "autoplay": autoplay }),
            Self::PlayerInteraction { state, playhead_ms, playhead_frame, speed } => {
                let mut v = json!({ "state": state, "playhead_ms": playhead_ms, "speed": speed });
                if let Some(frame) = playhead_frame {
                    v["playhead_frame"] = json!(frame);
                }
                v
            }
            Self::Rebuffer { playhead_ms } => json!({ "playhead_ms": playhead_ms }),
            Self::StreamEnd { playhead_ms } => json!({ "playhead_ms": playhead_ms }),
            Self::PlayheadProgress { playhead_ms } => json!({ "playhead_ms": playhead_ms }),
            Self::AbrSwitch { media_type, from_id, from_bitrate, to_id, to_bitrate } => {
                let mut v = json!({ "media_type": media_type, "to_id": to_id, "to_bitrate": to_bitrate });
                if let Some(id) = from_id {
                    v["from_id"] = json!(id);
                }
                if let Some(bitrate) = from_bitrate {
                    v["from_bitrate"] = json!(bitrate);
                }
                v
            }
            Self::AbrReadyStateChange { state } => json!({ "state": state }),
            Self::BufferOccupancyUpdate { media_type, playout_ms, max_ms, byte_count, frame_count } => {
                let mut v = json!({ "media_type": media_type, "playout_ms": playout_ms, "max_ms": max_ms });
                if let Some(b) = byte_count {
                    v["byte_count"] = json!(b);
                }
                if let Some(f) = frame_count {
                    v["frame_count"] = json!(f);
                }
                v
            }
            Self::NetworkRequest { media_type, resource_url, range } => {
                let mut v = json!({ "media_type": media_type, "resource_url": resource_url });
                if let Some((start, end)) = range {
                    v["range"] = json!({ "start": start, "end": end });
                }
                v
            }
            Self::NetworkRequestUpdate { resource_url, bytes_received } => {
                json!({ "resource_url": resource_url, "bytes_received": bytes_received })
            }
            Self::NetworkAbort { resource_url } => json!({ "resource_url": resource_url }),
            Self::MetricsUpdated { min_rtt_ms, smoothed_rtt_ms, latest_rtt_ms, rtt_variance_ms } => {
                let mut v = json!({});
                if let Some(x) = min_rtt_ms {
                    v["min_rtt"] = json!(x);
                }
                if let Some(x) = smoothed_rtt_ms {
                    v["smoothed_rtt"] = json!(x);
                }
                if let Some(x) = latest_rtt_ms {
                    v["latest_rtt"] = json!(x);
                }
                if let Some(x) = rtt_variance_ms {
                    v["rtt_variance"] = json!(x);
                }
                v
            }
        }
    }
}
