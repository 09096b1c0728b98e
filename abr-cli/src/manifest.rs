//! Synthetic demo manifest: a handful of representations with deterministic
//! chunk-size lists, enough to exercise every ABR policy including BBA-2's
//! reservoir math.

use abr_engine::{AdaptationSet, Period, Representation, StaticManifest};

const SEGMENT_COUNT: usize = 120;

fn chunk_sizes_bits(avg_bitrate_bps: u64, segment_duration_ms: u64, seed: u64) -> Vec<u64> {
    let base_bits = avg_bitrate_bps * segment_duration_ms / 1000;
    (0..SEGMENT_COUNT)
        .map(|i| {
            // Deterministic +/-20% wobble per segment so max/avg ratios are
            // non-trivial without depending on randomness at manifest build time.
            let phase = ((i as u64 + seed) % 10) as f64 / 10.0;
            let wobble = 0.8 + 0.4 * phase;
            (base_bits as f64 * wobble) as u64
        })
        .collect()
}

/// Builds a four-rung ladder manifest, 30s of video at the given segment
/// duration.
pub fn demo_manifest(segment_duration_ms: u64, stream_duration_ms: u64) -> StaticManifest {
    let ladder = [(4_000_000u64, 2), (2_500_000, 0), (1_200_000, 6), (600_000, 4)];
    let representations = ladder
        .iter()
        .map(|&(bandwidth_bps, seed)| Representation {
            bandwidth_bps,
            codec: "avc1.640028".into(),
            height: 720,
            width: 1280,
            frame_rate: 30.0,
            mime_type: "video/mp4".into(),
            chunk_sizes_bits: chunk_sizes_bits(bandwidth_bps, segment_duration_ms, seed),
        })
        .collect();

    StaticManifest {
        stream_duration_ms,
        periods: vec![Period {
            adaptation_sets: vec![AdaptationSet { mime_type: "video/mp4".into(), segment_duration_ms, representations }],
        }],
    }
}
