//! Synthetic segment fetcher: simulates packet-level delivery of each
//! segment at a time-varying bandwidth, feeding a [`PacketEvent`] stream to
//! the cross-layer accountant the way a real QUIC/HTTP stack's packet
//! callbacks would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use abr_engine::{FetchError, FetchRequest, FetchResponse, PacketEvent, SegmentFetcher, StaticManifest};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Bytes sent per simulated packet; a rough MTU-sized chunk.
const PACKET_BYTES: u32 = 1350;

pub struct DemoFetcher {
    manifest: Arc<StaticManifest>,
    packets: mpsc::Sender<PacketEvent>,
    /// Simulated link bandwidth in bits/sec; mutated by a background task to
    /// emulate network variability (see [`Self::set_bandwidth_bps`]).
    bandwidth_bps: AtomicU64,
}

impl DemoFetcher {
    pub fn new(manifest: Arc<StaticManifest>, packets: mpsc::Sender<PacketEvent>, initial_bandwidth_bps: u64) -> Self {
        Self { manifest, packets, bandwidth_bps: AtomicU64::new(initial_bandwidth_bps) }
    }

    pub fn set_bandwidth_bps(&self, bandwidth_bps: u64) {
        self.bandwidth_bps.store(bandwidth_bps, Ordering::Relaxed);
    }

    fn chunk_bits(&self, url: &str) -> u64 {
        let mut parts = url.split('/').skip(1);
        let rep_index: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let segment_number: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1);
        self.manifest
            .periods
            .first()
            .and_then(|p| p.adaptation_sets.first())
            .and_then(|set| set.representation(rep_index))
            .and_then(|rep| rep.chunk_bits(segment_number))
            .unwrap_or(0)
    }
}

#[async_trait]
impl SegmentFetcher for DemoFetcher {
    async fn fetch(&self, request: FetchRequest, cancel: CancellationToken) -> Result<FetchResponse, FetchError> {
        let total_bits = self.chunk_bits(&request.url).max(PACKET_BYTES as u64 * 8);
        let mut bits_sent = 0u64;
        let mut bytes_sent = 0u64;
        let start = std::time::Instant::now();

        while bits_sent < total_bits {
            let bandwidth_bps = self.bandwidth_bps.load(Ordering::Relaxed).max(1);
            let packet_duration = Duration::from_secs_f64(PACKET_BYTES as f64 * 8.0 / bandwidth_bps as f64);

            tokio::select! {
                _ = tokio::time::sleep(packet_duration) => {}
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            }

            bits_sent += PACKET_BYTES as u64 * 8;
            bytes_sent += PACKET_BYTES as u64;
            let _ = self.packets.try_send(PacketEvent::Received { length_bytes: PACKET_BYTES });
        }

        Ok(FetchResponse { bytes: bytes_sent, rtt: start.elapsed(), http_status: 200, protocol: "h3".into() })
    }
}
