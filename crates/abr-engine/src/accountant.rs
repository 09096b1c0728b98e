//! Cross-Layer Accountant (C5): consumes transport packet-arrival events,
//! maintains a running throughput/arrival-time series, and may cancel the
//! active segment fetch when it predicts the buffer will starve before the
//! segment finishes downloading.
//!
//! Grounded on `crosslayer/crosslayerHelpers.go` (`SegmentStart_predictStall`,
//! `stallPredictor`, `channelListenerThread`, `GetAverageThroughput`,
//! `GetRecentAverageThroughput`). The mutable sequences stay behind a
//! `parking_lot::Mutex`; the per-segment configuration is published as an
//! immutable snapshot (`SegmentSnapshot`) behind a second, short-held lock,
//! per the Design Notes preference for a lock-free-reading predictor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::abr::AbortLogic;
use crate::metrics::MetricSink;

/// Number of most-recent packets `RecentAverageThroughput` averages over.
const RECENT_WINDOW_PACKETS: usize = 3000;

/// One transport-layer event. Only [`PacketEvent::Received`] is inspected;
/// every other variant is forwarded untouched per spec §6.3.
#[derive(Debug, Clone, Copy)]
pub enum PacketEvent {
    Received { length_bytes: u32 },
    Other,
}

/// Immutable per-segment configuration published at `SegmentStart` and read
/// by the predictor without taking the sequence lock.
#[derive(Debug, Clone)]
struct SegmentSnapshot {
    seg_duration_s: f64,
    buffer_at_seg_start_ms: u64,
    seg_start_time: Instant,
    predict_stall: bool,
    abort_logic: AbortLogic,
    cur_chunk_bits: u64,
    next_lower_rep_next_chunk_bits: u64,
    lower_reservoir_ms: f64,
    lowest_bitrate_bps: u64,
    prediction_window_fraction: f64,
}

#[derive(Default)]
struct Sequences {
    packet_sizes: Vec<u32>,
    arrival_times: Vec<Instant>,
    timed_seconds_before_current: f64,
}

pub struct CrossLayerAccountant {
    snapshot: Mutex<Option<SegmentSnapshot>>,
    sequences: Mutex<Sequences>,
    cancel: Mutex<CancellationToken>,
    aborted: Arc<AtomicBool>,
    metrics: Arc<dyn MetricSink>,
}

impl CrossLayerAccountant {
    pub fn new(metrics: Arc<dyn MetricSink>) -> Self {
        Self {
            snapshot: Mutex::new(None),
            sequences: Mutex::new(Sequences::default()),
            cancel: Mutex::new(CancellationToken::new()),
            aborted: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    /// The token for the segment currently in flight. Callers must fetch a
    /// fresh one for each fetch — it is replaced at every `segment_start`/
    /// `start_timing` so an abort on one segment cannot leave the next one
    /// born already cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    pub fn aborted_flag(&self) -> Arc<AtomicBool> {
        self.aborted.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Idempotent: a second call on an already-cancelled token or an
    /// already-set flag is a no-op. `compare_exchange` keeps a predictor
    /// firing twice on the same segment from double-logging an abort.
    fn cancel(&self) -> bool {
        let first = self
            .aborted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.cancel.lock().cancel();
        first
    }

    /// §4.2 "Lifecycle per segment" step 1. Clears the packet/arrival
    /// sequences and starts timing; a second call without an intervening
    /// `stop_timing` is allowed and discards the previous predictor state
    /// (§4.2 Idempotence).
    #[allow(clippy::too_many_arguments)]
    pub fn segment_start(
        &self,
        seg_duration_s: f64,
        buffer_at_seg_start_ms: u64,
        max_buffer_ms: u64,
        lowest_bitrate_bps: u64,
        cur_chunk_bits: u64,
        next_lower_rep_next_chunk_bits: u64,
        lower_reservoir_ms: f64,
        abort_logic: AbortLogic,
        prediction_window_fraction: f64,
        predict_stall: bool,
    ) {
        let _ = max_buffer_ms;
        {
            let mut seq = self.sequences.lock();
            seq.packet_sizes.clear();
            seq.arrival_times.clear();
        }
        self.aborted.store(false, Ordering::SeqCst);
        *self.cancel.lock() = CancellationToken::new();
        *self.snapshot.lock() = Some(SegmentSnapshot {
            seg_duration_s,
            buffer_at_seg_start_ms,
            seg_start_time: Instant::now(),
            predict_stall,
            abort_logic,
            cur_chunk_bits,
            next_lower_rep_next_chunk_bits,
            lower_reservoir_ms,
            lowest_bitrate_bps,
            prediction_window_fraction,
        });
    }

    /// §4.2 step 1 "else" branch: timing without stall prediction, used
    /// when the current representation already is the lowest one (§9 guard).
    pub fn start_timing(&self, seg_duration_s: f64) {
        let mut guard = self.snapshot.lock();
        *guard = Some(SegmentSnapshot {
            seg_duration_s,
            buffer_at_seg_start_ms: 0,
            seg_start_time: Instant::now(),
            predict_stall: false,
            abort_logic: AbortLogic::Base,
            cur_chunk_bits: 0,
            next_lower_rep_next_chunk_bits: 0,
            lower_reservoir_ms: 0.0,
            lowest_bitrate_bps: 0,
            prediction_window_fraction: 0.0,
        });
        {
            let mut seq = self.sequences.lock();
            seq.packet_sizes.clear();
            seq.arrival_times.clear();
        }
        self.aborted.store(false, Ordering::SeqCst);
        *self.cancel.lock() = CancellationToken::new();
    }

    /// §4.2 step 3: clears `predict_stall` and folds the elapsed time into
    /// `total_timed_seconds` so throughput exports remain correct once the
    /// snapshot is replaced by the next segment.
    pub fn stop_timing(&self) {
        let mut snapshot_guard = self.snapshot.lock();
        if let Some(snapshot) = snapshot_guard.take() {
            let elapsed = snapshot.seg_start_time.elapsed().as_secs_f64();
            self.sequences.lock().timed_seconds_before_current += elapsed;
        }
    }

    /// §4.2 step 2: append one packet's length/arrival time and, if
    /// `predict_stall` is active for the current segment, run the predictor.
    pub fn on_packet(&self, event: PacketEvent) {
        let PacketEvent::Received { length_bytes } = event else { return };

        let predict_stall_now = {
            let mut seq = self.sequences.lock();
            seq.packet_sizes.push(length_bytes);
            seq.arrival_times.push(Instant::now());
            self.snapshot.lock().as_ref().map(|s| s.predict_stall).unwrap_or(false)
        };

        if predict_stall_now {
            self.stall_predictor();
        }
    }

    /// `AverageThroughput`: `8 * sum(sizes) / total_timed_seconds`,
    /// including elapsed time on the segment still in flight.
    pub fn average_throughput_bps(&self) -> f64 {
        let seq = self.sequences.lock();
        let total_bits: f64 = seq.packet_sizes.iter().map(|&b| b as f64 * 8.0).sum();
        let total_seconds = self.total_timed_seconds(&seq);
        if total_seconds <= 0.0 {
            0.0
        } else {
            total_bits / total_seconds
        }
    }

    /// `RecentAverageThroughput`: same, over only the last
    /// [`RECENT_WINDOW_PACKETS`] packets.
    pub fn recent_average_throughput_bps(&self) -> f64 {
        let seq = self.sequences.lock();
        let start = seq.packet_sizes.len().saturating_sub(RECENT_WINDOW_PACKETS);
        let total_bits: f64 = seq.packet_sizes[start..].iter().map(|&b| b as f64 * 8.0).sum();
        let total_seconds = self.total_timed_seconds(&seq);
        if total_seconds <= 0.0 {
            0.0
        } else {
            total_bits / total_seconds
        }
    }

    fn total_timed_seconds(&self, seq: &Sequences) -> f64 {
        let in_flight = self
            .snapshot
            .lock()
            .as_ref()
            .map(|s| s.seg_start_time.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        seq.timed_seconds_before_current + in_flight
    }

    /// `StallPredictor`, invoked per packet under the sequence lock. Never
    /// blocks: the cancel path is wait-free and idempotent (spec §5).
    fn stall_predictor(&self) {
        let snapshot = match self.snapshot.lock().clone() {
            Some(s) => s,
            None => return,
        };
        if !snapshot.predict_stall {
            return;
        }

        let (sum_bits, window_ms) = {
            let seq = self.sequences.lock();
            let sum_bits: f64 = seq.packet_sizes.iter().map(|&b| b as f64 * 8.0).sum();
            let window_ms = seq
                .arrival_times
                .first()
                .map(|&first| Instant::now().saturating_duration_since(first).as_secs_f64() * 1000.0)
                .unwrap_or(0.0);
            (sum_bits, window_ms)
        };

        self.metrics.log_tag("WINDOWTHROUGHPUT", &format!("{:.3}", if window_ms > 0.0 { sum_bits / window_ms } else { 0.0 }));
        self.metrics.log_tag("SUMBITS", &format!("{sum_bits:.0}"));
        self.metrics.log_tag("WINDOWTHRESHOLD", &format!("{:.3}", snapshot.prediction_window_fraction * snapshot.cur_chunk_bits as f64));
        self.metrics.log_tag("SEGMENTCHUNKSIZE", &format!("{}", snapshot.cur_chunk_bits));

        if !(sum_bits > snapshot.prediction_window_fraction * snapshot.cur_chunk_bits as f64
            && sum_bits < snapshot.cur_chunk_bits as f64
            && window_ms > 0.0)
        {
            return;
        }

        let bits_remaining = snapshot.cur_chunk_bits as f64 - sum_bits;
        let window_bitrate = sum_bits / window_ms; // bits per ms
        if window_bitrate <= 0.0 {
            return;
        }
        let required_ms = bits_remaining / window_bitrate;
        let seg_duration_ms = snapshot.seg_duration_s * 1000.0;
        let lowest_required_ms = (snapshot.lowest_bitrate_bps as f64 / snapshot.seg_duration_s.max(1e-9)) / window_bitrate;

        let elapsed_ms = snapshot.seg_start_time.elapsed().as_secs_f64() * 1000.0;
        let projected_buffer_ms = (snapshot.buffer_at_seg_start_ms as f64 - elapsed_ms).max(0.0);

        self.metrics.log_tag("ABORTLOGIC_REQUIREDTIME", &format!("{required_ms:.3}"));
        self.metrics.log_tag("ABORTLOGIC_LEVEL", &format!("{projected_buffer_ms:.3}"));

        let base_fires = projected_buffer_ms <= snapshot.lower_reservoir_ms
            && required_ms > projected_buffer_ms
            && lowest_required_ms < required_ms;

        let should_abort = match snapshot.abort_logic {
            AbortLogic::Base | AbortLogic::Rate => base_fires,
            AbortLogic::Double => {
                if base_fires {
                    true
                } else {
                    let next_lower_required_ms = snapshot.next_lower_rep_next_chunk_bits as f64 / window_bitrate;
                    next_lower_required_ms + required_ms > projected_buffer_ms + seg_duration_ms
                }
            }
        };

        if should_abort {
            self.metrics.log_tag("STALLPREDICTOR", "abort");
            if self.cancel() {
                tracing::warn!(required_ms, projected_buffer_ms, "cross-layer accountant aborting in-flight fetch");
            }
        }
    }
}

/// Spawns the Accountant Event Consumer activity (spec §5): one task per
/// stream, draining a transport event stream in arrival order and feeding
/// each packet to the accountant. Back-pressure on the upstream channel
/// ("drop oldest non-`PacketReceived`") is the transport source's
/// responsibility per §6.3; this consumer only forwards what it receives.
pub fn spawn_consumer<S>(accountant: Arc<CrossLayerAccountant>, mut events: S) -> tokio::task::JoinHandle<()>
where
    S: futures::Stream<Item = PacketEvent> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        use futures::StreamExt;
        while let Some(event) = events.next().await {
            accountant.on_packet(event);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::RecordingMetricSink;
    use std::thread::sleep;

    fn accountant() -> (CrossLayerAccountant, Arc<RecordingMetricSink>) {
        let sink = Arc::new(RecordingMetricSink::default());
        (CrossLayerAccountant::new(sink.clone()), sink)
    }

    #[test]
    fn no_prediction_without_predict_stall() {
        let (acc, _sink) = accountant();
        acc.start_timing(2.0);
        acc.on_packet(PacketEvent::Received { length_bytes: 10_000 });
        assert!(!acc.is_aborted());
    }

    #[test]
    fn aborts_when_base_logic_conditions_hold() {
        let (acc, _sink) = accountant();
        // Small chunk, slow window, low projected buffer: forces an abort.
        acc.segment_start(
            2.0,
            3_000,
            20_000,
            500_000,
            2_000_000, // cur_chunk_bits
            1_000_000,
            4_000.0, // lower_reservoir_ms
            AbortLogic::Base,
            0.15,
            true,
        );
        acc.on_packet(PacketEvent::Received { length_bytes: 50_000 });
        sleep(Duration::from_millis(5));
        acc.on_packet(PacketEvent::Received { length_bytes: 50_000 });
        assert!(acc.is_aborted());
        assert!(acc.cancel_token().is_cancelled());
    }

    #[test]
    fn double_logic_aborts_where_base_would_not() {
        // Buffer is well above the reservoir, so `Base`'s own condition
        // never fires; `Double` still aborts because the current chunk
        // plus the next lower rung's chunk can't both land inside one
        // more segment at the realized window throughput.
        let (base_acc, _sink) = accountant();
        base_acc.segment_start(2.0, 20_000, 30_000, 500_000, 200_000_000, 150_000_000, 3_000.0, AbortLogic::Base, 0.001, true);
        base_acc.on_packet(PacketEvent::Received { length_bytes: 50_000 });
        sleep(Duration::from_millis(80));
        base_acc.on_packet(PacketEvent::Received { length_bytes: 50_000 });
        assert!(!base_acc.is_aborted(), "Base should not abort with buffer far above the reservoir");

        let (double_acc, _sink) = accountant();
        double_acc.segment_start(2.0, 20_000, 30_000, 500_000, 200_000_000, 150_000_000, 3_000.0, AbortLogic::Double, 0.001, true);
        double_acc.on_packet(PacketEvent::Received { length_bytes: 50_000 });
        sleep(Duration::from_millis(80));
        double_acc.on_packet(PacketEvent::Received { length_bytes: 50_000 });
        assert!(double_acc.is_aborted(), "Double should abort on the same window Base tolerates");
    }

    #[test]
    fn second_cancel_is_idempotent() {
        let (acc, _sink) = accountant();
        assert!(acc.cancel());
        assert!(!acc.cancel());
    }

    #[test]
    fn segment_start_without_stop_timing_discards_previous_state() {
        let (acc, _sink) = accountant();
        acc.segment_start(2.0, 3_000, 20_000, 500_000, 2_000_000, 1_000_000, 4_000.0, AbortLogic::Base, 0.15, true);
        acc.on_packet(PacketEvent::Received { length_bytes: 50_000 });
        // re-arm without stop_timing: sequences must be cleared.
        acc.segment_start(2.0, 3_000, 20_000, 500_000, 2_000_000, 1_000_000, 4_000.0, AbortLogic::Base, 0.15, true);
        assert_eq!(acc.sequences.lock().packet_sizes.len(), 0);
    }
}
