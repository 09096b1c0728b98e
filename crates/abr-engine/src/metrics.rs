//! Metric Logger (C2): a line-oriented text log independent of the
//! structured event tracer, plus a background poller that samples buffer
//! occupancy. Grounded in
//! `examples/original_source/.../logging/metricLogging.go`
//! (`StartLogger`/`WriteLog`/`CalculateCurrentBufferOccupancy`/`MetricsPoller`)
//! and, for the non-blocking-channel shape, `mesio-engine`'s own metrics
//! collectors (`crates/mesio/src/hls/metrics.rs`).

use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Anything that can receive a tagged log line. Implemented by
/// [`MetricLogger`] and by a no-op/recording double in tests, so callers
/// like [`crate::accountant::CrossLayerAccountant`] don't depend on the
/// concrete logger.
pub trait MetricSink: Send + Sync {
    fn log_tag(&self, tag: &str, message: &str);
}

/// Handle the Playback Loop updates after every buffer-accounting step;
/// the poller extrapolates occupancy between updates the way
/// `CalculateCurrentBufferOccupancy` does from `lastBufferUpdate`.
#[derive(Clone)]
pub struct BufferLevelHandle {
    level_ms: Arc<AtomicI64>,
    set_at: Arc<Mutex<Instant>>,
}

impl BufferLevelHandle {
    fn new() -> Self {
        Self { level_ms: Arc::new(AtomicI64::new(0)), set_at: Arc::new(Mutex::new(Instant::now())) }
    }

    pub fn set(&self, buffer_ms: u64) {
        self.level_ms.store(buffer_ms as i64, Ordering::SeqCst);
        *self.set_at.lock() = Instant::now();
    }

    /// `CalculateCurrentBufferOccupancy`: last known level minus elapsed
    /// time since it was set, floored at 0.
    pub fn current(&self) -> i64 {
        let level = self.level_ms.load(Ordering::SeqCst);
        let elapsed_ms = self.set_at.lock().elapsed().as_millis() as i64;
        (level - elapsed_ms).max(0)
    }
}

pub struct MetricLogger {
    sender: mpsc::Sender<String>,
    buffer_level: BufferLevelHandle,
    start: Instant,
}

impl MetricLogger {
    /// Spawns the writer task and the buffer-occupancy poller
    /// (`poll_interval`, default 100ms per spec §6.7).
    pub fn start(mut sink: Box<dyn Write + Send>, poll_interval: Duration) -> Self {
        let (sender, mut receiver) = mpsc::channel::<String>(1024);
        let start = Instant::now();

        tokio::spawn(async move {
            while let Some(line) = receiver.recv().await {
                if let Err(err) = sink.write_all(line.as_bytes()) {
                    tracing::warn!(%err, "metric logger write failed");
                    break;
                }
            }
        });

        let logger = Self { sender, buffer_level: BufferLevelHandle::new(), start };
        logger.spawn_poller(poll_interval);
        logger
    }

    fn spawn_poller(&self, poll_interval: Duration) {
        let sender = self.sender.clone();
        let buffer_level = self.buffer_level.clone();
        let start = self.start;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                let ms_since_start = start.elapsed().as_millis();
                let line = format!("{ms_since_start} BUFFERLEVEL {}\n", buffer_level.current());
                if sender.send(line).await.is_err() {
                    break;
                }
            }
        });
    }

    pub fn buffer_level_handle(&self) -> BufferLevelHandle {
        self.buffer_level.clone()
    }
}

impl MetricSink for MetricLogger {
    fn log_tag(&self, tag: &str, message: &str) {
        let ms_since_start = self.start.elapsed().as_millis();
        let line = format!("{ms_since_start} {tag} {message}\n");
        // Never blocks the caller; a full channel silently drops the
        // sample, matching the tracer's non-blocking contract.
        let _ = self.sender.try_send(line);
    }
}
