//! Event Tracer (C1): an append-only, time-ordered, categorized log of
//! every playback/ABR/buffer/network decision (spec §4.4), written as a
//! qlog-style JSON document.
//!
//! Grounded on `qlog/qlog.go`/`qlog/trace.go`/`qlog/event.go` for the
//! document shape, reimplemented with `serde_json::json!` instead of a
//! streaming encoder since this crate serializes the whole trace at
//! `close()` rather than incrementally.

mod event;

pub use event::{Category, EventData};

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::{mpsc, oneshot};

/// One recorded event, stamped relative to the tracer's reference time.
#[derive(Debug, Clone)]
pub struct Event {
    pub relative_time: Duration,
    pub data: EventData,
}

impl Event {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "time_ms": self.relative_time.as_secs_f64() * 1000.0,
            "name": format!("{}:{}", self.data.category().as_str(), self.data.name()),
            "data": self.data.to_json(),
        })
    }
}

/// How many queued events before `record()` starts applying the drop
/// policy. Scaled up from the Go implementation's `eventChanSize = 50` for
/// the higher event volume a Rust-native client can sustain.
const CHANNEL_CAPACITY: usize = 1024;
/// Bounded retries before even a structural event is dropped, keeping
/// `record()`'s blocking time bounded (spec §5).
const STRUCTURAL_RETRY_ATTEMPTS: usize = 8;

enum Command {
    Record(Event),
    Close(oneshot::Sender<()>),
}

/// Per-stream tracer. Construct one per stream rather than relying on the
/// source's process-wide singleton (spec §9 Design Notes).
pub struct Tracer {
    sender: mpsc::Sender<Command>,
    reference_time: Instant,
    dropped_streak: AtomicBool,
}

impl Tracer {
    /// `perspective`/`stream_id` are forwarded to `sink_factory` so the host
    /// can name the output file; the tracer itself has no opinion about
    /// paths (spec §6.4).
    pub fn new(title: impl Into<String>, code_version: impl Into<String>, sink: Box<dyn Write + Send>) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let title = title.into();
        let code_version = code_version.into();
        tokio::spawn(Self::run(receiver, sink, title, code_version));
        Self { sender, reference_time: Instant::now(), dropped_streak: AtomicBool::new(false) }
    }

    async fn run(mut receiver: mpsc::Receiver<Command>, mut sink: Box<dyn Write + Send>, title: String, code_version: String) {
        let mut events = Vec::new();
        loop {
            match receiver.recv().await {
                Some(Command::Record(event)) => events.push(event),
                Some(Command::Close(ack)) => {
                    let document = json!({
                        "qlog_format": "JSON",
                        "qlog_version": "0.3",
                        "title": title,
                        "code_version": code_version,
                        "traces": [{ "events": events.iter().map(Event::to_json).collect::<Vec<_>>() }],
                    });
                    if let Err(err) = serde_json::to_writer_pretty(&mut *sink, &document) {
                        tracing::error!(%err, "tracer failed to serialize closing document");
                    }
                    let _ = sink.flush();
                    let _ = ack.send(());
                    return;
                }
                None => return,
            }
        }
    }

    /// Non-blocking from the caller's perspective for `buffer`/`generic`
    /// events: on back-pressure they are dropped and a single warning is
    /// logged per contiguous drop streak. `playback`/`abr`/`network` events
    /// retry briefly before they too are dropped, keeping `record()`'s
    /// worst-case blocking bounded rather than unconditional (spec §5).
    pub fn record(&self, data: EventData) {
        let event = Event { relative_time: self.reference_time.elapsed(), data };
        let category = event.data.category();
        let mut command = Command::Record(event);

        for attempt in 0..=STRUCTURAL_RETRY_ATTEMPTS {
            match self.sender.try_send(command) {
                Ok(()) => {
                    self.dropped_streak.store(false, Ordering::Relaxed);
                    return;
                }
                Err(mpsc::error::TrySendError::Full(returned)) => {
                    command = returned;
                    if category.droppable() || attempt == STRUCTURAL_RETRY_ATTEMPTS {
                        break;
                    }
                    std::thread::yield_now();
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }

        if self.dropped_streak.compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
            tracing::warn!(category = category.as_str(), "tracer channel full; dropping event(s)");
        }
    }

    /// Flushes and closes the underlying sink. Calling this before the
    /// consumer has drained in-flight events is a programming error in the
    /// source; here it simply waits for the consumer to finish writing.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.sender.send(Command::Close(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);
    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn closes_and_serializes_a_parseable_document() {
        let buf = SharedBuf::default();
        let tracer = Tracer::new("test", "0.0.0", Box::new(buf.clone()));
        tracer.record(EventData::StreamInitialised { autoplay: true });
        tracer.record(EventData::Rebuffer { playhead_ms: 1200 });
        tracer.close().await;

        let bytes = buf.0.lock().unwrap().clone();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let events = parsed["traces"][0]["events"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["name"], "playback:stream_initialised");
    }

    #[tokio::test]
    async fn events_are_time_ordered_by_enqueue() {
        let buf = SharedBuf::default();
        let tracer = Tracer::new("test", "0.0.0", Box::new(buf.clone()));
        for i in 0..5u64 {
            tracer.record(EventData::PlayheadProgress { playhead_ms: i * 1000 });
        }
        tracer.close().await;

        let bytes = buf.0.lock().unwrap().clone();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let events = parsed["traces"][0]["events"].as_array().unwrap();
        let times: Vec<f64> = events.iter().map(|e| e["time_ms"].as_f64().unwrap()).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}
