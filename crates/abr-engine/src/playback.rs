//! Playback Loop (C7): orchestrates the manifest, fetcher, ABR engine,
//! cross-layer accountant and tracer/metrics for one stream. Implemented as
//! an explicit loop, never recursion (spec §9 Design Notes), with exactly
//! two suspension points: the fetch call and the buffer-cap sleep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::abr::{ChunkSizeSource, DecisionInput, Policy, PolicyKind};
use crate::accountant::CrossLayerAccountant;
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::fetch::{FetchError, FetchRequest, SegmentFetcher};
use crate::manifest::{AdaptationSet, ManifestView};
use crate::metrics::{BufferLevelHandle, MetricSink};
use crate::tracer::{EventData, Tracer};

struct AdaptationSetChunks<'a> {
    set: &'a AdaptationSet,
}

impl ChunkSizeSource for AdaptationSetChunks<'_> {
    fn chunk_bits(&self, rep_index: usize, segment_number: u32) -> Option<u64> {
        self.set.representation(rep_index)?.chunk_bits(segment_number)
    }

    fn chunk_count(&self, rep_index: usize) -> usize {
        self.set.representation(rep_index).map(|r| r.chunk_sizes_bits.len()).unwrap_or(0)
    }

    fn max_avg_ratio(&self, rep_index: usize) -> f64 {
        self.set.representation(rep_index).map(|r| r.max_avg_ratio()).unwrap_or(1.0)
    }
}

struct PlaybackState {
    buffer_ms: u64,
    playhead_ms: u64,
    segment_number: u32,
    current_index: usize,
    waiting_to_play: u32,
    stall_accumulator_ms: u64,
    throughput_history: Vec<f64>,
    segment_duration_total_ms: u64,
    started_playing: bool,
    /// The lower reservoir the most recent decision computed; seeded to the
    /// static BBA reservoir so the very first `SegmentStart` has something
    /// sensible to compare against before any decision has run.
    last_lower_reservoir_ms: f64,
}

pub struct PlaybackLoop<M: ManifestView> {
    manifest: Arc<M>,
    period_index: usize,
    set_index: usize,
    fetcher: Arc<dyn SegmentFetcher>,
    accountant: Arc<CrossLayerAccountant>,
    tracer: Arc<Tracer>,
    metrics: Arc<dyn MetricSink>,
    buffer_level: BufferLevelHandle,
    config: StreamConfig,
    policy: Policy,
}

impl<M: ManifestView> PlaybackLoop<M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manifest: Arc<M>,
        period_index: usize,
        set_index: usize,
        fetcher: Arc<dyn SegmentFetcher>,
        accountant: Arc<CrossLayerAccountant>,
        tracer: Arc<Tracer>,
        metrics: Arc<dyn MetricSink>,
        buffer_level: BufferLevelHandle,
        config: StreamConfig,
    ) -> Result<Self> {
        config.validate()?;
        let set = manifest
            .adaptation_set(period_index, set_index)
            .ok_or_else(|| Error::configuration("adaptation set not found"))?;
        validate_manifest_for_policy(set, &config.abr_policy)?;

        let policy = Policy::new(config.abr_policy);
        Ok(Self {
            manifest,
            period_index,
            set_index,
            fetcher,
            accountant,
            tracer,
            metrics,
            buffer_level,
            config,
            policy,
        })
    }

    fn current_set(&self) -> &AdaptationSet {
        self.manifest
            .adaptation_set(self.period_index, self.set_index)
            .expect("validated at construction")
    }

    /// Runs the stream to completion (spec §4.3 steps 1-10, looped).
    pub async fn run(&mut self) -> Result<()> {
        let set = self.current_set();
        let mut state = PlaybackState {
            buffer_ms: 0,
            playhead_ms: 0,
            segment_number: 1,
            current_index: set.lowest_index(),
            waiting_to_play: 0,
            stall_accumulator_ms: 0,
            throughput_history: Vec::new(),
            segment_duration_total_ms: 0,
            started_playing: false,
            last_lower_reservoir_ms: self.config.max_buffer_ms as f64 * 0.1,
        };

        self.tracer.record(EventData::StreamInitialised { autoplay: true });
        self.metrics.log_tag("HIGHESTBANDWIDTH", &format!("{}", set.bandwidth_list()[set.highest_index()]));
        self.metrics.log_tag("BUFFERSIZE", &format!("{}", self.config.max_buffer_ms));
        self.metrics.log_tag("STARTTIME", &format!("{}", 0));

        loop {
            let loop_prev_tick = Instant::now();
            let set = self.current_set();
            let segment_duration_ms = set.segment_duration_ms;
            let bandwidth_list = set.bandwidth_list();
            let lowest_index = set.lowest_index();
            let highest_index = set.highest_index();

            // Step 1: chunk size of the representation one rung below
            // current, for the segment about to be fetched next.
            let next_lower_index = (state.current_index + 1).min(lowest_index);
            let next_lower_rep_next_chunk_bits = set
                .representation(next_lower_index)
                .and_then(|r| r.chunk_bits(state.segment_number + 1))
                .unwrap_or(0);
            let cur_chunk_bits =
                set.representation(state.current_index).and_then(|r| r.chunk_bits(state.segment_number)).unwrap_or(0);
            let lowest_bitrate_bps = bandwidth_list[lowest_index];

            // Step 2: arm stall prediction only for the policies that act on
            // it, and only when there's something to gain (§9 guard).
            let predict_stall = self.policy.abort_logic().is_some() && state.current_index != lowest_index;
            if predict_stall {
                self.accountant.segment_start(
                    segment_duration_ms as f64 / 1000.0,
                    state.buffer_ms,
                    self.config.max_buffer_ms,
                    lowest_bitrate_bps,
                    cur_chunk_bits,
                    next_lower_rep_next_chunk_bits,
                    state.last_lower_reservoir_ms,
                    self.policy.abort_logic().unwrap(),
                    self.config.prediction_window_fraction,
                    true,
                );
            } else {
                self.accountant.start_timing(segment_duration_ms as f64 / 1000.0);
            }

            // Step 3
            let chosen_bandwidth = bandwidth_list[state.current_index];
            self.metrics.log_tag(
                "SegmentDownloadStart",
                &format!("segment={} index={} bandwidth_bps={}", state.segment_number, state.current_index, chosen_bandwidth),
            );
            let resource_url = format!("segment/{}/{}/{}", self.set_index, state.current_index, state.segment_number);
            tracing::debug!(segment = state.segment_number, index = state.current_index, "starting segment download");
            self.tracer.record(EventData::NetworkRequest {
                media_type: set.mime_type.clone(),
                resource_url: resource_url.clone(),
                range: None,
            });

            // Step 4: the only suspension point besides the buffer-cap sleep.
            let cancel = self.accountant.cancel_token();
            let fetch_start = Instant::now();
            let fetch_result =
                self.fetcher.fetch(FetchRequest { url: resource_url.clone(), byte_range: None }, cancel).await;

            // Step 5a
            self.accountant.stop_timing();

            let (mut delivery_ms, mut bytes) = match fetch_result {
                Ok(response) => (fetch_start.elapsed().as_millis() as u64, response.bytes),
                Err(FetchError::Cancelled) => (fetch_start.elapsed().as_millis() as u64, 0),
                Err(other) => return Err(Error::FetchFailed(other.to_string())),
            };

            // Step 5c: the abort path.
            if self.accountant.is_aborted() {
                tracing::warn!(segment = state.segment_number, "segment aborted by cross-layer accountant, retrying at lowest index");
                self.policy.abort_reset(state.buffer_ms);
                state.current_index = lowest_index;
                self.tracer.record(EventData::NetworkAbort { resource_url: resource_url.clone() });

                let retry_url = format!("segment/{}/{}/{}", self.set_index, lowest_index, state.segment_number);
                let retry_start = Instant::now();
                let retry_response = self
                    .fetcher
                    .fetch(FetchRequest { url: retry_url, byte_range: None }, CancellationToken::new())
                    .await
                    .map_err(|e| Error::FetchFailed(e.to_string()))?;
                delivery_ms = retry_start.elapsed().as_millis() as u64;
                bytes = retry_response.bytes;
            }

            let run_ms = Instant::now().duration_since(loop_prev_tick).as_millis() as u64;

            // Step 6: buffer accounting.
            if state.waiting_to_play < self.config.init_buffer_segments {
                state.buffer_ms += segment_duration_ms;
                state.waiting_to_play += 1;
            } else {
                let drained = (run_ms as f64 * self.config.stream_speed) as u64;
                if drained > state.buffer_ms {
                    let stall_ms = drained - state.buffer_ms;
                    state.stall_accumulator_ms += stall_ms;
                    self.tracer.record(EventData::Rebuffer { playhead_ms: state.playhead_ms });
                    self.tracer.record(EventData::BufferOccupancyUpdate {
                        media_type: set.mime_type.clone(),
                        playout_ms: 0,
                        max_ms: self.config.max_buffer_ms,
                        byte_count: None,
                        frame_count: None,
                    });
                }
                state.buffer_ms = state.buffer_ms.saturating_sub(drained) + segment_duration_ms;
            }

            if !state.started_playing && state.waiting_to_play >= self.config.init_buffer_segments {
                state.started_playing = true;
                self.tracer.record(EventData::PlayerInteraction {
                    state: "play",
                    playhead_ms: 0,
                    playhead_frame: None,
                    speed: self.config.stream_speed,
                });
            }

            // Step 7: buffer-cap sleep, the second suspension point.
            if state.buffer_ms > self.config.max_buffer_ms {
                let overrun_ms = state.buffer_ms - self.config.max_buffer_ms;
                let sleep_ms = (overrun_ms as f64 / self.config.stream_speed) as u64;
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                state.buffer_ms -= (sleep_ms as f64 * self.config.stream_speed) as u64;
            }

            // Step 8
            self.tracer.record(EventData::NetworkRequestUpdate { resource_url: resource_url.clone(), bytes_received: bytes });
            self.metrics.log_tag("SegmentArrived", &format!("segment={} bytes={}", state.segment_number, bytes));
            state.segment_duration_total_ms += segment_duration_ms;
            state.playhead_ms = state.segment_duration_total_ms.saturating_sub(state.buffer_ms);
            self.tracer.record(EventData::PlayheadProgress { playhead_ms: state.playhead_ms });
            self.buffer_level.set(state.buffer_ms);
            self.metrics.log_tag("BUFFERLEVEL", &format!("{}", state.buffer_ms));

            // Step 9: ask the ABR engine for the next representation.
            let new_throughput_bps = if delivery_ms > 0 { bytes as f64 * 8.0 / (delivery_ms as f64 / 1000.0) } else { 0.0 };
            let chunks = AdaptationSetChunks { set };
            let input = DecisionInput {
                bandwidth_list: &bandwidth_list,
                lowest_index,
                highest_index,
                buffer_ms: state.buffer_ms,
                max_buffer_ms: self.config.max_buffer_ms,
                previous_index: state.current_index,
                segment_duration_ms,
                segment_number: state.segment_number,
                new_throughput_bps,
                last_delivery_ms: delivery_ms,
                cross_layer_throughput_bps: self.accountant.average_throughput_bps(),
                cross_layer_recent_throughput_bps: self.accountant.recent_average_throughput_bps(),
                lowest_bitrate_bps,
                chunks: &chunks,
            };
            let decision = self.policy.decide(&input);
            state.throughput_history.push(new_throughput_bps);
            if let Some(reservoir) = decision.lower_reservoir_ms {
                state.last_lower_reservoir_ms = reservoir;
                self.metrics.log_tag("LOWERRESERVOIR", &format!("{reservoir:.3}"));
            }
            if let Some(pct) = decision.percentage {
                self.metrics.log_tag("PERCENTAGE", &format!("{pct:.6}"));
            }
            if let Some(bitrate) = decision.desired_bitrate_bps {
                self.metrics.log_tag("DESIREDBITRATE", &format!("{bitrate:.3}"));
            }

            if decision.index != state.current_index {
                self.tracer.record(EventData::AbrSwitch {
                    media_type: set.mime_type.clone(),
                    from_id: Some(state.current_index),
                    from_bitrate: Some(bandwidth_list[state.current_index]),
                    to_id: decision.index,
                    to_bitrate: bandwidth_list[decision.index],
                });
            }
            state.current_index = decision.index;

            // Step 10
            state.segment_number += 1;
            if state.segment_duration_total_ms + segment_duration_ms > self.config.stream_duration_ms {
                break;
            }
        }

        self.tracer.record(EventData::StreamEnd { playhead_ms: state.playhead_ms });
        self.tracer.close().await;
        Ok(())
    }
}

fn validate_manifest_for_policy(set: &AdaptationSet, policy: &PolicyKind) -> Result<()> {
    if matches!(policy, PolicyKind::Bba2 { .. }) {
        for (index, rep) in set.representations.iter().enumerate() {
            if rep.chunk_sizes_bits.is_empty() {
                return Err(Error::manifest_unsupported("bba2", index));
            }
        }
    }
    Ok(())
}
