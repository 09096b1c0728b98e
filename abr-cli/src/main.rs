//! Demo driver for the adaptive bitrate control core: runs a synthetic
//! manifest and network through the playback loop with a chosen ABR policy,
//! writing a qlog-style event trace and a tagged metric log to disk.

mod fetcher;
mod manifest;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use abr_engine::{spawn_consumer, CrossLayerAccountant, MetricLogger, PlaybackLoop, PolicyKind, StreamConfig, Tracer};
use clap::Parser;
use fetcher::DemoFetcher;
use tokio::sync::mpsc;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Runs a synthetic streaming session through the ABR control core.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// ABR policy identifier, e.g. "conventional", "bba2", "bba2XL-base".
    #[arg(long, default_value = "bba2XL-base")]
    policy: String,

    /// Nominal segment duration in milliseconds.
    #[arg(long, default_value_t = 4000)]
    segment_duration_ms: u64,

    /// Total stream duration in milliseconds.
    #[arg(long, default_value_t = 120_000)]
    stream_duration_ms: u64,

    /// Maximum client buffer in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    max_buffer_ms: u64,

    /// Initial simulated link bandwidth in bits/sec.
    #[arg(long, default_value_t = 3_000_000)]
    initial_bandwidth_bps: u64,

    /// Directory the event trace and metric log are written to.
    #[arg(long, default_value = "demo-out")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let policy: PolicyKind = args.policy.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&args.out_dir)?;
    let trace_path = args.out_dir.join("trace.qlog.json");
    let metric_path = args.out_dir.join("metrics.log");

    info!(policy = %policy, out_dir = %args.out_dir.display(), "starting demo stream");

    let manifest = Arc::new(manifest::demo_manifest(args.segment_duration_ms, args.stream_duration_ms));

    let metrics = Arc::new(MetricLogger::start(Box::new(File::create(&metric_path)?), Duration::from_millis(100)));
    let buffer_level = metrics.buffer_level_handle();
    let accountant = Arc::new(CrossLayerAccountant::new(metrics.clone()));
    let tracer = Arc::new(Tracer::new("abr-demo", env!("CARGO_PKG_VERSION"), Box::new(File::create(&trace_path)?)));

    let (packet_tx, packet_rx) = mpsc::channel(4096);
    let fetcher = Arc::new(DemoFetcher::new(manifest.clone(), packet_tx, args.initial_bandwidth_bps));
    let consumer = spawn_consumer(accountant.clone(), tokio_stream::wrappers::ReceiverStream::new(packet_rx));

    let config = StreamConfig::new(args.max_buffer_ms, args.stream_duration_ms, policy);

    let mut playback = PlaybackLoop::new(
        manifest,
        0,
        0,
        fetcher,
        accountant,
        tracer,
        metrics,
        buffer_level,
        config,
    )?;

    playback.run().await?;
    consumer.abort();

    info!(trace = %trace_path.display(), metrics = %metric_path.display(), "demo stream complete");
    Ok(())
}
