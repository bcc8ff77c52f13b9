//! Media coordinator simulation.
//!
//! Wires simulated audio, video and network producers to a coordinator
//! and logs what the coordinator makes of them.

mod producers;

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediacoord_engine::Coordinator;
use mediacoord_ipc::{CoordinatorConfig, CoordinatorEvent};

/// Path to a JSON config file. Defaults apply when unset.
pub const CONFIG_ENV: &str = "MEDIACOORD_CONFIG";

/// How long to run, in seconds.
pub const DURATION_ENV: &str = "MEDIACOORD_SIM_SECS";

const DEFAULT_DURATION: Duration = Duration::from_secs(10);
const STATS_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediacoord_sim=info,mediacoord_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config() -> Result<CoordinatorConfig> {
    match env::var_os(CONFIG_ENV) {
        Some(path) => CoordinatorConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path.to_string_lossy())),
        None => Ok(CoordinatorConfig::default()),
    }
}

fn run_duration() -> Result<Duration> {
    match env::var(DURATION_ENV) {
        Ok(secs) => {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("{DURATION_ENV} must be a whole number of seconds"))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(DEFAULT_DURATION),
    }
}

pub fn run() -> Result<()> {
    init_logging();

    let config = load_config()?;
    let duration = run_duration()?;
    info!(?duration, "Media coordinator simulation starting");

    let coordinator = Coordinator::start(config).context("starting coordinator")?;
    let ctx = Arc::clone(coordinator.context());
    let should_stop = Arc::new(AtomicBool::new(false));

    let events = ctx.subscribe();
    let logger_stop = Arc::clone(&should_stop);
    let event_logger = thread::Builder::new()
        .name("sim-events".into())
        .spawn(move || loop {
            match events.recv_timeout(EVENT_POLL_INTERVAL) {
                Ok(CoordinatorEvent::MemoryWarning { current_mb }) => {
                    warn!(current_mb, "Memory warning")
                }
                Ok(event) => info!(event = event.name(), ?event, "Coordinator event"),
                Err(RecvTimeoutError::Timeout) if !logger_stop.load(Ordering::SeqCst) => {}
                Err(_) => break,
            }
        })
        .context("spawning event logger")?;

    let producers = producers::spawn_all(&ctx, &should_stop)?;

    let started = Instant::now();
    while started.elapsed() < duration {
        thread::sleep(STATS_INTERVAL);
        let stats = ctx.stats();
        info!(
            audio_sent = stats.audio_packets_sent,
            audio_received = stats.audio_packets_received,
            video_sent = stats.video_frames_sent,
            video_dropped = stats.video_frames_dropped,
            send_fps = %format_args!("{:.1}", stats.video_send_fps),
            latency_ms = stats.network_latency_ms,
            congested = stats.network_congested,
            voice = stats.voice_active,
            memory_mb = stats.current_memory_mb,
            "Stats"
        );
    }

    should_stop.store(true, Ordering::SeqCst);
    for producer in producers {
        if producer.join().is_err() {
            warn!("Producer thread panicked");
        }
    }

    coordinator.shutdown();
    let summary = serde_json::to_string_pretty(&ctx.stats()).context("serializing stats")?;

    if event_logger.join().is_err() {
        warn!("Event logger panicked");
    }
    debug!("Event logger stopped");

    info!("Final stats:\n{summary}");
    Ok(())
}
