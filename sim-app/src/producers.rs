//! Synthetic media producers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::BufMut;
use tracing::{debug, trace};

use mediacoord_engine::CoordinatorContext;

const AUDIO_PACKET_INTERVAL: Duration = Duration::from_millis(20);
const VIDEO_FRAME_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / 30);
const LATENCY_PROBE_INTERVAL: Duration = Duration::from_millis(100);

const TARGET_FPS: u32 = 30;
const BASELINE_BITRATE_KBPS: u32 = 6000;

/// Talk/silence cycle for the audio producer, in packets.
const LOCAL_TALK_PACKETS: u64 = 100;
const REMOTE_TALK_PACKETS: u64 = 75;
const SILENCE_PACKETS: u64 = 50;

/// Start the audio, video and latency producers.
pub fn spawn_all(
    ctx: &Arc<CoordinatorContext>,
    should_stop: &Arc<AtomicBool>,
) -> Result<Vec<JoinHandle<()>>> {
    let producers: [(&str, fn(&CoordinatorContext, &AtomicBool)); 3] = [
        ("sim-audio", audio_loop),
        ("sim-video", video_loop),
        ("sim-network", latency_loop),
    ];

    producers
        .into_iter()
        .map(|(name, body)| {
            let ctx = Arc::clone(ctx);
            let should_stop = Arc::clone(should_stop);
            thread::Builder::new()
                .name(name.into())
                .spawn(move || body(&ctx, &should_stop))
                .with_context(|| format!("spawning {name}"))
        })
        .collect()
}

/// Alternates local speech, remote speech and silence.
fn audio_loop(ctx: &CoordinatorContext, should_stop: &AtomicBool) {
    let cycle = LOCAL_TALK_PACKETS + REMOTE_TALK_PACKETS + SILENCE_PACKETS;
    let mut packet: u64 = 0;

    while !should_stop.load(Ordering::SeqCst) {
        let slot = packet % cycle;
        if slot < LOCAL_TALK_PACKETS {
            let mut buffer = ctx.rent_small_buffer();
            buffer[..8].copy_from_slice(&packet.to_le_bytes());
            ctx.signal_audio_send();
            ctx.return_small_buffer(buffer);
        } else if slot < LOCAL_TALK_PACKETS + REMOTE_TALK_PACKETS {
            ctx.signal_audio_receive();
        }

        packet += 1;
        thread::sleep(AUDIO_PACKET_INTERVAL);
    }
    debug!(packets = packet, "Audio producer stopped");
}

/// Paces frames at 30 fps, honouring yield and skip decisions.
fn video_loop(ctx: &CoordinatorContext, should_stop: &AtomicBool) {
    let mut frame: u64 = 0;
    let mut next_frame = Instant::now();

    while !should_stop.load(Ordering::SeqCst) {
        let delay = ctx.video_yield_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        if ctx.should_skip_video_frame(frame) {
            ctx.signal_video_frame_dropped();
        } else {
            let mut buffer = ctx.rent_large_buffer();
            buffer.clear();
            buffer.put_u64_le(frame);
            buffer.resize(ctx.large_pool().buffer_size(), 0);
            ctx.signal_video_frame_sent();
            ctx.return_large_buffer(buffer);
        }

        if frame % u64::from(TARGET_FPS) == 0 {
            debug!(
                frame,
                bitrate_kbps = ctx.recommended_bitrate_kbps(BASELINE_BITRATE_KBPS),
                fps = ctx.recommended_fps(TARGET_FPS),
                "Encoder targets"
            );
        }

        frame += 1;
        next_frame += VIDEO_FRAME_INTERVAL;
        let now = Instant::now();
        if next_frame > now {
            thread::sleep(next_frame - now);
        } else {
            next_frame = now;
        }
    }
    debug!(frames = frame, "Video producer stopped");
}

/// Clear network with a congested stretch every 8 seconds.
fn latency_loop(ctx: &CoordinatorContext, should_stop: &AtomicBool) {
    let mut probe: u64 = 0;

    while !should_stop.load(Ordering::SeqCst) {
        ctx.record_latency(synthetic_latency_ms(probe));
        probe += 1;
        thread::sleep(LATENCY_PROBE_INTERVAL);
    }
    trace!(probes = probe, "Latency producer stopped");
}

/// Of every 80 probes, the first 60 are clear (30-59 ms) and the last 20
/// congested (180-238 ms).
fn synthetic_latency_ms(probe: u64) -> u32 {
    let jitter = (probe * 37 % 30) as u32;
    if probe % 80 < 60 {
        30 + jitter
    } else {
        180 + 2 * jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_cycle_has_a_congested_stretch() {
        let cycle: Vec<u32> = (0..80).map(synthetic_latency_ms).collect();
        assert!(cycle[..60].iter().all(|&ms| (30..60).contains(&ms)));
        assert!(cycle[60..].iter().all(|&ms| (180..240).contains(&ms)));
    }
}
