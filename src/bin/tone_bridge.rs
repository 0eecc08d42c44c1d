//! Plays a square-wave test tone through the fragment queue.
//!
//! A producer thread stands in for the TIA sound loop: it renders one
//! fragment at a time at the configured sample rate and hands it to the
//! queue. The configured backend consumes from the other end.
//!
//! Usage:
//!
//!   CONFIG_PATH=config.toml RUST_LOG=info cargo run --bin tone-bridge
//!
//! Set `backend = "null"` under `[audio]` to run without an output device.
//! Stop with Ctrl-C.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use vcs_audio_bridge::{
    audio::{tracing_sink, AudioQueue, FragmentWriter},
    config::Config,
    sound::create_sound,
};

const TONE_HZ: u32 = 440;
const TONE_AMPLITUDE: i16 = 4000;

fn load_config() -> anyhow::Result<Config> {
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".into());
    if !Path::new(&config_path).exists() {
        tracing::info!("{config_path} not found, using default config");
        return Ok(Config::default());
    }
    Config::from_file(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))
}

/// Renders fragments in real time until `running` is cleared.
fn spawn_tone_producer(
    queue: Arc<AudioQueue>,
    sample_rate: u32,
    running: Arc<AtomicBool>,
) -> anyhow::Result<thread::JoinHandle<()>> {
    let mut writer = FragmentWriter::new(queue).context("failed to start producer")?;
    let fragment_size = writer.queue().fragment_size();
    let fragment_duration =
        Duration::from_secs_f64(fragment_size as f64 / f64::from(sample_rate.max(1)));
    let half_period = (sample_rate / (TONE_HZ * 2)).max(1);

    let handle = thread::Builder::new()
        .name("tone-producer".into())
        .spawn(move || {
            let mut phase = 0u32;
            let mut deadline = Instant::now();
            while running.load(Ordering::Relaxed) {
                for _ in 0..fragment_size {
                    let level = if (phase / half_period) % 2 == 0 {
                        TONE_AMPLITUDE
                    } else {
                        -TONE_AMPLITUDE
                    };
                    phase = phase.wrapping_add(1);
                    if let Err(e) = writer.push_frame(level, level) {
                        tracing::error!("producer stopped: {e}");
                        return;
                    }
                }

                deadline += fragment_duration;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                } else {
                    deadline = now;
                }
            }
            tracing::info!("producer submitted {} fragments", writer.submitted());
        })?;
    Ok(handle)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = load_config()?;

    let queue = Arc::new(
        AudioQueue::from_config(&config.audio, &config.overflow_log, tracing_sink())
            .context("invalid audio config")?,
    );

    let mut sound = create_sound(&config.audio);
    sound
        .open(Arc::clone(&queue))
        .context("failed to open sound backend")?;

    let running = Arc::new(AtomicBool::new(true));
    let producer = spawn_tone_producer(
        Arc::clone(&queue),
        config.audio.sample_rate,
        Arc::clone(&running),
    )?;

    tracing::info!("playing {TONE_HZ} Hz test tone, ctrl-c to stop");
    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");

    running.store(false, Ordering::Relaxed);
    if tokio::task::spawn_blocking(move || producer.join())
        .await?
        .is_err()
    {
        tracing::warn!("producer thread panicked");
    }
    sound.close();
    queue.flush_overflow_log();

    Ok(())
}
