//! muxd - adaptive audio multiplexer daemon
//!
//! Bridges several intermittent JACK input channels (radio and intercom
//! feeds) onto one output, always playing the channel with the strongest
//! claim to the air and time-stretching its backlog away. The daemon:
//! 1. Loads the YAML config
//! 2. Starts the JACK client (the engine lives on the JACK RT thread)
//! 3. Loops, logging periodic status read from the engine's atomics,
//!    until the JACK server goes away
//!
//! ## Command line flags
//!
//! - `--config <path>`: use a specific config file instead of the default

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;

use mux_core::audio::{start_audio_system, MuxConfig};
use mux_core::config::{default_config_path, load_config};

fn main() -> anyhow::Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    log::info!("muxd starting up");
    let config: MuxConfig = load_config(&config_path);

    let system = start_audio_system(&config)
        .context("could not start JACK audio system (is the server running?)")?;
    log::info!(
        "JACK client '{}' running ({} Hz, {} frames, {:.1} ms)",
        system.client_name,
        system.sample_rate,
        system.buffer_size,
        system.latency_ms
    );

    let atomics = &system.atomics;
    let shutdown = &system.shutdown;

    // Status heartbeat; the engine itself never logs from the RT thread
    loop {
        std::thread::sleep(Duration::from_secs(1));

        if shutdown.load(Ordering::Relaxed) {
            log::error!("JACK session ended, exiting");
            std::process::exit(1);
        }

        log::info!(
            "ch {} | tempo {:.2} | backlog {} | staged {} | dropped {}",
            atomics.current_channel(),
            atomics.tempo(),
            atomics.backlog(),
            atomics.staged(),
            atomics.dropped_blocks(),
        );
        if log::log_enabled!(log::Level::Debug) {
            for ch in 0..atomics.num_channels() {
                log::debug!("  affinity[{}] = {:.1}", ch, atomics.affinity(ch));
            }
        }
    }
}
