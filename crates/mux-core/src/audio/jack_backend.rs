//! Native JACK audio backend
//!
//! Opens the JACK client, registers one input port per channel plus a mono
//! output port, and runs the multiplexer inside the process callback. The
//! engine is owned by the processor - no mutex, no shared mutable state -
//! and every diagnostic crosses to the non-real-time side through
//! `MuxAtomics` or the notification thread.
//!
//! ```text
//! ┌────────────────┐   in_1..in_N    ┌─────────────────────┐
//! │  JACK server   │────────────────►│  JACK RT thread     │
//! │  (or PipeWire) │◄────────────────│  (owns Multiplexer) │
//! └────────────────┘      out        └──────────┬──────────┘
//!                                               │ relaxed atomics
//!                                               ▼
//!                                    ┌─────────────────────┐
//!                                    │   monitor thread    │
//!                                    │  (status logging)   │
//!                                    └─────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jack::{AudioIn, AudioOut, Client, ClientOptions, ClientStatus, Control, Port, ProcessScope};

use super::config::MuxConfig;
use super::error::{AudioError, AudioResult};
use crate::engine::{Multiplexer, MuxAtomics};

/// Name of the mono output port
const OUTPUT_PORT: &str = "out";

/// JACK-specific audio handle
///
/// Keeps the JACK client active. Drop this to disconnect from JACK.
pub struct JackAudioHandle {
    _async_client: jack::AsyncClient<JackNotifications, JackProcessor>,
    sample_rate: u32,
    buffer_size: u32,
}

impl JackAudioHandle {
    /// Sample rate reported by the JACK server
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Callback period in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Result of starting the audio system
pub struct AudioSystemResult {
    /// Handle keeping audio alive (drop to stop)
    pub handle: JackAudioHandle,
    /// Engine state for lock-free monitor reads
    pub atomics: Arc<MuxAtomics>,
    /// Set by the notification thread when the JACK server goes away
    pub shutdown: Arc<AtomicBool>,
    /// Actual client name (JACK may rename on collision)
    pub client_name: String,
    /// Sample rate of the audio system
    pub sample_rate: u32,
    /// Callback period in frames
    pub buffer_size: u32,
    /// One-way output latency in milliseconds
    pub latency_ms: f32,
}

/// JACK process handler
///
/// Owns the `Multiplexer` exclusively - no mutex needed. The callback
/// ingests every input port in index order, then renders one period.
struct JackProcessor {
    inputs: Vec<Port<AudioIn>>,
    output: Port<AudioOut>,
    engine: Multiplexer,
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        for idx in 0..self.inputs.len() {
            self.engine.ingest(idx, Some(self.inputs[idx].as_slice(ps)));
        }
        self.engine.render(self.output.as_mut_slice(ps));
        Control::Continue
    }
}

/// JACK notification handler
///
/// Runs on the server's notification thread, so logging here is safe.
struct JackNotifications {
    shutdown: Arc<AtomicBool>,
}

impl jack::NotificationHandler for JackNotifications {
    fn shutdown(&mut self, _status: ClientStatus, reason: &str) {
        log::error!("JACK server shut down: {}", reason);
        self.shutdown.store(true, Ordering::Relaxed);
    }

    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        log::info!("JACK sample rate changed to: {}", srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

/// Start the JACK audio system
///
/// Creates the client, registers ports, builds the engine at the server's
/// sample rate, and starts processing. Every failure here is fatal for the
/// caller; nothing past activation can fail.
pub fn start_audio_system(config: &MuxConfig) -> AudioResult<AudioSystemResult> {
    config.validate()?;

    let (client, _status) = Client::new(&config.client_name, ClientOptions::NO_START_SERVER)
        .map_err(|e| AudioError::ClientOpen(e.to_string()))?;
    let actual_client_name = client.name().to_string();

    let sample_rate = client.sample_rate() as u32;
    let buffer_size = client.buffer_size();

    log::info!(
        "JACK client '{}' created (sample rate: {}Hz, buffer: {} frames, latency: {:.1}ms)",
        actual_client_name,
        sample_rate,
        buffer_size,
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    );

    let mut inputs = Vec::with_capacity(config.num_channels);
    for i in 1..=config.num_channels {
        let name = format!("in_{}", i);
        let port = client
            .register_port(&name, AudioIn::default())
            .map_err(|e| AudioError::PortRegistration {
                name,
                reason: e.to_string(),
            })?;
        inputs.push(port);
    }

    let output = client
        .register_port(OUTPUT_PORT, AudioOut::default())
        .map_err(|e| AudioError::PortRegistration {
            name: OUTPUT_PORT.to_string(),
            reason: e.to_string(),
        })?;

    // Build the engine only now that the sample rate is known
    let engine = Multiplexer::new(config, sample_rate);
    let atomics = engine.atomics();

    let shutdown = Arc::new(AtomicBool::new(false));
    let notifications = JackNotifications {
        shutdown: Arc::clone(&shutdown),
    };

    let processor = JackProcessor {
        inputs,
        output,
        engine,
    };

    let async_client = client
        .activate_async(notifications, processor)
        .map_err(|e| AudioError::Activation(e.to_string()))?;

    log::info!(
        "JACK client activated with {} input channels",
        config.num_channels
    );

    if config.connect_output {
        if let Err(e) = connect_output(&actual_client_name) {
            log::warn!("Auto-connect failed: {}", e);
        }
    }

    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;

    Ok(AudioSystemResult {
        handle: JackAudioHandle {
            _async_client: async_client,
            sample_rate,
            buffer_size,
        },
        atomics,
        shutdown,
        client_name: actual_client_name,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// Connect the output port to the first system playback pair
///
/// The mono output feeds both sides of the pair. Connection failures are
/// reported to the caller; a missing playback device is not fatal.
pub fn connect_output(client_name: &str) -> AudioResult<()> {
    let (client, _) = Client::new(
        &format!("{}_connect", client_name),
        ClientOptions::NO_START_SERVER,
    )
    .map_err(|e| AudioError::ClientOpen(e.to_string()))?;

    let mut playback = client.ports(
        Some(".*:playback_.*"),
        None,
        jack::PortFlags::IS_INPUT,
    );
    playback.sort();

    if playback.is_empty() {
        log::warn!("No JACK playback ports found for connection");
        return Ok(());
    }

    let our_port = format!("{}:{}", client_name, OUTPUT_PORT);
    for target in playback.iter().take(2) {
        if let Err(e) = client.connect_ports_by_name(&our_port, target) {
            log::warn!("Could not connect {} to {}: {}", our_port, target, e);
        } else {
            log::info!("Connected {} to {}", our_port, target);
        }
    }

    Ok(())
}
