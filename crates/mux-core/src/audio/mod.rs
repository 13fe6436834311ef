//! JACK audio backend for muxd
//!
//! Connects the multiplexer engine to a JACK server: one input port per
//! channel, one mono output port, and a process callback that owns the
//! engine exclusively.
//!
//! # Architecture
//!
//! The audio system follows a lock-free design for real-time safety:
//!
//! - **JACK RT thread**: owns the `Multiplexer`, ingests every input port
//!   and renders the output, once per process callback
//! - **Monitor thread**: reads engine state via relaxed atomics (no locks)
//! - **Notification thread**: JACK server events (xrun, shutdown) are
//!   logged here, never on the RT thread

mod config;
mod error;
mod jack_backend;

pub use config::{
    MuxConfig, DEFAULT_MAX_PENDING_SECS, DEFAULT_NUM_CHANNELS, DEFAULT_STAGING_SECS, MAX_CHANNELS,
};
pub use error::{AudioError, AudioResult};
pub use jack_backend::{connect_output, start_audio_system, AudioSystemResult, JackAudioHandle};
