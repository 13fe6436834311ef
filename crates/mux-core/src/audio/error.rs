//! Audio backend error types
//!
//! Everything here is an initialization failure. The process callback has
//! no recoverable error conditions: absent input and insufficient buffered
//! audio are normal per-period occurrences, not errors.

use thiserror::Error;

/// Errors that can occur while bringing the JACK client up
#[derive(Error, Debug)]
pub enum AudioError {
    /// Could not open a client on the JACK server
    #[error("Failed to open JACK client: {0}")]
    ClientOpen(String),

    /// Could not register an input or output port
    #[error("Failed to register JACK port '{name}': {reason}")]
    PortRegistration { name: String, reason: String },

    /// Could not activate the client
    #[error("Failed to activate JACK client: {0}")]
    Activation(String),

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
