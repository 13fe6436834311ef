//! Multiplexer configuration
//!
//! Everything tunable about a muxd instance lives here; the daemon loads
//! it from YAML and hands it to the backend. Values that are policy rather
//! than plumbing (the selection tuning) are nested so the config file
//! reads naturally.

use serde::{Deserialize, Serialize};

use super::error::{AudioError, AudioResult};
use crate::engine::SelectionPolicy;

/// Default number of input channels
pub const DEFAULT_NUM_CHANNELS: usize = 2;

/// Upper bound on input channels; this is an intercom bridge, not a desk
pub const MAX_CHANNELS: usize = 8;

/// Default output staging capacity in seconds of audio
pub const DEFAULT_STAGING_SECS: usize = 32;

/// Default cap on queued audio per channel, in seconds
///
/// Past this the oldest pending audio is dropped.
pub const DEFAULT_MAX_PENDING_SECS: usize = 120;

/// Configuration for one muxd instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// JACK client name
    pub client_name: String,

    /// Number of input channels (ports `in_1` .. `in_N`)
    pub num_channels: usize,

    /// Wire the output port to the first system playback pair on startup
    pub connect_output: bool,

    /// Channel selection tuning
    pub selection: SelectionPolicy,

    /// Output staging buffer capacity in seconds
    pub staging_secs: usize,

    /// Cap on queued audio per channel in seconds
    pub max_pending_secs: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            client_name: "muxd".to_string(),
            num_channels: DEFAULT_NUM_CHANNELS,
            connect_output: false,
            selection: SelectionPolicy::default(),
            staging_secs: DEFAULT_STAGING_SECS,
            max_pending_secs: DEFAULT_MAX_PENDING_SECS,
        }
    }
}

impl MuxConfig {
    /// Check the config before the backend spends real resources on it
    pub fn validate(&self) -> AudioResult<()> {
        if self.num_channels == 0 || self.num_channels > MAX_CHANNELS {
            return Err(AudioError::InvalidConfig(format!(
                "num_channels must be 1..={}, got {}",
                MAX_CHANNELS, self.num_channels
            )));
        }
        if self.staging_secs == 0 {
            return Err(AudioError::InvalidConfig(
                "staging_secs must be at least 1".to_string(),
            ));
        }
        if self.max_pending_secs == 0 {
            return Err(AudioError::InvalidConfig(
                "max_pending_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the number of input channels
    pub fn with_channels(mut self, num_channels: usize) -> Self {
        self.num_channels = num_channels;
        self
    }

    /// Set the JACK client name
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Set the selection tuning
    pub fn with_selection(mut self, selection: SelectionPolicy) -> Self {
        self.selection = selection;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MuxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_channels, 2);
        assert_eq!(config.client_name, "muxd");
    }

    #[test]
    fn test_channel_bounds_are_enforced() {
        assert!(MuxConfig::default().with_channels(0).validate().is_err());
        assert!(MuxConfig::default()
            .with_channels(MAX_CHANNELS + 1)
            .validate()
            .is_err());
        assert!(MuxConfig::default()
            .with_channels(MAX_CHANNELS)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = MuxConfig::default()
            .with_channels(4)
            .with_client_name("tower-bridge");
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: MuxConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.num_channels, 4);
        assert_eq!(back.client_name, "tower-bridge");
        assert_eq!(back.selection, config.selection);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: MuxConfig = serde_yaml::from_str("num_channels: 3\n").unwrap();
        assert_eq!(config.num_channels, 3);
        assert_eq!(config.client_name, "muxd");
        assert_eq!(config.selection.playing_bonus, 100.0);
    }
}
