//! Backlog-driven playback tempo
//!
//! When queued audio piles up faster than real time can drain it, playback
//! speeds up (pitch-preserved, via the time stretcher) until the backlog is
//! gone. The first samples of every block are free so that a single short
//! utterance does not count as congestion.

use super::Channel;

/// Samples per block exempt from the backlog metric
pub const BLOCK_ALLOWANCE: usize = 100;

/// Backlog samples per callback frame that add one full tempo step
pub const BACKLOG_DIVISOR: f64 = 200.0;

/// Never play slower than real time
pub const MIN_TEMPO: f64 = 1.0;

/// Double-speed catch-up cap
pub const MAX_TEMPO: f64 = 2.0;

/// Aggregate backlog across all channels, after the per-block allowance
pub fn aggregate_backlog(channels: &[Channel]) -> usize {
    channels.iter().map(|c| c.backlog(BLOCK_ALLOWANCE)).sum()
}

/// Playback tempo for a given backlog and callback frame count
///
/// Linear in the backlog, clamped to [1.0, 2.0].
pub fn tempo_for_backlog(backlog: usize, frames: usize) -> f64 {
    if frames == 0 {
        return MIN_TEMPO;
    }
    (1.0 + backlog as f64 / BACKLOG_DIVISOR / frames as f64).clamp(MIN_TEMPO, MAX_TEMPO)
}
