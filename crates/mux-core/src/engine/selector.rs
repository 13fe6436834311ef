//! Affinity scoring and channel selection
//!
//! Every callback, each channel gets a priority score ("affinity"); the
//! channel with the highest score holds the output. More backlog, more time
//! off the air, and already being audible all raise a channel's claim; a
//! running silent streak lowers it. A channel with nothing queued scores
//! exactly 0 so it can never outrank one with audio waiting.

use serde::{Deserialize, Serialize};

use super::Channel;

/// Tunable selection parameters
///
/// The playing bonus is hysteresis: it decides how much better another
/// channel must score before the output switches away mid-stream, so its
/// magnitude directly sets switching latency. It is a parameter rather
/// than a constant for that reason.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Score bonus for the channel currently holding the output
    pub playing_bonus: f64,
    /// Score penalty per consecutive silent input block
    pub silence_penalty: f64,
    /// Score gained per second since the channel last reached the output
    pub idle_rate: f64,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            playing_bonus: 100.0,
            silence_penalty: 5.0,
            idle_rate: 1.0,
        }
    }
}

impl SelectionPolicy {
    /// Score one channel
    ///
    /// `now` is the engine frame clock; idle time is measured against the
    /// channel's last-active stamp on the same clock. An empty queue forces
    /// the score to exactly 0 regardless of every other term.
    pub fn affinity(&self, channel: &Channel, selected: bool, now: u64, sample_rate: u32) -> f64 {
        if !channel.has_audio() {
            return 0.0;
        }
        let idle_secs = now.saturating_sub(channel.last_active()) as f64 / sample_rate as f64;
        let bonus = if selected { self.playing_bonus } else { 0.0 };
        channel.queued_samples() as f64 + idle_secs * self.idle_rate + bonus
            - self.silence_penalty * f64::from(channel.silence_run())
    }

    /// Rescore every channel and decide which one holds the output
    ///
    /// Evaluated once per callback, after all channels have ingested. The
    /// selection moves only when another channel strictly outscores the
    /// current one; ties keep the incumbent. Scores are stored on the
    /// channels for later publication.
    pub fn select(
        &self,
        channels: &mut [Channel],
        current: usize,
        now: u64,
        sample_rate: u32,
    ) -> usize {
        for (idx, channel) in channels.iter_mut().enumerate() {
            let score = self.affinity(channel, idx == current, now, sample_rate);
            channel.set_affinity(score);
        }

        let mut best = current;
        let mut best_score = channels[current].affinity();
        for (idx, channel) in channels.iter().enumerate() {
            if idx != current && channel.affinity() > best_score {
                best = idx;
                best_score = channel.affinity();
            }
        }
        best
    }
}
