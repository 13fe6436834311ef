//! Lock-free engine state for non-real-time observers
//!
//! The callback thread owns the `Multiplexer` exclusively and must never
//! log or block, so diagnostics leave the real-time path through this
//! aggregate of relaxed atomics instead. A monitor thread (or a UI) clones
//! the `Arc` and reads at its own pace; writes cost a handful of relaxed
//! stores per callback.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Relaxed-atomic snapshot of multiplexer state
pub struct MuxAtomics {
    /// Index of the channel currently holding the output
    pub current_channel: AtomicUsize,
    /// Playback tempo in thousandths (1000 = real time)
    pub tempo_millis: AtomicU32,
    /// Aggregate backlog in samples (after the per-block allowance)
    pub backlog: AtomicU64,
    /// Samples staged for output
    pub staged: AtomicU64,
    /// Pending blocks dropped to honor the queue cap, cumulative
    pub dropped_blocks: AtomicU64,
    /// Per-channel affinity scores, stored as f32 bit patterns
    affinities: Vec<AtomicU32>,
}

impl MuxAtomics {
    /// Create atomic state for `num_channels` channels
    pub fn new(num_channels: usize) -> Self {
        Self {
            current_channel: AtomicUsize::new(0),
            tempo_millis: AtomicU32::new(1000),
            backlog: AtomicU64::new(0),
            staged: AtomicU64::new(0),
            dropped_blocks: AtomicU64::new(0),
            affinities: (0..num_channels).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Currently selected channel index (lock-free)
    #[inline]
    pub fn current_channel(&self) -> usize {
        self.current_channel.load(Ordering::Relaxed)
    }

    /// Current playback tempo (lock-free)
    #[inline]
    pub fn tempo(&self) -> f64 {
        f64::from(self.tempo_millis.load(Ordering::Relaxed)) / 1000.0
    }

    /// Aggregate backlog in samples (lock-free)
    #[inline]
    pub fn backlog(&self) -> u64 {
        self.backlog.load(Ordering::Relaxed)
    }

    /// Samples staged for output (lock-free)
    #[inline]
    pub fn staged(&self) -> u64 {
        self.staged.load(Ordering::Relaxed)
    }

    /// Cumulative count of blocks dropped by the queue cap (lock-free)
    #[inline]
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks.load(Ordering::Relaxed)
    }

    /// Number of channels this state was built for
    pub fn num_channels(&self) -> usize {
        self.affinities.len()
    }

    /// Affinity of one channel (lock-free); 0.0 for an unknown index
    pub fn affinity(&self, channel: usize) -> f32 {
        self.affinities
            .get(channel)
            .map(|a| f32::from_bits(a.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    pub(crate) fn store_tempo(&self, tempo: f64) {
        self.tempo_millis
            .store((tempo * 1000.0) as u32, Ordering::Relaxed);
    }

    pub(crate) fn store_affinity(&self, channel: usize, affinity: f64) {
        if let Some(slot) = self.affinities.get(channel) {
            slot.store((affinity as f32).to_bits(), Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let atomics = MuxAtomics::new(2);
        assert_eq!(atomics.current_channel(), 0);
        assert_eq!(atomics.tempo(), 1.0);
        assert_eq!(atomics.backlog(), 0);
        assert_eq!(atomics.staged(), 0);
        assert_eq!(atomics.num_channels(), 2);
    }

    #[test]
    fn test_tempo_round_trip() {
        let atomics = MuxAtomics::new(2);
        atomics.store_tempo(1.75);
        assert_eq!(atomics.tempo(), 1.75);
    }

    #[test]
    fn test_affinity_round_trip() {
        let atomics = MuxAtomics::new(2);
        atomics.store_affinity(1, 322.5);
        assert_eq!(atomics.affinity(1), 322.5);
        // Out-of-range reads are harmless
        assert_eq!(atomics.affinity(7), 0.0);
    }
}
