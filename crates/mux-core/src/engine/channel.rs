//! Per-channel input accounting
//!
//! Each input port gets a `Channel` that accumulates non-silent audio into
//! utterance-sized pending blocks and tracks how long the channel has been
//! silent and when it last reached the output. Block boundaries are decided
//! by a small state machine: a breath pause inside a sentence keeps the
//! block open, a sustained silence closes it so stale audio is never glued
//! to fresh speech.

use std::collections::VecDeque;

use crate::silence::is_silent;
use crate::types::Sample;

/// Consecutive silent blocks tolerated inside an open block before it closes
pub const TRAILING_SILENCE_LIMIT: u32 = 10;

/// Ingest state machine
///
/// Transitions are driven by the silence verdict of each incoming block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// No open block; silent input has nothing to attach to and is dropped
    Idle,
    /// The tail block is open and the last input was active
    Accumulating,
    /// The tail block is open but the last `count` inputs were silent
    TrailingSilence(u32),
}

/// One contiguous run of queued audio awaiting playback
///
/// Consumption advances a read cursor instead of shifting the vector; the
/// block is removed from the queue once the cursor reaches the end, so a
/// zero-length block is never observable between callbacks.
#[derive(Debug)]
pub struct PendingBlock {
    samples: Vec<Sample>,
    read: usize,
}

impl PendingBlock {
    fn new(samples: &[Sample]) -> Self {
        Self {
            samples: samples.to_vec(),
            read: 0,
        }
    }

    fn append(&mut self, samples: &[Sample]) {
        self.samples.extend_from_slice(samples);
    }

    /// Samples not yet consumed by the feeder
    #[inline]
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.read
    }

    fn take_into(&mut self, dst: &mut [Sample]) -> usize {
        let n = dst.len().min(self.remaining());
        dst[..n].copy_from_slice(&self.samples[self.read..self.read + n]);
        self.read += n;
        n
    }

    fn discard(&mut self, n: usize) -> usize {
        let n = n.min(self.remaining());
        self.read += n;
        n
    }
}

/// Per-input-channel state: pending audio, silence tracking, priority score
pub struct Channel {
    queue: VecDeque<PendingBlock>,
    state: IngestState,
    silence_run: u32,
    /// Frame-clock timestamp of the last feed to the output
    last_active: u64,
    /// Cached sum of `remaining()` across the queue
    queued: usize,
    /// Cap on `queued`; oldest audio is dropped beyond it
    max_queued: usize,
    /// Most recently computed priority score
    affinity: f64,
}

impl Channel {
    /// Create a channel with the given cap on queued samples
    pub fn new(max_queued: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            state: IngestState::Idle,
            silence_run: 0,
            last_active: 0,
            queued: 0,
            max_queued,
            affinity: 0.0,
        }
    }

    /// Feed one callback period of input into the channel
    ///
    /// Classifies the block and runs the state machine. Returns the number
    /// of pending blocks dropped to honor the queue cap (normally 0).
    pub fn ingest(&mut self, block: &[Sample]) -> u64 {
        if is_silent(block) {
            self.silence_run = self.silence_run.saturating_add(1);
            match self.state {
                IngestState::Idle => {}
                IngestState::Accumulating => {
                    self.append_tail(block);
                    self.state = IngestState::TrailingSilence(1);
                }
                IngestState::TrailingSilence(count) if count < TRAILING_SILENCE_LIMIT => {
                    self.append_tail(block);
                    self.state = IngestState::TrailingSilence(count + 1);
                }
                IngestState::TrailingSilence(_) => {
                    // Sustained silence: the block is closed for good
                    self.state = IngestState::Idle;
                }
            }
        } else {
            self.silence_run = 0;
            match self.state {
                IngestState::Idle => {
                    self.queue.push_back(PendingBlock::new(block));
                    self.queued += block.len();
                }
                IngestState::Accumulating | IngestState::TrailingSilence(_) => {
                    self.append_tail(block);
                }
            }
            self.state = IngestState::Accumulating;
        }
        self.enforce_cap()
    }

    fn append_tail(&mut self, block: &[Sample]) {
        match self.queue.back_mut() {
            Some(tail) => {
                tail.append(block);
                self.queued += block.len();
            }
            None => {
                // The feeder drained the open block; start over
                self.queue.push_back(PendingBlock::new(block));
                self.queued += block.len();
            }
        }
    }

    fn enforce_cap(&mut self) -> u64 {
        let mut dropped = 0;
        while self.queued > self.max_queued && self.queue.len() > 1 {
            if let Some(oldest) = self.queue.pop_front() {
                self.queued -= oldest.remaining();
                dropped += 1;
            }
        }
        // A single utterance longer than the cap: lose its oldest samples
        if self.queued > self.max_queued {
            if let Some(only) = self.queue.front_mut() {
                let excess = self.queued - self.max_queued;
                self.queued -= only.discard(excess);
                dropped += 1;
            }
        }
        dropped
    }

    /// Copy up to `dst.len()` samples from the head block into `dst`
    ///
    /// Consumes from the head block only (fewer samples if it is shorter),
    /// removing the block once drained. Returns the number of samples
    /// copied; 0 when nothing is queued.
    pub fn take_into(&mut self, dst: &mut [Sample]) -> usize {
        let taken = match self.queue.front_mut() {
            Some(head) => head.take_into(dst),
            None => 0,
        };
        self.queued -= taken;
        if self.queue.front().is_some_and(|head| head.remaining() == 0) {
            self.queue.pop_front();
            if self.queue.is_empty() {
                self.state = IngestState::Idle;
            }
        }
        taken
    }

    /// Record that this channel just fed the output
    pub fn mark_played(&mut self, now: u64) {
        self.last_active = now;
    }

    /// Queued-but-unplayed samples across all pending blocks
    #[inline]
    pub fn queued_samples(&self) -> usize {
        self.queued
    }

    /// Whether any audio is queued
    #[inline]
    pub fn has_audio(&self) -> bool {
        self.queued > 0
    }

    /// Queued samples beyond the per-block allowance (congestion metric)
    pub fn backlog(&self, allowance: usize) -> usize {
        self.queue
            .iter()
            .map(|b| b.remaining().saturating_sub(allowance))
            .sum()
    }

    /// Consecutive silent input blocks observed
    #[inline]
    pub fn silence_run(&self) -> u32 {
        self.silence_run
    }

    /// Frame-clock timestamp of the last feed to the output
    #[inline]
    pub fn last_active(&self) -> u64 {
        self.last_active
    }

    /// Number of pending blocks
    pub fn pending_blocks(&self) -> usize {
        self.queue.len()
    }

    /// Most recently computed priority score
    #[inline]
    pub fn affinity(&self) -> f64 {
        self.affinity
    }

    pub(crate) fn set_affinity(&mut self, affinity: f64) {
        self.affinity = affinity;
    }
}
