//! The multiplexer - callback driver and playback feeder
//!
//! One `Multiplexer` owns every per-callback mutable piece: the channels,
//! the selected-channel index, the time stretcher and the output staging
//! ring. The JACK processor owns the `Multiplexer` exclusively (no mutex,
//! no shared state) and drives `ingest` + `render` once per process
//! callback; tests drive the same entry points with synthetic blocks.
//! Nothing on this path locks, blocks, or logs; the only allocation is
//! pending-queue growth during ingest.

use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::audio::MuxConfig;
use crate::timestretch::TimeStretcher;
use crate::types::{Sample, MAX_BUFFER_SIZE};

use super::{aggregate_backlog, tempo_for_backlog, Channel, MuxAtomics, SelectionPolicy};

/// Minimum buffered callback periods before feeding starts
///
/// With less queued than this, the callback skips feeding entirely and
/// leaves the output silent for the period.
const MIN_FEED_PERIODS: usize = 2;

/// Staged callback periods at which the feeder stops for this invocation
///
/// Bounds the work done inside one real-time deadline.
const STAGE_AHEAD_PERIODS: usize = 4;

/// Channel multiplexer: selects one live input stream for the output,
/// absorbing timing drift by time-stretching the selected stream
///
/// Constructed once, after the sample rate is known, before the first
/// callback. The channel count is fixed for the life of the engine.
pub struct Multiplexer {
    channels: Vec<Channel>,
    /// Index of the channel holding the output; always in bounds
    current: usize,
    policy: SelectionPolicy,
    stretcher: TimeStretcher,
    /// Output staging ring; both halves live on the callback thread
    staging_tx: Producer<Sample>,
    staging_rx: Consumer<Sample>,
    atomics: Arc<MuxAtomics>,
    sample_rate: u32,
    /// Frames rendered since construction; the engine's only clock
    clock: u64,
    feed_buf: Vec<Sample>,
    pull_buf: Vec<Sample>,
}

impl Multiplexer {
    /// Create an engine for `config.num_channels` inputs at `sample_rate`
    pub fn new(config: &MuxConfig, sample_rate: u32) -> Self {
        assert!(
            config.num_channels > 0,
            "multiplexer needs at least one input channel"
        );
        let max_queued = config.max_pending_secs * sample_rate as usize;
        let staging_capacity = config.staging_secs * sample_rate as usize;
        let stretcher = TimeStretcher::new(sample_rate);
        log::debug!(
            "time stretcher ready ({} in / {} out frames of latency)",
            stretcher.input_latency(),
            stretcher.output_latency()
        );

        let (staging_tx, staging_rx) = RingBuffer::new(staging_capacity);
        Self {
            channels: (0..config.num_channels)
                .map(|_| Channel::new(max_queued))
                .collect(),
            current: 0,
            policy: config.selection,
            stretcher,
            staging_tx,
            staging_rx,
            atomics: Arc::new(MuxAtomics::new(config.num_channels)),
            sample_rate,
            clock: 0,
            feed_buf: vec![0.0; MAX_BUFFER_SIZE],
            pull_buf: vec![0.0; MAX_BUFFER_SIZE],
        }
    }

    /// Lock-free state snapshot for monitor threads
    ///
    /// Call once during initialization and keep the `Arc`.
    pub fn atomics(&self) -> Arc<MuxAtomics> {
        Arc::clone(&self.atomics)
    }

    /// Index of the channel currently holding the output
    pub fn current_channel(&self) -> usize {
        self.current
    }

    /// Read access to one channel's state
    pub fn channel(&self, idx: usize) -> Option<&Channel> {
        self.channels.get(idx)
    }

    /// Frames rendered since construction
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Feed one callback period of input for one channel
    ///
    /// `None` means the input produced nothing this period: a normal
    /// occurrence, not an error, and the channel simply does not
    /// contribute. Channels must be ingested in index order, all of them
    /// before `render`.
    pub fn ingest(&mut self, idx: usize, input: Option<&[Sample]>) {
        let Some(block) = input else { return };
        if block.is_empty() {
            return;
        }
        if let Some(channel) = self.channels.get_mut(idx) {
            let dropped = channel.ingest(block);
            if dropped > 0 {
                self.atomics
                    .dropped_blocks
                    .fetch_add(dropped, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }

    /// Produce one callback period of output
    ///
    /// Runs selection, derives the tempo from the aggregate backlog, feeds
    /// the selected channel through the stretcher into the staging ring,
    /// and copies one period out of the ring. When too little audio is
    /// buffered the output stays silent for this period.
    pub fn render(&mut self, out: &mut [Sample]) {
        out.fill(0.0);
        let frames = out.len();
        if frames == 0 {
            return;
        }
        let now = self.clock;

        // Selection happens exactly once, after all ingestion
        self.current = self
            .policy
            .select(&mut self.channels, self.current, now, self.sample_rate);

        let backlog = aggregate_backlog(&self.channels);
        let queued: usize = self.channels.iter().map(Channel::queued_samples).sum();
        let tempo = tempo_for_backlog(backlog, frames);

        if queued >= frames * MIN_FEED_PERIODS {
            self.stretcher.set_tempo(tempo);
            self.feed(frames, now);
            self.emit(out);
        }

        self.clock += frames as u64;
        self.publish(backlog, tempo);
    }

    /// Convenience driver: ingest every channel, then render
    ///
    /// `inputs` is indexed by channel; missing trailing channels are
    /// treated as absent. The JACK processor calls `ingest`/`render`
    /// directly to avoid building the slice, but the behavior is the same.
    pub fn process(&mut self, inputs: &[Option<&[Sample]>], out: &mut [Sample]) {
        for (idx, input) in inputs.iter().enumerate() {
            self.ingest(idx, *input);
        }
        self.render(out);
    }

    /// Drain the selected channel through the stretcher into staging
    ///
    /// Loops while the channel has audio and the staging ring holds less
    /// than `STAGE_AHEAD_PERIODS` callback periods, so per-callback work
    /// stays bounded no matter how much is queued.
    fn feed(&mut self, frames: usize, now: u64) {
        let stage_target = frames * STAGE_AHEAD_PERIODS;
        let take_len = frames.min(self.feed_buf.len());
        loop {
            if self.staging_rx.slots() >= stage_target {
                break;
            }
            let channel = &mut self.channels[self.current];
            let taken = channel.take_into(&mut self.feed_buf[..take_len]);
            if taken == 0 {
                break;
            }
            self.stretcher.push(&self.feed_buf[..taken]);
            channel.mark_played(now);

            // One push can yield output over several internal frames
            loop {
                let got = self.stretcher.pull(&mut self.pull_buf);
                if got == 0 {
                    break;
                }
                for &sample in &self.pull_buf[..got] {
                    if self.staging_tx.push(sample).is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Copy one period from staging into the output block
    ///
    /// If less than a full period is staged, the pre-zeroed silence
    /// stands; partial periods are never emitted.
    fn emit(&mut self, out: &mut [Sample]) {
        if self.staging_rx.slots() < out.len() {
            return;
        }
        for slot in out.iter_mut() {
            if let Ok(sample) = self.staging_rx.pop() {
                *slot = sample;
            }
        }
    }

    fn publish(&self, backlog: usize, tempo: f64) {
        use std::sync::atomic::Ordering;
        self.atomics
            .current_channel
            .store(self.current, Ordering::Relaxed);
        self.atomics.backlog.store(backlog as u64, Ordering::Relaxed);
        self.atomics
            .staged
            .store(self.staging_rx.slots() as u64, Ordering::Relaxed);
        self.atomics.store_tempo(tempo);
        for (idx, channel) in self.channels.iter().enumerate() {
            self.atomics.store_affinity(idx, channel.affinity());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: usize = 256;
    const RATE: u32 = 48000;

    fn test_engine(num_channels: usize) -> Multiplexer {
        let config = MuxConfig {
            num_channels,
            ..MuxConfig::default()
        };
        Multiplexer::new(&config, RATE)
    }

    /// A block loud enough to classify as active
    fn speech(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| 0.9 * (i as f32 * 440.0 * std::f32::consts::TAU / RATE as f32).sin())
            .collect()
    }

    fn silence(n: usize) -> Vec<Sample> {
        vec![0.0; n]
    }

    #[test]
    fn test_idle_callbacks_are_idempotent() {
        let mut mux = test_engine(2);
        let mut out = [0.0; N];
        for _ in 0..50 {
            mux.process(&[None, None], &mut out);
            assert_eq!(mux.current_channel(), 0);
            assert!(out.iter().all(|&s| s == 0.0));
        }
        assert_eq!(mux.channel(0).unwrap().queued_samples(), 0);
        assert_eq!(mux.channel(1).unwrap().queued_samples(), 0);
        assert_eq!(mux.clock(), 50 * N as u64);
    }

    #[test]
    fn test_all_silent_input_never_queues_or_switches() {
        let mut mux = test_engine(2);
        let silent = silence(N);
        let mut out = [0.0; N];
        for _ in 0..50 {
            mux.process(&[Some(&silent), Some(&silent)], &mut out);
            assert_eq!(mux.current_channel(), 0);
        }
        assert_eq!(mux.channel(0).unwrap().queued_samples(), 0);
        assert_eq!(mux.channel(1).unwrap().queued_samples(), 0);
    }

    #[test]
    fn test_single_period_is_below_the_feed_gate() {
        let mut mux = test_engine(2);
        let block = speech(N);
        let mut out = [0.0; N];
        // One queued period is less than MIN_FEED_PERIODS: no feeding yet
        mux.process(&[Some(&block), None], &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(mux.atomics().staged(), 0);
        assert_eq!(mux.channel(0).unwrap().queued_samples(), N);
    }

    #[test]
    fn test_active_channel_reaches_the_output() {
        let mut mux = test_engine(2);
        let block = speech(N);
        let silent = silence(N);
        let mut out = [0.0; N];

        let mut peak: f32 = 0.0;
        for _ in 0..500 {
            mux.process(&[Some(&block), Some(&silent)], &mut out);
            // channel 1 never queues audio, so channel 0 keeps the output
            assert_eq!(mux.current_channel(), 0);
            peak = peak.max(out.iter().fold(0.0f32, |m, s| m.max(s.abs())));
        }
        assert!(mux.atomics().staged() > 0);
        // Stretcher latency delays the first audible samples, but 500
        // periods is far past it: the output must have carried signal
        assert!(peak > 1e-4, "output stayed silent, peak {peak}");
    }

    #[test]
    fn test_backlogged_channel_takes_over_idle_one() {
        let mut mux = test_engine(2);
        let block = speech(N);
        let mut out = [0.0; N];
        for _ in 0..5 {
            mux.process(&[None, Some(&block)], &mut out);
        }
        // channel 0 empty scores 0; channel 1 has audio waiting
        assert_eq!(mux.current_channel(), 1);
    }

    #[test]
    fn test_selection_honors_playing_bonus_across_callbacks() {
        let mut mux = test_engine(2);
        let block = speech(N);
        let mut out = [0.0; N];

        // Give channel 0 the output first
        for _ in 0..3 {
            mux.process(&[Some(&block), None], &mut out);
        }
        assert_eq!(mux.current_channel(), 0);

        // Both channels now receive audio; channel 0 keeps the output
        // until channel 1's backlog outgrows the playing bonus
        let mut switched_at = None;
        for i in 0..200 {
            mux.process(&[Some(&block), Some(&block)], &mut out);
            if mux.current_channel() == 1 {
                switched_at = Some(i);
                break;
            }
        }
        // channel 1 is never fed while unselected, so its backlog grows
        // past channel 0's bonus-protected score eventually
        assert!(switched_at.is_some(), "selection never switched");
        assert!(switched_at.unwrap() > 0, "bonus hysteresis did not hold");
    }

    #[test]
    fn test_tempo_rises_with_backlog_and_stays_clamped() {
        let mut mux = test_engine(2);
        let block = speech(N);
        let mut out = [0.0; N];

        let mut last = 1.0;
        for _ in 0..300 {
            // Two fresh periods per rendered period: backlog must grow
            mux.ingest(0, Some(&block));
            mux.ingest(0, Some(&block));
            mux.render(&mut out);
            let tempo = mux.atomics().tempo();
            assert!((1.0..=2.0).contains(&tempo));
            last = tempo;
        }
        assert!(last > 1.0, "tempo never left real time");
    }

    #[test]
    fn test_atomics_track_engine_state() {
        let mut mux = test_engine(2);
        let block = speech(N);
        let mut out = [0.0; N];
        for _ in 0..5 {
            mux.process(&[None, Some(&block)], &mut out);
        }
        let atomics = mux.atomics();
        assert_eq!(atomics.current_channel(), mux.current_channel());
        assert_eq!(atomics.affinity(0), 0.0);
        assert!(atomics.affinity(1) > 0.0);
    }

    #[test]
    fn test_drained_channel_score_decays_to_zero_without_input() {
        let mut mux = test_engine(2);
        let block = speech(N);
        let mut out = [0.0; N];
        for _ in 0..4 {
            mux.process(&[Some(&block), None], &mut out);
        }
        assert!(mux.atomics().affinity(0) > 0.0);

        // Stop the input: with nothing left queued the score must fall
        for _ in 0..50 {
            mux.process(&[None, None], &mut out);
        }
        assert_eq!(mux.channel(0).unwrap().queued_samples(), 0);
        assert_eq!(mux.atomics().affinity(0), 0.0);
    }

    #[test]
    fn test_out_of_range_ingest_is_ignored() {
        let mut mux = test_engine(2);
        let block = speech(N);
        let mut out = [0.0; N];
        mux.ingest(5, Some(&block));
        mux.render(&mut out);
        assert_eq!(mux.channel(0).unwrap().queued_samples(), 0);
    }
}
