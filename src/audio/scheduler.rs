//! Jitter-buffered playback scheduler
//!
//! Smooths bursty block arrival into the steady pull cadence of the audio
//! callback. The pull side runs on the output device's callback thread and
//! must never wait on control flow: the queue is guarded by one short
//! mutex section and all statistics are relaxed atomics.
//!
//! Latency policy: total queued audio is capped at a configured ceiling.
//! When a push would exceed it, the *oldest* queued blocks are dropped
//! first, preserving the order of what remains. Underruns are filled with
//! silence and counted, never surfaced as errors.

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Playback sample rate the queue is timed against
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Queued-audio ceiling in milliseconds
    pub ceiling_ms: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::constants::DEFAULT_SAMPLE_RATE,
            channels: crate::constants::DEFAULT_CHANNELS,
            ceiling_ms: crate::constants::DEFAULT_JITTER_CEILING_MS,
        }
    }
}

/// Best-effort latency telemetry pushed from the audio context.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerTelemetry {
    pub queued_ms: u32,
    pub underruns: u64,
}

struct Queue {
    blocks: VecDeque<Vec<f32>>,
    /// Drain position inside the front block
    cursor: usize,
    /// Total queued samples, cursor already subtracted
    queued: usize,
}

/// Bounded FIFO of decoded sample blocks feeding the audio callback.
pub struct PlaybackScheduler {
    config: SchedulerConfig,
    /// Ceiling in interleaved samples
    ceiling: usize,
    queue: Mutex<Queue>,

    underruns: AtomicU64,
    blocks_pushed: AtomicU64,
    blocks_dropped: AtomicU64,
    samples_pulled: AtomicU64,

    /// Micros since `started` of the last underrun warning
    last_underrun_log_us: AtomicU64,
    started: Instant,

    telemetry: Option<Sender<SchedulerTelemetry>>,
}

/// Minimum spacing between underrun warnings
const UNDERRUN_LOG_INTERVAL_US: u64 = 1_000_000;

/// Telemetry is sent at most once per this many pulls
const TELEMETRY_PULL_INTERVAL: u64 = 32;

impl PlaybackScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let ceiling = (config.sample_rate as usize * config.ceiling_ms as usize / 1000)
            * config.channels.max(1) as usize;
        Self {
            config,
            ceiling,
            queue: Mutex::new(Queue {
                blocks: VecDeque::new(),
                cursor: 0,
                queued: 0,
            }),
            underruns: AtomicU64::new(0),
            blocks_pushed: AtomicU64::new(0),
            blocks_dropped: AtomicU64::new(0),
            samples_pulled: AtomicU64::new(0),
            last_underrun_log_us: AtomicU64::new(0),
            started: Instant::now(),
            telemetry: None,
        }
    }

    /// Attach a best-effort telemetry channel (audio → control, never blocks).
    pub fn with_telemetry(mut self, tx: Sender<SchedulerTelemetry>) -> Self {
        self.telemetry = Some(tx);
        self
    }

    /// Queue a block of interleaved samples for playback.
    ///
    /// If the queue would exceed the ceiling, the oldest blocks are dropped
    /// until it fits again.
    pub fn push(&self, block: Vec<f32>) {
        if block.is_empty() {
            return;
        }

        let mut dropped = 0u64;
        {
            let mut q = self.queue.lock();
            q.queued += block.len();
            q.blocks.push_back(block);

            while q.queued > self.ceiling && q.blocks.len() > 1 {
                if let Some(oldest) = q.blocks.pop_front() {
                    q.queued -= oldest.len() - q.cursor;
                    q.cursor = 0;
                    dropped += 1;
                }
            }
        }

        self.blocks_pushed.fetch_add(1, Ordering::Relaxed);
        if dropped > 0 {
            self.blocks_dropped.fetch_add(dropped, Ordering::Relaxed);
            tracing::debug!(dropped, "jitter ceiling exceeded, dropped oldest blocks");
        }
    }

    /// Fill `out` with queued samples, zero-filling any shortfall.
    ///
    /// Called from the audio callback thread.
    pub fn pull(&self, out: &mut [f32]) {
        let mut filled = 0usize;

        {
            let mut q = self.queue.lock();
            while filled < out.len() {
                let Some(front) = q.blocks.front() else {
                    break;
                };
                let take = (front.len() - q.cursor).min(out.len() - filled);
                let start = q.cursor;
                out[filled..filled + take].copy_from_slice(&front[start..start + take]);
                filled += take;
                q.cursor += take;
                q.queued -= take;

                if q.cursor == q.blocks.front().map(Vec::len).unwrap_or(0) {
                    q.blocks.pop_front();
                    q.cursor = 0;
                }
            }
        }

        if filled < out.len() {
            out[filled..].fill(0.0);
            let underruns = self.underruns.fetch_add(1, Ordering::Relaxed) + 1;
            self.log_underrun(underruns);
        }

        let pulls = self
            .samples_pulled
            .fetch_add(out.len() as u64, Ordering::Relaxed);
        if pulls / (out.len().max(1) as u64) % TELEMETRY_PULL_INTERVAL == 0 {
            self.send_telemetry();
        }
    }

    /// Reset queue and cursor in one step, for immediate resync.
    pub fn clear(&self) {
        let mut q = self.queue.lock();
        q.blocks.clear();
        q.cursor = 0;
        q.queued = 0;
    }

    /// Currently queued audio in milliseconds.
    pub fn queued_ms(&self) -> u32 {
        let queued = self.queue.lock().queued;
        let per_channel = queued / self.config.channels.max(1) as usize;
        (per_channel as u64 * 1000 / self.config.sample_rate.max(1) as u64) as u32
    }

    /// Currently queued interleaved samples.
    pub fn queued_samples(&self) -> usize {
        self.queue.lock().queued
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queued_samples: self.queued_samples(),
            underruns: self.underruns.load(Ordering::Relaxed),
            blocks_pushed: self.blocks_pushed.load(Ordering::Relaxed),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
            samples_pulled: self.samples_pulled.load(Ordering::Relaxed),
        }
    }

    fn log_underrun(&self, total: u64) {
        // 0 means "never logged"; the first underrun always logs.
        let now_us = self.started.elapsed().as_micros().max(1) as u64;
        let last = self.last_underrun_log_us.load(Ordering::Relaxed);
        if (last == 0 || now_us.saturating_sub(last) >= UNDERRUN_LOG_INTERVAL_US)
            && self
                .last_underrun_log_us
                .compare_exchange(last, now_us, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            tracing::warn!(total, "audio underrun, emitting silence");
        }
    }

    fn send_telemetry(&self) {
        if let Some(tx) = &self.telemetry {
            let _ = tx.try_send(SchedulerTelemetry {
                queued_ms: self.queued_ms(),
                underruns: self.underruns.load(Ordering::Relaxed),
            });
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub queued_samples: usize,
    pub underruns: u64,
    pub blocks_pushed: u64,
    pub blocks_dropped: u64,
    pub samples_pulled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(ceiling_ms: u32) -> PlaybackScheduler {
        PlaybackScheduler::new(SchedulerConfig {
            sample_rate: 48000,
            channels: 2,
            ceiling_ms,
        })
    }

    #[test]
    fn test_fifo_order() {
        let s = scheduler(80);
        s.push(vec![1.0]);
        s.push(vec![2.0, 3.0]);

        let mut out = [0.0f32; 3];
        s.pull(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_underrun_zero_fills() {
        let s = scheduler(80);
        let mut out = [7.0f32; 64];
        s.pull(&mut out);

        assert!(out.iter().all(|&v| v == 0.0));
        assert_eq!(s.stats().underruns, 1);
    }

    #[test]
    fn test_partial_block_cursor() {
        let s = scheduler(80);
        s.push(vec![1.0, 2.0, 3.0, 4.0]);

        let mut out = [0.0f32; 3];
        s.pull(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0]);

        let mut out = [9.0f32; 3];
        s.pull(&mut out);
        assert_eq!(out, [4.0, 0.0, 0.0]);
        assert_eq!(s.stats().underruns, 1);
    }

    #[test]
    fn test_ceiling_bounds_queued_duration() {
        // 80ms at 48kHz stereo = 7680 interleaved samples.
        let s = scheduler(80);
        for _ in 0..100 {
            s.push(vec![0.5; 960]); // 10ms blocks
        }
        assert!(s.queued_samples() <= 7680);
        assert!(s.queued_ms() <= 80);
        assert!(s.stats().blocks_dropped > 0);
    }

    #[test]
    fn test_oldest_dropped_first() {
        // Ceiling of 1ms stereo = 96 samples; two 96-sample blocks can't
        // both stay queued.
        let s = scheduler(1);
        s.push(vec![1.0; 96]);
        s.push(vec![2.0; 96]);

        let mut out = [0.0f32; 96];
        s.pull(&mut out);
        assert!(out.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_clear_resets_queue_and_cursor() {
        let s = scheduler(80);
        s.push(vec![1.0, 2.0, 3.0, 4.0]);
        let mut out = [0.0f32; 2];
        s.pull(&mut out);

        s.clear();
        assert_eq!(s.queued_samples(), 0);

        let mut out = [5.0f32; 2];
        s.pull(&mut out);
        assert_eq!(out, [0.0, 0.0]);
    }

    #[test]
    fn test_empty_push_ignored() {
        let s = scheduler(80);
        s.push(Vec::new());
        assert_eq!(s.stats().blocks_pushed, 0);
        assert_eq!(s.queued_samples(), 0);
    }

    #[test]
    fn test_telemetry_best_effort() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let s = PlaybackScheduler::new(SchedulerConfig::default()).with_telemetry(tx);

        // First pull lands on the telemetry interval boundary.
        let mut out = [0.0f32; 16];
        s.pull(&mut out);
        let t = rx.try_recv().unwrap();
        assert_eq!(t.queued_ms, 0);
        assert_eq!(t.underruns, 1);
    }
}
