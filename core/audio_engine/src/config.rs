use std::time::Duration;

use crate::constants::{READ_RETRY_ATTEMPTS, READ_RETRY_INITIAL_DELAY_MS};

/// Backoff used by `retried_read` when a reader returns no frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reads attempted after the first empty one.
    pub max_attempts: u32,
    /// Sleep before the first retry. Doubles on every following retry.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: READ_RETRY_ATTEMPTS,
            initial_delay: Duration::from_millis(READ_RETRY_INITIAL_DELAY_MS),
        }
    }
}

/// Runtime settings for voices, decoders and the mixer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Interleaved output channels.
    pub channels: usize,
    pub sample_rate: u32,
    /// Largest block a decoder requests from its reader at once.
    pub block_frames: usize,
    /// Frames buffered between a decoder and the mixer.
    pub ring_frames: usize,
    /// Largest block the mixer renders in one pass. Its buffers are sized for
    /// this once; longer output requests are rendered in several passes.
    pub mix_frames: usize,
    /// How long an idle decoder sleeps when its ring is full.
    pub decoder_idle: Duration,
    pub retry: RetryPolicy,
}

impl EngineConfig {
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44_100,
            block_frames: 1024,
            ring_frames: 8192,
            mix_frames: 4096,
            decoder_idle: Duration::from_millis(5),
            retry: RetryPolicy::default(),
        }
    }
}
