//! Reading through transient decoder starvation.
//!
//! Streaming decoders sometimes return zero frames because they are waiting
//! on I/O or on a filter further up the chain. [`retried_read`] hides that
//! from the mixing pipeline with a short, bounded exponential backoff, while
//! hard errors and end-of-stream come back on the first read.
//!
//! The backoff sleeps, so this must only run on a decode thread, never on the
//! real-time output thread.

use std::{thread, time::Duration};

use log::warn;

use crate::{
    config::RetryPolicy,
    error::ReaderError,
    reader::{ReadStatus, Reader},
};

/// What [`retried_read`] ended up delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Frames written to the buffer. Zero means the retry budget ran out.
    Frames(usize),
    EndOfStream,
}

/// Result of [`retried_read`], with the reader state captured before reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetriedRead {
    pub outcome: ReadOutcome,
    /// `next_source_frame()` before the read.
    pub source_frame: i64,
    /// `stream_to_source_ratio()` before the read.
    pub ratio: f64,
}

impl RetriedRead {
    pub fn frames(&self) -> usize {
        match self.outcome {
            ReadOutcome::Frames(frames) => frames,
            ReadOutcome::EndOfStream => 0,
        }
    }
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// [`retried_read_with`] using the default policy and real sleeps.
pub fn retried_read<R: Reader + ?Sized>(
    reader: &mut R,
    buf: &mut [f32],
    frames: usize,
) -> Result<RetriedRead, ReaderError> {
    retried_read_with(reader, buf, frames, &RetryPolicy::default(), &mut ThreadSleeper)
}

/// Read `frames` frames, retrying while the reader produces nothing.
///
/// A `Looped` result counts as zero frames. Errors are returned as-is without
/// retrying. After `policy.max_attempts` empty retries a single warning is
/// logged and zero frames are returned.
pub fn retried_read_with<R, S>(
    reader: &mut R,
    buf: &mut [f32],
    frames: usize,
    policy: &RetryPolicy,
    sleeper: &mut S,
) -> Result<RetriedRead, ReaderError>
where
    R: Reader + ?Sized,
    S: Sleeper + ?Sized,
{
    let ratio = reader.stream_to_source_ratio();
    let source_frame = reader.next_source_frame();
    let done = |outcome| RetriedRead {
        outcome,
        source_frame,
        ratio,
    };

    if frames == 0 {
        return Ok(done(ReadOutcome::Frames(0)));
    }

    if let Some(outcome) = read_once(reader, buf, frames)? {
        return Ok(done(outcome));
    }

    let mut delay = policy.initial_delay;
    for _ in 0..policy.max_attempts {
        sleeper.sleep(delay);
        delay = delay.saturating_mul(2);

        if let Some(outcome) = read_once(reader, buf, frames)? {
            return Ok(done(outcome));
        }
    }

    warn!(
        "{} attempts to read from the stream failed",
        policy.max_attempts
    );
    Ok(done(ReadOutcome::Frames(0)))
}

/// `None` when the read produced nothing and should be retried.
fn read_once<R: Reader + ?Sized>(
    reader: &mut R,
    buf: &mut [f32],
    frames: usize,
) -> Result<Option<ReadOutcome>, ReaderError> {
    Ok(match reader.read(buf, frames)? {
        ReadStatus::Frames(0) | ReadStatus::Looped => None,
        ReadStatus::Frames(n) => Some(ReadOutcome::Frames(n)),
        ReadStatus::EndOfStream => Some(ReadOutcome::EndOfStream),
    })
}
