use crate::error::ReaderError;

pub mod constant;
pub mod retry;
pub mod sine;
pub mod wav;

/// Non-error result of a single [`Reader::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// This many frames were written to the front of the buffer. May be zero
    /// when a streaming decoder has nothing ready yet.
    Frames(usize),
    /// The stream wrapped back to its start; nothing was written this call.
    Looped,
    /// The stream has no more frames.
    EndOfStream,
}

/// A decoded stream of interleaved `f32` frames.
///
/// Implemented by decoders and generators. Readers may be driven from a
/// decode thread, so they must be `Send`.
pub trait Reader: Send {
    fn channels(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Decode up to `frames` frames into `buf`, which holds at least
    /// `frames * channels()` samples.
    fn read(&mut self, buf: &mut [f32], frames: usize) -> Result<ReadStatus, ReaderError>;

    /// Source frames consumed per frame produced by the next `read`.
    fn stream_to_source_ratio(&self) -> f64 {
        1.0
    }

    /// Source frame the next `read` starts at.
    fn next_source_frame(&self) -> i64;

    fn seek(&mut self, _source_frame: i64) -> Result<(), ReaderError> {
        Err(ReaderError::SeekUnsupported)
    }
}

impl<R: Reader + ?Sized> Reader for Box<R> {
    fn channels(&self) -> usize {
        (**self).channels()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn read(&mut self, buf: &mut [f32], frames: usize) -> Result<ReadStatus, ReaderError> {
        (**self).read(buf, frames)
    }

    fn stream_to_source_ratio(&self) -> f64 {
        (**self).stream_to_source_ratio()
    }

    fn next_source_frame(&self) -> i64 {
        (**self).next_source_frame()
    }

    fn seek(&mut self, source_frame: i64) -> Result<(), ReaderError> {
        (**self).seek(source_frame)
    }
}
