use crate::{
    error::ReaderError,
    reader::{ReadStatus, Reader},
};

/// Emits the same sample value on every channel for a fixed number of
/// frames, or forever.
#[derive(Debug, Clone)]
pub struct ConstantReader {
    value: f32,
    channels: usize,
    sample_rate: u32,
    length: Option<i64>,
    position: i64,
}

impl ConstantReader {
    pub fn new(value: f32, channels: usize, sample_rate: u32) -> Self {
        Self {
            value,
            channels,
            sample_rate,
            length: None,
            position: 0,
        }
    }

    /// Stop after `frames` frames.
    pub fn with_length(mut self, frames: i64) -> Self {
        self.length = Some(frames);
        self
    }
}

impl Reader for ConstantReader {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [f32], frames: usize) -> Result<ReadStatus, ReaderError> {
        let frames = match self.length {
            Some(length) if self.position >= length => return Ok(ReadStatus::EndOfStream),
            Some(length) => frames.min((length - self.position) as usize),
            None => frames,
        };

        buf[..frames * self.channels].fill(self.value);
        self.position += frames as i64;
        Ok(ReadStatus::Frames(frames))
    }

    fn next_source_frame(&self) -> i64 {
        self.position
    }

    fn seek(&mut self, source_frame: i64) -> Result<(), ReaderError> {
        match self.length {
            Some(length) if source_frame > length => Err(ReaderError::SeekOutOfRange(source_frame)),
            _ if source_frame < 0 => Err(ReaderError::SeekOutOfRange(source_frame)),
            _ => {
                self.position = source_frame;
                Ok(())
            }
        }
    }
}
