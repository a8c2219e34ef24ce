use std::f64::consts::TAU;

use crate::{
    error::ReaderError,
    reader::{ReadStatus, Reader},
};

/// Generates a sine tone whose playback rate can change between reads.
///
/// At rate `r` every output frame advances the tone by `r` source frames,
/// which raises pitch and speed together, so the stream-to-source ratio seen
/// by the position map follows the rate.
#[derive(Debug, Clone)]
pub struct SineReader {
    freq: f64,
    amplitude: f32,
    channels: usize,
    sample_rate: u32,
    rate: f64,
    /// Position in source frames, fractional when `rate` is not whole.
    position: f64,
    length: Option<i64>,
}

impl SineReader {
    pub fn new(freq: f64, channels: usize, sample_rate: u32) -> Self {
        Self {
            freq,
            amplitude: 0.5,
            channels,
            sample_rate,
            rate: 1.0,
            position: 0.0,
            length: None,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// End the stream after `frames` source frames.
    pub fn with_length(mut self, frames: i64) -> Self {
        self.length = Some(frames);
        self
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        debug_assert!(rate > 0.0, "non-positive rate {rate}");
        self.rate = rate;
    }
}

impl Reader for SineReader {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [f32], frames: usize) -> Result<ReadStatus, ReaderError> {
        let step = self.freq / f64::from(self.sample_rate);
        let mut produced = 0;

        for frame in buf.chunks_exact_mut(self.channels).take(frames) {
            if self.length.is_some_and(|len| self.position >= len as f64) {
                break;
            }
            let sample = (TAU * step * self.position).sin() as f32 * self.amplitude;
            frame.fill(sample);
            self.position += self.rate;
            produced += 1;
        }

        if produced == 0 && frames > 0 {
            return Ok(ReadStatus::EndOfStream);
        }
        Ok(ReadStatus::Frames(produced))
    }

    fn stream_to_source_ratio(&self) -> f64 {
        self.rate
    }

    fn next_source_frame(&self) -> i64 {
        self.position.floor() as i64
    }

    fn seek(&mut self, source_frame: i64) -> Result<(), ReaderError> {
        if source_frame < 0 || self.length.is_some_and(|len| source_frame > len) {
            return Err(ReaderError::SeekOutOfRange(source_frame));
        }
        self.position = source_frame as f64;
        Ok(())
    }
}
