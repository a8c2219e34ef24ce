use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use hound::{SampleFormat, WavReader};

use crate::{
    error::ReaderError,
    reader::{ReadStatus, Reader},
};

/// Streams interleaved `f32` frames out of a `.wav` file.
///
/// Supports integer PCM up to 32 bits and 32-bit float. Frames are decoded
/// on demand rather than loaded up front. With looping enabled the reader
/// reports [`ReadStatus::Looped`] once at the end and starts again from
/// frame 0.
///
/// # Example
/// ```no_run
/// use audio_engine::reader::wav::WavStreamReader;
///
/// let reader = WavStreamReader::from_file("assets/wav/piano.wav").unwrap();
/// ```
pub struct WavStreamReader<R: Read + Seek> {
    inner: WavReader<R>,
    channels: usize,
    sample_rate: u32,
    format: SampleFormat,
    /// Multiplier mapping integer samples onto [-1.0, 1.0).
    int_scale: f32,
    position: i64,
    looping: bool,
}

impl<R: Read + Seek> std::fmt::Debug for WavStreamReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavStreamReader")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("format", &self.format)
            .field("position", &self.position)
            .field("looping", &self.looping)
            .finish_non_exhaustive()
    }
}

impl WavStreamReader<BufReader<File>> {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReaderError> {
        Self::from_reader(WavReader::open(path)?)
    }
}

impl<R: Read + Seek> WavStreamReader<R> {
    pub fn from_stream(stream: R) -> Result<Self, ReaderError> {
        Self::from_reader(WavReader::new(stream)?)
    }

    fn from_reader(inner: WavReader<R>) -> Result<Self, ReaderError> {
        let spec = inner.spec();
        if spec.channels == 0 {
            return Err(ReaderError::Unsupported("wav file has no channels".into()));
        }
        if spec.sample_format == SampleFormat::Float && spec.bits_per_sample != 32 {
            return Err(ReaderError::Unsupported(format!(
                "{}-bit float samples",
                spec.bits_per_sample
            )));
        }

        Ok(Self {
            channels: spec.channels as usize,
            sample_rate: spec.sample_rate,
            format: spec.sample_format,
            int_scale: 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32,
            position: 0,
            looping: false,
            inner,
        })
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Length of the file in frames.
    pub fn duration(&self) -> i64 {
        i64::from(self.inner.duration())
    }

    fn decode_into(&mut self, buf: &mut [f32]) -> Result<usize, ReaderError> {
        let mut written = 0;
        match self.format {
            SampleFormat::Int => {
                let scale = self.int_scale;
                for (slot, sample) in buf.iter_mut().zip(self.inner.samples::<i32>()) {
                    *slot = sample? as f32 * scale;
                    written += 1;
                }
            }
            SampleFormat::Float => {
                for (slot, sample) in buf.iter_mut().zip(self.inner.samples::<f32>()) {
                    *slot = sample?;
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}

impl<R: Read + Seek + Send> Reader for WavStreamReader<R> {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [f32], frames: usize) -> Result<ReadStatus, ReaderError> {
        if frames == 0 {
            return Ok(ReadStatus::Frames(0));
        }

        let samples = self.decode_into(&mut buf[..frames * self.channels])?;
        let produced = samples / self.channels;
        if produced > 0 {
            self.position += produced as i64;
            return Ok(ReadStatus::Frames(produced));
        }

        if self.looping {
            self.inner.seek(0)?;
            self.position = 0;
            return Ok(ReadStatus::Looped);
        }
        Ok(ReadStatus::EndOfStream)
    }

    fn next_source_frame(&self) -> i64 {
        self.position
    }

    fn seek(&mut self, source_frame: i64) -> Result<(), ReaderError> {
        if source_frame < 0 || source_frame > self.duration() {
            return Err(ReaderError::SeekOutOfRange(source_frame));
        }
        self.inner.seek(source_frame as u32)?;
        self.position = source_frame;
        Ok(())
    }
}
