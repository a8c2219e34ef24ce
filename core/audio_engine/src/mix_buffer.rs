use crate::{constants::I16_FULL_SCALE, device_manager::AudioSourceBufferKind};

/// Accumulates float samples from any number of sources by addition.
///
/// Writes land at the current write offset (in samples, not frames) and are
/// summed into whatever is already there. No clipping happens until export.
/// Every `read_*` drains the buffer.
#[derive(Debug, Clone, Default)]
pub struct MixBuffer {
    /// Allocated samples. Only `..used` holds mixed data.
    buffer: Vec<f32>,
    used: usize,
    offset: usize,
}

impl MixBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(samples: usize) -> Self {
        Self {
            buffer: vec![0.0; samples],
            used: 0,
            offset: 0,
        }
    }

    /// Where the next [`write`](Self::write) starts, in samples.
    pub fn set_write_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn write_offset(&self) -> usize {
        self.offset
    }

    /// Samples holding mixed data.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Samples that fit without reallocating.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Make `samples` samples past the write offset part of the mix, as if
    /// silence had been written there.
    pub fn extend(&mut self, samples: usize) {
        let end = self.offset + samples;
        if self.buffer.len() < end {
            self.buffer.resize(end, 0.0);
        }
        if self.used < end {
            self.buffer[self.used..end].fill(0.0);
            self.used = end;
        }
    }

    /// Add `count` samples from `buf`, taken every `source_stride` samples,
    /// into the mix every `dest_stride` samples starting at the write offset.
    pub fn write(&mut self, buf: &[f32], count: usize, source_stride: usize, dest_stride: usize) {
        if count == 0 {
            return;
        }
        debug_assert!(source_stride > 0 && dest_stride > 0, "zero stride");
        let source_stride = source_stride.max(1);
        let dest_stride = dest_stride.max(1);

        // the last sample needs no trailing stride
        self.extend(count * dest_stride - (dest_stride - 1));

        let dest = self.buffer[self.offset..].iter_mut().step_by(dest_stride);
        let source = buf.iter().step_by(source_stride).take(count);
        for (d, s) in dest.zip(source) {
            *d += *s;
        }
    }

    /// Export as signed 16-bit PCM, clamped to full scale. Returns samples
    /// written.
    pub fn read_i16(&mut self, out: &mut [i16]) -> usize {
        debug_assert!(
            out.len() >= self.used,
            "{} mixed samples do not fit in {}",
            self.used,
            out.len()
        );
        let n = self.used.min(out.len());
        for (o, s) in out.iter_mut().zip(&self.buffer[..n]) {
            *o = (s.clamp(-1.0, 1.0) * I16_FULL_SCALE + 0.5) as i16;
        }
        self.used = 0;
        n
    }

    /// Export the raw sums, unclamped. Returns samples written.
    pub fn read_f32(&mut self, out: &mut [f32]) -> usize {
        debug_assert!(
            out.len() >= self.used,
            "{} mixed samples do not fit in {}",
            self.used,
            out.len()
        );
        let n = self.used.min(out.len());
        out[..n].copy_from_slice(&self.buffer[..n]);
        self.used = 0;
        n
    }

    /// Split the interleaved mix into one buffer per channel. Returns the
    /// number of frames written.
    pub fn read_deinterlace(&mut self, channels: &mut [&mut [f32]]) -> usize {
        self.read_deinterlace_at(channels, 0)
    }

    /// [`read_deinterlace`](Self::read_deinterlace) into each channel buffer
    /// starting at `first_frame`.
    pub fn read_deinterlace_at(&mut self, channels: &mut [&mut [f32]], first_frame: usize) -> usize {
        let count = channels.len();
        if count == 0 {
            self.used = 0;
            return 0;
        }

        let frames = self.used / count;
        debug_assert!(
            channels.iter().all(|channel| channel.len() >= first_frame + frames),
            "{frames} mixed frames do not fit after frame {first_frame}"
        );
        for (frame, samples) in self.buffer[..frames * count].chunks_exact(count).enumerate() {
            for (channel, sample) in channels.iter_mut().zip(samples) {
                if let Some(slot) = channel.get_mut(first_frame + frame) {
                    *slot = *sample;
                }
            }
        }
        self.used = 0;
        frames
    }

    /// Export into whichever representation the output sink asked for, with
    /// the mix laid out as `channels` interleaved channels. Returns frames
    /// written.
    pub fn read_into(&mut self, out: AudioSourceBufferKind<'_, '_>, channels: usize) -> usize {
        let channels = channels.max(1);
        match out {
            AudioSourceBufferKind::F32(data) => self.read_f32(data) / channels,
            AudioSourceBufferKind::I16(data) => self.read_i16(data) / channels,
            AudioSourceBufferKind::Planar(planes) => {
                debug_assert_eq!(planes.len(), channels, "one buffer per channel");
                self.read_deinterlace(planes)
            }
        }
    }
}
