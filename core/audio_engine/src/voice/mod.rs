use std::fmt;

use rtrb::{Consumer, RingBuffer};
use transport::{PositionMap, SharedPositionMap};
use uuid::Uuid;

use crate::{config::EngineConfig, reader::Reader};

pub mod decoder;

pub use decoder::{DecodeStep, DecoderCommand, DecoderHandle, StreamDecoder};

/// Capacity of the command ring between a [`DecoderHandle`] and its thread.
const DECODER_COMMAND_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(Uuid);

impl VoiceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for VoiceId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// The mixer's end of one playing stream.
///
/// Decoded samples arrive from the voice's [`StreamDecoder`] through a
/// lock-free ring, so pulling from a voice never blocks.
pub struct Voice {
    id: VoiceId,
    channels: usize,
    gain: f32,
    samples: Consumer<f32>,
    positions: SharedPositionMap,
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("channels", &self.channels)
            .field("gain", &self.gain)
            .field("available", &self.samples.slots())
            .finish_non_exhaustive()
    }
}

impl Voice {
    /// Wire `reader` to a new voice. The decoder must be driven (usually via
    /// [`StreamDecoder::spawn`]) for the voice to produce anything.
    pub fn open(reader: Box<dyn Reader>, config: &EngineConfig) -> (Self, StreamDecoder) {
        let id = VoiceId::new();
        let channels = reader.channels();
        let positions = SharedPositionMap::new(PositionMap::new());
        let (producer, samples) = RingBuffer::new(config.ring_frames * channels);

        let voice = Self {
            id,
            channels,
            gain: 1.0,
            samples,
            positions: positions.clone(),
        };
        let decoder = StreamDecoder::new(id, reader, producer, positions, config);
        (voice, decoder)
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Handle for mapping this voice's source frames onto its output frames.
    pub fn positions(&self) -> SharedPositionMap {
        self.positions.clone()
    }

    /// Samples buffered and ready to mix.
    pub fn available(&self) -> usize {
        self.samples.slots()
    }

    /// The decoder has stopped and everything it produced has been mixed.
    pub fn is_finished(&self) -> bool {
        self.samples.is_abandoned() && self.samples.is_empty()
    }

    /// Copy up to `out.len()` buffered samples into `out`, scaled by the
    /// voice gain. Returns the number of samples copied.
    pub(crate) fn pull(&mut self, out: &mut [f32]) -> usize {
        let wanted = out.len().min(self.samples.slots());
        let Ok(chunk) = self.samples.read_chunk(wanted) else {
            return 0;
        };

        let (first, second) = chunk.as_slices();
        let gain = self.gain;
        for (o, s) in out.iter_mut().zip(first.iter().chain(second)) {
            *o = *s * gain;
        }
        chunk.commit_all();
        wanted
    }
}
