use std::fmt;

use log::{debug, info, warn};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::{
    config::EngineConfig,
    device_manager::{AudioSource, AudioSourceBufferKind},
    error::MixerError,
    mix_buffer::MixBuffer,
    voice::{Voice, VoiceId},
};

const MIXER_COMMAND_CAPACITY: usize = 64;
const MIXER_EVENT_CAPACITY: usize = 64;
/// Voices the mixer holds before adding one has to allocate.
const VOICE_CAPACITY: usize = 64;

/// Changes sent to a [`Mixer`] that lives on the output thread.
#[derive(Debug)]
pub enum MixerCommand {
    AddVoice(Voice),
    RemoveVoice(VoiceId),
    SetGain { target: VoiceId, gain: f32 },
}

/// A voice the mixer let go of, handed back to the [`MixerHandle`] so it is
/// dropped off the output thread.
#[derive(Debug)]
pub enum MixerEvent {
    /// Its decoder stopped and every sample was mixed.
    Finished(Voice),
    Removed(Voice),
    Rejected { voice: Voice, error: MixerError },
}

impl MixerEvent {
    pub fn voice(&self) -> &Voice {
        match self {
            Self::Finished(voice) | Self::Removed(voice) | Self::Rejected { voice, .. } => voice,
        }
    }
}

/// Sums every playing voice into interleaved output.
///
/// Runs on the real-time output thread: it only pulls what decoders have
/// already buffered and pads the rest with silence. Buffers are sized once
/// for `mix_frames`, and voices leaving the mix go back through the handle,
/// so a pass neither allocates, frees, logs nor waits.
pub struct Mixer {
    channels: usize,
    max_frames: usize,
    voices: Vec<Voice>,
    buffer: MixBuffer,
    scratch: Vec<f32>,
    commands: Consumer<MixerCommand>,
    events: Producer<MixerEvent>,
    frames_mixed: u64,
}

impl fmt::Debug for Mixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mixer")
            .field("channels", &self.channels)
            .field("max_frames", &self.max_frames)
            .field("voices", &self.voices)
            .field("frames_mixed", &self.frames_mixed)
            .finish_non_exhaustive()
    }
}

impl Mixer {
    pub fn new(config: EngineConfig) -> (Self, MixerHandle) {
        let (command_tx, commands) = RingBuffer::new(MIXER_COMMAND_CAPACITY);
        let (events, event_rx) = RingBuffer::new(MIXER_EVENT_CAPACITY);
        let channels = config.channels.max(1);
        let max_frames = config.mix_frames.max(1);
        let samples = max_frames * channels;

        let mixer = Self {
            channels,
            max_frames,
            voices: Vec::with_capacity(VOICE_CAPACITY),
            buffer: MixBuffer::with_capacity(samples),
            scratch: vec![0.0; samples],
            commands,
            events,
            frames_mixed: 0,
        };
        let handle = MixerHandle {
            commands: command_tx,
            events: event_rx,
        };
        (mixer, handle)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Output frames produced since the mixer was created.
    pub fn frames_mixed(&self) -> u64 {
        self.frames_mixed
    }

    /// Voices must match the output layout or be mono, which is spread to
    /// every output channel.
    fn check_layout(&self, voice: &Voice) -> Result<(), MixerError> {
        if voice.channels() != self.channels && voice.channels() != 1 {
            return Err(MixerError::ChannelMismatch {
                voice: voice.channels(),
                mixer: self.channels,
            });
        }
        Ok(())
    }

    pub fn add_voice(&mut self, voice: Voice) -> Result<(), MixerError> {
        self.check_layout(&voice)?;
        self.voices.push(voice);
        Ok(())
    }

    pub fn remove_voice(&mut self, id: VoiceId) -> Option<Voice> {
        let index = self.voices.iter().position(|voice| voice.id() == id)?;
        Some(self.voices.swap_remove(index))
    }

    pub fn process_command(&mut self, command: MixerCommand) {
        match command {
            MixerCommand::AddVoice(voice) => match self.check_layout(&voice) {
                Ok(()) => self.voices.push(voice),
                Err(error) => self.retire(MixerEvent::Rejected { voice, error }),
            },
            MixerCommand::RemoveVoice(id) => {
                if let Some(voice) = self.remove_voice(id) {
                    self.retire(MixerEvent::Removed(voice));
                }
            }
            MixerCommand::SetGain { target, gain } => {
                if let Some(voice) = self.voices.iter_mut().find(|voice| voice.id() == target) {
                    voice.set_gain(gain);
                }
            }
        }
    }

    fn retire(&mut self, event: MixerEvent) {
        // a full ring means nobody is reclaiming; the voice is then dropped here
        let _ = self.events.push(event);
    }

    /// Mix up to `frames` frames, at most `mix_frames`, from every voice into
    /// the internal buffer. Returns the frames mixed.
    pub fn mix(&mut self, frames: usize) -> usize {
        let frames = frames.min(self.max_frames);
        while let Ok(command) = self.commands.pop() {
            self.process_command(command);
        }

        let channels = self.channels;
        for voice in &mut self.voices {
            let voice_channels = voice.channels();
            let wanted = frames * voice_channels;
            let pulled = voice.pull(&mut self.scratch[..wanted]) / voice_channels;
            if voice_channels == channels {
                self.buffer.set_write_offset(0);
                self.buffer.write(&self.scratch, pulled * channels, 1, 1);
            } else {
                for channel in 0..channels {
                    self.buffer.set_write_offset(channel);
                    self.buffer.write(&self.scratch, pulled, 1, channels);
                }
            }
        }

        self.buffer.set_write_offset(0);
        self.buffer.extend(frames * channels);

        let mut index = 0;
        while index < self.voices.len() {
            if self.voices[index].is_finished() {
                let voice = self.voices.swap_remove(index);
                self.retire(MixerEvent::Finished(voice));
            } else {
                index += 1;
            }
        }

        self.frames_mixed += frames as u64;
        frames
    }

    /// Mix `frames` frames into `out`, in passes of at most `mix_frames`.
    /// Returns the frames written, which is less than `frames` only when `out`
    /// is shorter.
    pub fn fill(&mut self, out: AudioSourceBufferKind<'_, '_>, frames: usize) -> usize {
        let channels = self.channels;
        let pass = self.max_frames * channels;
        let mut written = 0;
        match out {
            AudioSourceBufferKind::F32(data) => {
                let frames = frames.min(data.len() / channels);
                for chunk in data[..frames * channels].chunks_mut(pass) {
                    self.mix(chunk.len() / channels);
                    written += self
                        .buffer
                        .read_into(AudioSourceBufferKind::F32(chunk), channels);
                }
            }
            AudioSourceBufferKind::I16(data) => {
                let frames = frames.min(data.len() / channels);
                for chunk in data[..frames * channels].chunks_mut(pass) {
                    self.mix(chunk.len() / channels);
                    written += self
                        .buffer
                        .read_into(AudioSourceBufferKind::I16(chunk), channels);
                }
            }
            AudioSourceBufferKind::Planar(planes) => {
                debug_assert_eq!(planes.len(), channels, "one buffer per channel");
                let shortest = planes.iter().map(|plane| plane.len()).min().unwrap_or(0);
                let frames = frames.min(shortest);
                while written < frames {
                    let mixed = self.mix(frames - written);
                    self.buffer.read_deinterlace_at(planes, written);
                    written += mixed;
                }
            }
        }
        written
    }
}

impl AudioSource for Mixer {
    fn fill_buffer(&mut self, buffer: AudioSourceBufferKind<'_, '_>, frame_size: usize) {
        self.fill(buffer, frame_size);
    }
}

/// The control side of a [`Mixer`] running on another thread: sends
/// [`MixerCommand`]s and takes back the voices it let go of.
pub struct MixerHandle {
    commands: Producer<MixerCommand>,
    events: Consumer<MixerEvent>,
}

impl fmt::Debug for MixerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MixerHandle")
            .field("free_slots", &self.commands.slots())
            .field("pending_events", &self.events.slots())
            .finish()
    }
}

impl MixerHandle {
    pub fn send(&mut self, command: MixerCommand) -> Result<(), MixerError> {
        self.commands
            .push(command)
            .map_err(|_| MixerError::CommandQueueFull)
    }

    pub fn add_voice(&mut self, voice: Voice) -> Result<(), MixerError> {
        self.send(MixerCommand::AddVoice(voice))
    }

    pub fn remove_voice(&mut self, id: VoiceId) -> Result<(), MixerError> {
        self.send(MixerCommand::RemoveVoice(id))
    }

    pub fn set_gain(&mut self, target: VoiceId, gain: f32) -> Result<(), MixerError> {
        self.send(MixerCommand::SetGain { target, gain })
    }

    pub fn next_event(&mut self) -> Option<MixerEvent> {
        self.events.pop().ok()
    }

    /// Log and drop every voice the mixer handed back. Returns how many
    /// there were.
    pub fn reclaim(&mut self) -> usize {
        let mut reclaimed = 0;
        while let Some(event) = self.next_event() {
            match &event {
                MixerEvent::Finished(voice) => info!("mixer: voice {} finished", voice.id()),
                MixerEvent::Removed(voice) => debug!("mixer: removed voice {}", voice.id()),
                MixerEvent::Rejected { voice, error } => {
                    warn!("mixer: rejected voice {}: {error}", voice.id());
                }
            }
            reclaimed += 1;
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::AUDIO_SAMPLE_EPSILON,
        reader::{Reader, constant::ConstantReader},
        voice::StreamDecoder,
    };

    fn config(channels: usize) -> EngineConfig {
        EngineConfig {
            channels,
            block_frames: 8,
            ring_frames: 64,
            ..EngineConfig::default()
        }
    }

    /// Open a voice and decode one block into it.
    fn decoded_voice(reader: impl Reader + 'static, channels: usize) -> (Voice, StreamDecoder) {
        let (voice, mut decoder) = Voice::open(Box::new(reader), &config(channels));
        decoder.decode_block().unwrap();
        (voice, decoder)
    }

    fn mix_f32(mixer: &mut Mixer, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * mixer.channels()];
        let written = mixer.fill(AudioSourceBufferKind::F32(&mut out), frames);
        assert_eq!(written, frames);
        out
    }

    #[test]
    fn test_mixer_with_two_voices_should_sum_samples() {
        let (mut mixer, _) = Mixer::new(config(2));
        let (v1, _d1) = decoded_voice(ConstantReader::new(0.2, 2, 44_100), 2);
        let (v2, _d2) = decoded_voice(ConstantReader::new(0.3, 2, 44_100), 2);
        mixer.add_voice(v1).unwrap();
        mixer.add_voice(v2).unwrap();

        let output = mix_f32(&mut mixer, 4);
        assert!(output.iter().all(|s| (s - 0.5).abs() < AUDIO_SAMPLE_EPSILON));
    }

    #[test]
    fn test_mixer_with_no_voices_should_output_silence() {
        let (mut mixer, _) = Mixer::new(config(2));
        let output = mix_f32(&mut mixer, 2);
        assert_eq!(output, vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_voice_gain_scales_output() {
        let (mut mixer, _) = Mixer::new(config(1));
        let (mut voice, _decoder) = decoded_voice(ConstantReader::new(0.8, 1, 44_100), 1);
        voice.set_gain(0.25);
        mixer.add_voice(voice).unwrap();

        let output = mix_f32(&mut mixer, 4);
        assert!(output.iter().all(|s| (s - 0.2).abs() < AUDIO_SAMPLE_EPSILON));
    }

    #[test]
    fn test_mono_voice_is_spread_to_every_channel() {
        let (mut mixer, _) = Mixer::new(config(2));
        let (voice, _decoder) = decoded_voice(ConstantReader::new(0.4, 1, 44_100), 1);
        mixer.add_voice(voice).unwrap();

        let output = mix_f32(&mut mixer, 3);
        assert_eq!(output.len(), 6);
        assert!(output.iter().all(|s| (s - 0.4).abs() < AUDIO_SAMPLE_EPSILON));
    }

    #[test]
    fn test_short_voice_is_padded_with_silence() {
        let (mut mixer, _) = Mixer::new(config(1));
        let reader = ConstantReader::new(0.5, 1, 44_100).with_length(3);
        let (voice, _decoder) = decoded_voice(reader, 1);
        mixer.add_voice(voice).unwrap();

        let output = mix_f32(&mut mixer, 6);
        assert_eq!(output, vec![0.5, 0.5, 0.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_overflowing_voices_clamp_on_i16_output() {
        let (mut mixer, _) = Mixer::new(config(1));
        let (v1, _d1) = decoded_voice(ConstantReader::new(0.9, 1, 44_100), 1);
        let (v2, _d2) = decoded_voice(ConstantReader::new(0.9, 1, 44_100), 1);
        mixer.add_voice(v1).unwrap();
        mixer.add_voice(v2).unwrap();

        let mut out = [0i16; 4];
        mixer.fill(AudioSourceBufferKind::I16(&mut out), 4);
        assert_eq!(out, [32767; 4]);
    }

    #[test]
    fn test_planar_output_deinterlaces_channels() {
        let (mut mixer, _) = Mixer::new(config(2));
        let (voice, _decoder) = decoded_voice(ConstantReader::new(0.1, 1, 44_100), 1);
        mixer.add_voice(voice).unwrap();

        let mut left = [0.0f32; 4];
        let mut right = [0.0f32; 4];
        let frames = mixer.fill(
            AudioSourceBufferKind::Planar(&mut [&mut left[..], &mut right[..]]),
            4,
        );
        assert_eq!(frames, 4);
        assert!(left.iter().chain(&right).all(|s| (s - 0.1).abs() < AUDIO_SAMPLE_EPSILON));
    }

    #[test]
    fn test_incompatible_voice_is_rejected() {
        let (mut mixer, _) = Mixer::new(config(1));
        let (voice, _decoder) = decoded_voice(ConstantReader::new(0.1, 2, 44_100), 2);

        assert_eq!(
            mixer.add_voice(voice),
            Err(MixerError::ChannelMismatch { voice: 2, mixer: 1 })
        );
        assert_eq!(mixer.voice_count(), 0);
    }

    #[test]
    fn test_finished_voice_is_handed_back_after_draining() {
        let (mut mixer, mut handle) = Mixer::new(config(1));
        let reader = ConstantReader::new(0.5, 1, 44_100).with_length(4);
        let (voice, decoder) = decoded_voice(reader, 1);
        let id = voice.id();
        drop(decoder);
        mixer.add_voice(voice).unwrap();

        mix_f32(&mut mixer, 2);
        assert_eq!(mixer.voice_count(), 1);
        assert!(handle.next_event().is_none());

        mix_f32(&mut mixer, 2);
        assert_eq!(mixer.voice_count(), 0);
        assert_eq!(mixer.frames_mixed(), 4);
        assert!(matches!(handle.next_event(), Some(MixerEvent::Finished(v)) if v.id() == id));
    }

    #[test]
    fn test_commands_are_applied_before_mixing() {
        let (mut mixer, mut handle) = Mixer::new(config(1));
        let (voice, _decoder) = decoded_voice(ConstantReader::new(0.6, 1, 44_100), 1);
        let id = voice.id();

        handle.add_voice(voice).unwrap();
        handle.set_gain(id, 0.5).unwrap();
        let output = mix_f32(&mut mixer, 2);
        assert_eq!(mixer.voice_count(), 1);
        assert!(output.iter().all(|s| (s - 0.3).abs() < AUDIO_SAMPLE_EPSILON));

        handle.remove_voice(id).unwrap();
        let output = mix_f32(&mut mixer, 2);
        assert_eq!(mixer.voice_count(), 0);
        assert_eq!(output, vec![0.0, 0.0]);
        assert_eq!(handle.reclaim(), 1);
        assert_eq!(handle.reclaim(), 0);
    }

    #[test]
    fn test_voice_rejected_by_command_is_handed_back() {
        let (mut mixer, mut handle) = Mixer::new(config(1));
        let (voice, _decoder) = decoded_voice(ConstantReader::new(0.1, 2, 44_100), 2);
        let id = voice.id();

        handle.add_voice(voice).unwrap();
        mix_f32(&mut mixer, 2);
        assert_eq!(mixer.voice_count(), 0);

        let event = handle.next_event().unwrap();
        assert_eq!(event.voice().id(), id);
        assert!(matches!(
            event,
            MixerEvent::Rejected {
                error: MixerError::ChannelMismatch { voice: 2, mixer: 1 },
                ..
            }
        ));
    }

    #[test]
    fn test_long_requests_are_mixed_in_passes_without_growing() {
        let mixer_config = EngineConfig {
            mix_frames: 4,
            ..config(2)
        };
        let (mut mixer, _) = Mixer::new(mixer_config);
        let (voice, mut decoder) = decoded_voice(ConstantReader::new(0.5, 2, 44_100), 2);
        decoder.decode_block().unwrap();
        mixer.add_voice(voice).unwrap();
        let capacity = mixer.buffer.capacity();

        let output = mix_f32(&mut mixer, 10);
        assert!(output.iter().all(|s| (s - 0.5).abs() < AUDIO_SAMPLE_EPSILON));
        assert_eq!(mixer.frames_mixed(), 10);
        assert_eq!(mixer.buffer.capacity(), capacity);
        assert_eq!(capacity, 8);
    }

    #[test]
    fn test_long_planar_requests_are_mixed_in_passes() {
        let mixer_config = EngineConfig {
            mix_frames: 3,
            ..config(2)
        };
        let (mut mixer, _) = Mixer::new(mixer_config);
        let (voice, _decoder) = decoded_voice(ConstantReader::new(0.25, 1, 44_100), 1);
        mixer.add_voice(voice).unwrap();

        let mut left = [0.0f32; 7];
        let mut right = [0.0f32; 7];
        let mut planes = [&mut left[..], &mut right[..]];
        assert_eq!(mixer.fill(AudioSourceBufferKind::Planar(&mut planes), 7), 7);
        assert!(left.iter().chain(&right).all(|s| (s - 0.25).abs() < AUDIO_SAMPLE_EPSILON));
    }

    #[test]
    fn test_fill_stops_at_the_end_of_a_short_output_buffer() {
        let (mut mixer, _) = Mixer::new(config(1));
        let mut out = [0.0f32; 3];
        assert_eq!(mixer.fill(AudioSourceBufferKind::F32(&mut out), 8), 3);
    }

    #[test]
    fn test_full_command_queue_is_reported() {
        let (_mixer, mut handle) = Mixer::new(config(1));
        let id = VoiceId::new();
        for _ in 0..MIXER_COMMAND_CAPACITY {
            handle.remove_voice(id).unwrap();
        }
        assert_eq!(handle.remove_voice(id), Err(MixerError::CommandQueueFull));
    }
}
