use std::{fmt, thread, time::Duration};

use log::{debug, error, info, warn};
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use transport::SharedPositionMap;

use super::{DECODER_COMMAND_CAPACITY, VoiceId};
use crate::{
    config::{EngineConfig, RetryPolicy},
    error::ReaderError,
    reader::{
        Reader,
        retry::{ReadOutcome, RetriedRead, ThreadSleeper, retried_read_with},
    },
};

/// What one [`StreamDecoder::decode_block`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    /// Frames pushed to the voice.
    Decoded(usize),
    /// The reader stayed empty through every retry; nothing was pushed.
    Starved,
    /// The voice's ring has no room for another frame.
    Full,
    /// The reader reached the end of the stream.
    Finished,
}

/// Requests for a decoder running on its own thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderCommand {
    /// Jump to a source frame and forget the recorded position history.
    Seek(i64),
    Stop,
}

/// The decode-thread end of a voice.
///
/// Pulls frames from a [`Reader`] through `retried_read`, records where each
/// block lands on the voice's output timeline, and feeds the samples to the
/// mixer. Retries may sleep, so this never runs on the output thread.
pub struct StreamDecoder {
    id: VoiceId,
    reader: Box<dyn Reader>,
    producer: Producer<f32>,
    positions: SharedPositionMap,
    channels: usize,
    block_frames: usize,
    idle: Duration,
    retry: RetryPolicy,
    /// Output frame the next decoded frame will be heard at.
    dest_frame: i64,
    finished: bool,
    scratch: Vec<f32>,
}

impl fmt::Debug for StreamDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDecoder")
            .field("id", &self.id)
            .field("channels", &self.channels)
            .field("dest_frame", &self.dest_frame)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl StreamDecoder {
    pub(super) fn new(
        id: VoiceId,
        reader: Box<dyn Reader>,
        producer: Producer<f32>,
        positions: SharedPositionMap,
        config: &EngineConfig,
    ) -> Self {
        let channels = reader.channels();
        Self {
            id,
            reader,
            producer,
            positions,
            channels,
            block_frames: config.block_frames,
            idle: config.decoder_idle,
            retry: config.retry,
            dest_frame: 0,
            finished: false,
            scratch: vec![0.0; config.block_frames * channels],
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    /// Output frame the next decoded frame will land on.
    pub fn dest_frame(&self) -> i64 {
        self.dest_frame
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode as much of one block as the voice's ring has room for.
    pub fn decode_block(&mut self) -> Result<DecodeStep, ReaderError> {
        if self.finished {
            return Ok(DecodeStep::Finished);
        }

        let frames = self.block_frames.min(self.producer.slots() / self.channels);
        if frames == 0 {
            return Ok(DecodeStep::Full);
        }

        let samples = frames * self.channels;
        let read = retried_read_with(
            self.reader.as_mut(),
            &mut self.scratch[..samples],
            frames,
            &self.retry,
            &mut ThreadSleeper,
        )?;

        let produced = match read.outcome {
            ReadOutcome::EndOfStream => {
                self.finished = true;
                return Ok(DecodeStep::Finished);
            }
            ReadOutcome::Frames(0) => return Ok(DecodeStep::Starved),
            ReadOutcome::Frames(produced) => produced,
        };

        self.record_position(&read, produced);
        self.push(produced * self.channels);
        self.dest_frame += produced as i64;
        Ok(DecodeStep::Decoded(produced))
    }

    fn record_position(&self, read: &RetriedRead, produced: usize) {
        if read.ratio <= 0.0 {
            debug!(
                "voice {}: ratio {} for {produced} frames, not recorded",
                self.id, read.ratio
            );
            return;
        }

        let next = self.reader.next_source_frame();
        let mut source_frame = read.source_frame;
        if next <= source_frame {
            // wrapped to the start while retrying, so the block began on the new pass
            source_frame = next - (produced as f64 * read.ratio).round() as i64;
        }

        let consumed = next - source_frame;
        if consumed <= 0 {
            debug!(
                "voice {}: {produced} frames ending at source frame {next} consumed nothing, not recorded",
                self.id
            );
            return;
        }

        self.positions
            .insert(source_frame, consumed, self.dest_frame, 1.0 / read.ratio);
    }

    fn push(&mut self, samples: usize) {
        match self.producer.write_chunk(samples) {
            Ok(mut chunk) => {
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&self.scratch[..split]);
                second.copy_from_slice(&self.scratch[split..samples]);
                chunk.commit_all();
            }
            Err(err) => error!("voice {}: dropped {samples} samples: {err}", self.id),
        }
    }

    /// Move the reader to `source_frame` and discard the recorded positions.
    /// The output timeline keeps counting from where it was.
    pub fn seek(&mut self, source_frame: i64) -> Result<(), ReaderError> {
        self.reader.seek(source_frame)?;
        self.positions.clear();
        self.finished = false;
        debug!("voice {}: seeked to source frame {source_frame}", self.id);
        Ok(())
    }

    /// Run the decoder on its own thread until end of stream, a hard error,
    /// or [`DecoderHandle::stop`].
    pub fn spawn(self) -> std::io::Result<DecoderHandle> {
        let id = self.id;
        let (commands, command_rx) = RingBuffer::new(DECODER_COMMAND_CAPACITY);
        let join = thread::Builder::new()
            .name(format!("decoder-{id}"))
            .spawn(move || self.run(command_rx))?;

        Ok(DecoderHandle { id, commands, join })
    }

    fn run(mut self, mut commands: Consumer<DecoderCommand>) -> Result<(), ReaderError> {
        loop {
            while let Ok(command) = commands.pop() {
                match command {
                    DecoderCommand::Seek(frame) => {
                        if let Err(err) = self.seek(frame) {
                            warn!("voice {}: seek to {frame} failed: {err}", self.id);
                        }
                    }
                    DecoderCommand::Stop => return Ok(()),
                }
            }

            match self.decode_block() {
                Ok(DecodeStep::Decoded(_) | DecodeStep::Starved) => {}
                Ok(DecodeStep::Full) => thread::sleep(self.idle),
                Ok(DecodeStep::Finished) => {
                    info!(
                        "voice {}: end of stream after {} output frames",
                        self.id, self.dest_frame
                    );
                    return Ok(());
                }
                Err(err) => {
                    error!("voice {}: decode failed: {err}", self.id);
                    return Err(err);
                }
            }
        }
    }
}

/// Control side of a decoder running on its own thread.
pub struct DecoderHandle {
    id: VoiceId,
    commands: Producer<DecoderCommand>,
    join: thread::JoinHandle<Result<(), ReaderError>>,
}

impl fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderHandle")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DecoderHandle {
    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    pub fn seek(&mut self, source_frame: i64) -> Result<(), PushError<DecoderCommand>> {
        self.commands.push(DecoderCommand::Seek(source_frame))
    }

    /// Ask the thread to stop and wait for it. Returns the error that ended
    /// the thread, if any.
    pub fn stop(mut self) -> Result<(), ReaderError> {
        while self.commands.push(DecoderCommand::Stop).is_err() && self.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        self.join()
    }

    /// Wait for the thread to end on its own.
    pub fn join(self) -> Result<(), ReaderError> {
        self.join
            .join()
            .map_err(|_| ReaderError::DecoderPanicked)?
    }
}
