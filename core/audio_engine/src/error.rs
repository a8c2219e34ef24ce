use thiserror::Error;

/// Hard failures from a [`Reader`](crate::reader::Reader).
///
/// These are never retried: `retried_read` hands them back untouched and the
/// owner of the stream decides whether playback stops.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported stream: {0}")]
    Unsupported(String),

    #[error("stream does not support seeking")]
    SeekUnsupported,

    #[error("seek to source frame {0} is out of range")]
    SeekOutOfRange(i64),

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoder thread panicked")]
    DecoderPanicked,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MixerError {
    #[error("cannot mix a {voice}-channel voice into {mixer} output channels")]
    ChannelMismatch { voice: usize, mixer: usize },

    #[error("mixer command queue is full")]
    CommandQueueFull,
}
