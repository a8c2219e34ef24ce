use thiserror::Error;

pub mod cpal_dm;

/// Output buffer handed to an [`AudioSource`], in the representation the
/// device asked for.
#[derive(Debug)]
pub enum AudioSourceBufferKind<'a, 'b> {
    /// Interleaved float PCM.
    F32(&'a mut [f32]),
    /// Interleaved signed 16-bit PCM.
    I16(&'a mut [i16]),
    /// One float buffer per channel.
    Planar(&'a mut [&'b mut [f32]]),
}

/// Something the output device can pull mixed audio from.
pub trait AudioSource: Send {
    /// Fill `buffer` with `frame_size` frames. Called on the real-time thread.
    fn fill_buffer(&mut self, buffer: AudioSourceBufferKind<'_, '_>, frame_size: usize);
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioDeviceError {
    #[error("no output device available")]
    DeviceNotFound,
    #[error("failed to build output stream: {0}")]
    StreamBuildFailed(String),
    #[error("failed to start output stream: {0}")]
    StreamStartFailed(String),
}

/// Layout of the stream a device manager will open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub channels: usize,
    pub sample_rate: u32,
}

pub trait AudioDeviceManager {
    /// Format the next call to `start_output_stream` will use.
    fn output_format(&self) -> Result<OutputFormat, AudioDeviceError>;

    fn start_output_stream(
        &mut self,
        audio_source: Box<dyn AudioSource>,
    ) -> Result<(), AudioDeviceError>;
}
