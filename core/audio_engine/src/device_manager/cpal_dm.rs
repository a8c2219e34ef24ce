use super::{AudioDeviceManager, OutputFormat};
use crate::device_manager::{AudioDeviceError, AudioSource, AudioSourceBufferKind};
use cpal::{
    OutputCallbackInfo,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use log::{error, info};

/// Plays an [`AudioSource`] on the host's default output device.
pub struct CpalAudioDeviceManager {
    stream: Option<cpal::Stream>,
}

impl std::fmt::Debug for CpalAudioDeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalAudioDeviceManager")
            .field("running", &self.stream.is_some())
            .finish()
    }
}

impl CpalAudioDeviceManager {
    pub fn new() -> Self {
        Self { stream: None }
    }

    fn default_device() -> Result<(cpal::Device, cpal::SupportedStreamConfig), AudioDeviceError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or(AudioDeviceError::DeviceNotFound)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioDeviceError::StreamBuildFailed(e.to_string()))?;

        Ok((device, config))
    }

    fn build_output_stream<T, C>(
        device: &cpal::Device,
        config: cpal::SupportedStreamConfig,
        mut cb: C,
    ) -> Result<cpal::Stream, AudioDeviceError>
    where
        T: cpal::SizedSample,
        C: FnMut(&mut [T], usize) + Send + 'static,
    {
        let error_cb = move |err| {
            error!("output stream error: {err}");
        };

        let channels = config.channels() as usize;
        let data_cb = move |data: &mut [T], _: &OutputCallbackInfo| {
            let frame_size = data.len() / channels;
            cb(data, frame_size);
        };

        device
            .build_output_stream(&config.into(), data_cb, error_cb, None)
            .map_err(|e| AudioDeviceError::StreamBuildFailed(e.to_string()))
    }
}

impl Default for CpalAudioDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDeviceManager for CpalAudioDeviceManager {
    fn output_format(&self) -> Result<OutputFormat, AudioDeviceError> {
        let (_, config) = Self::default_device()?;
        Ok(OutputFormat {
            channels: config.channels() as usize,
            sample_rate: config.sample_rate().0,
        })
    }

    fn start_output_stream(
        &mut self,
        mut audio_source: Box<dyn AudioSource>,
    ) -> Result<(), AudioDeviceError> {
        let (device, config) = Self::default_device()?;
        info!(
            "opening output: {} channels at {} Hz ({:?})",
            config.channels(),
            config.sample_rate().0,
            config.sample_format()
        );

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_output_stream(&device, config, move |data: &mut [f32], frame_size| {
                    audio_source.fill_buffer(AudioSourceBufferKind::F32(data), frame_size);
                })?
            }
            cpal::SampleFormat::I16 => {
                Self::build_output_stream(&device, config, move |data: &mut [i16], frame_size| {
                    audio_source.fill_buffer(AudioSourceBufferKind::I16(data), frame_size);
                })?
            }
            format => {
                return Err(AudioDeviceError::StreamBuildFailed(format!(
                    "Unsupported sample format '{format}'"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| AudioDeviceError::StreamStartFailed(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }
}
