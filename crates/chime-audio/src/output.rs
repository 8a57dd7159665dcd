//! Audio output using cpal.

use chime_core::{Error, OutputFormat, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, Stream, StreamConfig,
};
use tracing::{debug, error, info};

use crate::mixer::SharedMixer;

/// Frames rendered per mixer pass inside the device callback.
const SCRATCH_FRAMES: usize = 4096;

/// Output stream pulling samples from the mixer on every device callback.
///
/// `cpal::Stream` is not `Send`, so the owner must keep this on the thread
/// that created it.
pub struct AudioOutput {
    _stream: Stream,
    format: OutputFormat,
    device_name: String,
}

impl AudioOutput {
    /// Create a new audio output with the default device.
    pub fn new(mixer: SharedMixer) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;

        Self::with_device(device, mixer)
    }

    /// Create a new audio output with a specific device.
    ///
    /// The mixer is reconfigured to the device's native format before the
    /// stream starts.
    pub fn with_device(device: Device, mixer: SharedMixer) -> Result<Self> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;

        debug!("Supported output config: {:?}", supported_config);

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        let format = OutputFormat {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };
        mixer.lock().configure(format);

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, mixer)?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, mixer)?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, mixer)?,
            _ => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

        debug!(
            "Output stream started: {}Hz, {} channels, {:?}",
            format.sample_rate, format.channels, sample_format
        );

        Ok(Self {
            _stream: stream,
            format,
            device_name,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &Device,
        config: &StreamConfig,
        mixer: SharedMixer,
    ) -> Result<Stream> {
        let err_fn = |err| {
            error!("Audio stream error: {err}");
        };

        // Fixed size; larger device buffers are rendered in several passes
        let channels = usize::from(config.channels).max(1);
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * channels];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    fill_from_mixer(&mixer, &mut scratch, data);
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))?;

        Ok(stream)
    }

    /// Format the device renders in.
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// Render the mixer into a device buffer of any length.
///
/// `scratch` is never resized, so nothing is allocated on the audio thread.
/// Its length must be a whole number of frames.
fn fill_from_mixer<T: cpal::FromSample<f32>>(
    mixer: &SharedMixer,
    scratch: &mut [f32],
    data: &mut [T],
) {
    if scratch.is_empty() {
        return;
    }
    for chunk in data.chunks_mut(scratch.len()) {
        let mixed = &mut scratch[..chunk.len()];
        mixer.lock().render(mixed);

        for (sample, &value) in chunk.iter_mut().zip(mixed.iter()) {
            *sample = T::from_sample_(value);
        }
    }
}

/// An output device offered by the default host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDevice {
    pub name: String,
    /// The device `SoundEngine::new` would open.
    pub is_default: bool,
}

/// Output devices of the default host, with the default one flagged.
pub fn output_devices() -> Result<Vec<OutputDevice>> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .map(|name| OutputDevice {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        })
        .collect();

    Ok(devices)
}
