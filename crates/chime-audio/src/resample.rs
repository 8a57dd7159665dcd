//! Sample rate and channel conversion using rubato.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use chime_core::{Error, Result};
use rubato::{FftFixedIn, Resampler as RubatoResampler};
use tracing::debug;

/// Input frames fed to rubato per call.
const CHUNK_SIZE: usize = 1024;

/// Converts whole sounds to the output sample rate before they reach the mixer.
pub struct Resampler {
    /// `None` when the rates already match.
    inner: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
}

impl Resampler {
    /// Create a new resampler.
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        if channels == 0 || input_rate == 0 || output_rate == 0 {
            return Err(Error::Resample(format!(
                "cannot resample {channels} channels from {input_rate}Hz to {output_rate}Hz"
            )));
        }

        let inner = if input_rate == output_rate {
            None
        } else {
            let resampler = FftFixedIn::new(
                input_rate as usize,
                output_rate as usize,
                CHUNK_SIZE,
                2,
                channels,
            )
            .map_err(|e| Error::Resample(format!("Failed to create resampler: {e}")))?;

            debug!(
                "Resampler created: {}Hz -> {}Hz, {} channels",
                input_rate, output_rate, channels
            );
            Some(resampler)
        };

        Ok(Self {
            inner,
            input_rate,
            output_rate,
            channels,
        })
    }

    /// Check if resampling is needed.
    pub const fn needs_resampling(&self) -> bool {
        self.inner.is_some()
    }

    pub const fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub const fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Number of output frames a complete input of `frames` frames maps to.
    pub fn output_frames(&self, frames: usize) -> usize {
        (frames as u64 * u64::from(self.output_rate)).div_ceil(u64::from(self.input_rate)) as usize
    }

    /// Resample a complete interleaved sound.
    ///
    /// The filter delay is trimmed from the front and the tail is flushed with
    /// silence, so the result holds exactly `output_frames(input_frames)` frames.
    pub fn process_all(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let frames = input.len() / self.channels;
        let expected = self.output_frames(frames);

        let Some(resampler) = self.inner.as_mut() else {
            return Ok(input[..frames * self.channels].to_vec());
        };
        resampler.reset();

        let planes = deinterleave(input, self.channels);
        let delay = resampler.output_delay();
        let target = expected + delay;

        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(target + CHUNK_SIZE); self.channels];
        let mut position = 0;

        while output[0].len() < target {
            // Zero-padded past the end of the input to drain the filter
            let chunk: Vec<Vec<f32>> = planes
                .iter()
                .map(|plane| {
                    let start = position.min(plane.len());
                    let end = (position + CHUNK_SIZE).min(plane.len());
                    let mut data = plane[start..end].to_vec();
                    data.resize(CHUNK_SIZE, 0.0);
                    data
                })
                .collect();
            position += CHUNK_SIZE;

            let resampled = resampler
                .process(&chunk, None)
                .map_err(|e| Error::Resample(format!("Resample failed: {e}")))?;

            if resampled.first().map_or(true, Vec::is_empty) {
                return Err(Error::Resample("Resampler produced no output".to_string()));
            }

            for (dst, src) in output.iter_mut().zip(resampled) {
                dst.extend(src);
            }
        }

        for plane in &mut output {
            plane.drain(..delay);
            plane.truncate(expected);
        }

        Ok(interleave(&output))
    }
}

/// Convert interleaved samples from one channel count to another.
///
/// Downmixing to mono averages every channel; any other conversion maps output
/// channel `c` to input channel `c % from`, so mono is duplicated.
pub fn remix_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    let from = usize::from(from);
    let to = usize::from(to);
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut output = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            output.extend((0..to).map(|c| frame[c % from]));
        }
    }

    output
}

/// Split interleaved samples into one buffer per channel.
fn deinterleave(input: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = input.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];

    for frame in input.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }

    planes
}

/// Interleave channel buffers into output.
fn interleave(planes: &[Vec<f32>]) -> Vec<f32> {
    if planes.is_empty() || planes[0].is_empty() {
        return Vec::new();
    }

    let frames = planes[0].len();
    let mut output = Vec::with_capacity(frames * planes.len());

    for frame in 0..frames {
        for plane in planes {
            output.push(plane[frame]);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_resampling() {
        let mut resampler = Resampler::new(48000, 48000, 2).unwrap();
        assert!(!resampler.needs_resampling());

        let input = vec![0.5f32; 2048];
        let output = resampler.process_all(&input).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_resampler_creation() {
        let resampler = Resampler::new(48000, 44100, 2).unwrap();
        assert!(resampler.needs_resampling());
        assert_eq!(resampler.input_rate(), 48000);
        assert_eq!(resampler.output_rate(), 44100);
        assert_eq!(resampler.channels(), 2);
        assert!(Resampler::new(48000, 44100, 0).is_err());
    }

    #[test]
    fn test_upsample_length_and_level() {
        let mut resampler = Resampler::new(24000, 48000, 1).unwrap();
        let input = vec![0.5f32; 2400];

        let output = resampler.process_all(&input).unwrap();
        assert_eq!(output.len(), 4800);

        // Away from the edges a constant signal stays constant
        for sample in &output[1000..3800] {
            assert!((sample - 0.5).abs() < 0.05, "sample drifted to {sample}");
        }
    }

    #[test]
    fn test_downsample_stereo_length() {
        let mut resampler = Resampler::new(44100, 22050, 2).unwrap();
        let input = vec![0.0f32; 4410 * 2];

        let output = resampler.process_all(&input).unwrap();
        assert_eq!(output.len(), 2205 * 2);
    }

    #[test]
    fn test_remix_mono_to_stereo() {
        let output = remix_channels(&[0.1, 0.2, 0.3], 1, 2);
        assert_eq!(output, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_remix_stereo_to_mono() {
        let output = remix_channels(&[1.0, 0.0, 0.5, 0.5], 2, 1);
        assert_eq!(output, vec![0.5, 0.5]);
    }

    #[test]
    fn test_remix_same_channels() {
        let input = vec![0.25f32; 6];
        assert_eq!(remix_channels(&input, 2, 2), input);
    }
}
