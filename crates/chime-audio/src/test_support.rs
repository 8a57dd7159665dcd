//! WAV fixtures for tests.

#![allow(clippy::unwrap_used)]

use std::f32::consts::TAU;
use std::path::{Path, PathBuf};

fn create_wav(
    dir: &Path,
    name: &str,
    sample_rate: u32,
    channels: u16,
    frames: u32,
    mut sample_at: impl FnMut(u32) -> i16,
) -> PathBuf {
    let path = dir.join(format!("{name}.wav"));
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for frame in 0..frames {
        let sample = sample_at(frame);
        for _ in 0..channels {
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

/// 440 Hz sine at half scale.
pub(crate) fn write_tone(
    dir: &Path,
    name: &str,
    sample_rate: u32,
    channels: u16,
    frames: u32,
) -> PathBuf {
    create_wav(dir, name, sample_rate, channels, frames, |frame| {
        let t = frame as f32 / sample_rate as f32;
        ((t * 440.0 * TAU).sin() * 0.5 * f32::from(i16::MAX)) as i16
    })
}

/// Every sample set to `value`.
pub(crate) fn write_constant(
    dir: &Path,
    name: &str,
    sample_rate: u32,
    channels: u16,
    frames: u32,
    value: i16,
) -> PathBuf {
    create_wav(dir, name, sample_rate, channels, frames, |_| value)
}
