//! Audio decoding using symphonia.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::fs::File;
use std::path::Path;

use chime_core::{Error, Result};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    formats::{FormatOptions, FormatReader},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, trace, warn};

/// Fully decoded PCM in the file's native format.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }
}

/// Packet-by-packet decoder wrapping symphonia.
pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl AudioDecoder {
    /// Open a sound file, using its extension as a format hint.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| Error::Decode(format!("Failed to probe {}: {e}", path.display())))?;

        let format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode(format!("No audio tracks in {}", path.display())))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode(format!("Unknown sample rate in {}", path.display())))?;
        let channels = track.codec_params.channels.map_or(0, |c| c.count() as u16);

        debug!(
            "Audio track: id={}, sample_rate={}, channels={}",
            track_id, sample_rate, channels
        );

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {e}")))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            sample_buf: None,
        })
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count. Zero until the first packet if the container does not declare it.
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Decode the next packet and append its interleaved samples to `out`.
    ///
    /// Returns `false` at end of stream.
    pub fn decode_next(&mut self, out: &mut Vec<f32>) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(symphonia::core::errors::Error::ResetRequired) => {
                    // Chained streams are not supported; treat as the end.
                    return Ok(false);
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Failed to read packet: {e}")));
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let frames = decoded.capacity() as u64;
                    if self.channels == 0 {
                        self.channels = spec.channels.count() as u16;
                    }

                    // Reuse the conversion buffer unless this packet is larger
                    let needed = decoded.capacity() * spec.channels.count();
                    if self
                        .sample_buf
                        .as_ref()
                        .map_or(true, |buf| buf.capacity() < needed)
                    {
                        self.sample_buf = Some(SampleBuffer::new(frames, spec));
                    }

                    if let Some(buf) = self.sample_buf.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        out.extend_from_slice(buf.samples());
                        trace!("Decoded {} samples", buf.samples().len());
                    }
                    return Ok(true);
                }
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    // Log and skip corrupt frames
                    warn!("Decode error (skipping packet): {e}");
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Decode failed: {e}")));
                }
            }
        }
    }

    /// Decode every remaining packet.
    pub fn decode_to_end(mut self) -> Result<DecodedAudio> {
        let mut samples = Vec::new();
        while self.decode_next(&mut samples)? {}

        Ok(DecodedAudio {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }
}

/// Decode a whole file into memory.
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let audio = AudioDecoder::open(path)?.decode_to_end()?;

    if audio.channels == 0 || audio.frames() == 0 {
        return Err(Error::Decode(format!(
            "{} contains no audio frames",
            path.display()
        )));
    }

    debug!(
        "Decoded {}: {} frames, {} Hz, {} channels",
        path.display(),
        audio.frames(),
        audio.sample_rate,
        audio.channels
    );
    Ok(audio)
}
