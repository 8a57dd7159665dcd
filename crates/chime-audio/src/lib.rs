//! # chime-audio
//!
//! Sound playback engine for Chime.
//!
//! Features:
//! - Name-keyed table of fully decoded sounds (symphonia)
//! - Conversion to the output format at load time (rubato)
//! - Generational instance registry with per-instance volume, pitch, and looping
//! - Mixer pulled directly from a low-latency cpal output callback

pub mod asset;
pub mod decode;
pub mod engine;
pub mod mixer;
pub mod output;
pub mod registry;
pub mod resample;

#[cfg(test)]
pub(crate) mod test_support;

pub use asset::{AssetTable, SoundAsset};
pub use engine::{EngineEvent, SoundEngine};
pub use mixer::{Mixer, SharedMixer};
pub use output::{output_devices, OutputDevice};
pub use registry::{InstanceId, PlaybackInstance, Registry};
