//! Decoded sound assets and the name-keyed table that owns them.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chime_core::{Error, OutputFormat, Result};
use tracing::{debug, trace};

use crate::decode::decode_file;
use crate::resample::{remix_channels, Resampler};

/// A sound fully decoded into the mixer's output format.
#[derive(Debug)]
pub struct SoundAsset {
    name: Arc<str>,
    /// Interleaved, already at `sample_rate` with `channels` channels.
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    source_rate: u32,
    path: Option<PathBuf>,
}

impl SoundAsset {
    /// Decode a file and convert it to `format`.
    pub fn load(name: &str, path: &Path, format: OutputFormat) -> Result<Self> {
        let decoded = decode_file(path)?;
        let source_rate = decoded.sample_rate;

        let samples = remix_channels(&decoded.samples, decoded.channels, format.channels);
        let samples = Resampler::new(
            source_rate,
            format.sample_rate,
            usize::from(format.channels),
        )?
        .process_all(&samples)?;

        if samples.is_empty() {
            return Err(Error::Decode(format!(
                "{} resampled to zero frames",
                path.display()
            )));
        }

        debug!(
            "Loaded '{}' from {} ({} Hz -> {} Hz, {} channels)",
            name,
            path.display(),
            source_rate,
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            name: Arc::from(name),
            samples,
            sample_rate: format.sample_rate,
            channels: format.channels,
            source_rate,
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap samples that are already in the output format.
    pub fn from_samples(name: &str, samples: Vec<f32>, format: OutputFormat) -> Self {
        Self {
            name: Arc::from(name),
            samples,
            sample_rate: format.sample_rate,
            channels: format.channels,
            source_rate: format.sample_rate,
            path: None,
        }
    }

    /// Shared name, cheap to clone onto every instance.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate of the file before conversion.
    pub const fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// File the asset was decoded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }
}

/// Find the file for `name` (given without extension) under `base_path`.
///
/// Extensions are tried in order; the first regular file wins.
pub fn resolve_sound_file(base_path: &Path, name: &str, extensions: &[String]) -> Result<PathBuf> {
    for ext in extensions {
        let candidate = base_path.join(format!("{name}.{ext}"));
        trace!("Trying {}", candidate.display());
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(Error::FileNotFound {
        name: name.to_string(),
        base_path: base_path.to_path_buf(),
    })
}

/// Name-keyed table of preloaded sounds. A name maps to at most one asset.
#[derive(Debug, Default)]
pub struct AssetTable {
    assets: HashMap<String, Arc<SoundAsset>>,
}

impl AssetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<SoundAsset>> {
        self.assets.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    /// Insert an asset unless its name is taken.
    ///
    /// Returns the asset stored under the name afterwards, which is the
    /// existing one if there was a collision.
    pub fn insert(&mut self, asset: SoundAsset) -> Arc<SoundAsset> {
        self.assets
            .entry(asset.name().to_string())
            .or_insert_with(|| Arc::new(asset))
            .clone()
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<SoundAsset>> {
        self.assets.remove(name)
    }

    /// Sorted asset names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.assets.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Remove every asset, handing them back so the caller decides where they drop.
    pub fn drain(&mut self) -> Vec<Arc<SoundAsset>> {
        self.assets.drain().map(|(_, asset)| asset).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_tone;

    fn exts() -> Vec<String> {
        vec!["wav".to_string(), "mp3".to_string()]
    }

    #[test]
    fn test_resolve_prefers_first_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("click.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("click.wav"), b"").unwrap();

        let path = resolve_sound_file(dir.path(), "click", &exts()).unwrap();
        assert_eq!(path, dir.path().join("click.wav"));

        std::fs::write(dir.path().join("pop.mp3"), b"").unwrap();
        let path = resolve_sound_file(dir.path(), "pop", &exts()).unwrap();
        assert_eq!(path, dir.path().join("pop.mp3"));
    }

    #[test]
    fn test_resolve_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("folder.wav")).unwrap();

        let err = resolve_sound_file(dir.path(), "folder", &exts()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_load_converts_to_output_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tone(dir.path(), "blip", 24000, 1, 2400);
        let format = OutputFormat {
            sample_rate: 48000,
            channels: 2,
        };

        let asset = SoundAsset::load("blip", &path, format).unwrap();
        assert_eq!(asset.channels(), 2);
        assert_eq!(asset.sample_rate(), 48000);
        assert_eq!(asset.source_rate(), 24000);
        assert_eq!(asset.frames(), 4800);
        assert_eq!(asset.duration(), Duration::from_millis(100));
        assert_eq!(asset.path(), Some(path.as_path()));
    }

    #[test]
    fn test_table_keeps_first_insert() {
        let format = OutputFormat::default();
        let mut table = AssetTable::new();

        let first = table.insert(SoundAsset::from_samples("hit", vec![0.1; 8], format));
        let second = table.insert(SoundAsset::from_samples("hit", vec![0.9; 8], format));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
        assert!((table.get("hit").unwrap().samples()[0] - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_table_remove_and_names() {
        let format = OutputFormat::default();
        let mut table = AssetTable::new();
        table.insert(SoundAsset::from_samples("b", vec![0.0; 2], format));
        table.insert(SoundAsset::from_samples("a", vec![0.0; 2], format));

        assert_eq!(table.names(), vec!["a", "b"]);
        assert!(table.remove("a").is_some());
        assert!(table.remove("a").is_none());
        assert!(!table.contains("a"));
        assert_eq!(table.drain().len(), 1);
        assert!(table.is_empty());
    }
}
