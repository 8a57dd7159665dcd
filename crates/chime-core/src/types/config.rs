//! Engine configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Sample layout the mixer renders in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// Settings applied when a sound engine is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory searched for sound files.
    pub base_path: PathBuf,
    /// File extensions probed, in order, when resolving a sound name.
    pub extensions: Vec<String>,
    /// Output sample rate when no device dictates one.
    pub sample_rate: u32,
    /// Output channel count when no device dictates one.
    pub channels: u16,
    /// Initial master volume.
    pub master_volume: f32,
    /// Start with diagnostic logging enabled.
    pub debug: bool,
    /// Capacity of the engine event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::new(),
            extensions: vec!["wav".to_string(), "mp3".to_string()],
            sample_rate: 48000,
            channels: 2,
            master_volume: 1.0,
            debug: false,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Default configuration searching the given directory.
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Output format used when no device dictates one.
    pub const fn format(&self) -> OutputFormat {
        OutputFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".to_string()));
        }
        if self.channels == 0 {
            return Err(Error::Config("channels must be non-zero".to_string()));
        }
        if self.extensions.is_empty() {
            return Err(Error::Config(
                "at least one file extension is required".to_string(),
            ));
        }
        if !self.master_volume.is_finite() || self.master_volume < 0.0 {
            return Err(Error::Config(format!(
                "master_volume must be a finite value >= 0.0, got {}",
                self.master_volume
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.extensions, vec!["wav", "mp3"]);
        assert_eq!(config.format(), OutputFormat::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "base_path": "sfx", "debug": true }}"#).unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.base_path, PathBuf::from("sfx"));
        assert!(config.debug);
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "channels": 0 }}"#).unwrap();
        assert!(matches!(
            EngineConfig::from_json_file(file.path()),
            Err(Error::Config(_))
        ));

        let config = EngineConfig {
            extensions: Vec::new(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            EngineConfig::from_json_file(file.path()),
            Err(Error::Json(_))
        ));
    }
}
