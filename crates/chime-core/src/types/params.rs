//! Playback parameters and instance lifecycle.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Lifecycle of a single playback instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InstanceState {
    /// Created but not yet handed to the mixer.
    #[default]
    Starting,
    /// Audible on the next mixer tick.
    Playing,
    /// Finished or stopped; never plays again.
    Stopped,
}

/// Per-instance playback settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayParams {
    /// Wrap to the start instead of finishing.
    pub looping: bool,
    /// Linear gain, 0.0 is silence. Values above 1.0 amplify.
    pub volume: f32,
    /// Playback rate multiplier. Changes speed and tone together.
    pub pitch: f32,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            looping: false,
            volume: 1.0,
            pitch: 1.0,
        }
    }
}

impl PlayParams {
    pub fn new(looping: bool, volume: f32, pitch: f32) -> Self {
        Self {
            looping,
            volume,
            pitch,
        }
    }

    /// Looping playback with default volume and pitch.
    pub fn looped() -> Self {
        Self {
            looping: true,
            ..Self::default()
        }
    }

    /// Check that volume is finite and non-negative and pitch is finite and positive.
    pub fn validate(&self) -> Result<()> {
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "volume must be a finite value >= 0.0, got {}",
                self.volume
            )));
        }
        if !self.pitch.is_finite() || self.pitch <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "pitch must be a finite value > 0.0, got {}",
                self.pitch
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let params = PlayParams::default();
        assert!(!params.looping);
        assert!((params.volume - 1.0).abs() < f32::EPSILON);
        assert!((params.pitch - 1.0).abs() < f32::EPSILON);
        assert!(params.validate().is_ok());
        assert_eq!(InstanceState::default(), InstanceState::Starting);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(PlayParams::new(false, -0.1, 1.0).validate().is_err());
        assert!(PlayParams::new(false, f32::NAN, 1.0).validate().is_err());
        assert!(PlayParams::new(false, 1.0, 0.0).validate().is_err());
        assert!(PlayParams::new(false, 1.0, -2.0).validate().is_err());
        assert!(PlayParams::new(false, 1.0, f32::INFINITY).validate().is_err());
        // No upper bound on volume
        assert!(PlayParams::new(true, 4.0, 0.5).validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_valid_ranges_accepted(volume in 0.0f32..100.0, pitch in 0.001f32..16.0) {
            prop_assert!(PlayParams::new(false, volume, pitch).validate().is_ok());
        }
    }
}
