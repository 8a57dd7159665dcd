//! Mixer tick: sums every playing instance into the output buffer.

use std::sync::Arc;

use chime_core::OutputFormat;
use parking_lot::Mutex;

use crate::registry::Registry;

/// Mixer shared between the control side and the output callback.
pub type SharedMixer = Arc<Mutex<Mixer>>;

/// Threshold above which the soft clipper starts compressing.
const CLIP_KNEE: f32 = 0.9;

/// Instance slots reserved up front so the callback rarely sees a reallocated arena.
const INITIAL_INSTANCES: usize = 64;

/// Registry of playing instances plus the master gain applied on every tick.
#[derive(Debug)]
pub struct Mixer {
    registry: Registry,
    master_volume: f32,
    format: OutputFormat,
}

impl Mixer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            registry: Registry::with_capacity(INITIAL_INSTANCES),
            master_volume: 1.0,
            format,
        }
    }

    pub fn shared(format: OutputFormat) -> SharedMixer {
        Arc::new(Mutex::new(Self::new(format)))
    }

    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Change the output format. Only valid before any asset is loaded for it.
    pub fn configure(&mut self, format: OutputFormat) {
        self.format = format;
    }

    pub const fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Negative values are clamped to silence.
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.max(0.0);
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Render one tick into interleaved `out`, overwriting its contents.
    ///
    /// Instances that reach their end are marked stopped here and reclaimed
    /// later by the control side.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);

        let channels = usize::from(self.format.channels);
        let master = self.master_volume;
        for instance in self.registry.playing_mut() {
            instance.mix_into(out, channels, master);
        }

        for sample in out.iter_mut() {
            *sample = soft_clip(*sample);
        }
    }
}

/// Bound a mixed sample to [-1, 1].
///
/// Linear up to the knee, then a `tanh` curve that approaches full scale
/// without a discontinuity.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    let magnitude = x.abs();
    if magnitude <= CLIP_KNEE {
        return x;
    }

    let headroom = 1.0 - CLIP_KNEE;
    let compressed = CLIP_KNEE + headroom * ((magnitude - CLIP_KNEE) / headroom).tanh();
    x.signum() * compressed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::SoundAsset;
    use crate::registry::PlaybackInstance;
    use chime_core::PlayParams;
    use proptest::prelude::*;

    const STEREO: OutputFormat = OutputFormat {
        sample_rate: 100,
        channels: 2,
    };

    fn play(mixer: &mut Mixer, samples: Vec<f32>, params: PlayParams) {
        let asset = Arc::new(SoundAsset::from_samples("tone", samples, STEREO));
        let mut instance = PlaybackInstance::new(asset, params);
        instance.start();
        mixer.registry_mut().insert(instance);
    }

    #[test]
    fn test_render_silence_when_idle() {
        let mut mixer = Mixer::new(STEREO);
        let mut out = vec![1.0; 8];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_render_sums_instances() {
        let mut mixer = Mixer::new(STEREO);
        play(&mut mixer, vec![0.2; 8], PlayParams::default());
        play(&mut mixer, vec![0.3; 8], PlayParams::new(false, 1.0, 1.0));

        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_master_volume_scales_and_clamps() {
        let mut mixer = Mixer::new(STEREO);
        play(&mut mixer, vec![0.8; 8], PlayParams::new(false, 0.5, 1.0));
        mixer.set_master_volume(0.5);

        let mut out = vec![0.0; 2];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| (s - 0.2).abs() < 1e-6));

        mixer.set_master_volume(-3.0);
        assert_eq!(mixer.master_volume(), 0.0);
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_finished_instances_stop_but_stay_until_reaped() {
        let mut mixer = Mixer::new(STEREO);
        play(&mut mixer, vec![0.1; 4], PlayParams::default());

        let mut out = vec![0.0; 8];
        mixer.render(&mut out);
        assert!(!mixer.registry().is_playing("tone"));
        assert_eq!(mixer.registry().len(), 1);
        assert_eq!(mixer.registry_mut().reap().len(), 1);
    }

    #[test]
    fn test_soft_clip_shape() {
        assert_eq!(soft_clip(0.5), 0.5);
        assert_eq!(soft_clip(-0.9), -0.9);
        assert!(soft_clip(1.5) < 1.0);
        assert!(soft_clip(1.5) > 0.9);
        assert!((soft_clip(-1.5) + soft_clip(1.5)).abs() < f32::EPSILON);
    }

    proptest! {
        #[test]
        fn prop_soft_clip_bounded(x in -1000.0f32..1000.0) {
            let y = soft_clip(x);
            prop_assert!(y.abs() <= 1.0);
            prop_assert!(y.abs() <= x.abs() + 1e-6);
        }

        #[test]
        fn prop_soft_clip_monotonic(a in -10.0f32..10.0, b in -10.0f32..10.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(soft_clip(lo) <= soft_clip(hi) + 1e-6);
        }
    }
}
