//! Playback instances and the generational registry that owns them.
//!
//! Slots are reused through a free list. Every reuse bumps the slot's
//! generation, so an [`InstanceId`] held by a caller can never refer to a
//! different instance than the one it was issued for.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::fmt;
use std::sync::Arc;

use chime_core::{InstanceState, PlayParams};

use crate::asset::SoundAsset;

/// Stable handle to one playback instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId {
    index: u32,
    generation: u32,
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// One playback of an asset.
#[derive(Debug)]
pub struct PlaybackInstance {
    asset: Arc<SoundAsset>,
    params: PlayParams,
    /// Position in frames; fractional when pitch is not 1.0.
    cursor: f64,
    state: InstanceState,
    /// Set when the cursor ran off the end rather than being stopped.
    completed: bool,
}

impl PlaybackInstance {
    pub fn new(asset: Arc<SoundAsset>, params: PlayParams) -> Self {
        Self {
            asset,
            params,
            cursor: 0.0,
            state: InstanceState::Starting,
            completed: false,
        }
    }

    pub fn name(&self) -> &Arc<str> {
        self.asset.name()
    }

    pub const fn asset(&self) -> &Arc<SoundAsset> {
        &self.asset
    }

    pub const fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == InstanceState::Playing
    }

    pub const fn cursor(&self) -> f64 {
        self.cursor
    }

    /// True if playback ended by reaching the end of a non-looping asset.
    pub const fn completed(&self) -> bool {
        self.completed
    }

    fn finish(&mut self) {
        self.state = InstanceState::Stopped;
        self.completed = true;
    }

    /// Starting -> Playing. No effect once stopped.
    pub fn start(&mut self) {
        if self.state == InstanceState::Starting {
            self.state = InstanceState::Playing;
        }
    }

    /// Returns true if the instance was playing.
    pub fn stop(&mut self) -> bool {
        let was_playing = self.is_playing();
        self.state = InstanceState::Stopped;
        was_playing
    }

    /// Add this instance into an interleaved output buffer and advance the cursor.
    ///
    /// `out` must use the asset's channel count. Reads are linearly
    /// interpolated between frames so any positive pitch works.
    pub fn mix_into(&mut self, out: &mut [f32], channels: usize, master_volume: f32) {
        if !self.is_playing() {
            return;
        }

        let data = self.asset.samples();
        let src_channels = usize::from(self.asset.channels());
        let frames = self.asset.frames();
        if frames == 0 || src_channels == 0 || channels == 0 {
            self.state = InstanceState::Stopped;
            return;
        }

        let length = frames as f64;
        let looping = self.params.looping;
        let gain = self.params.volume * master_volume;
        let step = f64::from(self.params.pitch);

        for frame in out.chunks_exact_mut(channels) {
            if self.cursor >= length {
                if looping {
                    self.cursor %= length;
                } else {
                    self.finish();
                    return;
                }
            }

            let index = self.cursor as usize;
            let frac = (self.cursor - index as f64) as f32;
            let next = if index + 1 < frames {
                index + 1
            } else if looping {
                0
            } else {
                index
            };

            for (c, sample) in frame.iter_mut().enumerate() {
                let ch = c % src_channels;
                let a = data[index * src_channels + ch];
                let b = data[next * src_channels + ch];
                *sample += (a + (b - a) * frac) * gain;
            }

            self.cursor += step;
        }

        if self.cursor >= length {
            if looping {
                self.cursor %= length;
            } else {
                self.finish();
            }
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    instance: Option<PlaybackInstance>,
}

/// Arena of playback instances addressed by [`InstanceId`].
///
/// Stopped instances stay in their slot until [`Registry::reap`] detaches
/// them, so the audio thread never drops sample data.
#[derive(Debug, Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate room for `capacity` instances.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, instance: PlaybackInstance) -> InstanceId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.instance = Some(instance);
            return InstanceId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            instance: Some(instance),
        });
        InstanceId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: InstanceId) -> Option<&PlaybackInstance> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.instance.as_ref())
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut PlaybackInstance> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.instance.as_mut())
    }

    /// Every live instance, including stopped ones not yet reaped.
    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &PlaybackInstance)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.instance.as_ref().map(|instance| {
                (
                    InstanceId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    instance,
                )
            })
        })
    }

    pub fn playing_mut(&mut self) -> impl Iterator<Item = &mut PlaybackInstance> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.instance.as_mut())
            .filter(|instance| instance.is_playing())
    }

    /// Stop playing instances matching `predicate`, returning how many stopped.
    pub fn stop_where(&mut self, mut predicate: impl FnMut(&PlaybackInstance) -> bool) -> usize {
        self.playing_mut()
            .filter(|instance| predicate(instance))
            .map(PlaybackInstance::stop)
            .filter(|&was_playing| was_playing)
            .count()
    }

    pub fn stop_by_name(&mut self, name: &str) -> usize {
        self.stop_where(|instance| &**instance.name() == name)
    }

    pub fn stop_asset(&mut self, asset: &Arc<SoundAsset>) -> usize {
        self.stop_where(|instance| Arc::ptr_eq(instance.asset(), asset))
    }

    pub fn stop_all(&mut self) -> usize {
        self.stop_where(|_| true)
    }

    pub fn stop_instance(&mut self, id: InstanceId) -> bool {
        self.get_mut(id).is_some_and(PlaybackInstance::stop)
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.iter()
            .any(|(_, instance)| instance.is_playing() && &**instance.name() == name)
    }

    pub fn playing_count(&self) -> usize {
        self.iter()
            .filter(|(_, instance)| instance.is_playing())
            .count()
    }

    /// Detach every stopped instance and free its slot.
    pub fn reap(&mut self) -> Vec<(InstanceId, PlaybackInstance)> {
        let mut reaped = Vec::new();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let finished = slot
                .instance
                .as_ref()
                .is_some_and(|instance| instance.state() == InstanceState::Stopped);
            if !finished {
                continue;
            }

            if let Some(instance) = slot.instance.take() {
                let id = InstanceId {
                    index: index as u32,
                    generation: slot.generation,
                };
                self.free.push(index as u32);
                reaped.push((id, instance));
            }
        }

        reaped
    }

    /// Number of occupied slots, stopped or not.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::OutputFormat;

    const MONO: OutputFormat = OutputFormat {
        sample_rate: 8,
        channels: 1,
    };

    fn asset(name: &str, samples: Vec<f32>) -> Arc<SoundAsset> {
        Arc::new(SoundAsset::from_samples(name, samples, MONO))
    }

    fn started(asset: &Arc<SoundAsset>, params: PlayParams) -> PlaybackInstance {
        let mut instance = PlaybackInstance::new(asset.clone(), params);
        instance.start();
        instance
    }

    #[test]
    fn test_lifecycle() {
        let a = asset("a", vec![0.5; 4]);
        let mut instance = PlaybackInstance::new(a, PlayParams::default());
        assert_eq!(instance.state(), InstanceState::Starting);

        instance.start();
        assert!(instance.is_playing());
        assert!(instance.stop());
        assert!(!instance.completed());
        assert!(!instance.stop());

        instance.start();
        assert_eq!(instance.state(), InstanceState::Stopped);
    }

    #[test]
    fn test_mix_finishes_without_looping() {
        let a = asset("a", vec![0.25; 4]);
        let mut instance = started(&a, PlayParams::default());

        let mut out = vec![0.0; 6];
        instance.mix_into(&mut out, 1, 1.0);
        assert_eq!(out, vec![0.25, 0.25, 0.25, 0.25, 0.0, 0.0]);
        assert_eq!(instance.state(), InstanceState::Stopped);
        assert!(instance.completed());
    }

    #[test]
    fn test_mix_wraps_when_looping() {
        let a = asset("a", vec![1.0, 2.0, 3.0]);
        let mut instance = started(&a, PlayParams::looped());

        let mut out = vec![0.0; 7];
        instance.mix_into(&mut out, 1, 1.0);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
        assert!(instance.is_playing());
        assert!((instance.cursor() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mix_applies_gain_and_pitch() {
        let a = asset("a", vec![0.0, 1.0, 0.0, 1.0]);
        let mut instance = started(&a, PlayParams::new(false, 0.5, 0.5));

        let mut out = vec![0.0; 3];
        instance.mix_into(&mut out, 1, 0.5);
        // Half speed interpolates between frames; gain is 0.5 * 0.5
        assert_eq!(out, vec![0.0, 0.125, 0.25]);
        assert!((instance.cursor() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mix_into_wider_output() {
        let a = asset("a", vec![0.5; 2]);
        let mut instance = started(&a, PlayParams::default());

        let mut out = vec![0.0; 4];
        instance.mix_into(&mut out, 2, 1.0);
        assert_eq!(out, vec![0.5; 4]);
    }

    #[test]
    fn test_stop_by_name_counts() {
        let boom = asset("boom", vec![0.0; 4]);
        let click = asset("click", vec![0.0; 4]);
        let mut registry = Registry::new();

        registry.insert(started(&boom, PlayParams::default()));
        registry.insert(started(&boom, PlayParams::looped()));
        registry.insert(started(&click, PlayParams::default()));

        assert!(registry.is_playing("boom"));
        assert_eq!(registry.stop_by_name("boom"), 2);
        assert_eq!(registry.stop_by_name("boom"), 0);
        assert!(!registry.is_playing("boom"));
        assert!(registry.is_playing("click"));
        assert_eq!(registry.stop_all(), 1);
        assert_eq!(registry.playing_count(), 0);
    }

    #[test]
    fn test_reap_and_generations() {
        let a = asset("a", vec![0.0; 4]);
        let mut registry = Registry::new();

        let first = registry.insert(started(&a, PlayParams::default()));
        assert!(registry.stop_instance(first));
        assert!(!registry.stop_instance(first));

        let reaped = registry.reap();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].0, first);
        assert!(registry.is_empty());
        assert!(registry.get(first).is_none());

        // Slot reused with a new generation
        let second = registry.insert(started(&a, PlayParams::default()));
        assert_ne!(first, second);
        assert!(registry.get(first).is_none());
        assert!(registry.get(second).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stop_asset_uses_identity() {
        let preloaded = asset("boom", vec![0.0; 4]);
        let streamed = asset("boom", vec![0.0; 4]);
        let mut registry = Registry::new();

        registry.insert(started(&preloaded, PlayParams::default()));
        let other = registry.insert(started(&streamed, PlayParams::default()));

        assert_eq!(registry.stop_asset(&preloaded), 1);
        assert!(registry.get(other).unwrap().is_playing());
    }
}
