//! Sound engine: the control surface over the asset table and the mixer.
//!
//! Every bool/count operation has a `try_*` twin returning [`Result`]. The
//! plain forms log the error and return `false` or `0`, which is what scripting
//! layers and game loops usually want.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chime_core::{EngineConfig, Error, InstanceState, OutputFormat, PlayParams, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::asset::{resolve_sound_file, AssetTable, SoundAsset};
use crate::mixer::{Mixer, SharedMixer};
use crate::output::AudioOutput;
use crate::registry::{InstanceId, PlaybackInstance};

/// Diagnostics that only appear after `set_debug(true)`.
macro_rules! diag {
    ($engine:expr, $($arg:tt)+) => {
        if $engine.debug_enabled() {
            tracing::info!(target: "chime::debug", $($arg)+);
        }
    };
}

/// Events emitted by the sound engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A sound was added to the asset table.
    AssetLoaded { name: String },
    /// A sound was removed from the asset table.
    AssetUnloaded { name: String },
    /// An instance started playing.
    InstanceStarted { id: InstanceId, name: Arc<str> },
    /// An instance was stopped before reaching its end.
    InstanceStopped { id: InstanceId, name: Arc<str> },
    /// A non-looping instance played to its end.
    InstanceFinished { id: InstanceId, name: Arc<str> },
}

/// Dedicated thread owning the cpal stream.
struct OutputThread {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Sound engine owning preloaded assets and playing instances.
pub struct SoundEngine {
    mixer: SharedMixer,
    assets: RwLock<AssetTable>,
    base_path: RwLock<PathBuf>,
    extensions: Vec<String>,
    format: OutputFormat,
    debug: AtomicBool,
    event_tx: Sender<EngineEvent>,
    event_rx: Receiver<EngineEvent>,
    output: Mutex<Option<OutputThread>>,
    device_name: Option<String>,
    closed: AtomicBool,
}

impl SoundEngine {
    /// Create an engine playing through the default output device.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let mixer = Mixer::shared(config.format());
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(OutputFormat, String)>>(1);

        let mixer_clone = mixer.clone();
        let handle = std::thread::Builder::new()
            .name("chime-output".to_string())
            .spawn(move || {
                // Create the output inside this thread (cpal::Stream is not Send)
                match AudioOutput::new(mixer_clone) {
                    Ok(output) => {
                        let _ = ready_tx.send(Ok((output.format(), output.device_name().to_string())));
                        // Keep the stream alive until shutdown or until the engine is gone
                        let _ = shutdown_rx.recv();
                        drop(output);
                        debug!("Audio output closed");
                    }
                    Err(e) => {
                        error!("Failed to initialize audio output: {e}");
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {e}")))?;

        let (format, device_name) = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(Error::AudioOutput(
                    "Output thread exited during startup".to_string(),
                ));
            }
        };

        info!(
            "Sound engine started ({} Hz, {} channels, device: {})",
            format.sample_rate, format.channels, device_name
        );

        Ok(Self::assemble(
            &config,
            mixer,
            format,
            Some(OutputThread {
                shutdown_tx,
                handle,
            }),
            Some(device_name),
        ))
    }

    /// Create an engine without an output device.
    ///
    /// Nothing is audible; samples are pulled with [`SoundEngine::render`] or
    /// [`SoundEngine::advance`] instead.
    pub fn headless(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let format = config.format();
        info!(
            "Headless sound engine started ({} Hz, {} channels)",
            format.sample_rate, format.channels
        );
        Ok(Self::assemble(
            &config,
            Mixer::shared(format),
            format,
            None,
            None,
        ))
    }

    fn assemble(
        config: &EngineConfig,
        mixer: SharedMixer,
        format: OutputFormat,
        output: Option<OutputThread>,
        device_name: Option<String>,
    ) -> Self {
        mixer.lock().set_master_volume(config.master_volume);
        let (event_tx, event_rx) = bounded(config.event_capacity.max(1));

        Self {
            mixer,
            assets: RwLock::new(AssetTable::new()),
            base_path: RwLock::new(config.base_path.clone()),
            extensions: config.extensions.clone(),
            format,
            debug: AtomicBool::new(config.debug),
            event_tx,
            event_rx,
            output: Mutex::new(output),
            device_name,
            closed: AtomicBool::new(false),
        }
    }

    // --- Global controls ---

    /// Set the directory searched by later loads. Loaded sounds are untouched.
    pub fn set_base_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        diag!(self, "Base path set to: {}", path.display());
        *self.base_path.write() = path;
    }

    pub fn base_path(&self) -> PathBuf {
        self.base_path.read().clone()
    }

    pub fn set_debug(&self, enable: bool) {
        self.debug.store(enable, Ordering::Relaxed);
        info!(
            "chime debug logging {}",
            if enable { "ENABLED" } else { "DISABLED" }
        );
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Set the gain applied to the whole mix. Negative values clamp to 0.0.
    pub fn set_master_volume(&self, volume: f32) {
        if !volume.is_finite() {
            warn!("Ignoring non-finite master volume: {volume}");
            return;
        }
        let volume = volume.max(0.0);
        self.mixer.lock().set_master_volume(volume);
        diag!(self, "Master volume set to: {volume:.2}");
    }

    pub fn master_volume(&self) -> f32 {
        self.mixer.lock().master_volume()
    }

    /// Format every asset is converted to.
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Output device name, `None` for headless engines.
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    // --- Asset table ---

    /// Resolve and decode a sound. Runs entirely outside the mixer lock.
    fn load_asset(&self, name: &str) -> Result<SoundAsset> {
        let base_path = self.base_path();
        let path = resolve_sound_file(&base_path, name, &self.extensions)?;
        diag!(self, "Loading sound '{name}' from: {}", path.display());
        SoundAsset::load(name, &path, self.format)
    }

    /// Decode a sound into the asset table.
    ///
    /// Preloading a name that is already loaded keeps the existing asset.
    pub fn try_preload(&self, name: &str) -> Result<Arc<SoundAsset>> {
        let existing = self.assets.read().get(name);
        if let Some(asset) = existing {
            warn!("Sound '{name}' is already preloaded.");
            return Ok(asset);
        }

        let asset = self.load_asset(name)?;
        let stored = {
            let mut assets = self.assets.write();
            // Another caller may have stored the same name while this one decoded
            if let Some(existing) = assets.get(name) {
                drop(assets);
                diag!(self, "Sound '{name}' was preloaded concurrently; keeping the first copy.");
                return Ok(existing);
            }
            assets.insert(asset)
        };

        self.emit(EngineEvent::AssetLoaded {
            name: name.to_string(),
        });
        diag!(
            self,
            "Sound '{name}' preloaded successfully ({} frames).",
            stored.frames()
        );
        Ok(stored)
    }

    pub fn preload(&self, name: &str) -> bool {
        self.report("Preload", name, self.try_preload(name)).is_some()
    }

    /// Remove a preloaded sound, stopping every instance playing it first.
    pub fn try_unload(&self, name: &str) -> Result<()> {
        let Some(asset) = self.assets.write().remove(name) else {
            return Err(Error::AssetNotFound(name.to_string()));
        };

        let (stopped, reaped) = {
            let mut mixer = self.mixer.lock();
            let registry = mixer.registry_mut();
            (registry.stop_asset(&asset), registry.reap())
        };
        if stopped > 0 {
            diag!(self, "Stopped {stopped} instances of '{name}' before unloading");
        }
        self.publish_reaped(reaped);

        diag!(self, "Unloading preloaded sound '{name}'");
        drop(asset);
        self.emit(EngineEvent::AssetUnloaded {
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn unload(&self, name: &str) -> bool {
        self.report("Unload", name, self.try_unload(name)).is_some()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.assets.read().contains(name)
    }

    /// Sorted names of preloaded sounds.
    pub fn loaded_sounds(&self) -> Vec<String> {
        self.assets.read().names()
    }

    pub fn asset(&self, name: &str) -> Option<Arc<SoundAsset>> {
        self.assets.read().get(name)
    }

    // --- Instances ---

    /// Start a new instance, loading the sound from disk if it was not preloaded.
    ///
    /// An on-demand load is owned by the instance alone and never enters the
    /// asset table.
    pub fn try_play_instance(&self, name: &str, params: PlayParams) -> Result<InstanceId> {
        params.validate()?;

        let preloaded = self.assets.read().get(name);
        let is_preloaded = preloaded.is_some();
        let asset = match preloaded {
            Some(asset) => {
                diag!(self, "Playing preloaded sound: {name}");
                asset
            }
            None => {
                diag!(self, "Playing sound '{name}' directly from file");
                Arc::new(self.load_asset(name)?)
            }
        };

        let mut instance = PlaybackInstance::new(asset, params);
        instance.start();
        let instance_name = instance.name().clone();

        let (id, reaped) = {
            let mut mixer = self.mixer.lock();
            let registry = mixer.registry_mut();
            // Free finished slots first so they can be reused
            let reaped = registry.reap();
            (registry.insert(instance), reaped)
        };
        self.publish_reaped(reaped);

        self.emit(EngineEvent::InstanceStarted {
            id,
            name: instance_name,
        });
        diag!(
            self,
            "Started sound '{name}' {id} (Loop: {}, Vol: {:.2}, Pitch: {:.2}, Preloaded: {is_preloaded})",
            params.looping,
            params.volume,
            params.pitch
        );
        Ok(id)
    }

    /// Play a sound. Use `PlayParams::default()` for a single pass at normal
    /// volume and pitch.
    pub fn play(&self, name: &str, params: PlayParams) -> bool {
        self.report("Play", name, self.try_play_instance(name, params))
            .is_some()
    }

    /// Stop every playing instance of `name`, returning how many were stopped.
    pub fn stop(&self, name: &str) -> usize {
        let (stopped, reaped) = {
            let mut mixer = self.mixer.lock();
            let registry = mixer.registry_mut();
            (registry.stop_by_name(name), registry.reap())
        };
        self.publish_reaped(reaped);

        if stopped == 0 {
            warn!("Stop: Sound '{name}' not found playing.");
        } else {
            diag!(self, "Stopped {stopped} instances of '{name}'");
        }
        stopped
    }

    /// Stop everything, returning how many instances were playing.
    pub fn stop_all(&self) -> usize {
        let (stopped, reaped) = {
            let mut mixer = self.mixer.lock();
            let registry = mixer.registry_mut();
            (registry.stop_all(), registry.reap())
        };
        self.publish_reaped(reaped);

        diag!(self, "Stopped all {stopped} playing sounds.");
        stopped
    }

    /// Stop one instance. False if it already ended or the handle is stale.
    pub fn stop_instance(&self, id: InstanceId) -> bool {
        let (stopped, reaped) = {
            let mut mixer = self.mixer.lock();
            let registry = mixer.registry_mut();
            (registry.stop_instance(id), registry.reap())
        };
        self.publish_reaped(reaped);
        stopped
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.mixer.lock().registry().is_playing(name)
    }

    /// State of an instance, `None` once it has been reclaimed.
    pub fn instance_state(&self, id: InstanceId) -> Option<InstanceState> {
        self.mixer
            .lock()
            .registry()
            .get(id)
            .map(PlaybackInstance::state)
    }

    pub fn playing_count(&self) -> usize {
        self.mixer.lock().registry().playing_count()
    }

    /// Reclaim instances that finished on the audio side.
    ///
    /// Call once per frame from the host loop. Returns how many were reclaimed.
    pub fn update(&self) -> usize {
        let reaped = self.mixer.lock().registry_mut().reap();
        let count = reaped.len();
        self.publish_reaped(reaped);
        count
    }

    // --- Manual rendering ---

    /// Mix one buffer of interleaved samples in the engine format.
    ///
    /// Meant for headless engines; on a device-backed engine this advances
    /// playback in addition to the device callback.
    pub fn render(&self, out: &mut [f32]) {
        self.mixer.lock().render(out);
    }

    /// Render and discard `frames` frames, simulating elapsed playback.
    pub fn advance(&self, frames: usize) {
        let mut scratch = vec![0.0; frames * usize::from(self.format.channels)];
        self.render(&mut scratch);
    }

    // --- Events ---

    pub fn try_recv_event(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receiver sharing this engine's event stream.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.event_rx.clone()
    }

    fn emit(&self, event: EngineEvent) {
        // Never block the caller on a slow consumer
        let _ = self.event_tx.try_send(event);
    }

    /// Report reclaimed instances and drop them outside the mixer lock.
    fn publish_reaped(&self, reaped: Vec<(InstanceId, PlaybackInstance)>) {
        for (id, instance) in reaped {
            let name = instance.name().clone();
            if instance.completed() {
                diag!(self, "Cleaning up finished sound: {name}");
                self.emit(EngineEvent::InstanceFinished { id, name });
            } else {
                self.emit(EngineEvent::InstanceStopped { id, name });
            }
        }
    }

    /// Convert a failed operation into the logged `None` the plain API returns.
    fn report<T>(&self, op: &str, name: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) if e.is_not_found() || e.is_invalid_parameter() => {
                warn!("{op} '{name}': {e}");
                None
            }
            Err(e) => {
                error!("{op} '{name}' failed: {e}");
                None
            }
        }
    }

    // --- Lifecycle ---

    /// Stop every instance, drop every asset, and close the output device.
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down sound engine...");

        let reaped = {
            let mut mixer = self.mixer.lock();
            let registry = mixer.registry_mut();
            registry.stop_all();
            registry.reap()
        };
        drop(reaped);

        let assets = self.assets.write().drain();
        diag!(self, "Unloading {} preloaded sounds.", assets.len());
        drop(assets);

        if let Some(output) = self.output.lock().take() {
            let _ = output.shutdown_tx.send(());
            if output.handle.join().is_err() {
                error!("Audio output thread panicked");
            }
        }

        info!("Sound engine shut down");
    }
}

impl Drop for SoundEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
