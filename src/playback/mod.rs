//! Playback Controller
//!
//! Owns the engine, the loaded asset and the parameter catalog, and drives
//! the Idle -> Loaded -> Playing -> Loaded state machine.
//!
//! All mutation happens on the caller's thread through `&mut self`. The
//! render context and the settle timer never touch controller state: they
//! post [`ControlMessage`]s that the caller applies with
//! [`PlaybackController::process_pending`] or
//! [`PlaybackController::wait_and_process`]. Each message carries the load
//! generation (and, for completions, the play token) it was issued under, so
//! messages that outlive their load or play are discarded. Every transport
//! and load call drains the queue first, so a completion that is already
//! posted takes effect before that call checks the state.

mod state;

pub use state::{ControllerEvent, ControllerSnapshot, PlaybackState};

use crate::asset::{AudioAsset, DirectAccess, FileAccess};
use crate::audio::{AudioEngine, AudioOutput, GraphHandle};
use crate::config::PlayerConfig;
use crate::effect::{default_instantiator, EffectInstantiator};
use crate::error::PlayerError;
use crate::params::{ParameterAddress, ParameterCatalog, ParameterInfo, RefreshScheduler};
use crossbeam_channel::{unbounded, Receiver, Sender};
use state::{ControlMessage, Observers};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct PlaybackController {
    config: PlayerConfig,
    instantiator: Arc<dyn EffectInstantiator>,
    engine: AudioEngine,
    asset: Option<AudioAsset>,
    state: PlaybackState,
    last_error: Option<String>,
    advisory: Option<String>,
    catalog: ParameterCatalog,
    scheduler: RefreshScheduler,
    /// Bumped on every load and teardown
    generation: u64,
    /// Bumped on every play and stop
    play_token: u64,
    control_tx: Sender<ControlMessage>,
    control_rx: Receiver<ControlMessage>,
    observers: Observers,
}

impl PlaybackController {
    pub fn new(
        config: PlayerConfig,
        instantiator: Arc<dyn EffectInstantiator>,
        output: Box<dyn AudioOutput>,
    ) -> Result<Self, PlayerError> {
        let (control_tx, control_rx) = unbounded();
        Ok(Self {
            config,
            instantiator,
            engine: AudioEngine::new(output),
            asset: None,
            state: PlaybackState::Idle,
            last_error: None,
            advisory: None,
            catalog: ParameterCatalog::new(),
            scheduler: RefreshScheduler::new()?,
            generation: 0,
            play_token: 0,
            control_tx,
            control_rx,
            observers: Observers::default(),
        })
    }

    /// Controller with the saved config, the host's effect lookup and the
    /// host's default output
    pub fn with_defaults() -> Result<Self, PlayerError> {
        let config = PlayerConfig::load();
        let output = default_output(&config);
        Self::new(config, default_instantiator(), output)
    }

    // --- Loading ---

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), PlayerError> {
        self.load_with_access(path, &DirectAccess)
    }

    /// Load a file through a scoped access capability
    ///
    /// Any previous graph is torn down first, even while playing. On failure
    /// the controller is left Idle with no asset.
    pub fn load_with_access(
        &mut self,
        path: impl AsRef<Path>,
        access: &dyn FileAccess,
    ) -> Result<(), PlayerError> {
        let path = path.as_ref();
        self.process_pending();
        self.teardown();

        match AudioAsset::open(path, access) {
            Ok(asset) => self.install_asset(asset),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load audio file");
                Err(self.fail_load(e.into()))
            }
        }
    }

    /// Load an asset that is already decoded
    pub fn load_asset(&mut self, asset: AudioAsset) -> Result<(), PlayerError> {
        self.process_pending();
        self.teardown();
        self.install_asset(asset)
    }

    fn install_asset(&mut self, asset: AudioAsset) -> Result<(), PlayerError> {
        let graph =
            match GraphHandle::build(&asset, self.instantiator.as_ref(), &self.config.effect_kind) {
                Ok(graph) => graph,
                Err(e) => {
                    error!(file = asset.file_name(), error = %e, "failed to build graph");
                    return Err(self.fail_load(e.into()));
                }
            };

        let advisory = graph.advisory().map(|a| a.to_string());
        self.engine.install(graph);
        info!(
            file = asset.file_name(),
            generation = self.generation,
            "asset loaded"
        );
        self.asset = Some(asset);

        self.set_error(None);
        self.set_advisory(advisory);
        self.set_state(PlaybackState::Loaded);
        self.schedule_settle();
        Ok(())
    }

    /// Stop playback, drop the graph and invalidate pending messages
    fn teardown(&mut self) {
        self.stop_engine();
        self.engine.teardown();
        self.scheduler.cancel();
        self.generation += 1;
        self.asset = None;
        if !self.catalog.parameters().is_empty() || self.catalog.is_bound() {
            self.catalog.clear();
            self.observers
                .emit(ControllerEvent::ParametersChanged(Vec::new()));
        }
    }

    fn fail_load(&mut self, e: PlayerError) -> PlayerError {
        self.engine.teardown();
        self.asset = None;
        self.set_error(Some(e.to_string()));
        self.set_advisory(None);
        self.set_state(PlaybackState::Idle);
        e
    }

    fn schedule_settle(&mut self) {
        let generation = self.generation;
        let tx = self.control_tx.clone();
        let interval = self.config.settle_policy().interval;
        debug!(generation, ?interval, "parameter refresh scheduled");
        self.scheduler.schedule(interval, move || {
            let _ = tx.send(ControlMessage::SettleElapsed { generation });
        });
    }

    // --- Transport ---

    /// Start playing the loaded asset from its beginning
    pub fn play(&mut self) -> Result<(), PlayerError> {
        self.process_pending();
        if self.asset.is_none() {
            self.set_error(Some(PlayerError::NoAssetLoaded.to_string()));
            return Err(PlayerError::NoAssetLoaded);
        }
        if self.state == PlaybackState::Playing {
            return Err(PlayerError::AlreadyPlaying);
        }
        let (Some(asset), Some(graph)) = (self.asset.as_ref(), self.engine.graph()) else {
            return Err(PlayerError::NoAssetLoaded);
        };

        self.play_token += 1;
        let generation = self.generation;
        let token = self.play_token;
        let tx = self.control_tx.clone();
        graph.schedule(
            asset,
            Some(Box::new(move || {
                let _ = tx.send(ControlMessage::PlaybackFinished { generation, token });
            })),
        );
        graph.play_player();

        if let Err(e) = self.engine.start() {
            error!(error = %e, "engine failed to start");
            self.stop_engine();
            let e = PlayerError::from(e);
            self.set_error(Some(e.to_string()));
            return Err(e);
        }

        info!(
            file = asset.file_name(),
            output = self.engine.output_name(),
            "playback started"
        );
        self.set_error(None);
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Halt playback, discarding unplayed audio; safe in any state
    pub fn stop(&mut self) {
        self.process_pending();
        self.stop_engine();
        if self.state == PlaybackState::Playing {
            info!("playback stopped");
            self.set_state(PlaybackState::Stopped);
            self.set_state(PlaybackState::Loaded);
        }
    }

    fn stop_engine(&mut self) {
        self.play_token += 1;
        self.engine.stop();
    }

    /// Route around the effect, or back through it
    pub fn set_bypass(&mut self, bypass: bool) -> Result<(), PlayerError> {
        self.process_pending();
        let graph = self.engine.graph_mut().ok_or(PlayerError::NoAssetLoaded)?;
        graph.set_bypass(bypass)?;
        Ok(())
    }

    // --- Parameters ---

    /// Rebuild the parameter list from the live effect
    pub fn refresh_parameters(&mut self) -> Vec<ParameterInfo> {
        let source = self.engine.graph().and_then(|g| g.parameter_source());
        let parameters = self.catalog.refresh(source).to_vec();
        debug!(
            count = parameters.len(),
            generation = self.generation,
            "parameters refreshed"
        );
        self.observers
            .emit(ControllerEvent::ParametersChanged(parameters.clone()));
        parameters
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        self.catalog.parameters()
    }

    /// Write through to the live effect; unknown addresses are ignored
    pub fn write_parameter(&mut self, address: ParameterAddress, value: f32) -> Option<f32> {
        let applied = self.catalog.write(address, value)?;
        self.observers.emit(ControllerEvent::ParameterValueChanged {
            address,
            value: applied,
        });
        Some(applied)
    }

    /// Current value in the live effect
    pub fn read_parameter(&self, address: ParameterAddress) -> Option<f32> {
        self.catalog.read(address)
    }

    // --- Control plane ---

    /// Apply every message posted since the last call
    ///
    /// Returns the number of messages received, stale ones included.
    pub fn process_pending(&mut self) -> usize {
        let messages: Vec<_> = self.control_rx.try_iter().collect();
        let count = messages.len();
        for message in messages {
            self.handle(message);
        }
        count
    }

    /// Block up to `timeout` for one message, then drain the rest
    pub fn wait_and_process(&mut self, timeout: Duration) -> usize {
        match self.control_rx.recv_timeout(timeout) {
            Ok(message) => {
                self.handle(message);
                1 + self.process_pending()
            }
            Err(_) => 0,
        }
    }

    fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::PlaybackFinished { generation, token } => {
                if generation != self.generation
                    || token != self.play_token
                    || self.state != PlaybackState::Playing
                {
                    debug!(generation, token, "discarding stale completion");
                    return;
                }
                self.play_token += 1;
                info!("playback finished");
                self.set_state(PlaybackState::Loaded);
                self.observers.emit(ControllerEvent::PlaybackFinished);
            }
            ControlMessage::SettleElapsed { generation } => {
                if generation != self.generation {
                    debug!(generation, "discarding stale parameter refresh");
                    return;
                }
                self.refresh_parameters();
            }
        }
    }

    // --- Observation ---

    pub fn subscribe(&mut self) -> Receiver<ControllerEvent> {
        self.observers.subscribe()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn asset(&self) -> Option<&AudioAsset> {
        self.asset.as_ref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.asset.as_ref().map(|a| a.file_name())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn advisory(&self) -> Option<&str> {
        self.advisory.as_deref()
    }

    pub fn graph(&self) -> Option<&GraphHandle> {
        self.engine.graph()
    }

    pub fn is_engine_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let graph = self.engine.graph();
        ControllerSnapshot {
            state: self.state,
            file_name: self.file_name().map(str::to_string),
            format: self.asset.as_ref().map(|a| *a.format()),
            last_error: self.last_error.clone(),
            advisory: self.advisory.clone(),
            has_effect: graph.is_some_and(|g| g.has_effect()),
            bypassed: graph.is_some_and(|g| g.is_bypassed()),
            parameters: self.catalog.parameters().to_vec(),
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "state changed");
            self.state = state;
            self.observers.emit(ControllerEvent::StateChanged(state));
        }
    }

    fn set_error(&mut self, message: Option<String>) {
        if self.last_error != message {
            self.last_error = message.clone();
            self.observers.emit(ControllerEvent::ErrorChanged(message));
        }
    }

    fn set_advisory(&mut self, message: Option<String>) {
        if self.advisory != message {
            if let Some(message) = &message {
                warn!(advisory = %message, "advisory raised");
            }
            self.advisory = message.clone();
            self.observers.emit(ControllerEvent::AdvisoryChanged(message));
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.scheduler.cancel();
        self.stop_engine();
        self.engine.teardown();
    }
}

#[cfg(target_os = "macos")]
fn default_output(_config: &PlayerConfig) -> Box<dyn AudioOutput> {
    Box::new(crate::audio::coreaudio_output::CoreAudioOutput::new())
}

#[cfg(not(target_os = "macos"))]
fn default_output(config: &PlayerConfig) -> Box<dyn AudioOutput> {
    Box::new(crate::audio::OfflineOutput::new(
        crate::audio::Pacing::Realtime,
        config.block_frames,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{OfflineOutput, Pacing};
    use crate::effect::EffectRegistry;
    use crate::format::FormatDescriptor;

    fn controller(registry: EffectRegistry) -> PlaybackController {
        let config = PlayerConfig {
            settle_interval_ms: 10,
            ..PlayerConfig::default()
        };
        let output = OfflineOutput::new(Pacing::Fixed(Duration::from_millis(1)), 64);
        PlaybackController::new(config, Arc::new(registry), Box::new(output)).unwrap()
    }

    fn asset(frames: usize) -> AudioAsset {
        let format = FormatDescriptor::stereo_f32(44100.0).unwrap();
        AudioAsset::from_planar("clip.wav", format, vec![vec![0.1; frames], vec![0.1; frames]])
            .unwrap()
    }

    #[test]
    fn test_play_without_asset_is_rejected() {
        let mut player = controller(EffectRegistry::builtin());
        assert!(matches!(player.play(), Err(PlayerError::NoAssetLoaded)));
        assert_eq!(player.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_stale_settle_is_discarded() {
        let mut player = controller(EffectRegistry::builtin());
        player.load_asset(asset(64)).unwrap();
        let stale = player.generation;
        player.load_asset(asset(64)).unwrap();

        player
            .control_tx
            .send(ControlMessage::SettleElapsed { generation: stale })
            .unwrap();
        player.process_pending();
        assert!(player.parameters().is_empty());
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let mut player = controller(EffectRegistry::builtin());
        player.load_asset(asset(1_000_000)).unwrap();
        player.play().unwrap();

        let generation = player.generation;
        let token = player.play_token - 1;
        player
            .control_tx
            .send(ControlMessage::PlaybackFinished { generation, token })
            .unwrap();
        player.process_pending();
        assert_eq!(player.state(), PlaybackState::Playing);
        player.stop();
    }

    #[test]
    fn test_stop_passes_through_stopped() {
        let mut player = controller(EffectRegistry::builtin());
        let events = player.subscribe();
        player.load_asset(asset(1_000_000)).unwrap();
        player.play().unwrap();
        player.stop();

        let states: Vec<_> = events
            .try_iter()
            .filter_map(|e| match e {
                ControllerEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                PlaybackState::Loaded,
                PlaybackState::Playing,
                PlaybackState::Stopped,
                PlaybackState::Loaded
            ]
        );
    }
}
