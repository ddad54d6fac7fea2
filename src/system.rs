// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, error, info, span, warn, Level};

use crate::{
    asset::{AssetEvent, AssetLibrary},
    audio::{self, Output},
    bus::{BusManager, DEFAULT_BUS},
    config::{self, ConfigError},
    effect::{EffectRegistry, PlayerEffect},
    engine::{debug, Context, EngineError},
    ids::PlayerId,
    player::SoundPlayer,
    spatial::Transform,
};

/// Errors that prevent the system from starting at all. A missing output device is not
/// one of them.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unable to create audio context: {0}")]
    Engine(#[from] EngineError),
}

/// The shared collaborators every player is built from.
#[derive(Clone)]
pub struct Services {
    pub context: Arc<Context>,
    pub buses: Arc<BusManager>,
    pub assets: Arc<AssetLibrary>,
    pub effects: Arc<EffectRegistry>,
}

impl Services {
    /// Services with the built-in effects. The default bus is created here.
    pub fn new(context: Arc<Context>) -> Services {
        Services::with_registry(context, EffectRegistry::new())
    }

    pub fn with_registry(context: Arc<Context>, effects: EffectRegistry) -> Services {
        let buses = Arc::new(BusManager::new(context.clone()));
        buses.create(DEFAULT_BUS);
        Services {
            context,
            buses,
            assets: Arc::new(AssetLibrary::new()),
            effects: Arc::new(effects),
        }
    }
}

/// Owns every player and the output device.
pub struct SoundSystem {
    services: Services,
    players: HashMap<PlayerId, Arc<Mutex<SoundPlayer>>>,
    output: Option<Box<dyn Output>>,
}

impl fmt::Debug for SoundSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundSystem")
            .field("players", &self.players.len())
            .field("buses", &self.services.buses.len())
            .field(
                "output",
                &self.output.as_ref().map(|output| output.to_string()),
            )
            .finish()
    }
}

impl SoundSystem {
    /// A system around existing services with no output. Rendering is up to the caller.
    pub fn with_services(services: Services) -> SoundSystem {
        SoundSystem {
            services,
            players: HashMap::new(),
            output: None,
        }
    }

    /// Starts the system from configuration. If output is disabled or the device can't be
    /// opened, the system keeps running without one.
    pub fn new(config: &config::System) -> Result<SoundSystem, SystemError> {
        let span = span!(Level::INFO, "sound system");
        let _enter = span.enter();

        let audio = config.audio();
        audio.validate()?;

        let context = Context::new(audio.context_options())?;
        let mut system = SoundSystem::with_services(Services::new(context.clone()));
        for name in config.buses() {
            system.services.buses.create(name);
        }

        if audio.enabled() {
            match audio::start_output(&audio, context) {
                Ok(output) => {
                    info!(output = %output, "Audio output started.");
                    system.output = Some(output);
                }
                Err(e) => warn!(
                    err = %e,
                    device = audio.device(),
                    "Unable to start audio output, continuing without one."
                ),
            }
        } else {
            info!("Audio output disabled.");
        }

        Ok(system)
    }

    /// Creates a player routed into the default bus.
    pub fn create_player(&mut self) -> PlayerId {
        let id = PlayerId::random();
        let player = SoundPlayer::new(id, self.services.clone());
        self.players.insert(id, Arc::new(Mutex::new(player)));
        debug!(player = %id, "Created player.");
        id
    }

    /// Shuts the player down and forgets it. Unknown ids are ignored.
    pub fn destroy_player(&mut self, id: PlayerId) {
        match self.players.remove(&id) {
            Some(player) => {
                player.lock().shutdown();
                debug!(player = %id, "Destroyed player.");
            }
            None => debug!(player = %id, "Ignoring destroy of unknown player."),
        }
    }

    /// Creates an unattached effect by registry key.
    pub fn create_effect(&self, name: &str) -> Option<Box<dyn PlayerEffect>> {
        self.services.effects.create(name)
    }

    /// Runs once per frame on the control timeline: hands finished assets to waiting
    /// players, moves the listener to `viewpoint` and updates effects.
    pub fn tick(&mut self, viewpoint: &Transform) {
        for event in self.services.assets.drain_events() {
            match event {
                AssetEvent::Ready(asset_id) => {
                    let Some(asset) = self.services.assets.get(asset_id) else {
                        debug!(asset = %asset_id, "Ready asset is gone, ignoring.");
                        continue;
                    };
                    for player_id in self.services.assets.subscribers(asset_id) {
                        match self.players.get(&player_id) {
                            Some(player) => player.lock().on_asset_ready(asset.clone()),
                            None => {
                                debug!(player = %player_id, asset = %asset_id, "Stale subscriber.")
                            }
                        }
                    }
                }
                AssetEvent::Failed(asset_id, reason) => {
                    error!(asset = %asset_id, reason, "Asset failed to load.")
                }
            }
        }

        let listener = self.services.context.listener();
        listener.set_position(viewpoint.position.to_engine_space());
        listener.set_orientation(
            viewpoint.forward().to_engine_space(),
            viewpoint.up().to_engine_space(),
        );

        for player in self.players.values() {
            player.lock().update_effects();
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<Arc<Mutex<SoundPlayer>>> {
        self.players.get(&id).cloned()
    }

    /// Live player ids in ascending order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.players.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn buses(&self) -> &Arc<BusManager> {
        &self.services.buses
    }

    pub fn assets(&self) -> &Arc<AssetLibrary> {
        &self.services.assets
    }

    pub fn effects(&self) -> &Arc<EffectRegistry> {
        &self.services.effects
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.services.context
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// The graph upstream of the destination in nomnoml syntax.
    pub fn graph_dump(&self) -> String {
        debug::nomnoml(&self.services.context)
    }
}

impl Drop for SoundSystem {
    fn drop(&mut self) {
        for (_, player) in self.players.drain() {
            player.lock().shutdown();
        }
        self.services.buses.clear();
        if let Some(mut output) = self.output.take() {
            output.stop();
        }
        info!("Sound system shut down.");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        asset::AssetRequest,
        effect::spatializer,
        ids::AssetId,
        player::PlayerState,
        spatial::Vec3,
        testutil::{constant_asset, offline_system, render_seconds, TEST_SAMPLE_RATE},
    };

    #[test]
    fn test_create_and_destroy_player() {
        let mut system = offline_system();
        let first = system.create_player();
        let second = system.create_player();
        assert_ne!(first, second);
        assert_eq!(system.player_ids().len(), 2);

        let player = system.player(first).expect("player");
        let sample = player.lock().sample_node().clone();
        let context = system.context().clone();
        assert_eq!(context.output_count(&sample), 1);

        system.destroy_player(first);
        assert!(system.player(first).is_none());
        assert_eq!(context.output_count(&sample), 0);
        assert_eq!(system.player_ids(), vec![second]);

        // Unknown ids are a no-op.
        system.destroy_player(first);
        assert_eq!(system.player_ids().len(), 1);
    }

    #[test]
    fn test_create_effect() {
        let system = offline_system();
        let effect = system.create_effect(spatializer::KEY).expect("spatializer");
        assert_eq!(effect.name(), spatializer::KEY);
        assert!(system.create_effect("chorus").is_none());
    }

    #[test]
    fn test_tick_delivers_ready_assets() {
        let mut system = offline_system();
        let id = system.create_player();
        let player = system.player(id).expect("player");

        let asset_id = AssetId::new(42);
        system.assets().register_pending(asset_id);
        player.lock().set_asset(asset_id);
        player.lock().play();
        assert_eq!(player.lock().state(), PlayerState::AssetPending);

        system
            .assets()
            .complete(constant_asset(42, 0.5, TEST_SAMPLE_RATE, 1.0));
        // Nothing changes until the control timeline runs.
        assert_eq!(player.lock().state(), PlayerState::AssetPending);

        system.tick(&Transform::default());
        assert_eq!(player.lock().state(), PlayerState::AssetBound);
        assert!(player.lock().deferred().is_empty());
        assert!(system.assets().subscribers(asset_id).is_empty());
    }

    #[test]
    fn test_pending_asset_survives_release_attempt() {
        let mut system = offline_system();
        let id = system.create_player();
        let player = system.player(id).expect("player");

        let asset_id = AssetId::new(77);
        system.assets().register_pending(asset_id);
        player.lock().set_asset(asset_id);
        player.lock().play();
        assert!(system.assets().release(asset_id).is_err());

        system
            .assets()
            .complete(constant_asset(77, 0.5, TEST_SAMPLE_RATE, 1.0));
        system.tick(&Transform::default());
        render_seconds(system.context(), 0.1);
        let player = player.lock();
        assert_eq!(player.state(), PlayerState::AssetBound);
        assert!(player.deferred().is_empty());
        assert!(player.is_playing());
    }

    #[test]
    fn test_tick_ignores_destroyed_subscribers() {
        let mut system = offline_system();
        let id = system.create_player();
        let asset_id = AssetId::new(7);
        system.assets().register_pending(asset_id);
        system.player(id).expect("player").lock().set_asset(asset_id);

        // Destroying unsubscribes, so the event finds nobody waiting.
        system.destroy_player(id);
        system
            .assets()
            .complete(constant_asset(7, 0.5, TEST_SAMPLE_RATE, 1.0));
        system.tick(&Transform::default());
        assert!(matches!(
            system.assets().request(asset_id),
            AssetRequest::Ready(_)
        ));
    }

    #[test]
    fn test_tick_moves_listener() {
        let mut system = offline_system();
        let viewpoint = Transform::at(Vec3::new(1.0, 2.0, 3.0));
        system.tick(&viewpoint);

        let state = system.context().listener().state();
        assert_eq!(state.position, Vec3::new(1.0, 3.0, -2.0));
        assert_eq!(state.forward, Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(state.up, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_graph_dump() {
        let mut system = offline_system();
        assert!(system.graph_dump().contains("bus:Default"));

        let id = system.create_player();
        system.player(id).expect("player").lock().set_bus("Music");
        let dump = system.graph_dump();
        assert!(dump.starts_with("#direction: right"));
        assert!(dump.contains("bus:Music"));
        assert!(dump.contains(&format!("player:{}", id)));
        assert!(dump.contains(&format!("player_gain:{}", id)));
    }

    #[test]
    fn test_new_without_output() -> Result<(), Box<dyn std::error::Error>> {
        let config = config::System::from_yaml(
            "audio:\n  enabled: false\n  sample_rate: 1000\nbuses: [Music, Sfx]\n",
        )?;
        let system = SoundSystem::new(&config)?;
        assert!(!system.has_output());
        assert_eq!(system.context().sample_rate(), 1000.0);
        let mut names = Vec::new();
        system
            .buses()
            .iterate(|_, name| names.push(name.to_string()));
        names.sort();
        assert_eq!(names, vec!["Default", "Music", "Sfx"]);
        Ok(())
    }

    #[test]
    fn test_new_with_mock_output() -> Result<(), Box<dyn std::error::Error>> {
        let config = config::System::new(config::Audio::new("mock-device"));
        let system = SoundSystem::new(&config)?;
        assert!(system.has_output());
        Ok(())
    }

    #[test]
    fn test_new_falls_back_when_device_missing() -> Result<(), Box<dyn std::error::Error>> {
        let config = config::System::new(config::Audio::new("no such interface"));
        let system = SoundSystem::new(&config)?;
        assert!(!system.has_output());
        assert!(system.buses().exists(crate::ids::BusId::from_name(DEFAULT_BUS)));
        Ok(())
    }

    #[test]
    fn test_drop_tears_down_graph() {
        let mut system = offline_system();
        let id = system.create_player();
        let sample = system.player(id).expect("player").lock().sample_node().clone();
        let context = system.context().clone();
        let destination = context.destination().expect("destination").clone();
        assert!(context.input_count(&destination) > 0);

        drop(system);
        assert_eq!(context.output_count(&sample), 0);
        assert_eq!(context.input_count(&destination), 0);
    }
}
