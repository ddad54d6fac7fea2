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
use std::sync::Arc;

use tracing::{debug, error, info, span, warn, Level, Span};

use crate::{
    asset::{AssetRequest, SoundAsset},
    bus::DEFAULT_BUS,
    effect::{PlayerEffect, ProcessingOrder},
    engine::{
        gain::GainNode,
        sampled::{PlaybackState, SampledNode},
        AudioNode,
    },
    ids::{AssetId, BusId, EffectId, PlayerId},
    system::Services,
};

pub mod deferred;

#[cfg(test)]
mod tests;

pub use deferred::{DeferredPlay, DrainPolicy};
use deferred::DeferredQueue;

/// Where a player is with its asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    /// No asset has been set.
    NoAsset,
    /// Waiting for the target asset to finish loading.
    AssetPending,
    /// The target asset is bound to the sample node.
    AssetBound,
}

/// A sound source: a sample node feeding a chain of effects into a gain stage, which in
/// turn feeds a bus.
///
/// The sample node and the gain node live as long as the player. Only the edges between
/// them and the effects change.
pub struct SoundPlayer {
    id: PlayerId,
    services: Services,
    sampled: SampledNode,
    gain: GainNode,
    bus: BusId,
    bus_connected: bool,
    asset_id: AssetId,
    bound: Option<Arc<SoundAsset>>,
    effects: Vec<Box<dyn PlayerEffect>>,
    deferred: DeferredQueue,
    play_multiple: bool,
    shut_down: bool,
    span: Span,
}

impl SoundPlayer {
    /// Creates a player routed into the default bus.
    pub fn new(id: PlayerId, services: Services) -> SoundPlayer {
        let mut player = SoundPlayer {
            id,
            sampled: SampledNode::new(format!("player:{}", id)),
            gain: GainNode::new(format!("player_gain:{}", id)),
            services,
            bus: BusId::INVALID,
            bus_connected: false,
            asset_id: AssetId::INVALID,
            bound: None,
            effects: Vec::new(),
            deferred: DeferredQueue::default(),
            play_multiple: true,
            shut_down: false,
            span: span!(Level::INFO, "player", id = %id),
        };
        player.set_bus(DEFAULT_BUS);
        player
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn state(&self) -> PlayerState {
        if !self.asset_id.is_valid() {
            PlayerState::NoAsset
        } else if self.bound_asset().is_some() {
            PlayerState::AssetBound
        } else {
            PlayerState::AssetPending
        }
    }

    /// The bound asset, if it is still the target.
    fn bound_asset(&self) -> Option<&Arc<SoundAsset>> {
        self.bound
            .as_ref()
            .filter(|asset| asset.id() == self.asset_id)
    }

    pub fn sample_node(&self) -> &AudioNode {
        self.sampled.node()
    }

    pub fn gain_node(&self) -> &AudioNode {
        self.gain.node()
    }

    /// Routes the gain stage into the named bus, creating it if needed. An empty name
    /// means the default bus.
    pub fn set_bus(&mut self, name: &str) {
        let _enter = self.span.enter();
        let name = if name.is_empty() { DEFAULT_BUS } else { name };
        let buses = &self.services.buses;
        let bus = buses.create(name);
        if bus == self.bus && self.bus_connected {
            return;
        }

        let Some(input) = buses.input_node(bus) else {
            error!(bus = name, "Bus has no input node.");
            return;
        };
        let previous = if self.bus_connected {
            buses.input_node(self.bus)
        } else {
            None
        };

        {
            let mut lock = self.services.context.graph_lock("player set bus");
            if let Some(previous) = &previous {
                lock.disconnect(previous, self.gain.node());
            }
            lock.connect(&input, self.gain.node());
        }
        if self.bus_connected {
            buses.detach_route(self.bus, self.id);
        }
        buses.attach_route(bus, self.id);
        self.bus = bus;
        self.bus_connected = true;
        self.services.context.synchronize_connections();
        info!(bus = name, "Connected player to bus.");
    }

    pub fn bus(&self) -> BusId {
        self.bus
    }

    /// Targets an asset. A ready asset binds now, otherwise the player waits for it.
    pub fn set_asset(&mut self, asset: AssetId) {
        if asset == self.asset_id {
            return;
        }
        let request = self.services.assets.request(asset);
        if matches!(request, AssetRequest::Unknown) {
            let _enter = self.span.enter();
            error!(asset = %asset, "Unable to find asset.");
            return;
        }

        if self.asset_id.is_valid() {
            self.services.assets.unsubscribe(self.asset_id, self.id);
        }
        self.asset_id = asset;
        self.bound = None;
        match request {
            AssetRequest::Ready(ready) => self.on_asset_ready(ready),
            _ => {
                let _enter = self.span.enter();
                self.services.assets.subscribe(asset, self.id);
                debug!(asset = %asset, "Waiting for asset.");
            }
        }
    }

    /// The targeted asset, which may still be loading.
    pub fn asset(&self) -> AssetId {
        self.asset_id
    }

    /// The targeted asset's data if the library has it ready.
    pub fn asset_data(&self) -> Option<Arc<SoundAsset>> {
        if let Some(bound) = self.bound_asset() {
            return Some(bound.clone());
        }
        self.services.assets.get(self.asset_id)
    }

    /// Binds `asset` if it is the one this player is waiting for, then plays anything
    /// requested in the meantime.
    pub fn on_asset_ready(&mut self, asset: Arc<SoundAsset>) {
        let _enter = self.span.enter();
        if asset.id() != self.asset_id || self.bound_asset().is_some() {
            debug!(asset = %asset.id(), "Ignoring stale asset notification.");
            return;
        }

        self.sampled.set_buffer(Some(asset.buffer().clone()));
        self.bound = Some(asset);
        self.rebuild_chain();
        self.services.assets.unsubscribe(self.asset_id, self.id);
        info!(asset = %self.asset_id, "Asset bound.");

        if self.deferred.is_empty() {
            return;
        }
        let policy = DrainPolicy::for_play_multiple(self.play_multiple);
        let now = self.services.context.current_time();
        let plays = self.deferred.drain(policy, now);
        if policy == DrainPolicy::LatestOnly {
            self.sampled.clear_playback();
        }
        for play in plays {
            debug!(
                offset = play.offset,
                loops = play.loop_count,
                "Replaying deferred request."
            );
            self.sampled.schedule_with(
                &self.services.context,
                0.0,
                play.offset,
                play.loop_count,
            );
        }
    }

    /// Requests waiting for the asset.
    pub fn deferred(&self) -> &[DeferredPlay] {
        self.deferred.entries()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.gain().set(gain);
    }

    pub fn gain(&self) -> f32 {
        self.gain.gain().get()
    }

    /// Whether playing again layers over existing playback rather than replacing it.
    pub fn set_play_multiple(&mut self, play_multiple: bool) {
        self.play_multiple = play_multiple;
    }

    pub fn play_multiple(&self) -> bool {
        self.play_multiple
    }

    /// Length of the bound asset, or zero.
    pub fn length_in_seconds(&self) -> f64 {
        self.bound_asset()
            .map(|asset| asset.length_seconds())
            .unwrap_or(0.0)
    }

    /// Sample rate of the bound asset, or zero.
    pub fn sample_rate(&self) -> f32 {
        self.bound_asset()
            .map(|asset| asset.sample_rate())
            .unwrap_or(0.0)
    }

    pub fn play(&mut self) {
        self.request_play(0.0, 0);
    }

    /// Plays from `seconds` into the asset.
    pub fn play_at_seconds(&mut self, seconds: f64) {
        self.request_play(seconds, 0);
    }

    /// Plays from `seconds` into the asset, repeating `loop_count` times. A negative count
    /// loops until stopped.
    pub fn play_looping(&mut self, loop_count: i32, seconds: f64) {
        self.request_play(seconds, loop_count);
    }

    fn request_play(&mut self, seconds: f64, loop_count: i32) {
        let _enter = self.span.enter();
        if !self.asset_id.is_valid() {
            error!("No asset set for player.");
            return;
        }
        if self.state() != PlayerState::AssetBound {
            let requested_at = self.services.context.current_time() + seconds;
            self.deferred.push(requested_at, loop_count);
            debug!(requested_at, loop_count, "Deferring play until asset is ready.");
            return;
        }

        if !self.play_multiple {
            self.stop_all();
        }
        self.sampled
            .schedule_with(&self.services.context, 0.0, seconds, loop_count);
    }

    pub fn stop_all(&self) {
        self.sampled.clear_playback();
    }

    /// True once scheduled playback has actually produced sound.
    pub fn is_playing(&self) -> bool {
        match self.sampled.playback_state() {
            PlaybackState::Playing | PlaybackState::Scheduled => {
                let render = self.services.context.render_lock();
                self.sampled.cursor(&render) > 0
            }
            _ => false,
        }
    }

    pub fn position_in_seconds(&self) -> f64 {
        let Some(asset) = self.bound_asset() else {
            return 0.0;
        };
        let cursor = {
            let render = self.services.context.render_lock();
            self.sampled.cursor(&render)
        };
        let sample_rate = f64::from(asset.sample_rate());
        if cursor < 0 || sample_rate <= 0.0 {
            return 0.0;
        }
        cursor as f64 / sample_rate
    }

    pub fn position_in_microseconds(&self) -> u64 {
        (self.position_in_seconds() * 1_000_000.0) as u64
    }

    /// Attaches a new effect by registry key. Returns `EffectId::INVALID` if the key is
    /// unknown or the effect fails to initialize.
    pub fn add_effect(&mut self, name: &str) -> EffectId {
        let Some(mut effect) = self.services.effects.create(name) else {
            let _enter = self.span.enter();
            warn!(effect = name, "Unknown effect.");
            return EffectId::INVALID;
        };

        let id = EffectId::random();
        effect.core_mut().attach(id, self.id);
        if let Err(e) = effect.initialize(&self.services.context) {
            let _enter = self.span.enter();
            error!(effect = name, err = %e, "Unable to initialize effect.");
            return EffectId::INVALID;
        }
        self.effects.push(effect);
        self.rebuild_chain();
        id
    }

    /// Detaches and shuts down the effect. Unknown ids are ignored.
    pub fn remove_effect(&mut self, id: EffectId) {
        let Some(index) = self.effects.iter().position(|e| e.id() == id) else {
            return;
        };
        let mut effect = self.effects.remove(index);
        {
            let mut lock = self.services.context.graph_lock("player remove effect");
            if let Some(input) = effect.input_node() {
                lock.disconnect_node(&input);
            }
            if let Some(output) = effect.output_node() {
                lock.disconnect_node(&output);
            }
        }
        effect.shutdown();
        self.rebuild_chain();
    }

    /// Returns false for an unknown effect.
    pub fn set_effect_enabled(&mut self, id: EffectId, enabled: bool) -> bool {
        let Some(effect) = self.effects.iter_mut().find(|e| e.id() == id) else {
            return false;
        };
        if effect.is_enabled() != enabled {
            effect.set_enabled(enabled);
            self.rebuild_chain();
        }
        true
    }

    /// The first attached spatializer, or `EffectId::INVALID`.
    pub fn spatialization_effect_id(&self) -> EffectId {
        self.effects
            .iter()
            .find(|e| e.processing_order() == ProcessingOrder::Spatializer)
            .map(|e| e.id())
            .unwrap_or(EffectId::INVALID)
    }

    pub fn effect(&self, id: EffectId) -> Option<&dyn PlayerEffect> {
        self.effects
            .iter()
            .find(|e| e.id() == id)
            .map(|e| e.as_ref())
    }

    pub fn effect_mut(&mut self, id: EffectId) -> Option<&mut dyn PlayerEffect> {
        for effect in self.effects.iter_mut() {
            if effect.id() == id {
                return Some(effect.as_mut());
            }
        }
        None
    }

    /// Attached effects in attach order.
    pub fn effect_ids(&self) -> Vec<EffectId> {
        self.effects.iter().map(|e| e.id()).collect()
    }

    /// Enabled effects in the order they are wired.
    pub fn chain(&self) -> Vec<EffectId> {
        self.ordered_enabled().iter().map(|e| e.id()).collect()
    }

    fn ordered_enabled(&self) -> Vec<&dyn PlayerEffect> {
        let mut enabled: Vec<&dyn PlayerEffect> = self
            .effects
            .iter()
            .filter(|e| e.is_enabled())
            .map(|e| e.as_ref())
            .collect();
        enabled.sort_by_key(|e| e.processing_order());
        enabled
    }

    /// Runs every effect's per tick hook.
    pub fn update_effects(&mut self) {
        let context = self.services.context.clone();
        for effect in self.effects.iter_mut() {
            effect.update(&context);
        }
    }

    /// Rewires sample -> enabled effects -> gain. Does nothing until an asset is bound.
    fn rebuild_chain(&self) {
        if self.bound_asset().is_none() {
            return;
        }
        let _enter = self.span.enter();
        let sampled = self.sampled.node();
        let gain = self.gain.node();

        let mut lock = self.services.context.graph_lock("player rebuild");
        lock.disconnect_all_outputs(sampled);
        lock.disconnect_all_inputs(gain);
        for effect in self.effects.iter() {
            if let Some(input) = effect.input_node() {
                lock.disconnect_all_inputs(&input);
            }
            if let Some(output) = effect.output_node() {
                lock.disconnect_all_outputs(&output);
            }
        }

        let chain = self.ordered_enabled();
        let mut current = sampled.clone();
        for effect in chain.iter() {
            if let Some(input) = effect.input_node() {
                lock.connect(&input, &current);
            }
            if let Some(output) = effect.output_node() {
                current = output;
            }
        }
        lock.connect(gain, &current);
        debug!(
            effects = chain.len(),
            attached = self.effects.len(),
            "Rebuilt chain."
        );
    }

    /// Releases everything the player owns in the graph. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let _enter = self.span.enter();

        if self.asset_id.is_valid() {
            self.services.assets.unsubscribe(self.asset_id, self.id);
        }
        self.sampled.clear_playback();
        self.deferred.clear();

        {
            let mut lock = self.services.context.graph_lock("player shutdown");
            lock.disconnect_node(self.sampled.node());
            lock.disconnect_node(self.gain.node());
            for effect in self.effects.iter() {
                if let Some(input) = effect.input_node() {
                    lock.disconnect_node(&input);
                }
                if let Some(output) = effect.output_node() {
                    lock.disconnect_node(&output);
                }
            }
        }
        for mut effect in self.effects.drain(..) {
            effect.shutdown();
        }

        self.sampled.set_buffer(None);
        self.bound = None;
        if self.bus_connected {
            self.services.buses.detach_route(self.bus, self.id);
            self.bus_connected = false;
        }
        info!("Player shut down.");
    }
}

impl Drop for SoundPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
