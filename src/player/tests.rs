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
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serial_test::serial;

use super::*;
use crate::{
    effect::{
        radio, spatializer, visualizer, EffectCore, EffectDescriptor, EffectError,
        EffectRegistry, EffectState,
    },
    engine::{gain::GainNode, Context, EngineError},
    testutil::{
        constant_asset, offline_context, offline_services, render_seconds, TEST_SAMPLE_RATE,
    },
};

const COUNTING_KEY: &str = "counting";
const FAILING_KEY: &str = "failing";

static COUNTING_SHUTDOWNS: AtomicUsize = AtomicUsize::new(0);

/// Counts how often it is shut down.
struct Counting {
    core: EffectCore,
    node: Option<GainNode>,
}

impl PlayerEffect for Counting {
    fn name(&self) -> &'static str {
        COUNTING_KEY
    }

    fn processing_order(&self) -> ProcessingOrder {
        ProcessingOrder::Dynamics
    }

    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn on_initialize(&mut self, _context: &Arc<Context>) -> Result<(), EffectError> {
        self.node = Some(GainNode::new("counting"));
        Ok(())
    }

    fn on_shutdown(&mut self, context: &Context) {
        COUNTING_SHUTDOWNS.fetch_add(1, Ordering::SeqCst);
        if let Some(node) = self.node.take() {
            context
                .graph_lock("counting shutdown")
                .disconnect_node(node.node());
        }
    }

    fn input_node(&self) -> Option<AudioNode> {
        self.node.as_ref().map(|node| node.node().clone())
    }

    fn output_node(&self) -> Option<AudioNode> {
        self.input_node()
    }
}

/// Never initializes.
struct Failing {
    core: EffectCore,
}

impl PlayerEffect for Failing {
    fn name(&self) -> &'static str {
        FAILING_KEY
    }

    fn processing_order(&self) -> ProcessingOrder {
        ProcessingOrder::Utility
    }

    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn on_initialize(&mut self, _context: &Arc<Context>) -> Result<(), EffectError> {
        Err(EngineError::InvalidFftSize(0).into())
    }

    fn on_shutdown(&mut self, _context: &Context) {}

    fn input_node(&self) -> Option<AudioNode> {
        None
    }

    fn output_node(&self) -> Option<AudioNode> {
        None
    }
}

fn test_services() -> Services {
    let mut registry = EffectRegistry::new();
    registry.register(
        EffectDescriptor {
            key: COUNTING_KEY,
            description: "Counts shutdowns",
            order: ProcessingOrder::Dynamics,
        },
        || {
            Box::new(Counting {
                core: EffectCore::new(),
                node: None,
            })
        },
    );
    registry.register(
        EffectDescriptor {
            key: FAILING_KEY,
            description: "Fails to initialize",
            order: ProcessingOrder::Utility,
        },
        || {
            Box::new(Failing {
                core: EffectCore::new(),
            })
        },
    );
    Services::with_registry(offline_context(), registry)
}

/// A player bound to a ten second constant asset.
fn bound_player(services: &Services, asset: u64) -> SoundPlayer {
    services
        .assets
        .insert(constant_asset(asset, 0.5, TEST_SAMPLE_RATE, 10.0));
    let mut player = SoundPlayer::new(PlayerId::random(), services.clone());
    player.set_asset(AssetId::new(asset));
    assert_eq!(player.state(), PlayerState::AssetBound);
    player
}

fn pending_player(services: &Services, asset: u64) -> SoundPlayer {
    services.assets.register_pending(AssetId::new(asset));
    let mut player = SoundPlayer::new(PlayerId::random(), services.clone());
    player.set_asset(AssetId::new(asset));
    assert_eq!(player.state(), PlayerState::AssetPending);
    player
}

fn complete(services: &Services, asset: u64) -> Arc<SoundAsset> {
    services
        .assets
        .complete(constant_asset(asset, 0.5, TEST_SAMPLE_RATE, 10.0))
}

/// Checks that the graph holds exactly sample -> enabled chain -> gain, and that disabled
/// effects are unplugged.
fn assert_wired(player: &SoundPlayer) {
    let chain = player.chain();
    let lock = player.services.context.graph_lock("test wiring");

    let mut current = player.sample_node().clone();
    for id in chain.iter() {
        let effect = player.effect(*id).expect("chained effect");
        if let Some(input) = effect.input_node() {
            assert!(
                lock.is_connected(&input, &current),
                "{} is not fed by {}",
                input.name(),
                current.name()
            );
        }
        if let Some(output) = effect.output_node() {
            current = output;
        }
    }
    assert!(lock.is_connected(player.gain_node(), &current));
    assert_eq!(lock.input_count(player.gain_node()), 1);

    for id in player.effect_ids() {
        if chain.contains(&id) {
            continue;
        }
        let effect = player.effect(id).expect("attached effect");
        if let Some(input) = effect.input_node() {
            assert_eq!(lock.input_count(&input), 0);
        }
        if let Some(output) = effect.output_node() {
            assert_eq!(lock.output_count(&output), 0);
        }
    }
}

fn voices(player: &SoundPlayer) -> Vec<crate::engine::sampled::ScheduledVoice> {
    player.sampled.scheduled_voices()
}

#[test]
fn test_new_player_routes_to_default_bus() {
    let services = offline_services();
    let player = SoundPlayer::new(PlayerId::random(), services.clone());
    assert_eq!(player.bus(), BusId::from_name(DEFAULT_BUS));
    assert_eq!(player.state(), PlayerState::NoAsset);
    assert_eq!(services.buses.routes(player.bus()), vec![player.id()]);

    let input = services.buses.input_node(player.bus()).expect("bus input");
    let lock = services.context.graph_lock("test");
    assert!(lock.is_connected(&input, player.gain_node()));
}

#[test]
fn test_chain_order() {
    let services = offline_services();
    let mut player = bound_player(&services, 1);

    let first = player.add_effect(radio::KEY);
    let spatial = player.add_effect(spatializer::KEY);
    let second = player.add_effect(radio::KEY);
    assert!(first.is_valid() && spatial.is_valid() && second.is_valid());

    assert_eq!(player.effect_ids(), vec![first, spatial, second]);
    assert_eq!(player.chain(), vec![first, second, spatial]);
    assert_wired(&player);
    assert_eq!(player.spatialization_effect_id(), spatial);
}

#[test]
fn test_chain_with_visualizer() {
    let services = offline_services();
    let mut player = bound_player(&services, 1);

    let vis = player.add_effect(visualizer::KEY);
    let spatial = player.add_effect(spatializer::KEY);
    assert_eq!(player.chain(), vec![spatial, vis]);
    assert_wired(&player);

    // The analyser taps the spatializer's output but does not feed the gain stage.
    let panner = player
        .effect(spatial)
        .and_then(|e| e.output_node())
        .expect("panner");
    let lock = services.context.graph_lock("test");
    assert!(lock.is_connected(player.gain_node(), &panner));
    assert_eq!(lock.output_count(&panner), 2);
}

#[test]
fn test_chain_waits_for_asset() {
    let services = offline_services();
    let mut player = pending_player(&services, 2);
    let id = player.add_effect(radio::KEY);
    assert!(id.is_valid());
    assert_eq!(
        services.context.output_count(player.sample_node()),
        0,
        "unbound players are not wired"
    );

    player.on_asset_ready(complete(&services, 2));
    assert_wired(&player);
}

#[test]
fn test_enable_toggle_rewires() {
    let services = offline_services();
    let mut player = bound_player(&services, 1);
    let filter = player.add_effect(radio::KEY);
    let spatial = player.add_effect(spatializer::KEY);

    assert!(player.set_effect_enabled(filter, false));
    assert_eq!(player.chain(), vec![spatial]);
    assert_wired(&player);

    assert!(player.set_effect_enabled(spatial, false));
    assert!(player.chain().is_empty());
    assert_wired(&player);
    {
        let lock = services.context.graph_lock("test");
        assert!(lock.is_connected(player.gain_node(), player.sample_node()));
    }

    assert!(player.set_effect_enabled(filter, true));
    assert!(player.set_effect_enabled(spatial, true));
    assert_eq!(player.chain(), vec![filter, spatial]);
    assert_wired(&player);

    assert!(!player.set_effect_enabled(EffectId::random(), true));
}

#[test]
fn test_remove_effect() {
    let services = offline_services();
    let mut player = bound_player(&services, 1);
    let filter = player.add_effect(radio::KEY);
    let spatial = player.add_effect(spatializer::KEY);

    let input = player.effect(filter).and_then(|e| e.input_node()).expect("input");
    let output = player
        .effect(filter)
        .and_then(|e| e.output_node())
        .expect("output");

    player.remove_effect(filter);
    assert!(player.effect(filter).is_none());
    assert_eq!(player.chain(), vec![spatial]);
    assert_wired(&player);
    assert_eq!(services.context.input_count(&input), 0);
    assert_eq!(services.context.output_count(&output), 0);

    // Unknown ids are ignored.
    player.remove_effect(filter);
    assert_eq!(player.effect_ids(), vec![spatial]);

    player.remove_effect(spatial);
    assert_eq!(player.spatialization_effect_id(), EffectId::INVALID);
    assert_wired(&player);
}

#[test]
fn test_chain_order_under_random_edits() {
    const KEYS: [&str; 3] = [radio::KEY, spatializer::KEY, visualizer::KEY];

    for seed in 0..8u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let services = offline_services();
        let mut player = bound_player(&services, 1);
        // Attach order with the enabled flag, mirrored by hand.
        let mut attached: Vec<(EffectId, bool)> = Vec::new();

        for _ in 0..40 {
            match rng.gen_range(0..3) {
                0 => {
                    let id = player.add_effect(KEYS[rng.gen_range(0..KEYS.len())]);
                    assert!(id.is_valid());
                    attached.push((id, true));
                }
                1 if !attached.is_empty() => {
                    let (id, _) = attached.remove(rng.gen_range(0..attached.len()));
                    player.remove_effect(id);
                }
                2 if !attached.is_empty() => {
                    let index = rng.gen_range(0..attached.len());
                    let enabled = !attached[index].1;
                    attached[index].1 = enabled;
                    assert!(player.set_effect_enabled(attached[index].0, enabled));
                }
                _ => continue,
            }

            let mut expected: Vec<(ProcessingOrder, EffectId)> = attached
                .iter()
                .filter(|(_, enabled)| *enabled)
                .map(|(id, _)| (player.effect(*id).expect("effect").processing_order(), *id))
                .collect();
            // Stable, so equal orders keep attach order.
            expected.sort_by_key(|(order, _)| *order);
            let expected: Vec<EffectId> = expected.into_iter().map(|(_, id)| id).collect();

            assert_eq!(
                player.effect_ids(),
                attached.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
                "seed {}",
                seed
            );
            assert_eq!(player.chain(), expected, "seed {}", seed);
            assert_wired(&player);
        }
    }
}

#[test]
fn test_add_unknown_or_failing_effect() {
    let services = test_services();
    let mut player = bound_player(&services, 1);
    assert_eq!(player.add_effect("reverb"), EffectId::INVALID);
    assert_eq!(player.add_effect(FAILING_KEY), EffectId::INVALID);
    assert!(player.effect_ids().is_empty());
    assert_wired(&player);
}

#[test]
fn test_effect_mut_reaches_spatializer() {
    let services = offline_services();
    let mut player = bound_player(&services, 1);
    let spatial = player.add_effect(spatializer::KEY);

    let position = crate::spatial::Vec3::new(1.0, 2.0, 3.0);
    player
        .effect_mut(spatial)
        .and_then(|e| e.as_spatializer_mut())
        .expect("spatializer")
        .set_position(position);
    let player_id = player.id();
    let effect = player.effect_mut(spatial).expect("effect");
    assert_eq!(effect.owner(), player_id);
    assert_eq!(
        effect.as_spatializer_mut().expect("spatializer").position(),
        position
    );
}

#[test]
fn test_set_asset_twice_subscribes_once() {
    let services = offline_services();
    let mut player = pending_player(&services, 3);
    player.set_asset(AssetId::new(3));
    assert_eq!(services.assets.subscribers(AssetId::new(3)), vec![player.id()]);

    player.play();
    let asset = complete(&services, 3);
    player.on_asset_ready(asset.clone());
    // A duplicate notification must not replay anything.
    player.on_asset_ready(asset);

    assert_eq!(player.state(), PlayerState::AssetBound);
    assert_eq!(voices(&player).len(), 1);
    assert!(services.assets.subscribers(AssetId::new(3)).is_empty());
}

#[test]
fn test_set_unknown_asset() {
    let services = offline_services();
    let mut player = SoundPlayer::new(PlayerId::random(), services);
    player.set_asset(AssetId::new(99));
    assert_eq!(player.asset(), AssetId::INVALID);
    assert_eq!(player.state(), PlayerState::NoAsset);

    player.play();
    assert!(player.deferred().is_empty());
}

#[test]
fn test_retarget_asset() {
    let services = offline_services();
    let mut player = bound_player(&services, 4);
    services.assets.register_pending(AssetId::new(5));

    player.set_asset(AssetId::new(5));
    assert_eq!(player.state(), PlayerState::AssetPending);
    assert_eq!(services.assets.subscribers(AssetId::new(5)), vec![player.id()]);

    // Back to the ready asset binds immediately and drops the old subscription.
    player.set_asset(AssetId::new(4));
    assert_eq!(player.state(), PlayerState::AssetBound);
    assert!(services.assets.subscribers(AssetId::new(5)).is_empty());

    // A late notification for the abandoned asset is stale.
    player.on_asset_ready(complete(&services, 5));
    assert_eq!(player.asset(), AssetId::new(4));
    assert_eq!(
        player.asset_data().map(|asset| asset.id()),
        Some(AssetId::new(4))
    );
}

#[test]
fn test_single_instance_honours_latest_request() {
    let services = offline_services();
    let mut player = pending_player(&services, 6);
    player.set_play_multiple(false);

    player.play();
    render_seconds(&services.context, 1.0);
    player.play_at_seconds(0.5);
    render_seconds(&services.context, 1.0);
    player.play_looping(2, 1.0);
    assert_eq!(player.deferred().len(), 3);

    render_seconds(&services.context, 1.0);
    player.on_asset_ready(complete(&services, 6));

    let voices = voices(&player);
    assert_eq!(voices.len(), 1);
    // Requested at t=3.0 (2.0 + 1.0), ready at 3.0.
    assert!(voices[0].offset.abs() < 1e-9, "offset {}", voices[0].offset);
    assert_eq!(voices[0].loops_remaining, 2);
    assert!(player.deferred().is_empty());
}

#[test]
fn test_concurrent_replays_every_request() {
    let services = offline_services();
    let mut player = pending_player(&services, 7);
    assert!(player.play_multiple());

    player.play();
    render_seconds(&services.context, 1.0);
    player.play();
    render_seconds(&services.context, 1.0);
    player.play_at_seconds(0.5);
    render_seconds(&services.context, 1.0);

    player.on_asset_ready(complete(&services, 7));
    let offsets: Vec<f64> = voices(&player).iter().map(|v| v.offset).collect();
    let expected = [3.0, 2.0, 0.5];
    assert_eq!(offsets.len(), expected.len());
    for (offset, expected) in offsets.iter().zip(expected) {
        assert!((offset - expected).abs() < 1e-9, "{} != {}", offset, expected);
    }
}

#[test]
fn test_music_bus_deferred_loop() {
    let services = offline_services();
    let mut player = pending_player(&services, 8);
    player.set_bus("Music");
    assert_eq!(player.bus(), BusId::from_name("Music"));

    player.play_looping(-1, 2.0);
    assert_eq!(player.deferred().len(), 1);
    assert!((player.deferred()[0].requested_at - 2.0).abs() < 1e-9);
    assert_eq!(player.deferred()[0].loop_count, -1);

    render_seconds(&services.context, 5.0);
    player.on_asset_ready(complete(&services, 8));

    let voices = voices(&player);
    assert_eq!(voices.len(), 1);
    assert!((voices[0].offset - 3.0).abs() < 1e-9);
    assert_eq!(voices[0].loops_remaining, -1);
}

#[test]
fn test_future_request_clamps_to_start() {
    let services = offline_services();
    let mut player = pending_player(&services, 9);
    player.play_at_seconds(4.0);
    render_seconds(&services.context, 1.0);

    player.on_asset_ready(complete(&services, 9));
    let voices = voices(&player);
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].offset, 0.0);
}

#[test]
fn test_is_playing_after_render() {
    let services = offline_services();
    let mut player = bound_player(&services, 10);
    assert!(!player.is_playing());

    player.play();
    assert!(!player.is_playing(), "nothing rendered yet");

    render_seconds(&services.context, 0.1);
    assert!(player.is_playing());

    player.stop_all();
    assert!(!player.is_playing());
    assert!(voices(&player).is_empty());
}

#[test]
fn test_single_instance_restarts_bound_playback() {
    let services = offline_services();
    let mut player = bound_player(&services, 11);
    player.set_play_multiple(false);

    player.play();
    player.play_at_seconds(1.0);
    assert_eq!(voices(&player).len(), 1);

    player.set_play_multiple(true);
    player.play();
    assert_eq!(voices(&player).len(), 2);
}

#[test]
fn test_position() {
    let services = offline_services();
    let mut player = bound_player(&services, 12);
    assert_eq!(player.length_in_seconds(), 10.0);
    assert_eq!(player.sample_rate(), TEST_SAMPLE_RATE);
    assert_eq!(player.position_in_seconds(), 0.0);

    player.play();
    render_seconds(&services.context, 1.0);
    assert!((player.position_in_seconds() - 1.0).abs() < 1e-6);
    assert_eq!(player.position_in_microseconds(), 1_000_000);

    player.play_at_seconds(4.0);
    render_seconds(&services.context, 0.5);
    // The newest voice wins.
    assert!((player.position_in_seconds() - 4.5).abs() < 1e-6);
}

#[test]
fn test_gain() {
    let services = offline_services();
    let player = SoundPlayer::new(PlayerId::random(), services);
    assert_eq!(player.gain(), 1.0);
    player.set_gain(0.25);
    assert_eq!(player.gain(), 0.25);
}

#[test]
fn test_set_bus() {
    let services = offline_services();
    let mut player = SoundPlayer::new(PlayerId::random(), services.clone());
    let default = BusId::from_name(DEFAULT_BUS);
    let music = BusId::from_name("Music");

    player.set_bus("Music");
    assert!(services.buses.exists(music));
    assert!(services.buses.routes(default).is_empty());
    assert_eq!(services.buses.routes(music), vec![player.id()]);
    {
        let default_input = services.buses.input_node(default).expect("default");
        let music_input = services.buses.input_node(music).expect("music");
        let lock = services.context.graph_lock("test");
        assert!(lock.is_connected(&music_input, player.gain_node()));
        assert!(!lock.is_connected(&default_input, player.gain_node()));
        assert_eq!(lock.output_count(player.gain_node()), 1);
    }

    // Setting the same bus again changes nothing.
    player.set_bus("Music");
    assert_eq!(services.buses.routes(music), vec![player.id()]);

    player.set_bus("");
    assert_eq!(player.bus(), default);
    assert!(services.buses.routes(music).is_empty());
    assert!(matches!(services.buses.delete(music), Ok(true)));
}

#[test]
#[serial]
fn test_shutdown_releases_everything() {
    let services = test_services();
    let mut player = bound_player(&services, 13);
    player.set_bus("Sfx");
    let before = COUNTING_SHUTDOWNS.load(Ordering::SeqCst);

    let counting = player.add_effect(COUNTING_KEY);
    let filter = player.add_effect(radio::KEY);
    let spatial = player.add_effect(spatializer::KEY);
    let vis = player.add_effect(visualizer::KEY);
    assert_wired(&player);
    player.play_looping(-1, 0.0);

    let mut nodes = vec![player.sample_node().clone(), player.gain_node().clone()];
    for id in [counting, filter, spatial, vis] {
        let effect = player.effect(id).expect("effect");
        nodes.extend(effect.input_node());
        nodes.extend(effect.output_node());
    }

    player.shutdown();
    player.shutdown();

    assert_eq!(COUNTING_SHUTDOWNS.load(Ordering::SeqCst), before + 1);
    assert!(player.effect_ids().is_empty());
    assert!(voices(&player).is_empty());
    assert!(services.buses.routes(BusId::from_name("Sfx")).is_empty());
    let lock = services.context.graph_lock("test");
    for node in nodes.iter() {
        assert_eq!(lock.input_count(node), 0, "{} has inputs", node.name());
        assert_eq!(lock.output_count(node), 0, "{} has outputs", node.name());
        assert!(!lock.is_pull_node(node));
    }
}

#[test]
#[serial]
fn test_removed_effect_is_shut_down_once() {
    let services = test_services();
    let mut player = bound_player(&services, 14);
    let counting = player.add_effect(COUNTING_KEY);
    assert_eq!(
        player.effect(counting).map(|e| e.state()),
        Some(EffectState::Initialized)
    );
    let before = COUNTING_SHUTDOWNS.load(Ordering::SeqCst);

    player.remove_effect(counting);
    assert_eq!(COUNTING_SHUTDOWNS.load(Ordering::SeqCst), before + 1);

    // Nothing left to shut down when the player goes.
    player.shutdown();
    assert_eq!(COUNTING_SHUTDOWNS.load(Ordering::SeqCst), before + 1);
}

#[test]
fn test_drop_shuts_down() {
    let services = offline_services();
    let player = bound_player(&services, 15);
    let sample = player.sample_node().clone();
    let gain = player.gain_node().clone();
    let bus = player.bus();

    drop(player);
    assert_eq!(services.context.output_count(&sample), 0);
    assert_eq!(services.context.output_count(&gain), 0);
    assert!(services.buses.routes(bus).is_empty());
}
