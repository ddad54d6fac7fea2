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

//! Player effects and the registry that builds them by name.
//!
//! An effect owns a small sub-graph with an optional input and output node. The owning
//! player splices enabled effects between its sample node and its gain node, ordered by
//! [`ProcessingOrder`].

use std::{fmt, sync::Arc};

use tracing::{debug, error};

use crate::{
    engine::{AudioNode, Context, EngineError},
    ids::{EffectId, PlayerId},
    spatial::Vec3,
};

pub mod radio;
pub mod spatializer;
pub mod visualizer;

pub use radio::Radio;
pub use spatializer::Spatializer;
pub use visualizer::Visualizer;

/// Where an effect sits in a player's chain. Lower values run first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessingOrder {
    Source = 0,
    Filtering = 100,
    Dynamics = 200,
    TimeBased = 300,
    Spatializer = 400,
    Utility = 500,
    Output = 1000,
}

impl ProcessingOrder {
    pub fn value(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ProcessingOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingOrder::Source => "source",
            ProcessingOrder::Filtering => "filtering",
            ProcessingOrder::Dynamics => "dynamics",
            ProcessingOrder::TimeBased => "time-based",
            ProcessingOrder::Spatializer => "spatializer",
            ProcessingOrder::Utility => "utility",
            ProcessingOrder::Output => "output",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle of an effect. Only moves forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EffectState {
    #[default]
    Uninitialized,
    Initialized,
    ShutDown,
}

#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("Effect {0} is already initialized")]
    AlreadyInitialized(&'static str),

    #[error("Effect {0} has been shut down")]
    ShutDown(&'static str),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// State every effect carries regardless of kind.
#[derive(Debug, Default)]
pub struct EffectCore {
    id: EffectId,
    owner: PlayerId,
    enabled: bool,
    state: EffectState,
    context: Option<Arc<Context>>,
}

impl EffectCore {
    pub fn new() -> EffectCore {
        EffectCore {
            enabled: true,
            ..EffectCore::default()
        }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Set by the player at attach time.
    pub fn attach(&mut self, id: EffectId, owner: PlayerId) {
        self.id = id;
        self.owner = owner;
    }

    pub fn state(&self) -> EffectState {
        self.state
    }

    /// The context the effect was initialized with, if it is live.
    pub fn context(&self) -> Option<&Arc<Context>> {
        self.context.as_ref()
    }
}

/// Receives labelled values from [`PlayerEffect::draw_debug`].
pub trait DebugSink {
    fn text(&mut self, label: &str, value: &str);

    fn value(&mut self, label: &str, value: f32) {
        self.text(label, &format!("{:.2}", value));
    }
}

/// Collects debug output as `label: value` lines.
impl DebugSink for Vec<String> {
    fn text(&mut self, label: &str, value: &str) {
        self.push(format!("{}: {}", label, value));
    }
}

/// Something a visualizer scales with the spectrum, usually a host entity.
pub trait VisualTarget: Send + Sync {
    /// Targets that went away are skipped.
    fn is_valid(&self) -> bool {
        true
    }

    fn scale(&self) -> Vec3;

    fn set_scale(&self, scale: Vec3);
}

/// A unit of processing spliced into a player's chain.
///
/// Implementors provide the node plumbing through `on_initialize` and `on_shutdown`. The
/// provided `initialize` and `shutdown` enforce the lifecycle.
pub trait PlayerEffect: Send {
    /// The registry key of this kind of effect.
    fn name(&self) -> &'static str;

    fn processing_order(&self) -> ProcessingOrder;

    fn core(&self) -> &EffectCore;

    fn core_mut(&mut self) -> &mut EffectCore;

    /// Allocates nodes and wires the effect's internal edges.
    fn on_initialize(&mut self, context: &Arc<Context>) -> Result<(), EffectError>;

    /// Disconnects internal edges and drops node references.
    fn on_shutdown(&mut self, context: &Context);

    fn input_node(&self) -> Option<AudioNode>;

    fn output_node(&self) -> Option<AudioNode>;

    /// Called once per system tick.
    fn update(&mut self, _context: &Context) {}

    fn draw_debug(&self, sink: &mut dyn DebugSink) {
        sink.text("effect", self.name());
        sink.text("order", &self.processing_order().to_string());
        sink.text("enabled", if self.is_enabled() { "yes" } else { "no" });
    }

    fn as_spatializer_mut(&mut self) -> Option<&mut Spatializer> {
        None
    }

    fn as_visualizer_mut(&mut self) -> Option<&mut Visualizer> {
        None
    }

    fn id(&self) -> EffectId {
        self.core().id()
    }

    fn owner(&self) -> PlayerId {
        self.core().owner()
    }

    fn state(&self) -> EffectState {
        self.core().state()
    }

    fn is_enabled(&self) -> bool {
        self.core().enabled
    }

    /// Only records the flag. The owning player rebuilds its chain.
    fn set_enabled(&mut self, enabled: bool) {
        self.core_mut().enabled = enabled;
    }

    fn initialize(&mut self, context: &Arc<Context>) -> Result<(), EffectError> {
        match self.state() {
            EffectState::Initialized => return Err(EffectError::AlreadyInitialized(self.name())),
            EffectState::ShutDown => return Err(EffectError::ShutDown(self.name())),
            EffectState::Uninitialized => {}
        }
        self.on_initialize(context)?;
        let core = self.core_mut();
        core.context = Some(context.clone());
        core.state = EffectState::Initialized;
        debug!(effect = self.name(), id = %self.id(), "Initialized effect.");
        Ok(())
    }

    fn shutdown(&mut self) {
        match self.state() {
            EffectState::ShutDown => {
                error!(effect = self.name(), id = %self.id(), "Effect already shut down.");
            }
            EffectState::Uninitialized => {
                self.core_mut().state = EffectState::ShutDown;
            }
            EffectState::Initialized => {
                if let Some(context) = self.core_mut().context.take() {
                    self.on_shutdown(&context);
                }
                self.core_mut().state = EffectState::ShutDown;
                debug!(effect = self.name(), id = %self.id(), "Shut down effect.");
            }
        }
    }
}

/// Builds a fresh effect.
pub type EffectFactory = fn() -> Box<dyn PlayerEffect>;

/// Describes a registered effect kind.
#[derive(Clone, Debug)]
pub struct EffectDescriptor {
    pub key: &'static str,
    pub description: &'static str,
    pub order: ProcessingOrder,
}

struct RegistryEntry {
    descriptor: EffectDescriptor,
    factory: EffectFactory,
}

/// Effect kinds by key. The built-in effects are always registered.
pub struct EffectRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for EffectRegistry {
    fn default() -> EffectRegistry {
        EffectRegistry::new()
    }
}

impl EffectRegistry {
    pub fn new() -> EffectRegistry {
        let mut registry = EffectRegistry {
            entries: Vec::with_capacity(3),
        };
        registry.register(
            EffectDescriptor {
                key: spatializer::KEY,
                description: "Positions the player relative to the listener",
                order: ProcessingOrder::Spatializer,
            },
            || Box::new(Spatializer::new()),
        );
        registry.register(
            EffectDescriptor {
                key: radio::KEY,
                description: "Band limited and saturated, like a handheld radio",
                order: ProcessingOrder::Filtering,
            },
            || Box::new(Radio::new()),
        );
        registry.register(
            EffectDescriptor {
                key: visualizer::KEY,
                description: "Scales visual targets with the player's spectrum",
                order: ProcessingOrder::Utility,
            },
            || Box::new(Visualizer::new()),
        );
        registry
    }

    /// Adds an effect kind. A key registered twice resolves to the latest factory.
    pub fn register(&mut self, descriptor: EffectDescriptor, factory: EffectFactory) {
        self.entries.retain(|e| e.descriptor.key != descriptor.key);
        self.entries.push(RegistryEntry {
            descriptor,
            factory,
        });
    }

    pub fn all_effects(&self) -> Vec<&EffectDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    pub fn get(&self, key: &str) -> Option<&EffectDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.key == key)
            .map(|e| &e.descriptor)
    }

    /// Builds an uninitialized effect, or None for an unknown key.
    pub fn create(&self, key: &str) -> Option<Box<dyn PlayerEffect>> {
        self.entries
            .iter()
            .find(|e| e.descriptor.key == key)
            .map(|e| (e.factory)())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::offline_context;

    #[test]
    fn test_order_values() {
        assert_eq!(ProcessingOrder::Source.value(), 0);
        assert_eq!(ProcessingOrder::Filtering.value(), 100);
        assert_eq!(ProcessingOrder::Spatializer.value(), 400);
        assert_eq!(ProcessingOrder::Output.value(), 1000);
        assert!(ProcessingOrder::Filtering < ProcessingOrder::Dynamics);
        assert!(ProcessingOrder::TimeBased < ProcessingOrder::Spatializer);
        assert!(ProcessingOrder::Spatializer < ProcessingOrder::Utility);
    }

    #[test]
    fn test_registry() {
        let registry = EffectRegistry::new();
        assert_eq!(registry.len(), 3);
        for descriptor in registry.all_effects() {
            let effect = registry.create(descriptor.key).expect("effect");
            assert_eq!(effect.name(), descriptor.key);
            assert_eq!(effect.processing_order(), descriptor.order);
            assert_eq!(effect.state(), EffectState::Uninitialized);
            assert!(effect.is_enabled());
            assert!(!effect.id().is_valid());
        }
        assert!(registry.create("reverb").is_none());
        assert!(registry.get("radio").is_some());
    }

    #[test]
    fn test_lifecycle() {
        let ctx = offline_context();
        let mut effect = EffectRegistry::new().create("radio").expect("radio");
        effect.initialize(&ctx).expect("initialize");
        assert_eq!(effect.state(), EffectState::Initialized);
        let core = format!("{:?}", effect.core());
        assert!(core.contains("Initialized"));
        assert!(core.contains("Context"));
        assert!(matches!(
            effect.initialize(&ctx),
            Err(EffectError::AlreadyInitialized("radio"))
        ));

        effect.shutdown();
        assert_eq!(effect.state(), EffectState::ShutDown);
        assert!(effect.input_node().is_none());
        // Second shutdown is logged and ignored.
        effect.shutdown();
        assert_eq!(effect.state(), EffectState::ShutDown);
        assert!(matches!(
            effect.initialize(&ctx),
            Err(EffectError::ShutDown("radio"))
        ));
    }

    #[test]
    fn test_shutdown_before_initialize() {
        let mut effect = Spatializer::new();
        effect.shutdown();
        assert_eq!(effect.state(), EffectState::ShutDown);
    }

    #[test]
    fn test_draw_debug() {
        let mut effect = Radio::new();
        effect.set_enabled(false);
        let mut lines: Vec<String> = Vec::new();
        effect.draw_debug(&mut lines);
        assert!(lines.contains(&"effect: radio".to_string()));
        assert!(lines.contains(&"order: filtering".to_string()));
        assert!(lines.contains(&"enabled: no".to_string()));
    }
}
