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

use super::{DebugSink, EffectCore, EffectError, PlayerEffect, ProcessingOrder};
use crate::{
    engine::{
        panner::{DistanceModel, DistanceSettings, PannerNode},
        AudioNode, Context,
    },
    spatial::Vec3,
};

pub const KEY: &str = "spatializer";

/// Places the player in the world through a single panner node.
pub struct Spatializer {
    core: EffectCore,
    panner: Option<PannerNode>,
    settings: DistanceSettings,
    position: Vec3,
}

impl Default for Spatializer {
    fn default() -> Spatializer {
        Spatializer::new()
    }
}

impl Spatializer {
    pub fn new() -> Spatializer {
        Spatializer {
            core: EffectCore::new(),
            panner: None,
            settings: DistanceSettings::default(),
            position: Vec3::ZERO,
        }
    }

    /// Applied to the panner immediately when initialized, otherwise on initialize.
    #[allow(clippy::too_many_arguments)]
    pub fn set_distance_settings(
        &mut self,
        model: DistanceModel,
        ref_distance: f32,
        max_distance: f32,
        rolloff: f32,
        cone_inner_angle: f32,
        cone_outer_angle: f32,
        cone_outer_gain: f32,
    ) {
        self.settings = DistanceSettings {
            model,
            ref_distance,
            max_distance,
            rolloff,
            cone_inner_angle,
            cone_outer_angle,
            cone_outer_gain,
        };
        if let Some(panner) = &self.panner {
            panner.set_distance_settings(self.settings);
        }
    }

    pub fn distance_settings(&self) -> DistanceSettings {
        self.settings
    }

    /// Emitter position, already in engine coordinates.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        if let Some(panner) = &self.panner {
            panner.set_position(position);
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }
}

impl PlayerEffect for Spatializer {
    fn name(&self) -> &'static str {
        KEY
    }

    fn processing_order(&self) -> ProcessingOrder {
        ProcessingOrder::Spatializer
    }

    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn on_initialize(&mut self, _context: &Arc<Context>) -> Result<(), EffectError> {
        let panner = PannerNode::new(format!("spatializer:{}", self.core.owner()));
        panner.set_distance_settings(self.settings);
        panner.set_position(self.position);
        self.panner = Some(panner);
        Ok(())
    }

    fn on_shutdown(&mut self, context: &Context) {
        if let Some(panner) = self.panner.take() {
            context
                .graph_lock("spatializer shutdown")
                .disconnect_node(panner.node());
        }
    }

    fn input_node(&self) -> Option<AudioNode> {
        self.panner.as_ref().map(|p| p.node().clone())
    }

    fn output_node(&self) -> Option<AudioNode> {
        self.input_node()
    }

    fn draw_debug(&self, sink: &mut dyn DebugSink) {
        sink.text("effect", KEY);
        sink.text(
            "position",
            &format!(
                "({:.2}, {:.2}, {:.2})",
                self.position.x, self.position.y, self.position.z
            ),
        );
        sink.value("refDistance", self.settings.ref_distance);
        sink.value("maxDistance", self.settings.max_distance);
    }

    fn as_spatializer_mut(&mut self) -> Option<&mut Spatializer> {
        Some(self)
    }
}
