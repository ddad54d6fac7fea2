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

use tracing::warn;

use super::{DebugSink, EffectCore, EffectError, PlayerEffect, ProcessingOrder, VisualTarget};
use crate::{
    engine::{analyser::AnalyserNode, AudioNode, Context},
    spatial::Vec3,
};

pub const KEY: &str = "visualizer";

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -15.0;
const SMOOTHING: f32 = 0.4;

const DEFAULT_SCALE_MULTIPLIER: f32 = 5.0;
const MIN_SCALE_MULTIPLIER: f32 = 0.1;
const DEFAULT_MIN_SCALE: f32 = 0.1;
const MIN_MIN_SCALE: f32 = 0.01;

/// Averages `db` into one value per target. Every target gets `bins / targets` bins and
/// the last one also takes the remainder.
pub fn band_levels(db: &[f32], targets: usize) -> Vec<f32> {
    if targets == 0 || db.is_empty() {
        return Vec::new();
    }
    let per_target = (db.len() / targets).max(1);
    (0..targets)
        .map(|i| {
            let start = (i * per_target).min(db.len());
            let end = if i + 1 == targets {
                db.len()
            } else {
                (start + per_target).min(db.len())
            };
            let band = &db[start..end];
            if band.is_empty() {
                MIN_DECIBELS
            } else {
                band.iter().sum::<f32>() / band.len() as f32
            }
        })
        .collect()
}

/// Maps a level in decibels onto a scale.
pub fn level_to_scale(db: f32, min_db: f32, max_db: f32, min_scale: f32, multiplier: f32) -> f32 {
    let range = max_db - min_db;
    let normalized = if range > 0.0 {
        ((db - min_db) / range).clamp(0.0, 1.0)
    } else {
        0.0
    };
    min_scale + normalized * multiplier
}

/// Drives the Z scale of its targets from the player's spectrum. A sink: it has an input
/// but no output, and the engine pulls it every quantum.
pub struct Visualizer {
    core: EffectCore,
    analyser: Option<AnalyserNode>,
    targets: Vec<Arc<dyn VisualTarget>>,
    scale_multiplier: f32,
    min_scale: f32,
}

impl Default for Visualizer {
    fn default() -> Visualizer {
        Visualizer::new()
    }
}

impl Visualizer {
    pub fn new() -> Visualizer {
        Visualizer {
            core: EffectCore::new(),
            analyser: None,
            targets: Vec::new(),
            scale_multiplier: DEFAULT_SCALE_MULTIPLIER,
            min_scale: DEFAULT_MIN_SCALE,
        }
    }

    fn fft_size(&self) -> usize {
        (self.targets.len() * 2).max(2)
    }

    pub fn set_targets(&mut self, targets: Vec<Arc<dyn VisualTarget>>) {
        self.targets = targets;
        let fft_size = self.fft_size();
        if let Some(analyser) = &self.analyser {
            if let Err(e) = analyser.set_fft_size(fft_size) {
                warn!(err = %e, "Unable to resize visualizer analyser.");
            }
        }
    }

    pub fn targets(&self) -> &[Arc<dyn VisualTarget>] {
        &self.targets
    }

    pub fn set_scale_multiplier(&mut self, multiplier: f32) {
        self.scale_multiplier = multiplier.max(MIN_SCALE_MULTIPLIER);
    }

    pub fn scale_multiplier(&self) -> f32 {
        self.scale_multiplier
    }

    pub fn set_min_scale(&mut self, min_scale: f32) {
        self.min_scale = min_scale.max(MIN_MIN_SCALE);
    }

    pub fn min_scale(&self) -> f32 {
        self.min_scale
    }

    pub fn analyser(&self) -> Option<&AnalyserNode> {
        self.analyser.as_ref()
    }
}

impl PlayerEffect for Visualizer {
    fn name(&self) -> &'static str {
        KEY
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

    fn on_initialize(&mut self, context: &Arc<Context>) -> Result<(), EffectError> {
        let analyser = AnalyserNode::new(format!("visualizer:{}", self.core.owner()));
        analyser.set_fft_size(self.fft_size())?;
        analyser.set_min_decibels(MIN_DECIBELS);
        analyser.set_max_decibels(MAX_DECIBELS);
        analyser.set_smoothing(SMOOTHING);
        context
            .graph_lock("visualizer initialize")
            .add_pull_node(analyser.node());
        self.analyser = Some(analyser);
        Ok(())
    }

    fn on_shutdown(&mut self, context: &Context) {
        if let Some(analyser) = self.analyser.take() {
            let mut lock = context.graph_lock("visualizer shutdown");
            lock.remove_pull_node(analyser.node());
            lock.disconnect_node(analyser.node());
        }
    }

    fn input_node(&self) -> Option<AudioNode> {
        self.analyser.as_ref().map(|a| a.node().clone())
    }

    fn output_node(&self) -> Option<AudioNode> {
        None
    }

    fn update(&mut self, _context: &Context) {
        if !self.is_enabled() || self.targets.is_empty() {
            return;
        }
        let Some(analyser) = &self.analyser else {
            return;
        };

        let min_db = analyser.min_decibels();
        let max_db = analyser.max_decibels();
        let levels = band_levels(&analyser.frequency_data_db(), self.targets.len());
        for (target, db) in self.targets.iter().zip(levels) {
            if !target.is_valid() {
                continue;
            }
            let scale = target.scale();
            let z = level_to_scale(db, min_db, max_db, self.min_scale, self.scale_multiplier);
            target.set_scale(Vec3::new(scale.x, scale.y, z));
        }
    }

    fn draw_debug(&self, sink: &mut dyn DebugSink) {
        sink.text("effect", KEY);
        sink.text("targets", &self.targets.len().to_string());
        sink.value("scaleMultiplier", self.scale_multiplier);
        sink.value("minScale", self.min_scale);
    }

    fn as_visualizer_mut(&mut self) -> Option<&mut Visualizer> {
        Some(self)
    }
}
