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

use super::{EffectCore, EffectError, PlayerEffect, ProcessingOrder};
use crate::engine::{
    biquad::{BiquadNode, FilterType},
    waveshaper::WaveShaperNode,
    AudioNode, Context,
};

pub const KEY: &str = "radio";

pub const DEFAULT_HIGHPASS_HZ: f32 = 595.0;
pub const DEFAULT_LOWPASS_HZ: f32 = 2312.0;
const CURVE_POINTS: usize = 256;

/// The soft clipping curve, `tanh(2x)` sampled over [-1, 1).
pub fn distortion_curve() -> Vec<f32> {
    (0..CURVE_POINTS)
        .map(|i| {
            let x = i as f32 / (CURVE_POINTS / 2) as f32 - 1.0;
            (2.0 * x).tanh()
        })
        .collect()
}

struct Nodes {
    highpass: BiquadNode,
    lowpass: BiquadNode,
    shaper: WaveShaperNode,
}

/// Band limits the player and saturates it: highpass, lowpass, then a wave shaper.
pub struct Radio {
    core: EffectCore,
    nodes: Option<Nodes>,
    highpass_hz: f32,
    lowpass_hz: f32,
}

impl Default for Radio {
    fn default() -> Radio {
        Radio::new()
    }
}

impl Radio {
    pub fn new() -> Radio {
        Radio {
            core: EffectCore::new(),
            nodes: None,
            highpass_hz: DEFAULT_HIGHPASS_HZ,
            lowpass_hz: DEFAULT_LOWPASS_HZ,
        }
    }

    pub fn set_highpass_frequency(&mut self, hz: f32) {
        self.highpass_hz = hz;
        if let Some(nodes) = &self.nodes {
            nodes.highpass.frequency().set(hz);
        }
    }

    pub fn highpass_frequency(&self) -> f32 {
        self.highpass_hz
    }

    pub fn set_lowpass_frequency(&mut self, hz: f32) {
        self.lowpass_hz = hz;
        if let Some(nodes) = &self.nodes {
            nodes.lowpass.frequency().set(hz);
        }
    }

    pub fn lowpass_frequency(&self) -> f32 {
        self.lowpass_hz
    }
}

impl PlayerEffect for Radio {
    fn name(&self) -> &'static str {
        KEY
    }

    fn processing_order(&self) -> ProcessingOrder {
        ProcessingOrder::Filtering
    }

    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn on_initialize(&mut self, context: &Arc<Context>) -> Result<(), EffectError> {
        let owner = self.core.owner();
        let highpass = BiquadNode::new(
            format!("radio_highpass:{}", owner),
            FilterType::HighPass,
            self.highpass_hz,
        );
        let lowpass = BiquadNode::new(
            format!("radio_lowpass:{}", owner),
            FilterType::LowPass,
            self.lowpass_hz,
        );
        let shaper = WaveShaperNode::new(format!("radio_shaper:{}", owner));
        shaper.set_curve(distortion_curve())?;

        {
            let mut lock = context.graph_lock("radio initialize");
            lock.connect(lowpass.node(), highpass.node());
            lock.connect(shaper.node(), lowpass.node());
        }
        self.nodes = Some(Nodes {
            highpass,
            lowpass,
            shaper,
        });
        Ok(())
    }

    fn on_shutdown(&mut self, context: &Context) {
        if let Some(nodes) = self.nodes.take() {
            let mut lock = context.graph_lock("radio shutdown");
            lock.disconnect_node(nodes.highpass.node());
            lock.disconnect_node(nodes.lowpass.node());
            lock.disconnect_node(nodes.shaper.node());
        }
    }

    fn input_node(&self) -> Option<AudioNode> {
        self.nodes.as_ref().map(|n| n.highpass.node().clone())
    }

    fn output_node(&self) -> Option<AudioNode> {
        self.nodes.as_ref().map(|n| n.shaper.node().clone())
    }
}
