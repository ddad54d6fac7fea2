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

use parking_lot::Mutex;

use super::{AudioNode, Block, EngineError, ProcessContext, Processor};

struct ShaperProcessor {
    curve: Arc<Mutex<Option<Vec<f32>>>>,
}

/// Maps an input sample in [-1, 1] onto the curve with linear interpolation.
fn shape(curve: &[f32], sample: f32) -> f32 {
    let last = (curve.len() - 1) as f32;
    let position = ((sample.clamp(-1.0, 1.0) + 1.0) * 0.5) * last;
    let index = position.floor() as usize;
    let next = (index + 1).min(curve.len() - 1);
    let fraction = position - index as f32;
    curve[index] + (curve[next] - curve[index]) * fraction
}

impl Processor for ShaperProcessor {
    fn process(&mut self, input: &Block, _: &ProcessContext) -> Block {
        let curve = self.curve.lock();
        let mut output = input.clone();
        if let Some(curve) = curve.as_deref() {
            for channel in output.channels_mut() {
                for sample in channel.iter_mut() {
                    *sample = shape(curve, *sample);
                }
            }
        }
        output
    }
}

/// Distorts its input through a transfer curve. Without a curve it passes input through.
#[derive(Clone)]
pub struct WaveShaperNode {
    node: AudioNode,
    curve: Arc<Mutex<Option<Vec<f32>>>>,
}

impl WaveShaperNode {
    pub fn new(name: impl Into<String>) -> WaveShaperNode {
        let curve = Arc::new(Mutex::new(None));
        let node = AudioNode::new(
            name,
            Box::new(ShaperProcessor {
                curve: curve.clone(),
            }),
        );
        WaveShaperNode { node, curve }
    }

    pub fn node(&self) -> &AudioNode {
        &self.node
    }

    pub fn set_curve(&self, curve: Vec<f32>) -> Result<(), EngineError> {
        if curve.len() < 2 {
            return Err(EngineError::InvalidCurve(curve.len()));
        }
        *self.curve.lock() = Some(curve);
        Ok(())
    }

    pub fn curve(&self) -> Option<Vec<f32>> {
        self.curve.lock().clone()
    }
}
