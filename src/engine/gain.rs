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
use super::{param::Param, AudioNode, Block, ProcessContext, Processor};

struct GainProcessor {
    gain: Param,
}

impl Processor for GainProcessor {
    fn process(&mut self, input: &Block, _: &ProcessContext) -> Block {
        let mut output = input.clone();
        output.scale(self.gain.get());
        output
    }

    fn params(&self) -> Vec<(&'static str, f32)> {
        vec![("gain", self.gain.get())]
    }
}

/// Scales its input by a gain parameter.
#[derive(Clone)]
pub struct GainNode {
    node: AudioNode,
    gain: Param,
}

impl GainNode {
    pub fn new(name: impl Into<String>) -> GainNode {
        let gain = Param::new(1.0);
        let node = AudioNode::new(name, Box::new(GainProcessor { gain: gain.clone() }));
        GainNode { node, gain }
    }

    pub fn node(&self) -> &AudioNode {
        &self.node
    }

    pub fn gain(&self) -> &Param {
        &self.gain
    }
}
