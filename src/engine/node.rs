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
use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use super::{listener::ListenerState, Block};
use crate::ids::NodeId;

/// Everything a processor may need for one render quantum.
pub struct ProcessContext {
    pub sample_rate: f32,
    /// Context frame at the start of this quantum.
    pub frame: u64,
    /// Frames to produce.
    pub frames: usize,
    pub listener: ListenerState,
}

/// The DSP behind a node. Called on the render thread with the mix of all inputs.
pub trait Processor: Send {
    fn process(&mut self, input: &Block, ctx: &ProcessContext) -> Block;

    /// Named parameter values, for graph dumps.
    fn params(&self) -> Vec<(&'static str, f32)> {
        Vec::new()
    }
}

struct NodeCore {
    id: NodeId,
    name: String,
    processor: Mutex<Box<dyn Processor>>,
}

/// A reference counted handle to an engine node. Clones refer to the same node.
#[derive(Clone)]
pub struct AudioNode(Arc<NodeCore>);

impl AudioNode {
    pub fn new(name: impl Into<String>, processor: Box<dyn Processor>) -> AudioNode {
        AudioNode(Arc::new(NodeCore {
            id: NodeId::next(),
            name: name.into(),
            processor: Mutex::new(processor),
        }))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Number of live handles, edges included.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn params(&self) -> Vec<(&'static str, f32)> {
        self.0.processor.lock().params()
    }

    pub(crate) fn process(&self, input: &Block, ctx: &ProcessContext) -> Block {
        self.0.processor.lock().process(input, ctx)
    }
}

impl PartialEq for AudioNode {
    fn eq(&self, other: &AudioNode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for AudioNode {}

impl fmt::Debug for AudioNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0.name, self.0.id)
    }
}

/// Passes its input through unchanged. Used for the destination.
pub(crate) struct PassThrough;

impl Processor for PassThrough {
    fn process(&mut self, input: &Block, _: &ProcessContext) -> Block {
        input.clone()
    }
}
