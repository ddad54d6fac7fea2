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
use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

use super::{
    graph::Graph,
    listener::Listener,
    node::{PassThrough, ProcessContext},
    AudioNode, Block, EngineError, GraphLock,
};
use crate::ids::NodeId;

/// Frames rendered per pass through the graph.
pub const QUANTUM_FRAMES: usize = 128;

/// How to build a context.
#[derive(Clone, Debug)]
pub struct ContextOptions {
    pub sample_rate: f32,
    pub channels: u16,
    /// Without a destination nothing reaches an output, but the graph stays usable.
    pub with_destination: bool,
}

impl Default for ContextOptions {
    fn default() -> ContextOptions {
        ContextOptions {
            sample_rate: 48000.0,
            channels: 2,
            with_destination: true,
        }
    }
}

/// Render clock and pull scratch. Held for the duration of every render call.
pub(crate) struct RenderState {
    frame: u64,
    cache: HashMap<NodeId, Block>,
    visiting: HashSet<NodeId>,
}

/// Proof that no render is in progress. Playback cursors are read through this.
pub struct RenderLock<'a> {
    _state: MutexGuard<'a, RenderState>,
}

/// Owns the node graph, the clock, the listener and the destination.
pub struct Context {
    options: ContextOptions,
    graph: RwLock<Graph>,
    render: Mutex<RenderState>,
    frames: AtomicU64,
    listener: Listener,
    destination: Option<AudioNode>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("sample_rate", &self.options.sample_rate)
            .field("channels", &self.options.channels)
            .field("frame", &self.current_frame())
            .field("destination", &self.destination.is_some())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(options: ContextOptions) -> Result<Arc<Context>, EngineError> {
        if !(options.sample_rate.is_finite() && options.sample_rate > 0.0) {
            return Err(EngineError::InvalidSampleRate(options.sample_rate));
        }
        if options.channels == 0 {
            return Err(EngineError::InvalidChannelCount(options.channels));
        }
        let destination = options
            .with_destination
            .then(|| AudioNode::new("destination", Box::new(PassThrough)));
        info!(
            sample_rate = options.sample_rate,
            channels = options.channels,
            destination = destination.is_some(),
            "Created audio context."
        );
        Ok(Arc::new(Context {
            options,
            graph: RwLock::new(Graph::default()),
            render: Mutex::new(RenderState {
                frame: 0,
                cache: HashMap::new(),
                visiting: HashSet::new(),
            }),
            frames: AtomicU64::new(0),
            listener: Listener::default(),
            destination,
        }))
    }

    pub fn sample_rate(&self) -> f32 {
        self.options.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.options.channels
    }

    /// Frames rendered so far.
    pub fn current_frame(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Seconds rendered so far.
    pub fn current_time(&self) -> f64 {
        self.current_frame() as f64 / f64::from(self.options.sample_rate)
    }

    pub fn destination(&self) -> Option<&AudioNode> {
        self.destination.as_ref()
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Takes the exclusive structural lock. `reason` shows up in trace logs.
    pub fn graph_lock(&self, reason: &'static str) -> GraphLock<'_> {
        GraphLock::new(self.graph.write(), reason)
    }

    /// Waits for any in-progress render to finish.
    pub fn render_lock(&self) -> RenderLock<'_> {
        RenderLock {
            _state: self.render.lock(),
        }
    }

    /// Returns once every structural change made so far is visible to the renderer.
    pub fn synchronize_connections(&self) {
        drop(self.graph.write());
        debug!(frame = self.current_frame(), "Synchronized connections.");
    }

    /// Number of edges feeding `node`.
    pub fn input_count(&self, node: &AudioNode) -> usize {
        self.graph.read().input_count(node)
    }

    /// Number of edges leaving `node`.
    pub fn output_count(&self, node: &AudioNode) -> usize {
        self.graph.read().output_count(node)
    }

    /// Runs `f` against the graph under a shared lock.
    pub(crate) fn with_graph<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        f(&self.graph.read())
    }

    /// Renders `frames` frames from the destination, advancing the clock. Pull nodes are
    /// rendered too and their output discarded. Without a destination the result is
    /// silence.
    pub fn render(&self, frames: usize) -> Block {
        let mut guard = self.render.lock();
        let state = &mut *guard;
        let graph = self.graph.read();
        let mut out = Block::silent(usize::from(self.options.channels), frames);

        let mut offset = 0;
        while offset < frames {
            let quantum = (frames - offset).min(QUANTUM_FRAMES);
            let ctx = ProcessContext {
                sample_rate: self.options.sample_rate,
                frame: state.frame,
                frames: quantum,
                listener: self.listener.state(),
            };
            let mut pull = Pull::new(&graph, &ctx, &mut state.cache, &mut state.visiting);
            if let Some(destination) = &self.destination {
                let rendered = pull.node(destination);
                out.mix_from(&rendered, offset);
            }
            for node in graph.pull_nodes() {
                pull.node(node);
            }
            state.frame += quantum as u64;
            self.frames.store(state.frame, Ordering::Release);
            offset += quantum;
        }
        out
    }

    /// Renders into an interleaved device buffer with `channels` channels.
    pub fn render_interleaved(&self, out: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let block = self.render(out.len() / channels);
        block.write_interleaved(out, channels);
    }
}

/// One quantum of pull rendering. Each node is processed at most once per quantum.
/// The maps are owned by the render state and keep their capacity between quanta.
struct Pull<'a> {
    graph: &'a Graph,
    ctx: &'a ProcessContext,
    cache: &'a mut HashMap<NodeId, Block>,
    visiting: &'a mut HashSet<NodeId>,
}

impl<'a> Pull<'a> {
    fn new(
        graph: &'a Graph,
        ctx: &'a ProcessContext,
        cache: &'a mut HashMap<NodeId, Block>,
        visiting: &'a mut HashSet<NodeId>,
    ) -> Pull<'a> {
        cache.clear();
        visiting.clear();
        Pull {
            graph,
            ctx,
            cache,
            visiting,
        }
    }

    fn node(&mut self, node: &AudioNode) -> Block {
        if let Some(block) = self.cache.get(&node.id()) {
            return block.clone();
        }
        // A cycle contributes silence instead of recursing forever.
        if !self.visiting.insert(node.id()) {
            return Block::silent(1, self.ctx.frames);
        }

        let graph = self.graph;
        let mut input = Block::silent(1, self.ctx.frames);
        for source in graph.sources(node.id()) {
            let rendered = self.node(source);
            input.mix_from(&rendered, 0);
        }
        let output = node.process(&input, self.ctx);

        self.visiting.remove(&node.id());
        self.cache.insert(node.id(), output.clone());
        output
    }
}
