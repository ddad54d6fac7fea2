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
use std::collections::HashMap;

use parking_lot::RwLockWriteGuard;
use tracing::trace;

use super::AudioNode;
use crate::ids::NodeId;

/// The inputs of one node. Edges keep both ends alive.
struct Inputs {
    node: AudioNode,
    sources: Vec<AudioNode>,
}

/// Connections between nodes plus the nodes rendered without reaching the destination.
#[derive(Default)]
pub(crate) struct Graph {
    inputs: HashMap<NodeId, Inputs>,
    pull_nodes: Vec<AudioNode>,
}

impl Graph {
    /// The nodes feeding `node`, in connection order.
    pub(crate) fn sources(&self, node: NodeId) -> &[AudioNode] {
        self.inputs
            .get(&node)
            .map(|inputs| inputs.sources.as_slice())
            .unwrap_or(&[])
    }

    /// Every edge as (destination, source).
    pub(crate) fn edges(&self) -> impl Iterator<Item = (&AudioNode, &AudioNode)> {
        self.inputs
            .values()
            .flat_map(|inputs| inputs.sources.iter().map(move |src| (&inputs.node, src)))
    }

    pub(crate) fn pull_nodes(&self) -> &[AudioNode] {
        &self.pull_nodes
    }

    pub(crate) fn input_count(&self, node: &AudioNode) -> usize {
        self.sources(node.id()).len()
    }

    pub(crate) fn output_count(&self, node: &AudioNode) -> usize {
        self.inputs
            .values()
            .map(|inputs| inputs.sources.iter().filter(|src| *src == node).count())
            .sum()
    }
}

/// Exclusive access to the graph structure. Every connect and disconnect goes through
/// one of these, so the render thread never sees a half-applied change.
pub struct GraphLock<'a> {
    pub(crate) graph: RwLockWriteGuard<'a, Graph>,
    reason: &'static str,
}

impl<'a> GraphLock<'a> {
    pub(crate) fn new(graph: RwLockWriteGuard<'a, Graph>, reason: &'static str) -> GraphLock<'a> {
        trace!(reason, "Graph lock acquired.");
        GraphLock { graph, reason }
    }

    /// Feeds `source` into `destination`. Returns false if the edge already existed.
    pub fn connect(&mut self, destination: &AudioNode, source: &AudioNode) -> bool {
        let inputs = self
            .graph
            .inputs
            .entry(destination.id())
            .or_insert_with(|| Inputs {
                node: destination.clone(),
                sources: Vec::new(),
            });
        if inputs.sources.contains(source) {
            return false;
        }
        inputs.sources.push(source.clone());
        true
    }

    /// Removes the edge from `source` to `destination`. Returns false if there was none.
    pub fn disconnect(&mut self, destination: &AudioNode, source: &AudioNode) -> bool {
        let Some(inputs) = self.graph.inputs.get_mut(&destination.id()) else {
            return false;
        };
        let before = inputs.sources.len();
        inputs.sources.retain(|src| src != source);
        let removed = inputs.sources.len() != before;
        if inputs.sources.is_empty() {
            self.graph.inputs.remove(&destination.id());
        }
        removed
    }

    /// Removes every edge feeding `node`.
    pub fn disconnect_all_inputs(&mut self, node: &AudioNode) {
        self.graph.inputs.remove(&node.id());
    }

    /// Removes every edge leaving `node`.
    pub fn disconnect_all_outputs(&mut self, node: &AudioNode) {
        for inputs in self.graph.inputs.values_mut() {
            inputs.sources.retain(|src| src != node);
        }
        self.graph.inputs.retain(|_, inputs| !inputs.sources.is_empty());
    }

    /// Removes every edge touching `node` and drops it from the pull list.
    pub fn disconnect_node(&mut self, node: &AudioNode) {
        self.disconnect_all_inputs(node);
        self.disconnect_all_outputs(node);
        self.remove_pull_node(node);
    }

    pub fn is_connected(&self, destination: &AudioNode, source: &AudioNode) -> bool {
        self.graph.sources(destination.id()).contains(source)
    }

    pub fn input_count(&self, node: &AudioNode) -> usize {
        self.graph.input_count(node)
    }

    pub fn output_count(&self, node: &AudioNode) -> usize {
        self.graph.output_count(node)
    }

    /// Renders `node` every quantum even when nothing downstream reaches the destination.
    pub fn add_pull_node(&mut self, node: &AudioNode) {
        if !self.graph.pull_nodes.contains(node) {
            self.graph.pull_nodes.push(node.clone());
        }
    }

    pub fn remove_pull_node(&mut self, node: &AudioNode) {
        self.graph.pull_nodes.retain(|pull| pull != node);
    }

    pub fn is_pull_node(&self, node: &AudioNode) -> bool {
        self.graph.pull_nodes.contains(node)
    }
}

impl Drop for GraphLock<'_> {
    fn drop(&mut self) {
        trace!(reason = self.reason, "Graph lock released.");
    }
}
