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

//! Graph dumps in nomnoml syntax, for pasting into a diagram viewer.

use std::{collections::HashSet, fmt::Write};

use super::{graph::Graph, AudioNode, Context};
use crate::ids::NodeId;

const HEADER: &str = "#direction: right\n#spacing: 40\n#padding: 10\n\n";

fn label(node: &AudioNode) -> String {
    format!("{}_{:04x}", node.name(), node.id().raw() & 0xFFFF)
}

fn visit(graph: &Graph, node: &AudioNode, output: &mut String, visited: &mut HashSet<NodeId>) {
    if !visited.insert(node.id()) {
        return;
    }

    let id = label(node);
    let params = node.params();
    if params.is_empty() {
        let _ = writeln!(output, "[{}]", id);
    } else {
        let params = params
            .iter()
            .map(|(name, value)| format!("{}: {:.2}", name, value))
            .collect::<Vec<String>>()
            .join("; ");
        let _ = writeln!(output, "[{}|{}]", id, params);
    }

    for source in graph.sources(node.id()) {
        visit(graph, source, output, visited);
        let _ = writeln!(output, "[{}] -> [{}]", label(source), id);
    }
}

/// Everything reachable upstream of the destination and the pull nodes. Empty without
/// a destination.
pub fn nomnoml(context: &Context) -> String {
    let Some(destination) = context.destination() else {
        return String::new();
    };
    context.with_graph(|graph| {
        let mut output = String::from(HEADER);
        let mut visited = HashSet::new();
        visit(graph, destination, &mut output, &mut visited);
        for node in graph.pull_nodes() {
            visit(graph, node, &mut output, &mut visited);
        }
        output
    })
}
