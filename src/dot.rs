//! Graphviz DOT rendering of the dependency graph.
//!
//! Every path becomes a node and every task contributes one edge from each
//! input to each target. Nodes and edges are sorted so output is stable
//! across runs and suitable for snapshot tests.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::ir::BuildGraph;

/// Render `graph` as a DOT document.
#[must_use]
pub fn render(graph: &BuildGraph) -> String {
    Dot { graph }.to_string()
}

/// Quote a DOT identifier.
fn quote(id: &str) -> String {
    format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\""))
}

struct Dot<'a> {
    graph: &'a BuildGraph,
}

impl Display for Dot<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let graph = self.graph;
        writeln!(f, "digraph simbuild {{")?;
        writeln!(f, "  rankdir=LR;")?;

        let nodes = graph
            .nodes()
            .values()
            .map(|node| {
                let shape = if node.is_external() { "note" } else { "box" };
                (graph.display_path(&node.path), shape)
            })
            .sorted();
        for (name, shape) in nodes {
            writeln!(f, "  {} [shape={shape}];", quote(&name))?;
        }

        let edges: BTreeSet<(String, String)> = graph
            .tasks()
            .iter()
            .flat_map(|task| {
                task.inputs()
                    .cartesian_product(task.targets.iter())
                    .map(|(input, target)| {
                        (graph.display_path(input), graph.display_path(target))
                    })
            })
            .collect();
        for (from, to) in &edges {
            writeln!(f, "  {} -> {};", quote(from), quote(to))?;
        }
        writeln!(f, "}}")
    }
}
