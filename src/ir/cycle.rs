//! Cycle detection for the task graph and the alias table.

use std::collections::HashMap;
use std::hash::Hash;

use camino::Utf8PathBuf;
use indexmap::IndexMap;

use super::graph::BuildGraph;

/// Tracks the visitation state of a node during cycle detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VisitState {
    Visiting,
    Visited,
}

/// Depth-first search with an explicit recursion stack.
///
/// `edges` yields the successors of a node; nodes are visited in the order
/// `roots` yields them so the first cycle found is deterministic.
struct CycleDetector<N, F> {
    edges: F,
    stack: Vec<N>,
    states: HashMap<N, VisitState>,
}

impl<N, F> CycleDetector<N, F>
where
    N: Clone + Eq + Hash + Ord,
    F: Fn(&N) -> Vec<N>,
{
    fn new(edges: F) -> Self {
        Self {
            edges,
            stack: Vec::new(),
            states: HashMap::new(),
        }
    }

    fn is_visited(&self, node: &N) -> bool {
        matches!(self.states.get(node), Some(VisitState::Visited))
    }

    fn visit(&mut self, node: N) -> Option<Vec<N>> {
        match self.states.get(&node) {
            Some(VisitState::Visited) => return None,
            Some(VisitState::Visiting) => {
                let idx = self
                    .stack
                    .iter()
                    .position(|n| n == &node)
                    .unwrap_or_else(|| {
                        debug_assert!(false, "visiting node must be on the stack");
                        0
                    });
                let mut cycle: Vec<N> = self.stack.iter().skip(idx).cloned().collect();
                cycle.push(node);
                return Some(canonicalize_cycle(cycle));
            }
            None => {
                self.states.insert(node.clone(), VisitState::Visiting);
            }
        }

        self.stack.push(node.clone());
        for next in (self.edges)(&node) {
            if let Some(cycle) = self.visit(next) {
                return Some(cycle);
            }
        }
        self.stack.pop();
        self.states.insert(node, VisitState::Visited);
        None
    }

    fn find<I: IntoIterator<Item = N>>(mut self, roots: I) -> Option<Vec<N>> {
        for node in roots {
            if self.is_visited(&node) {
                continue;
            }
            if let Some(found) = self.visit(node) {
                return Some(found);
            }
        }
        None
    }
}

/// Find a cycle among produced paths. A target depends on the inputs of the
/// task producing it.
pub(super) fn find_task_cycle(graph: &BuildGraph) -> Option<Vec<Utf8PathBuf>> {
    let edges = |path: &Utf8PathBuf| -> Vec<Utf8PathBuf> {
        graph
            .producer_of(path)
            .and_then(|id| graph.task(id))
            .map(|task| {
                task.inputs()
                    .filter(|input| graph.producer_of(input).is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    };
    let roots = graph
        .tasks()
        .iter()
        .flat_map(|task| task.targets.iter().cloned());
    CycleDetector::new(edges).find(roots)
}

/// Find an alias that reaches itself through other aliases.
///
/// Members for which `is_target` holds name produced files and never count
/// as edges, even when an alias shares their name.
pub(super) fn find_alias_cycle(
    aliases: &IndexMap<String, Vec<String>>,
    is_target: impl Fn(&str) -> bool,
) -> Option<Vec<String>> {
    let edges = |name: &String| -> Vec<String> {
        aliases
            .get(name)
            .into_iter()
            .flatten()
            .filter(|member| aliases.contains_key(*member) && !is_target(member.as_str()))
            .cloned()
            .collect()
    };
    CycleDetector::new(edges).find(aliases.keys().cloned())
}

/// Rotate a closed cycle so it starts at its smallest node.
fn canonicalize_cycle<N: Clone + Ord>(mut cycle: Vec<N>) -> Vec<N> {
    if cycle.len() < 2 {
        return cycle;
    }
    let len = cycle.len() - 1;
    let start = cycle
        .iter()
        .take(len)
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(idx, _)| idx);
    let (prefix, suffix) = cycle.split_at_mut(len);
    prefix.rotate_left(start);
    if let (Some(first), Some(slot)) = (prefix.first().cloned(), suffix.first_mut()) {
        slot.clone_from(&first);
    }
    cycle
}
