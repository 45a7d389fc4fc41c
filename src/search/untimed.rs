use std::collections::{BTreeSet, HashMap, HashSet};

use crate::grid::{manhattan, Edge, Position};
use crate::map::Map;

/// Open node of the untimed search. Ordered by f-score, preferring deeper
/// nodes on ties, with the cell as the final deterministic key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f: usize,
    g: usize,
    position: Position,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.f
            .cmp(&other.f)
            .then_with(|| self.g.cmp(&other.g).reverse())
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Plain A* along the directed edges, no waiting, Manhattan heuristic.
/// Cells in `forbidden` may not appear on the path. Returns the cell
/// sequence excluding the start, or `None` if the goal is unreachable.
pub fn shortest_path(
    map: &Map,
    start: Position,
    goal: Position,
    forbidden: &HashSet<Position>,
) -> Option<Vec<Position>> {
    if forbidden.contains(&start) || forbidden.contains(&goal) {
        return None;
    }

    let mut open = BTreeSet::new();
    let mut best: HashMap<Position, OpenNode> = HashMap::new();
    let mut closed = HashSet::new();
    let mut predecessors: HashMap<Position, Position> = HashMap::new();

    let root = OpenNode {
        f: manhattan(start, goal),
        g: 0,
        position: start,
    };
    open.insert(root);
    best.insert(start, root);

    while let Some(current) = open.pop_first() {
        best.remove(&current.position);

        if current.position == goal {
            return Some(reconstruct(current.position, &predecessors));
        }
        closed.insert(current.position);

        for candidate in current.position.neighbours() {
            if closed.contains(&candidate)
                || forbidden.contains(&candidate)
                || !map.has_edge(Edge::new(current.position, candidate))
            {
                continue;
            }

            let node = OpenNode {
                f: current.g + 1 + manhattan(candidate, goal),
                g: current.g + 1,
                position: candidate,
            };
            match best.get(&candidate) {
                None => {
                    open.insert(node);
                    best.insert(candidate, node);
                    predecessors.insert(candidate, current.position);
                }
                Some(&present) if present.g > node.g => {
                    open.remove(&present);
                    open.insert(node);
                    best.insert(candidate, node);
                    predecessors.insert(candidate, current.position);
                }
                Some(_) => {}
            }
        }
    }

    None
}

/// Cost of the shortest path from `start` to `goal`, or `None` if the goal
/// is unreachable. This is the true-distance value for a single pair.
pub fn min_cost(map: &Map, start: Position, goal: Position) -> Option<usize> {
    let mut open = BTreeSet::new();
    let mut best: HashMap<Position, OpenNode> = HashMap::new();
    let mut closed = HashSet::new();

    let root = OpenNode {
        f: manhattan(start, goal),
        g: 0,
        position: start,
    };
    open.insert(root);
    best.insert(start, root);

    while let Some(current) = open.pop_first() {
        best.remove(&current.position);

        if current.position == goal {
            return Some(current.g);
        }
        closed.insert(current.position);

        for candidate in current.position.neighbours() {
            if closed.contains(&candidate) || !map.has_edge(Edge::new(current.position, candidate))
            {
                continue;
            }

            let node = OpenNode {
                f: current.g + 1 + manhattan(candidate, goal),
                g: current.g + 1,
                position: candidate,
            };
            match best.get(&candidate) {
                None => {
                    open.insert(node);
                    best.insert(candidate, node);
                }
                Some(&present) if present.g > node.g => {
                    open.remove(&present);
                    open.insert(node);
                    best.insert(candidate, node);
                }
                Some(_) => {}
            }
        }
    }

    None
}

/// The path is rebuilt backwards from the goal; the start cell is dropped
/// because it is already part of whatever plan the caller extends.
fn reconstruct(goal: Position, predecessors: &HashMap<Position, Position>) -> Vec<Position> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&previous) = predecessors.get(&current) {
        path.push(previous);
        current = previous;
    }
    path.pop();
    path.reverse();
    path
}
