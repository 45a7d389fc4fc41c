use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::Deadline;
use crate::error::PlannerError;
use crate::grid::{manhattan, Position, TimedEdge, TimedPosition};
use crate::map::MapManager;

/// Node of the alternating search. The state stores its time modulo twice
/// the direction change frequency; `g` is the real accumulated cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AltNode {
    f: usize,
    g: usize,
    state: TimedPosition,
}

impl Ord for AltNode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.f
            .cmp(&other.f)
            .then_with(|| self.g.cmp(&other.g))
            .then_with(|| self.state.cmp(&other.state))
    }
}

impl PartialOrd for AltNode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Single-agent A* over a map whose edge directions alternate every `f`
/// ticks. After `2f` ticks the edge situation repeats, so two states with
/// the same cell and time stamps equal modulo `2f` are interchangeable and
/// the search space collapses to `|cells| * 2f` states. Waiting is always
/// possible. With `f == 0` the modulus degenerates to 1 and the search is a
/// plain untimed A* on the directed graph.
///
/// Returns the cell sequence excluding the start cell.
pub fn alternating_search(
    manager: &MapManager,
    start: Position,
    goal: Position,
    start_time: usize,
    deadline: &Deadline,
) -> Result<Option<Vec<Position>>, PlannerError> {
    let modulo = (manager.direction_change_frequency * 2).max(1);

    let mut open = BTreeSet::new();
    let mut best: HashMap<TimedPosition, AltNode> = HashMap::new();
    let mut closed: HashSet<TimedPosition> = HashSet::new();
    let mut predecessors: HashMap<TimedPosition, TimedPosition> = HashMap::new();

    let root = AltNode {
        f: start_time + manhattan(start, goal),
        g: start_time,
        state: TimedPosition::at(start, start_time % modulo),
    };
    open.insert(root);
    best.insert(root.state, root);

    while let Some(current) = open.pop_first() {
        deadline.check()?;
        best.remove(&current.state);

        if current.state.position() == goal {
            return Ok(Some(reconstruct(current.state, &predecessors)));
        }
        closed.insert(current.state);

        let next_state_time = (current.g + 1) % modulo;
        let here = current.state;

        let mut candidates: Vec<TimedPosition> = here
            .position()
            .neighbours()
            .into_iter()
            .filter(|&cell| {
                manager.passage_permitted(TimedEdge::between(
                    here,
                    TimedPosition::at(cell, here.t + 1),
                ))
            })
            .map(|cell| TimedPosition::at(cell, next_state_time))
            .collect();
        // Waiting in place is never blocked by an edge direction.
        candidates.push(TimedPosition::at(here.position(), next_state_time));

        for state in candidates {
            if closed.contains(&state) {
                continue;
            }
            let node = AltNode {
                f: current.g + 1 + manhattan(state.position(), goal),
                g: current.g + 1,
                state,
            };
            match best.get(&state) {
                None => {
                    open.insert(node);
                    best.insert(state, node);
                    predecessors.insert(state, here);
                }
                Some(&present) if present.g > node.g => {
                    open.remove(&present);
                    open.insert(node);
                    best.insert(state, node);
                    predecessors.insert(state, here);
                }
                Some(_) => {}
            }
        }
    }

    Ok(None)
}

fn reconstruct(
    goal: TimedPosition,
    predecessors: &HashMap<TimedPosition, TimedPosition>,
) -> Vec<Position> {
    let mut path = vec![goal.position()];
    let mut current = goal;
    while let Some(&previous) = predecessors.get(&current) {
        path.push(previous.position());
        current = previous;
    }
    path.pop();
    path.reverse();
    path
}
