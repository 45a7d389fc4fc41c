use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::Deadline;
use crate::error::PlannerError;
use crate::grid::{Position, TimedPosition};

/// Open node of the space-time search. The ordering is the whole
/// tie-breaking policy: f-score first, then time, then cell, which keeps
/// results reproducible across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OpenNode {
    f: usize,
    t: usize,
    position: Position,
}

/// Space-time A* over the 4-connected grid with waiting. Every action costs
/// one tick. The caller supplies what varies between the planners:
///
/// * `legal` decides whether the step `from -> to` may be taken; a wait is
///   the case where both cells coincide.
/// * `accept` is the extra condition on popping a goal node (Cooperative A*
///   requires the goal cell to be free forever, CBS does not).
/// * `heuristic` estimates remaining cost from a cell and may fault, which
///   the true-distance oracle uses to report lookups outside its tables.
///
/// Returns the full path including the start entry. The search fails as a
/// whole as soon as any legal successor would pass the time horizon.
pub fn timed_search<L, G, H>(
    start: TimedPosition,
    goal: Position,
    horizon: usize,
    deadline: &Deadline,
    mut legal: L,
    mut accept: G,
    mut heuristic: H,
) -> Result<Option<Vec<TimedPosition>>, PlannerError>
where
    L: FnMut(TimedPosition, TimedPosition) -> bool,
    G: FnMut(TimedPosition) -> bool,
    H: FnMut(Position) -> Result<usize, PlannerError>,
{
    let mut open = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut predecessors: HashMap<TimedPosition, TimedPosition> = HashMap::new();

    visited.insert(start);
    open.insert(OpenNode {
        f: start.t + heuristic(start.position())?,
        t: start.t,
        position: start.position(),
    });

    while let Some(current) = open.pop_first() {
        deadline.check()?;

        let here = TimedPosition::at(current.position, current.t);
        if current.position == goal && accept(here) {
            return Ok(Some(reconstruct(here, &predecessors)));
        }

        for candidate in successors(here) {
            if !legal(here, candidate) {
                continue;
            }
            if candidate.t > horizon {
                return Ok(None);
            }
            if visited.insert(candidate) {
                predecessors.insert(candidate, here);
                open.insert(OpenNode {
                    f: candidate.t + heuristic(candidate.position())?,
                    t: candidate.t,
                    position: candidate.position(),
                });
            }
        }
    }

    Ok(None)
}

/// The four orthogonal moves plus waiting in place, one tick later.
fn successors(here: TimedPosition) -> [TimedPosition; 5] {
    let t = here.t + 1;
    [
        TimedPosition::new(here.x + 1, here.y, t),
        TimedPosition::new(here.x - 1, here.y, t),
        TimedPosition::new(here.x, here.y + 1, t),
        TimedPosition::new(here.x, here.y - 1, t),
        TimedPosition::new(here.x, here.y, t),
    ]
}

fn reconstruct(
    goal: TimedPosition,
    predecessors: &HashMap<TimedPosition, TimedPosition>,
) -> Vec<TimedPosition> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&previous) = predecessors.get(&current) {
        path.push(previous);
        current = previous;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::grid::{manhattan, Edge, TimedEdge};
    use crate::map::MapManager;

    fn search_open_grid(
        manager: &MapManager,
        start: TimedPosition,
        goal: Position,
        horizon: usize,
    ) -> Option<Vec<TimedPosition>> {
        timed_search(
            start,
            goal,
            horizon,
            &Deadline::none(),
            |from, to| {
                from.position() == to.position()
                    || manager.passage_permitted(TimedEdge::between(from, to))
            },
            |_| true,
            |position| Ok(manhattan(position, goal)),
        )
        .unwrap()
    }

    #[test]
    fn straight_line_on_open_grid() {
        let manager = MapManager::new(fixtures::open_grid(5, 5), 0);
        let path = search_open_grid(
            &manager,
            TimedPosition::new(0, 0, 0),
            Position::new(4, 4),
            100,
        )
        .unwrap();

        assert_eq!(path.len(), 9);
        assert_eq!(path[0], TimedPosition::new(0, 0, 0));
        assert_eq!(path[8], TimedPosition::new(4, 4, 8));
        for (tick, step) in path.iter().enumerate() {
            assert_eq!(step.t, tick);
        }
    }

    #[test]
    fn fails_when_horizon_too_tight() {
        let manager = MapManager::new(fixtures::open_grid(5, 5), 0);
        let result = search_open_grid(
            &manager,
            TimedPosition::new(0, 0, 0),
            Position::new(4, 4),
            3,
        );
        assert!(result.is_none());
    }

    #[test]
    fn zero_horizon_with_start_on_goal() {
        let manager = MapManager::new(fixtures::open_grid(2, 2), 0);
        let path = search_open_grid(
            &manager,
            TimedPosition::new(0, 0, 0),
            Position::new(0, 0),
            0,
        )
        .unwrap();
        assert_eq!(path, vec![TimedPosition::new(0, 0, 0)]);
    }

    #[test]
    fn legality_predicate_forces_a_detour() {
        let manager = MapManager::new(fixtures::open_grid(3, 1), 0);
        let blocked = TimedPosition::new(1, 0, 1);

        let path = timed_search(
            TimedPosition::new(0, 0, 0),
            Position::new(2, 0),
            10,
            &Deadline::none(),
            |from, to| {
                if to == blocked {
                    return false;
                }
                from.position() == to.position()
                    || manager.passage_permitted(TimedEdge::between(from, to))
            },
            |_| true,
            |position| Ok(manhattan(position, Position::new(2, 0))),
        )
        .unwrap()
        .unwrap();

        // One wait at the start, then the two moves.
        assert_eq!(path.len(), 4);
        assert_eq!(path[1], TimedPosition::new(0, 0, 1));
        assert_eq!(path[3], TimedPosition::new(2, 0, 3));
    }

    #[test]
    fn respects_directed_edges() {
        let mut map = fixtures::open_grid(2, 1);
        map.edges.remove(&Edge::new(Position::new(0, 0), Position::new(1, 0)));
        let manager = MapManager::new(map, 0);

        let result = search_open_grid(
            &manager,
            TimedPosition::new(0, 0, 0),
            Position::new(1, 0),
            10,
        );
        assert!(result.is_none());
    }
}
