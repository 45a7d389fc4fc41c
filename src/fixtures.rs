//! Hand-built maps and scenarios shared by the unit tests.

use std::collections::HashSet;

use crate::grid::{Edge, Position};
use crate::map::Map;
use crate::scenario::{Agent, Scenario, Task};

/// A fully open `width` x `height` grid: every orthogonal neighbour pair is
/// connected by edges in both directions, no obstacles.
pub(crate) fn open_grid(width: i32, height: i32) -> Map {
    let mut edges = HashSet::new();
    for x in 0..width {
        for y in 0..height {
            let here = Position::new(x, y);
            for there in here.neighbours() {
                if (0..width).contains(&there.x) && (0..height).contains(&there.y) {
                    edges.insert(Edge::new(here, there));
                }
            }
        }
    }
    Map::new(edges, (width, height), HashSet::new(), HashSet::new())
}

fn edge(from: (i32, i32), to: (i32, i32)) -> Edge {
    Edge::new(Position::new(from.0, from.1), Position::new(to.0, to.1))
}

fn both_ways(edges: &mut HashSet<Edge>, a: (i32, i32), b: (i32, i32)) {
    edges.insert(edge(a, b));
    edges.insert(edge(b, a));
}

/// A 9x5 maze of one-way passages: 32 directed edges, 21 free cells and 24
/// obstacle cells. Reaching (2,1) from the adjacent (1,1) requires the full
/// loop (cost 5); (7,1) from (7,3) costs 6; (1,3) from (5,2) costs 7.
pub(crate) fn maze_9x5() -> Map {
    let mut edges = HashSet::new();

    // One-way loop through the lower-left block.
    edges.insert(edge((1, 1), (1, 2)));
    edges.insert(edge((1, 2), (2, 2)));
    edges.insert(edge((2, 2), (3, 2)));
    edges.insert(edge((3, 2), (3, 1)));
    edges.insert(edge((3, 1), (2, 1)));
    edges.insert(edge((2, 1), (1, 1)));

    // Feeder corridor into the loop.
    edges.insert(edge((5, 2), (4, 2)));
    edges.insert(edge((4, 2), (3, 2)));
    edges.insert(edge((4, 2), (5, 2)));
    edges.insert(edge((3, 2), (4, 2)));

    // Dead-end branch off the loop.
    edges.insert(edge((1, 2), (1, 3)));
    edges.insert(edge((1, 3), (1, 2)));

    // One-way ring around the right-hand block.
    edges.insert(edge((7, 1), (7, 2)));
    edges.insert(edge((7, 2), (7, 3)));
    edges.insert(edge((7, 3), (8, 3)));
    edges.insert(edge((8, 3), (8, 2)));
    edges.insert(edge((8, 2), (8, 1)));
    edges.insert(edge((8, 1), (8, 0)));
    edges.insert(edge((8, 0), (7, 0)));
    edges.insert(edge((7, 0), (7, 1)));
    edges.insert(edge((8, 0), (8, 1)));
    edges.insert(edge((7, 0), (8, 0)));
    edges.insert(edge((7, 1), (7, 0)));
    edges.insert(edge((8, 1), (8, 2)));

    // Detached service square.
    both_ways(&mut edges, (5, 0), (6, 0));
    both_ways(&mut edges, (5, 1), (6, 1));
    both_ways(&mut edges, (5, 0), (5, 1));
    both_ways(&mut edges, (6, 0), (6, 1));

    let free: HashSet<Position> = edges
        .iter()
        .flat_map(|edge| [edge.source, edge.target])
        .collect();

    let mut obstacles = HashSet::new();
    for x in 0..9 {
        for y in 0..5 {
            let cell = Position::new(x, y);
            if !free.contains(&cell) {
                obstacles.insert(cell);
            }
        }
    }

    Map::new(edges, (9, 5), obstacles, HashSet::new())
}

/// A 3x3 grid with (1,0) and (1,2) blocked. Two agents heading through the
/// centre are forced into a head-on encounter on the middle row.
pub(crate) fn head_on_3x3() -> Map {
    let mut edges = HashSet::new();
    both_ways(&mut edges, (0, 0), (0, 1));
    both_ways(&mut edges, (0, 1), (0, 2));
    both_ways(&mut edges, (0, 1), (1, 1));
    both_ways(&mut edges, (1, 1), (2, 1));
    both_ways(&mut edges, (2, 1), (2, 0));
    both_ways(&mut edges, (2, 1), (2, 2));

    let obstacles = [Position::new(1, 0), Position::new(1, 2)]
        .into_iter()
        .collect();

    Map::new(edges, (3, 3), obstacles, HashSet::new())
}

/// A classic scenario: one single-goal task per agent.
pub(crate) fn classic_scenario(map: Map, routes: &[((i32, i32), (i32, i32))]) -> Scenario {
    let mut agents = Vec::new();
    let mut tasks = Vec::new();
    for (id, &(start, goal)) in routes.iter().enumerate() {
        let task = Task::new(id, vec![Position::new(goal.0, goal.1)], 0);
        tasks.push(task.clone());
        agents.push(Agent::new(
            id,
            format!("agent{id}"),
            Position::new(start.0, start.1),
            Some(task),
        ));
    }
    Scenario::new(map, agents, tasks, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maze_has_expected_shape() {
        let map = maze_9x5();
        assert_eq!(map.edges.len(), 32);
        assert_eq!(map.obstacles.len(), 24);
        assert!(map.has_edge(edge((3, 1), (2, 1))));
        assert!(map.obstacles.contains(&Position::new(4, 4)));
    }

    #[test]
    fn open_grid_edge_count() {
        // 2 * (w-1) * h horizontal plus 2 * w * (h-1) vertical edges.
        let map = open_grid(5, 5);
        assert_eq!(map.edges.len(), 2 * 4 * 5 + 2 * 5 * 4);
    }
}
