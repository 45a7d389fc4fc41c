use std::collections::HashSet;

use crate::grid::{Edge, Position, TimedEdge};

/// A map is a set of directed edges plus obstacle cells that may never be
/// entered and optional parking cells for idle agents. An undirected
/// passage is modelled as two edges, one per direction.
#[derive(Debug, Clone, Default)]
pub struct Map {
    pub edges: HashSet<Edge>,
    pub dimensions: (i32, i32),
    pub obstacles: HashSet<Position>,
    pub parking: HashSet<Position>,
    /// Reverse edges added by `undirected`. The region layer removes these
    /// again where they would straddle a region border.
    pub copies: HashSet<Edge>,
}

impl Map {
    pub fn new(
        edges: HashSet<Edge>,
        dimensions: (i32, i32),
        obstacles: HashSet<Position>,
        parking: HashSet<Position>,
    ) -> Self {
        Map {
            edges,
            dimensions,
            obstacles,
            parking,
            copies: HashSet::new(),
        }
    }

    pub fn has_edge(&self, edge: Edge) -> bool {
        self.edges.contains(&edge)
    }

    /// Adds, for every edge, its reverse if absent. Added reverses are
    /// remembered in `copies`. Undirecting twice changes nothing.
    pub fn undirected(&self) -> Map {
        let mut result = self.clone();
        for edge in &self.edges {
            let reverse = edge.reversed();
            if result.edges.insert(reverse) {
                result.copies.insert(reverse);
            }
        }
        result
    }
}

/// Wraps a map and answers whether a directed edge may be passed at a given
/// time. With `direction_change_frequency == 0` the edge set is static and
/// membership is the whole answer. Otherwise the legal direction of each
/// edge alternates: it flips globally every `f` ticks, every `f` columns
/// (or rows) along the edge's axis, and between adjacent rows (or columns).
/// Each unmet criterion inverts the direction once, so the criteria are
/// summed and only the parity of the sum matters.
#[derive(Debug, Clone)]
pub struct MapManager {
    pub map: Map,
    pub direction_change_frequency: usize,
}

impl MapManager {
    pub fn new(map: Map, direction_change_frequency: usize) -> Self {
        MapManager {
            map,
            direction_change_frequency,
        }
    }

    pub fn is_static(&self) -> bool {
        self.direction_change_frequency == 0
    }

    pub fn passage_permitted(&self, timed_edge: TimedEdge) -> bool {
        let edge = timed_edge.edge;

        if !self.map.edges.contains(&edge) {
            return false;
        }
        if self.is_static() {
            return true;
        }

        let f = self.direction_change_frequency as i64;
        let timeframe = timed_edge.time as i64 / f;

        if edge.is_horizontal() {
            let section = i64::from(edge.source.x.min(edge.target.x)) / f;
            let row = i64::from(edge.source.y);
            let rightwards = i64::from(edge.source.x < edge.target.x);
            (timeframe + section + row + rightwards) & 1 == 1
        } else {
            let section = i64::from(edge.source.y.min(edge.target.y)) / f;
            let column = i64::from(edge.source.x);
            let upwards = i64::from(edge.source.y < edge.target.y);
            (timeframe + section + column + upwards) & 1 == 0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::grid::TimedPosition;

    fn timed(from: (i32, i32), to: (i32, i32), t: usize) -> TimedEdge {
        TimedEdge::between(
            TimedPosition::new(from.0, from.1, t),
            TimedPosition::new(to.0, to.1, t + 1),
        )
    }

    #[test]
    fn static_map_is_pure_membership() {
        let map = fixtures::open_grid(3, 3);
        let manager = MapManager::new(map, 0);

        assert!(manager.passage_permitted(timed((0, 0), (1, 0), 0)));
        assert!(manager.passage_permitted(timed((0, 0), (1, 0), 99)));
        assert!(!manager.passage_permitted(timed((0, 0), (2, 0), 0)));
    }

    #[test]
    fn alternating_map_flips_every_frequency_ticks() {
        let map = fixtures::open_grid(10, 10);
        let manager = MapManager::new(map, 2);

        // (0,0) -> (1,0): section 0, row 0, rightwards 1.
        assert!(manager.passage_permitted(timed((0, 0), (1, 0), 0)));
        assert!(manager.passage_permitted(timed((0, 0), (1, 0), 1)));
        assert!(!manager.passage_permitted(timed((0, 0), (1, 0), 2)));
        assert!(!manager.passage_permitted(timed((0, 0), (1, 0), 3)));
        assert!(manager.passage_permitted(timed((0, 0), (1, 0), 4)));

        // The reverse direction holds exactly when the forward one is shut.
        assert!(!manager.passage_permitted(timed((1, 0), (0, 0), 0)));
        assert!(manager.passage_permitted(timed((1, 0), (0, 0), 2)));
    }

    #[test]
    fn alternating_map_checkerboards_between_rows() {
        let map = fixtures::open_grid(10, 10);
        let manager = MapManager::new(map, 2);

        assert!(manager.passage_permitted(timed((0, 0), (1, 0), 0)));
        assert!(!manager.passage_permitted(timed((0, 1), (1, 1), 0)));
        assert!(manager.passage_permitted(timed((0, 2), (1, 2), 0)));
    }

    #[test]
    fn vertical_edges_use_opposite_phase() {
        let map = fixtures::open_grid(10, 10);
        let manager = MapManager::new(map, 2);

        // (0,1) -> (0,0): section 0, column 0, upwards 0 => sum even.
        assert!(manager.passage_permitted(timed((0, 1), (0, 0), 0)));
        assert!(!manager.passage_permitted(timed((0, 0), (0, 1), 0)));
        assert!(manager.passage_permitted(timed((0, 0), (0, 1), 2)));
    }

    #[test]
    fn undirect_adds_marked_reverses_and_is_idempotent() {
        let mut edges = HashSet::new();
        let forward = Edge::new(Position::new(0, 0), Position::new(1, 0));
        edges.insert(forward);

        let map = Map::new(edges, (2, 1), HashSet::new(), HashSet::new());
        let undirected = map.undirected();

        assert_eq!(undirected.edges.len(), 2);
        assert!(undirected.copies.contains(&forward.reversed()));
        assert!(!undirected.copies.contains(&forward));

        let twice = undirected.undirected();
        assert_eq!(twice.edges, undirected.edges);
        assert_eq!(twice.copies, undirected.copies);
    }
}
