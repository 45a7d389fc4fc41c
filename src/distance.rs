use std::collections::{HashMap, VecDeque};

use crate::config::Deadline;
use crate::error::PlannerError;
use crate::grid::{Edge, Position};
use crate::map::Map;

/// Precomputed shortest-path distances from every cell to a set of
/// endpoints, following the directed edges. Computed once per scenario by a
/// breadth-first sweep of the reversed edge graph per endpoint; cells from
/// which an endpoint is unreachable have no entry for it.
#[derive(Debug, Clone, Default)]
pub struct DistanceTable {
    distances: HashMap<(Position, Position), usize>,
}

impl DistanceTable {
    pub fn compute<I>(map: &Map, endpoints: I, deadline: &Deadline) -> Result<Self, PlannerError>
    where
        I: IntoIterator<Item = Position>,
    {
        let mut table = DistanceTable::default();
        for endpoint in endpoints {
            deadline.check()?;
            table.sweep(map, endpoint);
        }
        Ok(table)
    }

    fn sweep(&mut self, map: &Map, endpoint: Position) {
        let mut queue = VecDeque::new();
        queue.push_back(endpoint);
        self.distances.insert((endpoint, endpoint), 0);

        while let Some(current) = queue.pop_front() {
            let distance = self.distances[&(current, endpoint)];
            for candidate in current.neighbours() {
                // A predecessor is any cell with an edge into the current one.
                if !map.has_edge(Edge::new(candidate, current)) {
                    continue;
                }
                if self.distances.contains_key(&(candidate, endpoint)) {
                    continue;
                }
                self.distances.insert((candidate, endpoint), distance + 1);
                queue.push_back(candidate);
            }
        }
    }

    /// True distance from `from` to `endpoint`. Asking about a pair the
    /// sweep never reached is a programming error and surfaces as a
    /// distinct fault.
    pub fn distance(&self, from: Position, endpoint: Position) -> Result<usize, PlannerError> {
        self.distances
            .get(&(from, endpoint))
            .copied()
            .ok_or(PlannerError::DistanceTableMiss(from))
    }

    pub fn contains(&self, from: Position, endpoint: Position) -> bool {
        self.distances.contains_key(&(from, endpoint))
    }
}
