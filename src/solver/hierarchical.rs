use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use crate::config::{Deadline, Params};
use crate::error::PlannerError;
use crate::grid::{Edge, Position, TimedPosition};
use crate::map::Map;
use crate::plan::{CommonPlan, Plan};
use crate::scenario::Scenario;
use crate::search::shortest_path;
use crate::solver::cbs;
use crate::solver::Solver;

/// Identifies a traversal across node copies: the agent and the position
/// of the traversal in that agent's high-level plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TravId {
    pub agent: usize,
    pub index: usize,
}

/// An axis-aligned rectangle of the map together with the edges that start
/// and end inside it.
#[derive(Debug, Clone)]
pub struct Region {
    pub index: usize,
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
    edges: HashSet<Edge>,
}

impl Region {
    pub fn contains(&self, position: Position) -> bool {
        self.min_x <= position.x
            && self.min_y <= position.y
            && self.max_x >= position.x
            && self.max_y >= position.y
    }

    pub fn has_edge(&self, edge: Edge) -> bool {
        self.edges.contains(&edge)
    }
}

/// The map cut into regions of roughly sqrt(dimension) cells per side,
/// with the edges that straddle a region border held separately.
#[derive(Debug)]
pub struct RegionGrid {
    pub regions: Vec<Region>,
    horizontal_count: i32,
    horizontal_size: i32,
    vertical_size: i32,
    border_edges: HashSet<Edge>,
}

fn ceil_div(a: i32, b: i32) -> i32 {
    (a + b - 1) / b
}

impl RegionGrid {
    /// Partitions the map. Region borders must stay directed, so border
    /// edges that only exist as undirect copies are dropped; the returned
    /// map is the input without those edges.
    pub fn build(map: &Map) -> (RegionGrid, Map) {
        let horizontal_count = (f64::from(map.dimensions.0)).sqrt().ceil() as i32;
        let vertical_count = (f64::from(map.dimensions.1)).sqrt().ceil() as i32;
        let horizontal_size = ceil_div(map.dimensions.0, horizontal_count);
        let vertical_size = ceil_div(map.dimensions.1, vertical_count);

        let mut regions = Vec::new();
        for vertical in 0..vertical_count {
            for horizontal in 0..horizontal_count {
                regions.push(Region {
                    index: (vertical * horizontal_count + horizontal) as usize,
                    min_x: horizontal * horizontal_size,
                    min_y: vertical * vertical_size,
                    max_x: (horizontal + 1) * horizontal_size - 1,
                    max_y: (vertical + 1) * vertical_size - 1,
                    edges: HashSet::new(),
                });
            }
        }

        let mut grid = RegionGrid {
            regions,
            horizontal_count,
            horizontal_size,
            vertical_size,
            border_edges: HashSet::new(),
        };

        let mut pruned = map.clone();
        for &edge in &map.edges {
            let source = grid.region_index(edge.source);
            let target = grid.region_index(edge.target);
            if source == target {
                grid.regions[source].edges.insert(edge);
            } else if map.copies.contains(&edge) {
                // An undirect copy on a border would make the border
                // bidirectional again; it does not survive the partition.
                pruned.edges.remove(&edge);
            } else {
                grid.border_edges.insert(edge);
            }
        }

        (grid, pruned)
    }

    pub fn region_index(&self, position: Position) -> usize {
        let horizontal = position.x / self.horizontal_size;
        let vertical = position.y / self.vertical_size;
        (vertical * self.horizontal_count + horizontal) as usize
    }

    pub fn is_border_edge(&self, edge: Edge) -> bool {
        self.border_edges.contains(&edge)
    }
}

/// One pass of an agent through one region: where it enters, where it
/// leaves (or finally stops), and the plan slice covering the pass.
#[derive(Debug, Clone)]
pub struct Traversal {
    pub agent: usize,
    pub region: usize,
    pub start: Position,
    pub target: Position,
    pub start_time: usize,
    pub is_goal: bool,
    pub plan: Plan,
}

/// The ordered traversals of one agent alongside the concatenated
/// low-level plan. The low-level plan always equals its traversal plans
/// joined in order.
#[derive(Debug, Clone)]
pub struct HighLevelPlan {
    pub agent: usize,
    pub traversals: Vec<Traversal>,
    pub low_level: Plan,
}

impl HighLevelPlan {
    /// Splits a cell sequence into one traversal per region visited.
    pub fn new(grid: &RegionGrid, agent: usize, positions: &[Position]) -> Self {
        let low_level = Plan::from_positions(agent, positions, 0);
        let mut traversals = Vec::new();

        let mut region = grid.region_index(positions[0]);
        let mut slice = vec![positions[0]];
        let mut start_time = 0;

        for (index, &position) in positions.iter().enumerate().skip(1) {
            let next_region = grid.region_index(position);
            if next_region != region {
                traversals.push(Traversal {
                    agent,
                    region,
                    start: slice[0],
                    target: slice[slice.len() - 1],
                    start_time,
                    is_goal: false,
                    plan: Plan::from_positions(agent, &slice, start_time),
                });
                start_time = index;
                region = next_region;
                slice = Vec::new();
            }
            slice.push(position);
        }

        traversals.push(Traversal {
            agent,
            region,
            start: slice[0],
            target: slice[slice.len() - 1],
            start_time,
            is_goal: true,
            plan: Plan::from_positions(agent, &slice, start_time),
        });

        HighLevelPlan {
            agent,
            traversals,
            low_level,
        }
    }

    /// Replaces one traversal's plan slice inside the low-level plan and
    /// shifts every later traversal by the length difference.
    pub fn insert_plan(&mut self, trav_index: usize, new_plan: Plan) {
        let old_len = self.traversals[trav_index].plan.len();
        let delay = new_plan.len() as isize - old_len as isize;
        let preceding = new_plan.first().map(|step| step.t).unwrap_or(0);

        let mut rebuilt = Plan::new(self.agent);
        for &step in self.low_level.steps().iter().take(preceding) {
            rebuilt.push(step);
        }
        for &step in new_plan.steps() {
            rebuilt.push(step);
        }
        for &step in self.low_level.steps().iter().skip(preceding + old_len) {
            rebuilt.push(TimedPosition::at(
                step.position(),
                (step.t as isize + delay) as usize,
            ));
        }
        self.low_level = rebuilt;
        self.traversals[trav_index].plan = new_plan;

        for later in self.traversals.iter_mut().skip(trav_index + 1) {
            later.plan.delay(delay, 0);
            later.start_time = (later.start_time as isize + delay) as usize;
        }
    }
}

/// Hierarchical planning: route every agent over the region-pruned map,
/// cut the routes into per-region traversals, then sweep over time and
/// settle every conflicted region with a local Conflict-Based Search.
pub struct HierarchicalPlanner;

impl HierarchicalPlanner {
    pub fn new() -> Self {
        HierarchicalPlanner
    }

    fn makespan(plans: &[HighLevelPlan]) -> usize {
        plans.iter().map(|plan| plan.low_level.len()).max().unwrap_or(0)
    }

    /// The region in which some pair of plans collides at `time`, if any.
    fn find_conflict_region(
        grid: &RegionGrid,
        plans: &[HighLevelPlan],
        time: usize,
    ) -> Option<usize> {
        let mut positions: HashSet<Position> = HashSet::new();
        let mut edges: HashSet<Edge> = HashSet::new();

        for plan in plans {
            let Some(position) = plan.low_level.position(time, true) else {
                continue;
            };
            let Some(next) = plan.low_level.position(time + 1, true) else {
                continue;
            };

            if positions.contains(&position) || edges.contains(&Edge::new(next, position)) {
                return Some(grid.region_index(position));
            }
            positions.insert(position);
            if position != next {
                edges.insert(Edge::new(position, next));
            }
        }
        None
    }
}

impl Default for HierarchicalPlanner {
    fn default() -> Self {
        HierarchicalPlanner::new()
    }
}

impl Solver for HierarchicalPlanner {
    #[instrument(skip_all, name = "hierarchical_planner", level = "debug")]
    fn solve(
        &mut self,
        scenario: &Scenario,
        params: &Params,
        deadline: &Deadline,
    ) -> Result<Option<CommonPlan>, PlannerError> {
        let (grid, pruned) = RegionGrid::build(scenario.map());
        deadline.check()?;

        let mut plans: Vec<HighLevelPlan> = Vec::new();
        for agent in &scenario.agents {
            let goal = agent.goal().unwrap_or(agent.position);
            let Some(mut positions) =
                shortest_path(&pruned, agent.position, goal, &HashSet::new())
            else {
                debug!(agent = agent.id, "no route over the pruned map");
                return Ok(None);
            };
            positions.insert(0, agent.position);
            plans.push(HighLevelPlan::new(&grid, agent.id, &positions));
        }

        let mut region_traversals: HashMap<usize, Vec<TravId>> = HashMap::new();
        for plan in &plans {
            for (index, traversal) in plan.traversals.iter().enumerate() {
                region_traversals
                    .entry(traversal.region)
                    .or_default()
                    .push(TravId {
                        agent: plan.agent,
                        index,
                    });
            }
        }

        let mut time = 0;
        while time <= Self::makespan(&plans) {
            loop {
                deadline.check()?;
                let Some(region) = Self::find_conflict_region(&grid, &plans, time) else {
                    break;
                };
                debug!(region, time, "conflict found");

                let travs = region_traversals.get(&region).cloned().unwrap_or_default();
                let solved =
                    cbs::search_region(&grid, &mut plans, &travs, time, params, deadline)?;
                if !solved {
                    return Ok(None);
                }
            }
            time += 1;
        }

        let mut common = CommonPlan::new();
        for plan in plans {
            common.push(plan.low_level);
        }
        Ok(Some(common))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Algorithm;
    use crate::fixtures;
    use crate::validator;

    fn params() -> Params {
        Params {
            algorithm: Algorithm::EnhancedHierarchicalPlanner,
            time_horizon: 60,
            ..Params::default()
        }
    }

    #[test]
    fn region_partition_of_a_10x10_map() {
        let map = fixtures::open_grid(10, 10);
        let (grid, _) = RegionGrid::build(&map);

        // ceil(sqrt(10)) = 4 regions per row, 3 cells per side.
        assert_eq!(grid.regions.len(), 16);
        assert_eq!(grid.region_index(Position::new(0, 0)), 0);
        assert_eq!(grid.region_index(Position::new(2, 2)), 0);
        assert_eq!(grid.region_index(Position::new(3, 0)), 1);
        assert_eq!(grid.region_index(Position::new(9, 0)), 3);
        assert_eq!(grid.region_index(Position::new(0, 3)), 4);
        assert_eq!(grid.region_index(Position::new(9, 9)), 15);

        assert!(grid.regions[0].contains(Position::new(2, 2)));
        assert!(!grid.regions[0].contains(Position::new(3, 2)));
        assert!(grid.regions[0].has_edge(Edge::new(Position::new(0, 0), Position::new(1, 0))));
        assert!(!grid.regions[0].has_edge(Edge::new(Position::new(2, 0), Position::new(3, 0))));
    }

    #[test]
    fn undirect_copies_on_borders_are_pruned() {
        let mut map = fixtures::open_grid(4, 1);
        // Make the border crossing (1,0)->(2,0) one-way, then undirect.
        map.edges
            .remove(&Edge::new(Position::new(2, 0), Position::new(1, 0)));
        let undirected = map.undirected();
        let copy = Edge::new(Position::new(2, 0), Position::new(1, 0));
        assert!(undirected.copies.contains(&copy));

        let (grid, pruned) = RegionGrid::build(&undirected);
        assert!(grid.is_border_edge(Edge::new(Position::new(1, 0), Position::new(2, 0))));
        assert!(!pruned.edges.contains(&copy));
        assert!(pruned
            .edges
            .contains(&Edge::new(Position::new(1, 0), Position::new(2, 0))));
    }

    #[test]
    fn route_splits_into_one_traversal_per_region() {
        let map = fixtures::open_grid(10, 10);
        let (grid, _) = RegionGrid::build(&map);
        let positions: Vec<Position> = (0..10).map(|x| Position::new(x, 0)).collect();

        let plan = HighLevelPlan::new(&grid, 0, &positions);
        assert_eq!(plan.traversals.len(), 4);
        assert_eq!(plan.traversals[0].start, Position::new(0, 0));
        assert_eq!(plan.traversals[0].target, Position::new(2, 0));
        assert_eq!(plan.traversals[1].start_time, 3);
        assert!(plan.traversals[3].is_goal);
        assert_eq!(plan.traversals[3].target, Position::new(9, 0));
        assert_eq!(plan.low_level.len(), 10);
    }

    #[test]
    fn insert_plan_splices_and_delays() {
        let map = fixtures::open_grid(10, 10);
        let (grid, _) = RegionGrid::build(&map);
        let positions: Vec<Position> = (0..10).map(|x| Position::new(x, 0)).collect();
        let mut plan = HighLevelPlan::new(&grid, 0, &positions);

        // Replace the second traversal (cells x=3..5) by one with a wait.
        let replacement = Plan::from_positions(
            0,
            &[
                Position::new(3, 0),
                Position::new(3, 0),
                Position::new(4, 0),
                Position::new(5, 0),
            ],
            3,
        );
        plan.insert_plan(1, replacement);

        assert_eq!(plan.low_level.len(), 11);
        assert_eq!(plan.low_level.steps()[4], TimedPosition::new(3, 0, 4));
        assert_eq!(plan.low_level.steps()[10], TimedPosition::new(9, 0, 10));
        assert_eq!(plan.traversals[2].start_time, 8);
        assert_eq!(plan.traversals[2].plan.first(), Some(TimedPosition::new(6, 0, 8)));

        // The low-level plan still concatenates the traversal plans.
        for (tick, step) in plan.low_level.steps().iter().enumerate() {
            assert_eq!(step.t, tick);
        }
    }

    #[test]
    fn lone_agent_crosses_four_regions() {
        let scenario =
            fixtures::classic_scenario(fixtures::open_grid(10, 10), &[((0, 0), (9, 0))]);
        let common = HierarchicalPlanner::new()
            .solve(&scenario, &params(), &Deadline::none())
            .unwrap()
            .unwrap();

        assert_eq!(common.makespan(), 10);
        validator::validate_classic(&scenario, &common).unwrap();
    }

    #[test]
    fn two_agents_deconflicted_inside_one_region() {
        let scenario = fixtures::classic_scenario(
            fixtures::open_grid(10, 10),
            &[((0, 1), (2, 1)), ((2, 1), (0, 1))],
        );
        let common = HierarchicalPlanner::new()
            .solve(&scenario, &params(), &Deadline::none())
            .unwrap()
            .unwrap();

        validator::validate_classic(&scenario, &common).unwrap();
    }

    #[test]
    fn crossing_agents_in_adjacent_regions() {
        let scenario = fixtures::classic_scenario(
            fixtures::open_grid(10, 10),
            &[((0, 0), (5, 0)), ((5, 1), (0, 1))],
        );
        let common = HierarchicalPlanner::new()
            .solve(&scenario, &params(), &Deadline::none())
            .unwrap()
            .unwrap();

        validator::validate_classic(&scenario, &common).unwrap();
    }
}
