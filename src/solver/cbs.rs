use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::{debug, trace};

use crate::config::{Deadline, Params};
use crate::error::PlannerError;
use crate::grid::{manhattan, Edge, Position, TimedEdge, TimedPosition};
use crate::plan::Plan;
use crate::search::timed_search;
use crate::solver::hierarchical::{HighLevelPlan, RegionGrid, TravId};

/// Forbids a traversal from occupying a cell at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexConstraint {
    pub trav: TravId,
    pub at: TimedPosition,
}

/// Forbids a traversal from using an edge, in either direction, at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeConstraint {
    pub trav: TravId,
    pub at: TimedEdge,
}

#[derive(Debug, Clone, Copy)]
enum Conflict {
    Vertex {
        first: TravId,
        second: TravId,
        at: TimedPosition,
    },
    Edge {
        first: TravId,
        second: TravId,
        at: TimedEdge,
    },
}

impl Conflict {
    fn time(&self) -> usize {
        match self {
            Conflict::Vertex { at, .. } => at.t,
            Conflict::Edge { at, .. } => at.time,
        }
    }

    fn party(&self, first: bool) -> TravId {
        match (self, first) {
            (Conflict::Vertex { first, .. }, true) => *first,
            (Conflict::Vertex { second, .. }, false) => *second,
            (Conflict::Edge { first, .. }, true) => *first,
            (Conflict::Edge { second, .. }, false) => *second,
        }
    }
}

/// Constraint-tree node: inherited constraint sets and a solution holding
/// one plan per traversal of the region.
#[derive(Debug, Clone)]
struct CtNode {
    vertex: HashSet<VertexConstraint>,
    edge: HashSet<EdgeConstraint>,
    solution: Vec<Plan>,
}

impl CtNode {
    fn cost(&self) -> usize {
        self.solution.iter().map(Plan::len).sum()
    }
}

/// Heap entry. Lowest cost pops first; equal costs pop in insertion order.
struct OpenEntry {
    cost: usize,
    seq: usize,
    node: CtNode,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.seq == other.seq
    }
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Conflict-Based Search restricted to the traversals of one region, with
/// everything before `start_time` fixed. On success the deconflicted plans
/// are spliced back into their owning high-level plans and `true` is
/// returned; an exhausted tree means the scenario fails.
pub fn search_region(
    grid: &RegionGrid,
    plans: &mut [HighLevelPlan],
    travs: &[TravId],
    start_time: usize,
    params: &Params,
    deadline: &Deadline,
) -> Result<bool, PlannerError> {
    let local_index: HashMap<TravId, usize> = travs
        .iter()
        .enumerate()
        .map(|(index, &trav)| (trav, index))
        .collect();

    let root = CtNode {
        vertex: HashSet::new(),
        edge: HashSet::new(),
        solution: travs
            .iter()
            .map(|trav| plans[trav.agent].traversals[trav.index].plan.clone())
            .collect(),
    };

    let mut seq = 0;
    let mut tree = BinaryHeap::new();
    tree.push(OpenEntry {
        cost: root.cost(),
        seq,
        node: root,
    });

    while let Some(OpenEntry { node, .. }) = tree.pop() {
        deadline.check()?;

        let Some(conflict) = validate(&node, plans, travs, start_time) else {
            debug!(region_travs = travs.len(), "region deconflicted");
            for (local, trav) in travs.iter().enumerate() {
                plans[trav.agent].insert_plan(trav.index, node.solution[local].clone());
            }
            return Ok(true);
        };
        trace!(?conflict, "expanding constraint tree node");

        for first in [true, false] {
            let trav = conflict.party(first);
            let mut child = node.clone();
            match conflict {
                Conflict::Vertex { at, .. } => {
                    child.vertex.insert(VertexConstraint { trav, at });
                }
                Conflict::Edge { at, .. } => {
                    child.edge.insert(EdgeConstraint { trav, at });
                }
            }

            let local = local_index[&trav];
            let replanned = replan_traversal(
                grid,
                plans,
                &child.solution[local],
                trav,
                &child.vertex,
                &child.edge,
                conflict.time(),
                params,
                deadline,
            )?;
            let Some(replanned) = replanned else {
                continue;
            };

            child.solution[local] = replanned;
            seq += 1;
            tree.push(OpenEntry {
                cost: child.cost(),
                seq,
                node: child,
            });
        }
    }

    Ok(false)
}

/// First vertex or edge conflict between any two traversals of the region,
/// scanning from `start_time`. A goal traversal is assumed to rest at its
/// target after its plan ends; any other traversal is simply absent.
fn validate(
    node: &CtNode,
    plans: &[HighLevelPlan],
    travs: &[TravId],
    start_time: usize,
) -> Option<Conflict> {
    let last_time = node
        .solution
        .iter()
        .filter_map(|plan| plan.last().map(|step| step.t))
        .max()
        .unwrap_or(0);

    for time in start_time..last_time {
        let mut position_claims: HashMap<Position, TravId> = HashMap::new();
        let mut edge_claims: HashMap<Edge, TravId> = HashMap::new();

        for (local, &trav) in travs.iter().enumerate() {
            let plan = &node.solution[local];
            let is_goal = plans[trav.agent].traversals[trav.index].is_goal;

            let Some(position) = plan.position(time, is_goal) else {
                continue;
            };
            if let Some(&other) = position_claims.get(&position) {
                return Some(Conflict::Vertex {
                    first: other,
                    second: trav,
                    at: TimedPosition::at(position, time),
                });
            }
            position_claims.insert(position, trav);

            let Some(next) = plan.position(time + 1, false) else {
                continue;
            };
            if next == position {
                continue;
            }
            let edge = Edge::new(position, next);
            let claimant = edge_claims
                .get(&edge)
                .or_else(|| edge_claims.get(&edge.reversed()));
            if let Some(&other) = claimant {
                return Some(Conflict::Edge {
                    first: other,
                    second: trav,
                    at: TimedEdge::new(time, edge),
                });
            }
            edge_claims.insert(edge, trav);
        }
    }
    None
}

/// Replans one traversal under the child's constraints. The plan is fixed
/// up to the tick before the conflict; the remainder is searched inside
/// the region only.
#[allow(clippy::too_many_arguments)]
fn replan_traversal(
    grid: &RegionGrid,
    plans: &[HighLevelPlan],
    current: &Plan,
    trav: TravId,
    vertex: &HashSet<VertexConstraint>,
    edge: &HashSet<EdgeConstraint>,
    conflict_time: usize,
    params: &Params,
    deadline: &Deadline,
) -> Result<Option<Plan>, PlannerError> {
    let traversal = &plans[trav.agent].traversals[trav.index];
    let region = &grid.regions[traversal.region];

    let Some(plan_start) = current.start_time() else {
        return Ok(None);
    };
    // Going through the previous region faster is not an option.
    let Some(fixed_until) = conflict_time.checked_sub(1) else {
        return Ok(None);
    };
    if fixed_until < plan_start {
        return Ok(None);
    }

    let mut fixed: Vec<TimedPosition> = Vec::new();
    for time in plan_start..=fixed_until {
        let Some(position) = current.position(time, traversal.is_goal) else {
            // The traversal finished before the conflict window; nothing
            // of it can be replanned.
            return Ok(Some(current.clone()));
        };
        fixed.push(TimedPosition::at(position, time));
    }

    let start = fixed[fixed.len() - 1];
    let target = traversal.target;

    let path = timed_search(
        start,
        target,
        params.time_horizon,
        deadline,
        |from, to| {
            if vertex.contains(&VertexConstraint { trav, at: to }) {
                return false;
            }
            if from.position() == to.position() {
                return true;
            }
            region.has_edge(Edge::new(from.position(), to.position()))
                && !edge.contains(&EdgeConstraint {
                    trav,
                    at: TimedEdge::between(from, to),
                })
                && !edge.contains(&EdgeConstraint {
                    trav,
                    at: TimedEdge::new(from.t, Edge::new(to.position(), from.position())),
                })
        },
        |_| true,
        |position| Ok(manhattan(position, target)),
    )?;

    let Some(path) = path else {
        return Ok(None);
    };

    let mut plan = Plan::new(trav.agent);
    for step in fixed {
        plan.push(step);
    }
    for &step in path.iter().skip(1) {
        plan.push(step);
    }
    Ok(Some(plan))
}
