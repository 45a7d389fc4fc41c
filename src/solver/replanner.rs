use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, instrument};

use crate::config::{Deadline, Params};
use crate::error::PlannerError;
use crate::grid::{manhattan, Edge, Position, TimedEdge, TimedPosition};
use crate::plan::{CommonPlan, Plan};
use crate::scenario::Scenario;
use crate::search::{alternating_search, shortest_path};
use crate::solver::Solver;

/// A tentative claim for the next tick: a cell, or an undirected edge.
/// Edge claims are commutative on their endpoints, so a claim on one
/// direction blocks the swap in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Claim {
    Position(Position),
    Edge(Position, Position),
}

impl Claim {
    pub fn edge(a: Position, b: Position) -> Claim {
        if a <= b {
            Claim::Edge(a, b)
        } else {
            Claim::Edge(b, a)
        }
    }
}

/// Claims of a single tick, with constant-time lookup by claim and removal
/// by agent.
#[derive(Debug, Default)]
pub struct ClaimContainer {
    claims: HashSet<Claim>,
    by_agent: HashMap<usize, (Option<Claim>, Option<Claim>)>,
}

impl ClaimContainer {
    pub fn new() -> Self {
        ClaimContainer::default()
    }

    pub fn contains(&self, claim: Claim) -> bool {
        self.claims.contains(&claim)
    }

    pub fn no_claims_on(&self, position: Claim, edge: Option<Claim>) -> bool {
        !self.claims.contains(&position) && edge.is_none_or(|edge| !self.claims.contains(&edge))
    }

    pub fn add_claims(&mut self, agent: usize, position: Option<Claim>, edge: Option<Claim>) {
        self.remove_claims(agent);
        self.by_agent.insert(agent, (position, edge));
        if let Some(position) = position {
            self.claims.insert(position);
        }
        if let Some(edge) = edge {
            self.claims.insert(edge);
        }
    }

    pub fn remove_claims(&mut self, agent: usize) {
        if let Some((position, edge)) = self.by_agent.remove(&agent) {
            if let Some(position) = position {
                self.claims.remove(&position);
            }
            if let Some(edge) = edge {
                self.claims.remove(&edge);
            }
        }
    }
}

/// Per-tick claim-based coordination. Every agent first plans alone; at
/// each tick the agents announce their next action in order, backtracking
/// over alternatives when claims collide. Agents pushed off their plan are
/// replanned from where they actually ended up. The alternating variant
/// uses the modulo-2f search on maps whose edge directions flip over time.
pub struct RuntimeReplanner<R: Rng> {
    rng: R,
    alternating: bool,
}

impl<R: Rng> RuntimeReplanner<R> {
    pub fn new(rng: R, alternating: bool) -> Self {
        RuntimeReplanner { rng, alternating }
    }

    fn goal_of(scenario: &Scenario, agent: usize) -> Position {
        scenario.agents[agent]
            .goal()
            .unwrap_or(scenario.agents[agent].position)
    }

    /// A path for one agent that ignores everyone else, or `None` when the
    /// agent cannot reach its goal even alone.
    fn solo_path(
        &self,
        scenario: &Scenario,
        start: Position,
        goal: Position,
        start_time: usize,
        deadline: &Deadline,
    ) -> Result<Option<Vec<Position>>, PlannerError> {
        if self.alternating {
            alternating_search(&scenario.map_manager, start, goal, start_time, deadline)
        } else {
            Ok(shortest_path(scenario.map(), start, goal, &HashSet::new()))
        }
    }

    fn independent_plans(
        &self,
        scenario: &Scenario,
        deadline: &Deadline,
    ) -> Result<Option<CommonPlan>, PlannerError> {
        let mut plans = CommonPlan::new();
        for agent in &scenario.agents {
            let goal = Self::goal_of(scenario, agent.id);
            let Some(mut positions) = self.solo_path(scenario, agent.position, goal, 0, deadline)?
            else {
                return Ok(None);
            };
            positions.insert(0, agent.position);
            plans.push(Plan::from_positions(agent.id, &positions, 0));
        }
        Ok(Some(plans))
    }

    fn all_goals_reached(scenario: &Scenario, plans: &CommonPlan, time: usize) -> bool {
        plans.plans().iter().all(|plan| {
            plan.position(time, true) == Some(Self::goal_of(scenario, plan.agent))
        })
    }

    /// Cells the agent could move to instead of its planned step, closest
    /// to its goal first; waiting in place is appended as the last resort.
    fn alternatives(
        scenario: &Scenario,
        position_now: Position,
        time: usize,
        claims: &ClaimContainer,
        goal: Position,
    ) -> Vec<Position> {
        let mut options: Vec<Position> = position_now
            .neighbours()
            .into_iter()
            .filter(|&candidate| {
                scenario
                    .map_manager
                    .passage_permitted(TimedEdge::new(time, Edge::new(position_now, candidate)))
                    && !claims.contains(Claim::Position(candidate))
                    && !claims.contains(Claim::edge(position_now, candidate))
            })
            .collect();
        options.sort_by_key(|&candidate| manhattan(candidate, goal));

        if !claims.contains(Claim::Position(position_now)) {
            options.push(position_now);
        }
        options
    }

    /// Depth-first assignment of one action per agent for this tick.
    /// Returns the agent that could not act at all, or `None` on success;
    /// realized next cells land in `locations`.
    fn step(
        scenario: &Scenario,
        plans: &CommonPlan,
        order: &[usize],
        time: usize,
        order_index: usize,
        claims: &mut ClaimContainer,
        locations: &mut [Option<Position>],
        deadline: &Deadline,
    ) -> Result<Option<usize>, PlannerError> {
        deadline.check()?;

        let agent = order[order_index];
        let Some(plan) = plans.plan_by_agent(agent) else {
            return Ok(Some(agent));
        };
        let (Some(position_now), Some(position_next)) =
            (plan.position(time, true), plan.position(time + 1, true))
        else {
            return Ok(Some(agent));
        };

        let mut incapable = agent;

        let claim_pos = Claim::Position(position_next);
        let claim_edge =
            (position_now != position_next).then(|| Claim::edge(position_now, position_next));

        if claims.no_claims_on(claim_pos, claim_edge) {
            claims.add_claims(agent, Some(claim_pos), claim_edge);
            locations[agent] = Some(position_next);

            if order_index + 1 == order.len() {
                return Ok(None);
            }
            match Self::step(
                scenario,
                plans,
                order,
                time,
                order_index + 1,
                claims,
                locations,
                deadline,
            )? {
                None => return Ok(None),
                Some(blocked) => incapable = blocked,
            }
        }

        // The planned step is out, either claimed away or hopeless for the
        // agents after us. Try the remaining actions instead.
        let goal = Self::goal_of(scenario, agent);
        let options = Self::alternatives(scenario, position_now, time, claims, goal);

        for alternative in options {
            claims.remove_claims(agent);

            let claim_pos = Claim::Position(alternative);
            let claim_edge =
                (position_now != alternative).then(|| Claim::edge(position_now, alternative));

            if claims.no_claims_on(claim_pos, claim_edge) {
                claims.add_claims(agent, Some(claim_pos), claim_edge);
                locations[agent] = Some(alternative);

                if order_index + 1 == order.len() {
                    return Ok(None);
                }
                match Self::step(
                    scenario,
                    plans,
                    order,
                    time,
                    order_index + 1,
                    claims,
                    locations,
                    deadline,
                )? {
                    None => return Ok(None),
                    Some(blocked) => incapable = blocked,
                }
            }
        }

        // Backtrack further; freeing our claims may unblock a predecessor.
        claims.remove_claims(agent);
        Ok(Some(incapable))
    }

    /// Runs one tick. On success, agents whose realized cell differs from
    /// their planned one get their plan cut, extended by the realized step
    /// and replanned from there.
    fn attempt_step(
        &self,
        scenario: &Scenario,
        plans: &mut CommonPlan,
        order: &[usize],
        time: usize,
        deadline: &Deadline,
    ) -> Result<Option<usize>, PlannerError> {
        let mut locations: Vec<Option<Position>> = vec![None; scenario.agents.len()];
        let mut claims = ClaimContainer::new();

        let incapable = Self::step(
            scenario,
            plans,
            order,
            time,
            0,
            &mut claims,
            &mut locations,
            deadline,
        )?;
        if incapable.is_some() {
            return Ok(incapable);
        }

        for agent in 0..scenario.agents.len() {
            let Some(realized) = locations[agent] else {
                continue;
            };
            let plan = plans.get_mut(agent);
            if plan.position(time + 1, true) == Some(realized) {
                continue;
            }

            debug!(agent, time, ?realized, "agent moved off its plan");
            plan.cut_after(time);
            plan.fill_up(time);
            plan.push(TimedPosition::at(realized, time + 1));

            let goal = Self::goal_of(scenario, agent);
            let Some(positions) =
                self.solo_path(scenario, realized, goal, time + 1, deadline)?
            else {
                return Ok(Some(agent));
            };
            plans
                .get_mut(agent)
                .append(&Plan::from_positions(agent, &positions, time + 2));
        }

        Ok(None)
    }
}

impl<R: Rng> Solver for RuntimeReplanner<R> {
    #[instrument(skip_all, name = "runtime_replanner", fields(alternating = self.alternating), level = "debug")]
    fn solve(
        &mut self,
        scenario: &Scenario,
        params: &Params,
        deadline: &Deadline,
    ) -> Result<Option<CommonPlan>, PlannerError> {
        let Some(original) = self.independent_plans(scenario, deadline)? else {
            return Ok(None);
        };

        let mut order: Vec<usize> = (0..scenario.agents.len()).collect();

        for trial in 0..params.trial_limit {
            let mut plans = original.clone();

            for time in 0..params.time_horizon {
                deadline.check()?;
                if Self::all_goals_reached(scenario, &plans, time) {
                    return Ok(Some(plans));
                }
                if self
                    .attempt_step(scenario, &mut plans, &order, time, deadline)?
                    .is_some()
                {
                    debug!(trial, time, "tick failed, reshuffling agent order");
                    break;
                }
            }

            order.shuffle(&mut self.rng);
        }

        Ok(None)
    }
}
