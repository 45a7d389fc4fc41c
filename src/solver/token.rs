use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, instrument};

use crate::config::{Deadline, Params};
use crate::distance::DistanceTable;
use crate::error::PlannerError;
use crate::grid::{Position, TimedEdge, TimedPosition};
use crate::plan::{CommonPlan, Plan};
use crate::reservation::ReservationTable;
use crate::scenario::{Scenario, Task};
use crate::search::timed_search;
use crate::solver::Solver;

/// The shared state the agents pass around during lifelong planning: the
/// reservation table, the per-agent plans and positions, the free-agent
/// set and the task lifecycle queues. The scenario itself stays untouched.
struct Token {
    table: ReservationTable,
    plans: Vec<Plan>,
    positions: Vec<Position>,
    free: BTreeSet<usize>,
    tasks: Vec<Task>,
    tasks_by_time: BTreeMap<usize, Vec<usize>>,
    available: BTreeSet<usize>,
    claimed: BTreeSet<usize>,
    /// Delivery cells of currently available tasks; a poor choice for
    /// resting because someone will soon have to deliver there.
    available_deliveries: HashSet<Position>,
    assigned: Vec<Option<usize>>,
}

impl Token {
    fn new(scenario: &Scenario) -> Self {
        let agent_count = scenario.agents.len();
        let mut tasks_by_time: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, task) in scenario.tasks.iter().enumerate() {
            tasks_by_time.entry(task.availability).or_default().push(index);
        }

        Token {
            table: ReservationTable::new(),
            plans: (0..agent_count).map(Plan::new).collect(),
            positions: scenario.agents.iter().map(|agent| agent.position).collect(),
            free: (0..agent_count).collect(),
            tasks: scenario.tasks.clone(),
            tasks_by_time,
            available: BTreeSet::new(),
            claimed: BTreeSet::new(),
            available_deliveries: HashSet::new(),
            assigned: vec![None; agent_count],
        }
    }

    /// Truncates the agent's plan so that at most `len` entries remain.
    fn cut_plan(&mut self, agent: usize, len: usize) {
        self.plans[agent].truncate(len);
    }

    /// Appends the agent's current cell at `now` unless it is already the
    /// final plan entry. Keeps plans contiguous across replans.
    fn add_current_time_position(&mut self, agent: usize, now: usize) {
        let here = TimedPosition::at(self.positions[agent], now);
        if self.plans[agent].last() != Some(here) {
            self.plans[agent].push(here);
        }
    }

    fn claim_task(&mut self, agent: usize, task: usize) {
        self.assigned[agent] = Some(task);
        self.available.remove(&task);
        self.claimed.insert(task);
        self.free.remove(&agent);
        self.available_deliveries.remove(&self.tasks[task].delivery());
    }

    /// Inverse of `claim_task`; the task becomes available again.
    fn unclaim_task(&mut self, agent: usize) {
        let Some(task) = self.assigned[agent].take() else {
            return;
        };
        self.available.insert(task);
        self.claimed.remove(&task);
        self.free.insert(agent);
    }

    fn set_task_complete(&mut self, agent: usize, now: usize) {
        let Some(task) = self.assigned[agent].take() else {
            return;
        };
        self.tasks[task].completed = Some(now);
        self.claimed.remove(&task);
        self.free.insert(agent);
    }

    /// Plans to stay at the current cell forever, claiming it permanently.
    fn set_trivial_path(&mut self, agent: usize, now: usize) {
        let here = TimedPosition::at(self.positions[agent], now);
        self.cut_plan(agent, now);
        self.plans[agent].push(here);
        self.table.cancel_agent(agent);
        self.table.reserve_cell(agent, here, true);
    }

    fn assemble(&self) -> CommonPlan {
        let mut common = CommonPlan::new();
        for plan in &self.plans {
            common.push(plan.clone());
        }
        common
    }
}

/// Token-Passing for lifelong pickup-and-delivery. Each tick, free agents
/// take the token in turn: claim the nearest solvable task, or when none is
/// claimable either rest in place or withdraw to a parking endpoint.
pub struct TokenPassing;

impl TokenPassing {
    pub fn new() -> Self {
        TokenPassing
    }

    /// Space-time A* using the precomputed true distances as heuristic.
    /// A found path is committed to the table immediately.
    fn true_distance_astar(
        scenario: &Scenario,
        distances: &DistanceTable,
        token: &mut Token,
        agent: usize,
        start: TimedPosition,
        goal: Position,
        params: &Params,
        deadline: &Deadline,
    ) -> Result<Option<Vec<TimedPosition>>, PlannerError> {
        let manager = &scenario.map_manager;
        let path = {
            let table = &token.table;
            timed_search(
                start,
                goal,
                params.time_horizon,
                deadline,
                |from, to| {
                    if from.position() == to.position() {
                        table.is_cell_free(to)
                    } else {
                        table.is_cell_free(to)
                            && table.is_edge_free(from, to)
                            && manager.passage_permitted(TimedEdge::between(from, to))
                    }
                },
                |at| table.is_free_forever(at),
                |position| distances.distance(position, goal),
            )?
        };

        let Some(path) = path else {
            return Ok(None);
        };
        token.table.reserve_path(agent, &path);
        Ok(Some(path))
    }

    /// Available tasks whose pickup and delivery cell is not the terminal
    /// cell of another agent's plan, closest pickup first.
    fn task_candidates(
        token: &Token,
        distances: &DistanceTable,
        agent: usize,
        agent_count: usize,
    ) -> Result<Vec<usize>, PlannerError> {
        let mut candidates = BTreeSet::new();
        'tasks: for &task_index in &token.available {
            let task = &token.tasks[task_index];
            for other in 0..agent_count {
                if other == agent {
                    continue;
                }
                let Some(terminal) = token.plans[other].last() else {
                    continue;
                };
                let terminal = terminal.position();
                if terminal == task.pickup() || terminal == task.delivery() {
                    continue 'tasks;
                }
            }
            let distance = distances.distance(token.positions[agent], task.pickup())?;
            candidates.insert((distance, task_index));
        }
        Ok(candidates.into_iter().map(|(_, task)| task).collect())
    }

    /// Tries to claim the closest solvable task: one leg to the pickup,
    /// one to the delivery. A failed delivery leg rolls the pickup leg
    /// back and the next candidate is tried.
    fn plan_for_task(
        scenario: &Scenario,
        distances: &DistanceTable,
        token: &mut Token,
        agent: usize,
        now: usize,
        params: &Params,
        deadline: &Deadline,
    ) -> Result<bool, PlannerError> {
        let candidates = Self::task_candidates(token, distances, agent, scenario.agents.len())?;

        token.table.cancel_agent(agent);
        token.cut_plan(agent, now + 1);

        for task_index in candidates {
            let pickup = token.tasks[task_index].pickup();
            let delivery = token.tasks[task_index].delivery();
            let start = TimedPosition::at(token.positions[agent], now);

            let Some(pickup_leg) = Self::true_distance_astar(
                scenario, distances, token, agent, start, pickup, params, deadline,
            )?
            else {
                continue;
            };

            token.add_current_time_position(agent, now);
            for &step in pickup_leg.iter().skip(1) {
                token.plans[agent].push(step);
            }

            let pickup_reached = pickup_leg.last().copied().unwrap_or(start);
            let delivery_leg = Self::true_distance_astar(
                scenario,
                distances,
                token,
                agent,
                pickup_reached,
                delivery,
                params,
                deadline,
            )?;

            let Some(delivery_leg) = delivery_leg else {
                // Roll back the pickup leg before trying the next task.
                token.table.cancel_agent(agent);
                token.cut_plan(agent, now + 1);
                continue;
            };

            for &step in delivery_leg.iter().skip(1) {
                token.plans[agent].push(step);
            }
            token.claim_task(agent, task_index);
            debug!(agent, task = task_index, "task claimed");
            return Ok(true);
        }

        token.add_current_time_position(agent, now);
        Ok(false)
    }

    /// Whether staying here forever would ruin someone's plan or an
    /// available task. As a side effect the agent's reservations and plan
    /// future are dropped, so either outcome can replan from scratch.
    fn blocking(token: &mut Token, agent: usize, now: usize) -> bool {
        token.table.cancel_agent(agent);
        token.cut_plan(agent, now);
        token.add_current_time_position(agent, now);

        let here = token.positions[agent];
        if !token.table.resting_allowed(here, now) {
            return true;
        }
        token.available_deliveries.contains(&here)
    }

    /// Endpoints acceptable for resting, closest first: not a delivery
    /// cell of an available task, and nobody plans to pass through later.
    fn endpoint_candidates(
        token: &Token,
        distances: &DistanceTable,
        endpoints: &HashSet<Position>,
        agent: usize,
        now: usize,
    ) -> Result<Vec<Position>, PlannerError> {
        let mut candidates = BTreeSet::new();
        for &endpoint in endpoints {
            if token.available_deliveries.contains(&endpoint) {
                continue;
            }
            if !token.table.resting_allowed(endpoint, now) {
                continue;
            }
            let distance = distances.distance(token.positions[agent], endpoint)?;
            candidates.insert((distance, endpoint));
        }
        Ok(candidates.into_iter().map(|(_, endpoint)| endpoint).collect())
    }

    /// Moves a blocking agent out of the way to the nearest reachable
    /// resting endpoint.
    fn plan_for_endpoint(
        scenario: &Scenario,
        distances: &DistanceTable,
        endpoints: &HashSet<Position>,
        token: &mut Token,
        agent: usize,
        now: usize,
        params: &Params,
        deadline: &Deadline,
    ) -> Result<bool, PlannerError> {
        let candidates = Self::endpoint_candidates(token, distances, endpoints, agent, now)?;

        for endpoint in candidates {
            let start = TimedPosition::at(token.positions[agent], now);
            let leg = Self::true_distance_astar(
                scenario, distances, token, agent, start, endpoint, params, deadline,
            )?;
            if let Some(leg) = leg {
                token.add_current_time_position(agent, now);
                for &step in leg.iter().skip(1) {
                    token.plans[agent].push(step);
                }
                return Ok(true);
            }
        }

        token.add_current_time_position(agent, now);
        Ok(false)
    }

    /// Advances every agent one tick along its plan, recording task
    /// pickups and completions.
    fn step(token: &mut Token, now: usize) {
        for agent in 0..token.positions.len() {
            let Some(position) = token.plans[agent].position(now, true) else {
                continue;
            };
            token.positions[agent] = position;

            if let Some(task_index) = token.assigned[agent] {
                let task = &mut token.tasks[task_index];
                if task.started.is_none() && position == task.pickup() {
                    task.started = Some(now);
                }
            }

            if token.plans[agent].last() == Some(TimedPosition::at(position, now)) {
                token.set_task_complete(agent, now);
            }
        }
    }
}

impl Default for TokenPassing {
    fn default() -> Self {
        TokenPassing::new()
    }
}

impl Solver for TokenPassing {
    #[instrument(skip_all, name = "token_passing", level = "debug")]
    fn solve(
        &mut self,
        scenario: &Scenario,
        params: &Params,
        deadline: &Deadline,
    ) -> Result<Option<CommonPlan>, PlannerError> {
        let endpoints = scenario.endpoints();
        let distances =
            DistanceTable::compute(scenario.map(), endpoints.iter().copied(), deadline)?;
        let task_time_horizon = scenario.task_time_horizon();

        let mut token = Token::new(scenario);
        for agent in 0..scenario.agents.len() {
            token.set_trivial_path(agent, 0);
        }

        let mut now = 0;
        while now <= params.time_horizon {
            deadline.check()?;

            // Release the tasks that become available this tick.
            if let Some(fresh) = token.tasks_by_time.remove(&now) {
                for task_index in fresh {
                    token.available.insert(task_index);
                    token
                        .available_deliveries
                        .insert(token.tasks[task_index].delivery());
                }
            }

            // First every free agent competes for a task.
            let free: Vec<usize> = token.free.iter().copied().collect();
            for agent in free {
                Self::plan_for_task(scenario, &distances, &mut token, agent, now, params, deadline)?;
            }

            // The rest either settle where they stand or withdraw to an
            // endpoint; a blocked agent tries to at least wait one tick.
            let free: Vec<usize> = token.free.iter().copied().collect();
            for agent in free {
                if !Self::blocking(&mut token, agent, now) {
                    token.set_trivial_path(agent, now);
                    continue;
                }
                if Self::plan_for_endpoint(
                    scenario, &distances, &endpoints, &mut token, agent, now, params, deadline,
                )? {
                    continue;
                }

                let next = TimedPosition::at(token.positions[agent], now + 1);
                if token.table.is_cell_free(next) {
                    token.table.reserve_cell(agent, next, false);
                    token.plans[agent].push(next);
                    continue;
                }

                debug!(agent, now, "no legal behaviour left");
                return Ok(None);
            }

            now += 1;
            Self::step(&mut token, now);

            if token.available.is_empty()
                && token.claimed.is_empty()
                && token.tasks_by_time.is_empty()
                && now > task_time_horizon
            {
                return Ok(Some(token.assemble()));
            }
        }

        Ok(None)
    }
}
