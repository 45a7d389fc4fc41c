use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, instrument};

use crate::config::{Deadline, Params};
use crate::error::PlannerError;
use crate::grid::{manhattan, Position, TimedEdge, TimedPosition};
use crate::plan::{CommonPlan, Plan};
use crate::reservation::ReservationTable;
use crate::scenario::Scenario;
use crate::search::timed_search;
use crate::solver::Solver;

/// Cooperative A*: agents plan one after another in a shuffled order,
/// each against the reservations left behind by its predecessors. A failed
/// order discards the whole table and a fresh shuffle is tried, skipping
/// orders that were already seen, up to the trial limit.
pub struct CooperativeAStar<R: Rng> {
    rng: R,
}

impl<R: Rng> CooperativeAStar<R> {
    pub fn new(rng: R) -> Self {
        CooperativeAStar { rng }
    }

    /// Plans one leg from `start` to `target` against the table, then
    /// claims every cell and edge of the found path and the final cell
    /// forever. Returns the path including its start entry.
    fn plan_leg(
        scenario: &Scenario,
        table: &mut ReservationTable,
        agent: usize,
        start: TimedPosition,
        target: Position,
        params: &Params,
        deadline: &Deadline,
    ) -> Result<Option<Vec<TimedPosition>>, PlannerError> {
        let manager = &scenario.map_manager;
        let path = {
            let table = &*table;
            timed_search(
                start,
                target,
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
                |position| Ok(manhattan(position, target)),
            )?
        };

        let Some(path) = path else {
            return Ok(None);
        };

        table.reserve_path(agent, &path);
        Ok(Some(path))
    }
}

impl<R: Rng> Solver for CooperativeAStar<R> {
    #[instrument(skip_all, name = "cooperative_a_star", level = "debug")]
    fn solve(
        &mut self,
        scenario: &Scenario,
        params: &Params,
        deadline: &Deadline,
    ) -> Result<Option<CommonPlan>, PlannerError> {
        let mut order: Vec<usize> = (0..scenario.agents.len()).collect();
        let mut tried: HashSet<Vec<usize>> = HashSet::new();

        'trial: for trial in 0..params.trial_limit {
            deadline.check()?;
            order.shuffle(&mut self.rng);
            if !tried.insert(order.clone()) {
                continue;
            }
            debug!(trial, ?order, "starting trial");

            let mut table = ReservationTable::new();
            let mut plans: Vec<Option<Plan>> = vec![None; scenario.agents.len()];

            for &agent_index in &order {
                let agent = &scenario.agents[agent_index];
                let mut cursor = TimedPosition::at(agent.position, 0);
                let mut plan = Plan::new(agent_index);
                plan.push(cursor);

                let targets = agent
                    .task
                    .as_ref()
                    .map(|task| task.targets.as_slice())
                    .unwrap_or(&[]);

                for &target in targets {
                    let leg = Self::plan_leg(
                        scenario,
                        &mut table,
                        agent_index,
                        cursor,
                        target,
                        params,
                        deadline,
                    )?;
                    let Some(leg) = leg else {
                        continue 'trial;
                    };
                    if let Some(&reached) = leg.last() {
                        cursor = reached;
                    }
                    // The leg repeats the cursor cell; keep only the moves.
                    for &step in leg.iter().skip(1) {
                        plan.push(step);
                    }
                }

                if targets.is_empty() {
                    table.reserve_cell(agent_index, cursor, true);
                }
                plans[agent_index] = Some(plan);
            }

            let mut common = CommonPlan::new();
            for plan in plans.into_iter().flatten() {
                common.push(plan);
            }
            return Ok(Some(common));
        }

        debug!("all agent orders exhausted");
        Ok(None)
    }
}
