use std::time::Instant;

use tracing::info;

use crate::config::{Algorithm, Params};
use crate::plan::CommonPlan;
use crate::scenario::{Scenario, Task};
use crate::solver::mapf;
use crate::validator;

/// Quality measures of one successful planner run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub makespan: usize,
    pub flowtime: usize,
    /// MAPD: mean time from a task becoming available to its delivery.
    /// Classic MAPF: mean plan length.
    pub service_time: usize,
    pub planning_time_ns: u128,
    pub valid: bool,
}

/// The planner run three ways: on the directed map, on the
/// undirected-by-copy map, and on the dynamic map with alternating edges.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub directed: Option<RunStats>,
    pub undirected: Option<RunStats>,
    pub dynamic: Option<RunStats>,
}

fn lifelong(algorithm: Algorithm) -> bool {
    matches!(algorithm, Algorithm::TokenPassing)
}

/// The tick at which the plan finishes the task, taken from the first plan
/// whose cells visit the task's targets in order.
fn completion_time(common_plan: &CommonPlan, task: &Task) -> Option<usize> {
    for plan in common_plan.plans() {
        let mut next_target = 0;
        for step in plan.steps() {
            if step.position() == task.targets[next_target] {
                next_target += 1;
                if next_target == task.targets.len() {
                    return Some(step.t);
                }
            }
        }
    }
    None
}

fn service_time(scenario: &Scenario, common_plan: &CommonPlan, algorithm: Algorithm) -> usize {
    if lifelong(algorithm) {
        if scenario.tasks.is_empty() {
            return 0;
        }
        let total: usize = scenario
            .tasks
            .iter()
            .filter_map(|task| {
                completion_time(common_plan, task)
                    .map(|done| done.saturating_sub(task.availability))
            })
            .sum();
        total / scenario.tasks.len()
    } else if scenario.agents.is_empty() {
        0
    } else {
        common_plan.sum_of_costs() / scenario.agents.len()
    }
}

fn run_once(scenario: &Scenario, params: &Params) -> Option<RunStats> {
    let started = Instant::now();
    let outcome = mapf(scenario, params, &params.deadline());
    let planning_time_ns = started.elapsed().as_nanos();

    let plan = outcome.ok().flatten()?;
    let valid = if lifelong(params.algorithm) {
        validator::validate_dynamic(scenario, &plan).is_ok()
    } else {
        validator::validate_classic(scenario, &plan).is_ok()
    };

    let stats = RunStats {
        makespan: plan.makespan(),
        flowtime: plan.sum_of_costs(),
        service_time: service_time(scenario, &plan, params.algorithm),
        planning_time_ns,
        valid,
    };
    info!(
        makespan = stats.makespan,
        flowtime = stats.flowtime,
        service_time = stats.service_time,
        planning_time_ns = stats.planning_time_ns,
        valid = stats.valid,
        "run finished"
    );
    Some(stats)
}

/// Runs the configured planner on the directed scenario, its undirected
/// twin, and the dynamic variant with the configured direction change
/// frequency, collecting the quality measures of each.
pub fn evaluate(scenario: &Scenario, params: &Params) -> Evaluation {
    let undirected = scenario.undirected(0);
    let dynamic = scenario.undirected(params.direction_change_frequency);

    Evaluation {
        directed: run_once(scenario, params),
        undirected: run_once(&undirected, params),
        dynamic: run_once(&dynamic, params),
    }
}
