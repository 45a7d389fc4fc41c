//! Checks a common plan against its scenario: shape, contiguity, legal
//! moves, and freedom from vertex and swap conflicts. Classic mode also
//! requires every agent to end on its goal; dynamic mode instead requires
//! every task's target sequence to appear in some plan.

use std::collections::HashSet;

use crate::error::InvalidPlanError;
use crate::grid::{Edge, TimedEdge, TimedPosition};
use crate::plan::{CommonPlan, Plan};
use crate::scenario::{Scenario, Task};

fn fail(message: String) -> Result<(), InvalidPlanError> {
    Err(InvalidPlanError(message))
}

pub fn validate_classic(
    scenario: &Scenario,
    common_plan: &CommonPlan,
) -> Result<(), InvalidPlanError> {
    plan_count(scenario, common_plan)?;

    for plan in common_plan.plans() {
        let agent = &scenario.agents[plan.agent];
        let start = agent.position;
        let goal = agent.goal().unwrap_or(start);

        if plan.is_empty() {
            if start == goal {
                continue;
            }
            return fail(format!(
                "empty plan for {} even though start and goal differ",
                agent.name
            ));
        }

        if plan.first() != Some(TimedPosition::at(start, 0)) {
            return fail(format!(
                "{}'s plan starts at {:?} instead of its start cell {:?}",
                agent.name,
                plan.first(),
                start
            ));
        }

        if plan.last().map(|step| step.position()) != Some(goal) {
            return fail(format!(
                "{}'s plan ends at {:?} instead of its goal {:?}",
                agent.name,
                plan.last(),
                goal
            ));
        }

        obstacle_clash(scenario, plan)?;
        time_consistency(scenario, plan)?;
        edges_exist(scenario, plan)?;
    }

    conflicts(common_plan)
}

pub fn validate_dynamic(
    scenario: &Scenario,
    common_plan: &CommonPlan,
) -> Result<(), InvalidPlanError> {
    plan_count(scenario, common_plan)?;

    for plan in common_plan.plans() {
        obstacle_clash(scenario, plan)?;
        time_consistency(scenario, plan)?;
        edges_exist(scenario, plan)?;
    }

    conflicts(common_plan)?;

    for task in &scenario.tasks {
        if !common_plan
            .plans()
            .iter()
            .any(|plan| plan_completes_task(plan, task))
        {
            return fail(format!("task {} is not completed by any plan", task.id));
        }
    }
    Ok(())
}

/// The targets must show up in the plan in order, not necessarily
/// consecutively.
fn plan_completes_task(plan: &Plan, task: &Task) -> bool {
    let mut next_target = 0;
    for step in plan.steps() {
        if step.position() == task.targets[next_target] {
            next_target += 1;
            if next_target == task.targets.len() {
                return true;
            }
        }
    }
    false
}

fn plan_count(scenario: &Scenario, common_plan: &CommonPlan) -> Result<(), InvalidPlanError> {
    if scenario.agents.len() != common_plan.len() {
        return fail(format!(
            "expected {} plans but found {}",
            scenario.agents.len(),
            common_plan.len()
        ));
    }
    Ok(())
}

fn obstacle_clash(scenario: &Scenario, plan: &Plan) -> Result<(), InvalidPlanError> {
    for step in plan.steps() {
        if scenario.map().obstacles.contains(&step.position()) {
            return fail(format!(
                "{} steps onto an obstacle at {:?}",
                scenario.agents[plan.agent].name, step
            ));
        }
    }
    Ok(())
}

fn time_consistency(scenario: &Scenario, plan: &Plan) -> Result<(), InvalidPlanError> {
    for (tick, step) in plan.steps().iter().enumerate() {
        if step.t != tick {
            return fail(format!(
                "time inconsistency in {}'s plan: {:?} at index {}",
                scenario.agents[plan.agent].name, step, tick
            ));
        }
    }
    Ok(())
}

fn edges_exist(scenario: &Scenario, plan: &Plan) -> Result<(), InvalidPlanError> {
    for (tick, window) in plan.steps().windows(2).enumerate() {
        let position = window[0].position();
        let successor = window[1].position();
        if position == successor {
            continue;
        }
        let edge = Edge::new(position, successor);
        if !scenario
            .map_manager
            .passage_permitted(TimedEdge::new(tick, edge))
        {
            return fail(format!(
                "{} uses the edge {:?} at tick {} which the map does not permit",
                scenario.agents[plan.agent].name, edge, tick
            ));
        }
    }
    Ok(())
}

/// Per tick: no cell occupied twice and no undirected edge used in both
/// directions at once. Agents rest at their final cell after their plan.
fn conflicts(common_plan: &CommonPlan) -> Result<(), InvalidPlanError> {
    let makespan = common_plan.makespan();

    for time in 0..makespan {
        let mut positions = HashSet::new();
        for plan in common_plan.plans() {
            let Some(position) = plan.position(time, true) else {
                continue;
            };
            if !positions.insert(position) {
                return fail(format!("cell conflict at {position:?} at tick {time}"));
            }
        }
    }

    for time in 0..makespan.saturating_sub(1) {
        let mut edges = HashSet::new();
        for plan in common_plan.plans() {
            let (Some(position), Some(successor)) =
                (plan.position(time, true), plan.position(time + 1, true))
            else {
                continue;
            };
            if position == successor {
                continue;
            }
            let edge = Edge::new(position, successor);
            if edges.contains(&edge.reversed()) {
                return fail(format!(
                    "edge swap on {edge:?} between ticks {time} and {}",
                    time + 1
                ));
            }
            edges.insert(edge);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::grid::Position;
    use crate::plan::Plan;

    fn plan(agent: usize, cells: &[(i32, i32)]) -> Plan {
        let positions: Vec<Position> =
            cells.iter().map(|&(x, y)| Position::new(x, y)).collect();
        Plan::from_positions(agent, &positions, 0)
    }

    #[test]
    fn accepts_a_clean_plan() {
        let scenario =
            fixtures::classic_scenario(fixtures::open_grid(3, 3), &[((0, 0), (2, 0))]);
        let mut common = CommonPlan::new();
        common.push(plan(0, &[(0, 0), (1, 0), (2, 0)]));

        assert!(validate_classic(&scenario, &common).is_ok());
    }

    #[test]
    fn rejects_a_wrong_start() {
        let scenario =
            fixtures::classic_scenario(fixtures::open_grid(3, 3), &[((0, 0), (2, 0))]);
        let mut common = CommonPlan::new();
        common.push(plan(0, &[(1, 0), (2, 0)]));

        assert!(validate_classic(&scenario, &common).is_err());
    }

    #[test]
    fn rejects_a_missed_goal() {
        let scenario =
            fixtures::classic_scenario(fixtures::open_grid(3, 3), &[((0, 0), (2, 0))]);
        let mut common = CommonPlan::new();
        common.push(plan(0, &[(0, 0), (1, 0)]));

        assert!(validate_classic(&scenario, &common).is_err());
    }

    #[test]
    fn rejects_a_jump_without_an_edge() {
        let scenario =
            fixtures::classic_scenario(fixtures::open_grid(3, 3), &[((0, 0), (2, 0))]);
        let mut common = CommonPlan::new();
        common.push(plan(0, &[(0, 0), (2, 0)]));

        assert!(validate_classic(&scenario, &common).is_err());
    }

    #[test]
    fn rejects_a_cell_conflict() {
        let scenario = fixtures::classic_scenario(
            fixtures::open_grid(3, 3),
            &[((0, 0), (1, 0)), ((2, 0), (1, 0))],
        );
        let mut common = CommonPlan::new();
        common.push(plan(0, &[(0, 0), (1, 0)]));
        common.push(plan(1, &[(2, 0), (1, 0)]));

        let error = validate_classic(&scenario, &common).unwrap_err();
        assert!(error.0.contains("cell conflict"));
    }

    #[test]
    fn rejects_an_edge_swap() {
        let scenario = fixtures::classic_scenario(
            fixtures::open_grid(2, 1),
            &[((0, 0), (1, 0)), ((1, 0), (0, 0))],
        );
        let mut common = CommonPlan::new();
        common.push(plan(0, &[(0, 0), (1, 0)]));
        common.push(plan(1, &[(1, 0), (0, 0)]));

        let error = validate_classic(&scenario, &common).unwrap_err();
        assert!(error.0.contains("edge swap"));
    }

    #[test]
    fn resting_agents_still_conflict() {
        let scenario = fixtures::classic_scenario(
            fixtures::open_grid(4, 1),
            &[((0, 0), (2, 0)), ((3, 0), (2, 0))],
        );
        let mut common = CommonPlan::new();
        // The first agent parks on (2,0) from tick 2; the second arrives
        // at tick 1 and rests there, so tick 2 collides.
        common.push(plan(0, &[(0, 0), (1, 0), (2, 0)]));
        common.push(plan(1, &[(3, 0), (2, 0)]));

        let error = validate_classic(&scenario, &common).unwrap_err();
        assert!(error.0.contains("cell conflict"));
    }

    #[test]
    fn dynamic_mode_requires_completed_tasks() {
        let mut scenario =
            fixtures::classic_scenario(fixtures::open_grid(4, 1), &[((0, 0), (3, 0))]);
        scenario.agents[0].task = None;
        scenario.tasks = vec![Task::new(
            0,
            vec![Position::new(1, 0), Position::new(3, 0)],
            0,
        )];

        let mut complete = CommonPlan::new();
        complete.push(plan(0, &[(0, 0), (1, 0), (2, 0), (3, 0)]));
        assert!(validate_dynamic(&scenario, &complete).is_ok());

        let mut incomplete = CommonPlan::new();
        incomplete.push(plan(0, &[(0, 0), (1, 0), (2, 0)]));
        assert!(validate_dynamic(&scenario, &incomplete).is_err());
    }

    #[test]
    fn deep_copy_validates_identically() {
        let scenario =
            fixtures::classic_scenario(fixtures::open_grid(3, 3), &[((0, 0), (2, 0))]);
        let mut common = CommonPlan::new();
        common.push(plan(0, &[(0, 0), (1, 0), (2, 0)]));

        let copy = common.clone();
        assert_eq!(
            validate_classic(&scenario, &common).is_ok(),
            validate_classic(&scenario, &copy).is_ok()
        );
    }

    #[test]
    fn empty_plan_only_when_start_is_goal() {
        let scenario =
            fixtures::classic_scenario(fixtures::open_grid(2, 2), &[((1, 1), (1, 1))]);
        let mut common = CommonPlan::new();
        common.push(Plan::new(0));

        assert!(validate_classic(&scenario, &common).is_ok());
    }
}
