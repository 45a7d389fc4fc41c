use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use crate::config::{Deadline, Params};
use crate::error::PlannerError;
use crate::grid::{Position, TimedPosition};
use crate::plan::{CommonPlan, Plan};
use crate::scenario::Scenario;
use crate::search::shortest_path;
use crate::solver::Solver;

struct TrafficAgent {
    active: bool,
    untimed: Vec<Position>,
    pointer: usize,
    timed: Plan,
    current: Position,
    goal: Position,
}

impl TrafficAgent {
    fn next_position(&self) -> Option<Position> {
        self.untimed.get(self.pointer + 1).copied()
    }

    fn at_goal(&self) -> bool {
        self.current == self.goal
    }
}

/// Decentralized greedy execution: each agent computes one untimed path
/// that avoids every other agent's goal cell, then advances along it
/// whenever its next cell is free. Agents blocked in a closed cycle rotate
/// simultaneously; everyone else waits.
pub struct TrafficSimulator;

impl TrafficSimulator {
    pub fn new() -> Self {
        TrafficSimulator
    }

    fn build_agents(scenario: &Scenario) -> Option<Vec<TrafficAgent>> {
        let goals: HashSet<Position> = scenario
            .agents
            .iter()
            .map(|agent| agent.goal().unwrap_or(agent.position))
            .collect();

        let mut agents = Vec::new();
        for agent in &scenario.agents {
            let goal = agent.goal().unwrap_or(agent.position);
            let mut forbidden = goals.clone();
            forbidden.remove(&goal);

            let path = shortest_path(scenario.map(), agent.position, goal, &forbidden)?;
            let mut untimed = vec![agent.position];
            untimed.extend(path);

            let mut timed = Plan::new(agent.id);
            timed.push(TimedPosition::at(agent.position, 0));

            agents.push(TrafficAgent {
                active: true,
                untimed,
                pointer: 0,
                timed,
                current: agent.position,
                goal,
            });
        }
        Some(agents)
    }

    /// Moves one member of a blocked cycle after another; no cell is ever
    /// freed because each is reclaimed by the member behind it.
    fn rotate_cycle(
        agents: &mut [TrafficAgent],
        occupied: &mut HashMap<Position, usize>,
        entry: usize,
    ) {
        let mut current = entry;
        loop {
            let Some(target) = agents[current].next_position() else {
                return;
            };
            let Some(&blocker) = occupied.get(&target) else {
                return;
            };

            occupied.insert(target, current);
            agents[current].current = target;
            agents[current].pointer += 1;
            agents[current].active = false;

            current = blocker;
            if current == entry {
                return;
            }
        }
    }

    /// Follows the blocked-by chain from each still blocked agent; a chain
    /// returning to one of its own members is a cycle and gets rotated.
    fn resolve_cycles(agents: &mut [TrafficAgent], occupied: &mut HashMap<Position, usize>) {
        for start in 0..agents.len() {
            if !agents[start].active {
                continue;
            }

            let mut chain = HashSet::new();
            chain.insert(start);
            let mut current = start;

            loop {
                let Some(next) = agents[current].next_position() else {
                    break;
                };
                let Some(&blocker) = occupied.get(&next) else {
                    break;
                };
                // An agent that already moved cannot be part of a cycle.
                if !agents[blocker].active {
                    break;
                }
                if chain.contains(&blocker) {
                    debug!(entry = blocker, "rotating blocked cycle");
                    Self::rotate_cycle(agents, occupied, blocker);
                    break;
                }
                chain.insert(blocker);
                current = blocker;
            }
        }
    }
}

impl Default for TrafficSimulator {
    fn default() -> Self {
        TrafficSimulator::new()
    }
}

impl Solver for TrafficSimulator {
    #[instrument(skip_all, name = "traffic_simulator", level = "debug")]
    fn solve(
        &mut self,
        scenario: &Scenario,
        params: &Params,
        deadline: &Deadline,
    ) -> Result<Option<CommonPlan>, PlannerError> {
        let Some(mut agents) = Self::build_agents(scenario) else {
            return Ok(None);
        };

        let mut occupied: HashMap<Position, usize> = agents
            .iter()
            .enumerate()
            .map(|(index, agent)| (agent.current, index))
            .collect();

        let mut finished = false;
        let mut now = 1;

        while !finished && now < params.time_horizon {
            deadline.check()?;

            // Greedy passes until nobody can move anymore.
            loop {
                let mut movement = false;
                for index in 0..agents.len() {
                    if !agents[index].active {
                        continue;
                    }
                    let Some(target) = agents[index].next_position() else {
                        continue;
                    };
                    if occupied.contains_key(&target) {
                        continue;
                    }
                    occupied.remove(&agents[index].current);
                    occupied.insert(target, index);
                    agents[index].current = target;
                    agents[index].pointer += 1;
                    agents[index].active = false;
                    movement = true;
                }
                if !movement {
                    break;
                }
            }

            Self::resolve_cycles(&mut agents, &mut occupied);

            // Note each agent's move (or wait) and rearm it for the next
            // tick unless it is standing on its goal.
            for agent in agents.iter_mut() {
                let moved = agent
                    .timed
                    .last()
                    .map(|last| last.position() != agent.current)
                    .unwrap_or(true);
                if !agent.at_goal() || moved {
                    agent.timed.push(TimedPosition::at(agent.current, now));
                }
                agent.active = !agent.at_goal();
            }

            finished = agents.iter().all(|agent| !agent.active);
            now += 1;
        }

        if !finished {
            return Ok(None);
        }

        let mut common = CommonPlan::new();
        for agent in agents {
            common.push(agent.timed);
        }
        Ok(Some(common))
    }
}
