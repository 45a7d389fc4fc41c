use std::collections::HashSet;

use crate::grid::Position;
use crate::map::{Map, MapManager};

/// A sequence of cells some agent has to visit in order. Classic MAPF tasks
/// have a single target; MAPD tasks have a pickup and a delivery cell and
/// become claimable only once their availability time has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: usize,
    pub targets: Vec<Position>,
    pub availability: usize,
    pub started: Option<usize>,
    pub completed: Option<usize>,
}

impl Task {
    pub fn new(id: usize, targets: Vec<Position>, availability: usize) -> Self {
        Task {
            id,
            targets,
            availability,
            started: None,
            completed: None,
        }
    }

    pub fn pickup(&self) -> Position {
        self.targets[0]
    }

    pub fn delivery(&self) -> Position {
        self.targets[self.targets.len() - 1]
    }
}

/// An agent with a stable id equal to its index in the scenario's agent
/// array. Clones keep the id, which makes it a safe key across deep copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub id: usize,
    pub name: String,
    pub position: Position,
    pub task: Option<Task>,
}

impl Agent {
    pub fn new(id: usize, name: String, position: Position, task: Option<Task>) -> Self {
        Agent {
            id,
            name,
            position,
            task,
        }
    }

    /// The single goal of a classic agent.
    pub fn goal(&self) -> Option<Position> {
        self.task.as_ref().map(|task| task.targets[0])
    }
}

/// An immutable problem instance: the managed map, the agents and the task
/// set. Planners never mutate a scenario; online planners copy the parts
/// they need to evolve.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub map_manager: MapManager,
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
}

impl Scenario {
    pub fn new(map: Map, agents: Vec<Agent>, tasks: Vec<Task>, frequency: usize) -> Self {
        Scenario {
            map_manager: MapManager::new(map, frequency),
            agents,
            tasks,
        }
    }

    pub fn map(&self) -> &Map {
        &self.map_manager.map
    }

    /// The same scenario on the undirected-by-copy map, with the given
    /// direction change frequency.
    pub fn undirected(&self, frequency: usize) -> Scenario {
        Scenario {
            map_manager: MapManager::new(self.map().undirected(), frequency),
            agents: self.agents.clone(),
            tasks: self.tasks.clone(),
        }
    }

    /// Pickup and delivery cells, agent start cells and parking cells; the
    /// cells the true-distance oracle precomputes tables for.
    pub fn endpoints(&self) -> HashSet<Position> {
        let mut endpoints = HashSet::new();
        for task in &self.tasks {
            endpoints.extend(task.targets.iter().copied());
        }
        for agent in &self.agents {
            endpoints.insert(agent.position);
        }
        endpoints.extend(self.map().parking.iter().copied());
        endpoints
    }

    /// Last time a task becomes available.
    pub fn task_time_horizon(&self) -> usize {
        self.tasks
            .iter()
            .map(|task| task.availability)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn endpoints_cover_tasks_starts_and_parking() {
        let mut map = fixtures::open_grid(5, 2);
        map.parking.insert(Position::new(4, 1));

        let agents = vec![Agent::new(0, "a0".into(), Position::new(0, 0), None)];
        let tasks = vec![Task::new(
            0,
            vec![Position::new(2, 0), Position::new(4, 0)],
            0,
        )];
        let scenario = Scenario::new(map, agents, tasks, 0);

        let endpoints = scenario.endpoints();
        assert!(endpoints.contains(&Position::new(2, 0)));
        assert!(endpoints.contains(&Position::new(4, 0)));
        assert!(endpoints.contains(&Position::new(0, 0)));
        assert!(endpoints.contains(&Position::new(4, 1)));
        assert_eq!(endpoints.len(), 4);
    }

    #[test]
    fn task_time_horizon_is_latest_availability() {
        let map = fixtures::open_grid(3, 3);
        let tasks = vec![
            Task::new(0, vec![Position::new(1, 1)], 0),
            Task::new(1, vec![Position::new(2, 2)], 7),
        ];
        let scenario = Scenario::new(map, Vec::new(), tasks, 0);
        assert_eq!(scenario.task_time_horizon(), 7);
    }
}
