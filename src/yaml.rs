use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::grid::{Edge, Position};
use crate::map::Map;
use crate::scenario::{Agent, Scenario, Task};

#[derive(Debug, Serialize, Deserialize)]
pub struct MapYaml {
    pub dimensions: [i32; 2],
    pub edges: Vec<[i32; 4]>,
    #[serde(default)]
    pub obstacles: Vec<[i32; 2]>,
    #[serde(default)]
    pub parking: Vec<[i32; 2]>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentYaml {
    pub name: String,
    pub start: [i32; 2],
    /// Present in classic scenarios, absent in dynamic ones where tasks are
    /// assigned online.
    pub goal: Option<[i32; 2]>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskYaml {
    pub targets: Vec<[i32; 2]>,
    #[serde(default)]
    pub available: usize,
}

/// One schema for both scenario flavours: classic files give each agent a
/// goal, dynamic files carry a task list instead.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScenarioYaml {
    pub map: MapYaml,
    pub agents: Vec<AgentYaml>,
    #[serde(default)]
    pub tasks: Vec<TaskYaml>,
}

fn position(raw: [i32; 2]) -> Position {
    Position::new(raw[0], raw[1])
}

impl ScenarioYaml {
    pub fn from_file(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader).with_context(|| format!("failed to parse {path}"))
    }

    pub fn from_str(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn to_scenario(&self, direction_change_frequency: usize) -> Result<Scenario> {
        let edges: HashSet<Edge> = self
            .map
            .edges
            .iter()
            .map(|raw| {
                Edge::new(
                    Position::new(raw[0], raw[1]),
                    Position::new(raw[2], raw[3]),
                )
            })
            .collect();
        let obstacles = self.map.obstacles.iter().copied().map(position).collect();
        let parking = self.map.parking.iter().copied().map(position).collect();
        let map = Map::new(
            edges,
            (self.map.dimensions[0], self.map.dimensions[1]),
            obstacles,
            parking,
        );

        let mut agents = Vec::new();
        let mut tasks = Vec::new();
        for (id, agent) in self.agents.iter().enumerate() {
            let task = agent.goal.map(|goal| {
                let task = Task::new(tasks.len(), vec![position(goal)], 0);
                tasks.push(task.clone());
                task
            });
            agents.push(Agent::new(id, agent.name.clone(), position(agent.start), task));
        }

        for task in &self.tasks {
            if task.targets.is_empty() {
                bail!("a task without targets cannot be completed");
            }
            let targets = task.targets.iter().copied().map(position).collect();
            tasks.push(Task::new(tasks.len(), targets, task.available));
        }

        Ok(Scenario::new(map, agents, tasks, direction_change_frequency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classic_scenario() {
        let yaml = "\
map:
  dimensions: [3, 3]
  edges:
    - [0, 0, 1, 0]
    - [1, 0, 0, 0]
  obstacles:
    - [2, 2]
agents:
  - name: agent0
    start: [0, 0]
    goal: [1, 0]
";
        let scenario = ScenarioYaml::from_str(yaml)
            .unwrap()
            .to_scenario(0)
            .unwrap();

        assert_eq!(scenario.agents.len(), 1);
        assert_eq!(scenario.agents[0].id, 0);
        assert_eq!(scenario.agents[0].position, Position::new(0, 0));
        assert_eq!(scenario.agents[0].goal(), Some(Position::new(1, 0)));
        assert_eq!(scenario.tasks.len(), 1);
        assert!(scenario.map().obstacles.contains(&Position::new(2, 2)));
        assert_eq!(scenario.map().edges.len(), 2);
    }

    #[test]
    fn parses_dynamic_scenario_with_tasks_and_parking() {
        let yaml = "\
map:
  dimensions: [5, 2]
  edges:
    - [0, 0, 1, 0]
  parking:
    - [4, 1]
agents:
  - name: a0
    start: [0, 0]
tasks:
  - targets: [[2, 0], [4, 0]]
  - targets: [[3, 1], [0, 1]]
    available: 7
";
        let scenario = ScenarioYaml::from_str(yaml)
            .unwrap()
            .to_scenario(0)
            .unwrap();

        assert!(scenario.agents[0].task.is_none());
        assert_eq!(scenario.tasks.len(), 2);
        assert_eq!(scenario.tasks[1].availability, 7);
        assert_eq!(scenario.tasks[1].pickup(), Position::new(3, 1));
        assert_eq!(scenario.tasks[1].delivery(), Position::new(0, 1));
        assert!(scenario.map().parking.contains(&Position::new(4, 1)));
        assert_eq!(scenario.task_time_horizon(), 7);
    }

    #[test]
    fn rejects_empty_task() {
        let yaml = "\
map:
  dimensions: [2, 2]
  edges: []
agents: []
tasks:
  - targets: []
";
        let result = ScenarioYaml::from_str(yaml).unwrap().to_scenario(0);
        assert!(result.is_err());
    }
}
