//! Multi-agent pathfinding and pickup-and-delivery planning on grid maps
//! with directed, undirected or periodically alternating edges.
//!
//! Five planners share a space-time search engine and a reservation
//! substrate: Cooperative A*, Token-Passing for lifelong MAPD, a
//! hierarchical planner running Conflict-Based Search per region, a
//! claim-based runtime replanner (static and alternating), and a
//! decentralized traffic simulation.

pub mod config;
pub mod distance;
pub mod error;
pub mod grid;
pub mod map;
pub mod plan;
pub mod reservation;
pub mod scenario;
pub mod search;
pub mod solver;
pub mod stat;
pub mod validator;
pub mod yaml;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::{Algorithm, Cli, Deadline, Params};
pub use error::{InvalidPlanError, PlannerError};
pub use grid::{Edge, Position, TimedEdge, TimedPosition};
pub use map::{Map, MapManager};
pub use plan::{CommonPlan, Plan};
pub use scenario::{Agent, Scenario, Task};
pub use solver::{mapf, Solver};
pub use stat::{evaluate, Evaluation};
