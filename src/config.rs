use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

/// The planners this crate implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Algorithm {
    CaStar,
    TokenPassing,
    EnhancedHierarchicalPlanner,
    RuntimeReplanner,
    AlternatingRuntimeReplanner,
    TrafficSimulator,
}

#[derive(Parser, Debug)]
#[command(
    name = "gridmapf",
    about = "Grid-based multi-agent pathfinding and pickup-and-delivery planning.",
    version = "0.1.0"
)]
pub struct Cli {
    #[arg(help = "Path to the YAML scenario file")]
    pub scenario: String,

    #[arg(long, short, value_enum, default_value = "ca-star")]
    pub algorithm: Algorithm,

    #[arg(long, default_value_t = 400, help = "Maximum individual plan length")]
    pub time_horizon: usize,

    #[arg(long, default_value_t = 100, help = "Maximum number of agent orders to try")]
    pub trial_limit: usize,

    #[arg(
        long,
        default_value_t = 0,
        help = "Ticks between edge direction flips, 0 for a static map"
    )]
    pub direction_change_frequency: usize,

    #[arg(long, default_value_t = 300, help = "Runtime limit in seconds")]
    pub runtime_limit: u64,

    #[arg(long, help = "Seed for the agent order shuffle")]
    pub seed: Option<u64>,
}

/// Planner parameters, independent of where they came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    pub algorithm: Algorithm,
    pub time_horizon: usize,
    pub trial_limit: usize,
    pub direction_change_frequency: usize,
    pub runtime_limit_secs: u64,
    pub seed: Option<u64>,
}

impl Params {
    pub fn from_cli(cli: &Cli) -> Self {
        Params {
            algorithm: cli.algorithm,
            time_horizon: cli.time_horizon,
            trial_limit: cli.trial_limit,
            direction_change_frequency: cli.direction_change_frequency,
            runtime_limit_secs: cli.runtime_limit,
            seed: cli.seed,
        }
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::after(Duration::from_secs(self.runtime_limit_secs))
    }
}

impl Default for Params {
    fn default() -> Self {
        Params {
            algorithm: Algorithm::CaStar,
            time_horizon: 400,
            trial_limit: 100,
            direction_change_frequency: 0,
            runtime_limit_secs: 300,
            seed: None,
        }
    }
}

/// Cooperative cancellation point. Hot loops call `check` and surface a
/// timeout fault on breach; transient search state is simply dropped.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Deadline(Some(Instant::now() + limit))
    }

    pub fn none() -> Self {
        Deadline(None)
    }

    pub fn check(&self) -> Result<(), PlannerError> {
        match self.0 {
            Some(at) if Instant::now() > at => Err(PlannerError::Timeout),
            _ => Ok(()),
        }
    }
}
