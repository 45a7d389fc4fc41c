pub mod castar;
pub mod cbs;
pub mod hierarchical;
pub mod replanner;
pub mod token;
pub mod traffic;

pub use castar::CooperativeAStar;
pub use hierarchical::HierarchicalPlanner;
pub use replanner::RuntimeReplanner;
pub use token::TokenPassing;
pub use traffic::TrafficSimulator;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{Algorithm, Deadline, Params};
use crate::error::PlannerError;
use crate::plan::CommonPlan;
use crate::scenario::Scenario;

/// A planner attempt. `Ok(None)` means the scenario was not solved within
/// the given budgets; errors are reserved for timeouts and genuine faults.
pub trait Solver {
    fn solve(
        &mut self,
        scenario: &Scenario,
        params: &Params,
        deadline: &Deadline,
    ) -> Result<Option<CommonPlan>, PlannerError>;
}

/// Runs the algorithm selected in `params` on the scenario.
pub fn mapf(
    scenario: &Scenario,
    params: &Params,
    deadline: &Deadline,
) -> Result<Option<CommonPlan>, PlannerError> {
    let rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match params.algorithm {
        Algorithm::CaStar => CooperativeAStar::new(rng).solve(scenario, params, deadline),
        Algorithm::TokenPassing => TokenPassing::new().solve(scenario, params, deadline),
        Algorithm::EnhancedHierarchicalPlanner => {
            HierarchicalPlanner::new().solve(scenario, params, deadline)
        }
        Algorithm::RuntimeReplanner => {
            RuntimeReplanner::new(rng, false).solve(scenario, params, deadline)
        }
        Algorithm::AlternatingRuntimeReplanner => {
            RuntimeReplanner::new(rng, true).solve(scenario, params, deadline)
        }
        Algorithm::TrafficSimulator => TrafficSimulator::new().solve(scenario, params, deadline),
    }
}
