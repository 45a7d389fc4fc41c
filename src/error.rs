use thiserror::Error;

use crate::grid::Position;

/// Faults a planner run can surface. Unsolvable scenarios are not errors;
/// they are reported as an absent common plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("planning deadline exceeded")]
    Timeout,

    /// The true-distance oracle was asked about a cell it never computed.
    /// Only endpoint distances are precomputed, so this is a programming
    /// error rather than an unsolvable instance.
    #[error("true distance table lookup failed for ({}, {})", .0.x, .0.y)]
    DistanceTableMiss(Position),
}

/// A validator finding, carrying a message that names the offending
/// agent and tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid plan: {0}")]
pub struct InvalidPlanError(pub String);
