//! The A* family shared by every planner: a space-time engine with waiting,
//! an untimed engine over the raw edge graph, and the modulo-2f variant for
//! maps with alternating edge directions.

pub mod alternating;
pub mod timed;
pub mod untimed;

pub use alternating::alternating_search;
pub use timed::timed_search;
pub use untimed::{min_cost, shortest_path};
