//! Formulations which turn a resource model into bids.
//!
//! * [`exclusive_lp`] selects exclusive bids among the optimal dispatches of each scenario.
//! * [`exclusive_milp`] and [`ungrouped_milp`] design bid quantities and prices jointly with the
//!   dispatch, using a big-M reformulation of the clearing rules.
//! * [`self_schedule`] commits to a single dispatch for every scenario.
use crate::bid::BidSet;
use crate::solver::SolveStatus;
use std::time::Duration;

pub mod exclusive_lp;
pub mod milp;
pub mod self_schedule;
pub use exclusive_lp::exclusive_lp;
pub use milp::{BigM, exclusive_milp, ungrouped_milp};
pub use self_schedule::{SelfSchedule, self_schedule};

/// Tolerance used when reading binary selection indicators from a solution
pub const SELECTION_RANGE: std::ops::Range<f64> = 0.99..1.01;

/// Whether a binary indicator in a solution is set
pub fn is_selected(value: f64) -> bool {
    SELECTION_RANGE.start < value && value < SELECTION_RANGE.end
}

/// The bids produced by a formulation
#[derive(Debug, Clone)]
pub struct BidResult {
    /// The bids
    pub bids: BidSet,
    /// Objective value of the final solve
    pub objective: f64,
    /// How the solve(s) terminated
    pub status: SolveStatus,
    /// Total time spent in the solver
    pub runtime: Duration,
}
