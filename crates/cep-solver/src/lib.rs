mod branch;
mod problem;
mod simplex;
mod solution;

pub use branch::{BranchAndBound, MipError, MipSolution, MipSolver, MipStatus, SolveLimits};
pub use problem::{Constraint, ConstraintOp, LpProblem, MipProblem, Objective};
pub use simplex::Simplex;
pub use solution::{ConstraintViolation, Solution, SolutionStatus};
