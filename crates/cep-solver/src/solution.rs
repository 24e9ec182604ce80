use std::fmt;

use crate::problem::ConstraintOp;

/// Outcome of one LP solve
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolutionStatus,
    /// Primal values, one per variable; empty unless `status` is `Optimal`
    pub values: Vec<f64>,
    /// Objective at `values` in the problem's own sense (NaN when not optimal)
    pub objective_value: f64,
    /// Pivots performed across both phases
    pub pivots: usize,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    Optimal,
    /// No point satisfies every constraint
    Infeasible,
    /// The objective improves without limit
    Unbounded,
    /// The pivot budget ran out before optimality was proven
    IterationLimit,
}

impl Solution {
    /// A solve that ended without an optimal point
    pub fn failed(status: SolutionStatus, pivots: usize) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective_value: f64::NAN,
            pivots,
        }
    }
}

/// A constraint that a candidate point fails to satisfy
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintViolation {
    pub constraint: String,
    pub op: ConstraintOp,
    pub rhs: f64,
    /// Left-hand side evaluated at the point
    pub lhs: f64,
    /// Distance to feasibility, always positive
    pub amount: f64,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relation = match self.op {
            ConstraintOp::Le => "<=",
            ConstraintOp::Ge => ">=",
            ConstraintOp::Eq => "=",
        };
        write!(
            f,
            "{}: {:.6} {} {:.6} violated by {:.6}",
            self.constraint, self.lhs, relation, self.rhs, self.amount
        )
    }
}
