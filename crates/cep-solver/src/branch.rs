use std::time::{Duration, Instant};

use thiserror::Error;

use crate::problem::{ConstraintOp, LpProblem, MipProblem};
use crate::simplex::Simplex;
use crate::solution::SolutionStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MipError {
    #[error("Problem has no integer-feasible solution")]
    Infeasible,
    #[error("LP relaxation is unbounded")]
    Unbounded,
    #[error("No integer-feasible solution found within {0:?}")]
    TimeLimit(Duration),
    #[error("No integer-feasible solution found within {0} nodes")]
    NodeLimit(usize),
    #[error("LP relaxation exceeded its pivot budget")]
    IterationLimit,
}

/// Resource limits for a single MIP solve
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct SolveLimits {
    pub time_limit: Option<Duration>,
    pub node_limit: Option<usize>,
}

impl SolveLimits {
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_node_limit(mut self, limit: usize) -> Self {
        self.node_limit = Some(limit);
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipStatus {
    /// The search tree was exhausted; the incumbent is optimal
    Optimal,
    /// The time limit stopped the search after an incumbent was found
    TimeLimit,
    /// The node limit stopped the search after an incumbent was found
    NodeLimit,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct MipSolution {
    pub status: MipStatus,
    pub values: Vec<f64>,
    pub objective_value: f64,
    /// Branch-and-bound nodes whose relaxation was solved
    pub nodes: usize,
}

/// Capability interface for mixed-integer backends
pub trait MipSolver {
    fn solve(&self, problem: &MipProblem, limits: &SolveLimits) -> Result<MipSolution, MipError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Depth-first branch and bound over the two-phase simplex
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    simplex: Simplex,
    /// Distance from the nearest integer still accepted as integral
    integrality_tolerance: f64,
    /// Relative gap under which a node cannot improve the incumbent
    gap_tolerance: f64,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self {
            simplex: Simplex::new().with_max_iterations(50_000),
            integrality_tolerance: 1e-6,
            gap_tolerance: 1e-9,
        }
    }
}

/// Per-variable `(lower, upper)` bounds of one subtree
struct Node {
    bounds: Vec<(f64, f64)>,
}

impl Node {
    fn root(problem: &MipProblem) -> Self {
        let bounds = (0..problem.lp.num_variables())
            .map(|var| (0.0, problem.upper_bound(var)))
            .collect();
        Self { bounds }
    }

    fn is_fixed(&self, var: usize) -> bool {
        let (lower, upper) = self.bounds[var];
        lower == upper
    }

    /// Children that partition this node's range for `var` around `value`.
    /// The last child is the one to explore first.
    fn split(&self, var: usize, value: f64) -> Vec<Node> {
        let (lower, upper) = self.bounds[var];
        let value = value.clamp(lower, upper);
        let (floor, ceil) = (value.floor(), value.ceil());

        let ranges = if floor == ceil {
            vec![(lower, floor - 1.0), (floor + 1.0, upper), (floor, floor)]
        } else if value - floor >= 0.5 {
            vec![(lower, floor), (ceil, upper)]
        } else {
            vec![(ceil, upper), (lower, floor)]
        };

        ranges
            .into_iter()
            .filter(|&(lo, hi)| lo <= hi)
            .map(|range| {
                let mut bounds = self.bounds.clone();
                bounds[var] = range;
                Node { bounds }
            })
            .collect()
    }
}

struct Incumbent {
    values: Vec<f64>,
    score: f64,
}

/// Relative rounding slack for rows whose every column has been fixed
const FIXED_ROW_TOLERANCE: f64 = 1e-12;

/// The relaxation of `problem` under `bounds`. Fixed integer columns are
/// substituted out; rows left without variables are checked to rounding
/// precision and dropped. `None` when one of those rows is violated.
fn restrict(problem: &MipProblem, bounds: &[(f64, f64)]) -> Option<LpProblem> {
    let mut lp = problem.lp.clone();
    let mut scale: Vec<f64> = lp.constraints.iter().map(|c| c.rhs.abs()).collect();
    for &var in &problem.integers {
        let (lower, upper) = bounds[var];
        if lower != upper {
            continue;
        }
        for (constraint, scale) in lp.constraints.iter_mut().zip(&mut scale) {
            let shift = constraint.coefficients[var] * lower;
            constraint.rhs -= shift;
            *scale += shift.abs();
            constraint.coefficients[var] = 0.0;
        }
        lp.objective.coefficients[var] = 0.0;
    }

    let mut kept = Vec::with_capacity(lp.constraints.len());
    for (constraint, scale) in lp.constraints.into_iter().zip(scale) {
        if constraint.coefficients.iter().any(|&coef| coef != 0.0) {
            kept.push(constraint);
            continue;
        }
        let slack = FIXED_ROW_TOLERANCE * scale.max(1.0);
        let holds = match constraint.op {
            ConstraintOp::Le => constraint.rhs >= -slack,
            ConstraintOp::Ge => constraint.rhs <= slack,
            ConstraintOp::Eq => constraint.rhs.abs() <= slack,
        };
        if !holds {
            return None;
        }
    }
    lp.constraints = kept;

    for &var in &problem.integers {
        let (lower, upper) = bounds[var];
        if lower == upper {
            continue;
        }
        if lower > 0.0 {
            let name = format!("branch_{}_lo", lp.variables[var]);
            lp.add_sparse_constraint(name, &[(var, 1.0)], ConstraintOp::Ge, lower);
        }
        if upper < problem.upper_bound(var) {
            let name = format!("branch_{}_hi", lp.variables[var]);
            lp.add_sparse_constraint(name, &[(var, 1.0)], ConstraintOp::Le, upper);
        }
    }
    Some(lp)
}

impl BranchAndBound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_simplex(mut self, simplex: Simplex) -> Self {
        self.simplex = simplex;
        self
    }

    pub fn with_integrality_tolerance(mut self, tol: f64) -> Self {
        self.integrality_tolerance = tol;
        self
    }

    pub fn with_gap_tolerance(mut self, tol: f64) -> Self {
        self.gap_tolerance = tol;
        self
    }

    fn feasibility_tolerance(&self) -> f64 {
        self.simplex.tolerance().sqrt()
    }

    /// Solve the relaxation at `bounds`, with fixed columns reported at
    /// their fixed value. `Ok(None)` when it is infeasible.
    fn relax(&self, problem: &MipProblem, bounds: &[(f64, f64)]) -> Result<Option<Vec<f64>>, MipError> {
        let Some(lp) = restrict(problem, bounds) else {
            return Ok(None);
        };
        let relaxation = self.simplex.solve(&lp);
        match relaxation.status {
            SolutionStatus::Optimal => {}
            SolutionStatus::Infeasible => return Ok(None),
            SolutionStatus::Unbounded => return Err(MipError::Unbounded),
            SolutionStatus::IterationLimit => return Err(MipError::IterationLimit),
        }

        let mut values = relaxation.values;
        for &var in &problem.integers {
            let (lower, upper) = bounds[var];
            if lower == upper {
                values[var] = lower;
            }
        }
        Ok(Some(values))
    }

    /// The unfixed integer variable farthest from integrality, if that
    /// distance exceeds `threshold`. Values are clamped into the node's
    /// bounds first, so a fixed column never qualifies.
    fn most_fractional(&self, problem: &MipProblem, node: &Node, values: &[f64], threshold: f64) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64, f64)> = None;
        for &j in &problem.integers {
            if node.is_fixed(j) {
                continue;
            }
            let (lower, upper) = node.bounds[j];
            let value = values[j].clamp(lower, upper);
            let frac = (value - value.floor()).min(value.ceil() - value);
            if frac > threshold && best.is_none_or(|(_, _, f)| frac > f) {
                best = Some((j, value, frac));
            }
        }
        best.map(|(j, v, _)| (j, v))
    }

    /// Round every integer column of a near-integral point and re-solve for
    /// the continuous columns. `None` when the rounded point is infeasible.
    fn complete(&self, problem: &MipProblem, node: &Node, values: &[f64]) -> Result<Option<Vec<f64>>, MipError> {
        let mut bounds = node.bounds.clone();
        for &j in &problem.integers {
            let (lower, upper) = bounds[j];
            let rounded = values[j].round().clamp(lower, upper);
            bounds[j] = (rounded, rounded);
        }

        let Some(values) = self.relax(problem, &bounds)? else {
            return Ok(None);
        };
        if let Some(worst) = problem.lp.violations(&values, self.feasibility_tolerance()).first() {
            tracing::warn!(violation = %worst, "rounded point violates the model");
            return Ok(None);
        }
        Ok(Some(values))
    }

    fn can_improve(&self, bound: f64, incumbent: &Option<Incumbent>) -> bool {
        match incumbent {
            None => true,
            Some(inc) => bound > inc.score + self.gap_tolerance * inc.score.abs().max(1.0),
        }
    }
}

impl MipSolver for BranchAndBound {
    fn solve(&self, problem: &MipProblem, limits: &SolveLimits) -> Result<MipSolution, MipError> {
        let started = Instant::now();
        let sense = if problem.lp.objective.minimize { -1.0 } else { 1.0 };

        let mut stack = vec![Node::root(problem)];
        let mut incumbent: Option<Incumbent> = None;
        let mut nodes = 0usize;
        let mut stopped = None;

        while let Some(node) = stack.pop() {
            if let Some(limit) = limits.time_limit {
                if started.elapsed() >= limit {
                    stopped = Some(MipStatus::TimeLimit);
                    break;
                }
            }
            if let Some(limit) = limits.node_limit {
                if nodes >= limit {
                    stopped = Some(MipStatus::NodeLimit);
                    break;
                }
            }

            let relaxed = self.relax(problem, &node.bounds)?;
            nodes += 1;
            let Some(values) = relaxed else {
                continue;
            };

            let bound = sense * problem.lp.evaluate(&values);
            if !self.can_improve(bound, &incumbent) {
                continue;
            }

            if let Some((var, value)) = self.most_fractional(problem, &node, &values, self.integrality_tolerance) {
                stack.extend(node.split(var, value));
                continue;
            }

            match self.complete(problem, &node, &values)? {
                Some(values) => {
                    let score = sense * problem.lp.evaluate(&values);
                    if self.can_improve(score, &incumbent) {
                        tracing::debug!(node = nodes, objective = problem.lp.evaluate(&values), "new incumbent");
                        incumbent = Some(Incumbent { values, score });
                    }
                }
                // Rounding broke feasibility; keep splitting on unfixed columns
                None => {
                    if let Some((var, value)) = self.most_fractional(problem, &node, &values, -1.0) {
                        stack.extend(node.split(var, value));
                    }
                }
            }
        }

        match (incumbent, stopped) {
            (Some(inc), status) => Ok(MipSolution {
                status: status.unwrap_or(MipStatus::Optimal),
                objective_value: problem.lp.evaluate(&inc.values),
                values: inc.values,
                nodes,
            }),
            (None, Some(MipStatus::TimeLimit)) => {
                Err(MipError::TimeLimit(limits.time_limit.unwrap_or_default()))
            }
            (None, Some(MipStatus::NodeLimit)) => Err(MipError::NodeLimit(nodes)),
            (None, _) => Err(MipError::Infeasible),
        }
    }

    fn name(&self) -> &str {
        "branch-and-bound"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knapsack() -> MipProblem {
        // Maximize 5a + 4b + 3c subject to 2a + 3b + c <= 5, binaries.
        // Relaxation is fractional; the integer optimum takes a and b for 9.
        let mut mip = MipProblem::new(LpProblem::new(Vec::new()));
        let a = mip.add_binary("a");
        let b = mip.add_binary("b");
        let c = mip.add_binary("c");
        mip.lp.objective.minimize = false;
        mip.lp.objective.coefficients[a] = 5.0;
        mip.lp.objective.coefficients[b] = 4.0;
        mip.lp.objective.coefficients[c] = 3.0;
        mip.lp.add_sparse_constraint("weight", &[(a, 2.0), (b, 3.0), (c, 1.0)], ConstraintOp::Le, 5.0);
        mip
    }

    #[test]
    fn test_knapsack_optimum() {
        let solution = BranchAndBound::new().solve(&knapsack(), &SolveLimits::default()).unwrap();

        assert_eq!(solution.status, MipStatus::Optimal);
        assert!((solution.objective_value - 9.0).abs() < 1e-6);
        assert_eq!(solution.values, vec![1.0, 1.0, 0.0]);
        assert!(solution.nodes > 1);
    }

    #[test]
    fn test_general_integer_minimization() {
        // Minimize x + y subject to 2x + 2y >= 5 with integer x, y: optimum 3
        let mut mip = MipProblem::new(LpProblem::new(vec!["x".to_string(), "y".to_string()]));
        mip.integers = vec![0, 1];
        mip.lp.set_objective(vec![1.0, 1.0], true);
        mip.lp.add_constraint("cover", vec![2.0, 2.0], ConstraintOp::Ge, 5.0);

        let solution = BranchAndBound::new().solve(&mip, &SolveLimits::default()).unwrap();

        assert!((solution.objective_value - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_binaries() {
        let mut mip = MipProblem::new(LpProblem::new(Vec::new()));
        let x = mip.add_binary("x");
        let y = mip.add_binary("y");
        mip.lp.add_sparse_constraint("too_many", &[(x, 1.0), (y, 1.0)], ConstraintOp::Ge, 3.0);

        let err = BranchAndBound::new().solve(&mip, &SolveLimits::default()).unwrap_err();
        assert_eq!(err, MipError::Infeasible);
    }

    #[test]
    fn test_integer_infeasible_but_relaxation_feasible() {
        // 2x = 1 has the relaxed solution x = 0.5 and no integer one
        let mut mip = MipProblem::new(LpProblem::new(Vec::new()));
        let x = mip.add_binary("x");
        mip.lp.add_sparse_constraint("half", &[(x, 2.0)], ConstraintOp::Eq, 1.0);

        let err = BranchAndBound::new().solve(&mip, &SolveLimits::default()).unwrap_err();
        assert_eq!(err, MipError::Infeasible);
    }

    #[test]
    fn test_limits_without_incumbent() {
        let limits = SolveLimits::default().with_time_limit(Duration::ZERO);
        let err = BranchAndBound::new().solve(&knapsack(), &limits).unwrap_err();
        assert_eq!(err, MipError::TimeLimit(Duration::ZERO));

        let limits = SolveLimits::default().with_node_limit(0);
        let err = BranchAndBound::new().solve(&knapsack(), &limits).unwrap_err();
        assert_eq!(err, MipError::NodeLimit(0));
    }

    fn ranges(children: &[Node], var: usize) -> Vec<(f64, f64)> {
        children.iter().map(|child| child.bounds[var]).collect()
    }

    #[test]
    fn test_split_strictly_tightens() {
        let node = Node::root(&knapsack());

        // Nearer the floor: the down child is explored first
        assert_eq!(ranges(&node.split(1, 0.4), 1), vec![(1.0, 1.0), (0.0, 0.0)]);
        assert_eq!(ranges(&node.split(1, 0.7), 1), vec![(0.0, 0.0), (1.0, 1.0)]);
        // Noise just off an integer still splits into disjoint children
        assert_eq!(ranges(&node.split(1, 1e-7), 1), vec![(1.0, 1.0), (0.0, 0.0)]);
        // An integral value is isolated and tried first
        assert_eq!(ranges(&node.split(1, 1.0), 1), vec![(0.0, 0.0), (1.0, 1.0)]);
        assert_eq!(ranges(&node.split(1, 1.0000001), 1), vec![(0.0, 0.0), (1.0, 1.0)]);
    }

    #[test]
    fn test_fixed_column_never_branched() {
        let mip = knapsack();
        let solver = BranchAndBound::new();
        let mut node = Node::root(&mip);
        node.bounds[0] = (0.0, 0.0);

        // The relaxation leaked 1e-4 into a fixed column
        let values = [1e-4, 1.0, 0.0];
        assert_eq!(solver.most_fractional(&mip, &node, &values, 1e-9), None);
        assert_eq!(solver.most_fractional(&mip, &node, &values, -1.0), Some((1, 1.0)));
    }

    #[test]
    fn test_fixed_columns_substituted_out() {
        let mut mip = MipProblem::new(LpProblem::new(Vec::new()));
        let x = mip.add_binary("x");
        let y = mip.add_continuous("y");
        mip.lp.add_sparse_constraint("cap", &[(x, 1.0), (y, 1.0)], ConstraintOp::Le, 1.5);
        mip.lp.add_sparse_constraint("need", &[(x, 2.0)], ConstraintOp::Ge, 1.0);

        let lp = restrict(&mip, &[(1.0, 1.0), (0.0, f64::INFINITY)]).unwrap();
        // x_ub and need lost every variable and hold, so they are dropped
        assert_eq!(lp.num_constraints(), 1);
        assert_eq!(lp.constraints[0].name, "cap");
        assert_eq!(lp.constraints[0].coefficients, vec![0.0, 1.0]);
        assert!((lp.constraints[0].rhs - 0.5).abs() < 1e-12);

        // need becomes 0 >= 1
        assert!(restrict(&mip, &[(0.0, 0.0), (0.0, f64::INFINITY)]).is_none());

        let values = BranchAndBound::new().relax(&mip, &[(1.0, 1.0), (0.0, f64::INFINITY)]).unwrap();
        assert_eq!(values.map(|v| v[x]), Some(1.0));
    }

    #[test]
    fn test_big_m_assignment_terminates() {
        // Two items into two bins with a big-M switch per bin: the
        // relaxation spreads tiny amounts across every binary
        let mut mip = MipProblem::new(LpProblem::new(Vec::new()));
        mip.lp.objective.minimize = false;
        let weights = [247.0, 393.0, 477.0];
        let big_m = 10_000.0;
        let x: Vec<Vec<usize>> = (0..3)
            .map(|i| (0..2).map(|g| mip.add_binary(format!("x_{i}_{g}"))).collect())
            .collect();
        for (i, row) in x.iter().enumerate() {
            let terms: Vec<(usize, f64)> = row.iter().map(|&v| (v, 1.0)).collect();
            mip.lp.add_sparse_constraint(format!("assign_{i}"), &terms, ConstraintOp::Eq, 1.0);
        }
        for g in 0..2 {
            let open = mip.add_binary(format!("open_{g}"));
            let value = mip.add_continuous(format!("w_{g}"));
            mip.lp.objective.coefficients[value] = 1.0;
            let mut terms: Vec<(usize, f64)> = x.iter().zip(&weights).map(|(row, &w)| (row[g], -w)).collect();
            terms.push((value, 1.0));
            terms.push((open, big_m));
            mip.lp.add_sparse_constraint(format!("value_{g}"), &terms, ConstraintOp::Le, big_m);
            let mut cap: Vec<(usize, f64)> = x.iter().zip(&weights).map(|(row, &w)| (row[g], w)).collect();
            cap.push((open, -700.0));
            mip.lp.add_sparse_constraint(format!("cap_{g}"), &cap, ConstraintOp::Le, 0.0);
        }

        let limits = SolveLimits::default().with_node_limit(10_000);
        let solution = BranchAndBound::new().solve(&mip, &limits).unwrap();

        assert_eq!(solution.status, MipStatus::Optimal);
        assert!(solution.nodes < 10_000);
        assert!(mip.is_integral(&solution.values, 0.0));
        assert!(mip.lp.violations(&solution.values, 1e-6).is_empty());
    }
}
