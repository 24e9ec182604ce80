//! Dense two-phase primal simplex.
//!
//! Every row is normalized to a non-negative right-hand side before the
//! tableau is built, so slack and artificial columns always form a feasible
//! starting basis for phase one.

use crate::problem::{ConstraintOp, LpProblem};
use crate::solution::{Solution, SolutionStatus};

#[derive(Debug, Clone)]
pub struct Simplex {
    /// Pivot budget per phase
    max_iterations: usize,
    tolerance: f64,
}

impl Default for Simplex {
    fn default() -> Self {
        Self {
            max_iterations: 10000,
            tolerance: 1e-9,
        }
    }
}

impl Simplex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn solve(&self, problem: &LpProblem) -> Solution {
        let mut tableau = Tableau::standard_form(problem);
        let mut pivots = 0;

        // Phase two never lets an artificial re-enter
        let limit = tableau.artificial_start();
        let outcome = self
            .phase_one(&mut tableau, &mut pivots)
            .and_then(|()| self.iterate(&mut tableau, limit, &mut pivots));
        if let Err(status) = outcome {
            return Solution::failed(status, pivots);
        }

        let values = tableau.primal(problem.num_variables());
        Solution {
            status: SolutionStatus::Optimal,
            objective_value: problem.evaluate(&values),
            values,
            pivots,
        }
    }

    /// Reach a basis free of positive artificials, then restore the real
    /// objective priced against that basis
    fn phase_one(&self, tableau: &mut Tableau, pivots: &mut usize) -> Result<(), SolutionStatus> {
        if tableau.artificial == 0 {
            return Ok(());
        }

        let m = tableau.constraints();
        let start = tableau.artificial_start();
        let rhs_col = tableau.rhs_col();

        // Maximize −Σ artificials
        let objective = tableau.row(m).to_vec();
        let auxiliary = tableau.row_mut(m);
        auxiliary.fill(0.0);
        auxiliary[start..rhs_col].fill(-1.0);
        for i in 0..m {
            if tableau.basis[i] >= start {
                tableau.eliminate(m, i, -1.0);
            }
        }

        match self.iterate(tableau, rhs_col, pivots) {
            Ok(()) => {}
            // The auxiliary objective is bounded above by zero
            Err(SolutionStatus::Unbounded) => return Err(SolutionStatus::Infeasible),
            Err(status) => return Err(status),
        }

        let residual = self.tolerance.sqrt();
        if (0..m).any(|i| tableau.basis[i] >= start && tableau.rhs(i).abs() > residual) {
            return Err(SolutionStatus::Infeasible);
        }

        // Artificials still basic sit at zero. Swap each for any non-artificial
        // column with a nonzero entry; rows without one are redundant.
        for i in 0..m {
            if tableau.basis[i] < start {
                continue;
            }
            if let Some(col) = (0..start).find(|&j| tableau.at(i, j).abs() > self.tolerance) {
                tableau.row_mut(i)[rhs_col] = 0.0;
                tableau.pivot(i, col);
                *pivots += 1;
            }
        }

        tableau.row_mut(m).copy_from_slice(&objective);
        for i in 0..m {
            let cost = tableau.at(m, tableau.basis[i]);
            if cost != 0.0 {
                tableau.eliminate(m, i, cost);
            }
        }
        Ok(())
    }

    /// Pivot until no column below `limit` has a positive reduced cost.
    ///
    /// Dantzig's rule picks the entering column; after a degenerate pivot
    /// Bland's rule takes over so the method cannot cycle.
    fn iterate(&self, tableau: &mut Tableau, limit: usize, pivots: &mut usize) -> Result<(), SolutionStatus> {
        let mut degenerate = false;
        for _ in 0..self.max_iterations {
            let Some(col) = tableau.entering(limit, degenerate, self.tolerance) else {
                return Ok(());
            };
            let Some((row, ratio)) = tableau.ratio_test(col, self.tolerance) else {
                return Err(SolutionStatus::Unbounded);
            };
            degenerate = ratio <= self.tolerance;
            tableau.pivot(row, col);
            *pivots += 1;
        }
        Err(SolutionStatus::IterationLimit)
    }
}

/// Row-major tableau: constraint rows, then the objective row. Columns are
/// structural variables, slacks/surpluses, artificials, then the RHS.
struct Tableau {
    cells: Vec<f64>,
    width: usize,
    /// Basic column of each constraint row
    basis: Vec<usize>,
    structural: usize,
    slack: usize,
    artificial: usize,
}

impl Tableau {
    fn standard_form(problem: &LpProblem) -> Self {
        let rows: Vec<(f64, ConstraintOp)> = problem
            .constraints
            .iter()
            .map(|c| if c.rhs < 0.0 { (-1.0, c.op.flipped()) } else { (1.0, c.op) })
            .collect();

        let structural = problem.num_variables();
        let slack = rows.iter().filter(|(_, op)| *op != ConstraintOp::Eq).count();
        let artificial = rows.iter().filter(|(_, op)| *op != ConstraintOp::Le).count();
        let width = structural + slack + artificial + 1;

        let mut tableau = Self {
            cells: vec![0.0; (rows.len() + 1) * width],
            width,
            basis: vec![0; rows.len()],
            structural,
            slack,
            artificial,
        };

        let mut next_slack = structural;
        let mut next_artificial = structural + slack;
        for (i, (constraint, &(sign, op))) in problem.constraints.iter().zip(&rows).enumerate() {
            let row = tableau.row_mut(i);
            for (cell, &coef) in row.iter_mut().zip(&constraint.coefficients) {
                *cell = sign * coef;
            }
            row[width - 1] = sign * constraint.rhs;

            let basic = match op {
                ConstraintOp::Le => {
                    row[next_slack] = 1.0;
                    next_slack += 1;
                    next_slack - 1
                }
                ConstraintOp::Ge => {
                    row[next_slack] = -1.0;
                    next_slack += 1;
                    row[next_artificial] = 1.0;
                    next_artificial += 1;
                    next_artificial - 1
                }
                ConstraintOp::Eq => {
                    row[next_artificial] = 1.0;
                    next_artificial += 1;
                    next_artificial - 1
                }
            };
            tableau.basis[i] = basic;
        }

        // Reduced costs of the equivalent maximization
        let sense = if problem.objective.minimize { -1.0 } else { 1.0 };
        let m = tableau.constraints();
        for (cell, &coef) in tableau.row_mut(m).iter_mut().zip(&problem.objective.coefficients) {
            *cell = sense * coef;
        }

        tableau
    }

    fn constraints(&self) -> usize {
        self.basis.len()
    }

    fn rhs_col(&self) -> usize {
        self.width - 1
    }

    fn artificial_start(&self) -> usize {
        self.structural + self.slack
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self.cells[row * self.width + col]
    }

    fn rhs(&self, row: usize) -> f64 {
        self.at(row, self.rhs_col())
    }

    fn row(&self, row: usize) -> &[f64] {
        &self.cells[row * self.width..(row + 1) * self.width]
    }

    fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.cells[row * self.width..(row + 1) * self.width]
    }

    /// `dst -= factor × src`
    fn eliminate(&mut self, dst: usize, src: usize, factor: f64) {
        if dst == src || factor == 0.0 {
            return;
        }
        let (dst, src) = (dst * self.width, src * self.width);
        for j in 0..self.width {
            self.cells[dst + j] -= factor * self.cells[src + j];
        }
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let scale = self.at(row, col);
        for cell in self.row_mut(row) {
            *cell /= scale;
        }
        for i in 0..=self.constraints() {
            let factor = self.at(i, col);
            self.eliminate(i, row, factor);
        }
        self.basis[row] = col;
    }

    /// Entering column below `limit`: the largest reduced cost (first on
    /// ties), or under Bland's rule the first improving column
    fn entering(&self, limit: usize, bland: bool, tolerance: f64) -> Option<usize> {
        let costs = &self.row(self.constraints())[..limit];
        if bland {
            return costs.iter().position(|&c| c > tolerance);
        }
        costs
            .iter()
            .enumerate()
            .rev()
            .filter(|&(_, &c)| c > tolerance)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(j, _)| j)
    }

    /// Leaving row for `col` by minimum ratio; near-ties go to the row whose
    /// basic column has the lowest index
    fn ratio_test(&self, col: usize, tolerance: f64) -> Option<(usize, f64)> {
        (0..self.constraints())
            .filter(|&i| self.at(i, col) > tolerance)
            .map(|i| (i, self.rhs(i).max(0.0) / self.at(i, col)))
            .fold(None, |best, (i, ratio)| match best {
                Some((row, min)) if ratio > min + tolerance => Some((row, min)),
                Some((row, min)) if ratio >= min - tolerance && self.basis[i] >= self.basis[row] => {
                    Some((row, min))
                }
                _ => Some((i, ratio)),
            })
    }

    /// Values of the first `n` columns at the current basis
    fn primal(&self, n: usize) -> Vec<f64> {
        let mut values = vec![0.0; n];
        for (i, &col) in self.basis.iter().enumerate() {
            if col < n {
                values[col] = self.rhs(i).max(0.0);
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::LpProblem;

    #[test]
    fn test_simple_maximization() {
        // Maximize: 3x + 2y
        // Subject to:
        //   x + y <= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=11
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![3.0, 2.0], false);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Le, 4.0);
        problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0);
        problem.add_constraint("y_max", vec![0.0, 1.0], ConstraintOp::Le, 3.0);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
        assert!((solution.objective_value - 11.0).abs() < 1e-6, "obj = {} (expected 11)", solution.objective_value);
    }

    #[test]
    fn test_minimization_with_ge() {
        // Minimize: 2x + 3y
        // Subject to:
        //   x + y >= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=9
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![2.0, 3.0], true);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Ge, 4.0);
        problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0);
        problem.add_constraint("y_max", vec![0.0, 1.0], ConstraintOp::Le, 3.0);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
        assert!((solution.objective_value - 9.0).abs() < 1e-6, "obj = {} (expected 9)", solution.objective_value);
    }

    #[test]
    fn test_infeasible() {
        // x >= 5
        // x <= 3
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], true);
        problem.add_constraint("lower", vec![1.0], ConstraintOp::Ge, 5.0);
        problem.add_constraint("upper", vec![1.0], ConstraintOp::Le, 3.0);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Infeasible);
    }

    #[test]
    fn test_unbounded() {
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![1.0, 1.0], false);
        problem.add_constraint("diff", vec![1.0, -1.0], ConstraintOp::Le, 2.0);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Unbounded);
    }

    #[test]
    fn test_negative_rhs_and_equality() {
        // Maximize: x + 2y
        // Subject to:
        //   x + y = 5
        //   -y >= -3      (y <= 3)
        //   -x <= -1      (x >= 1)
        // Optimal: x=2, y=3, obj=8
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![1.0, 2.0], false);
        problem.add_constraint("total", vec![1.0, 1.0], ConstraintOp::Eq, 5.0);
        problem.add_constraint("y_cap", vec![0.0, -1.0], ConstraintOp::Ge, -3.0);
        problem.add_constraint("x_floor", vec![-1.0, 0.0], ConstraintOp::Le, -1.0);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 2.0).abs() < 1e-6);
        assert!((solution.values[1] - 3.0).abs() < 1e-6);
        assert!((solution.objective_value - 8.0).abs() < 1e-6);
        assert!(problem.violations(&solution.values, 1e-6).is_empty());
    }

    #[test]
    fn test_redundant_equalities() {
        // The second row repeats the first, leaving an artificial in a redundant row
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![1.0, 0.0], false);
        problem.add_constraint("a", vec![1.0, 1.0], ConstraintOp::Eq, 1.0);
        problem.add_constraint("b", vec![2.0, 2.0], ConstraintOp::Eq, 2.0);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.objective_value - 1.0).abs() < 1e-6);
    }
}
