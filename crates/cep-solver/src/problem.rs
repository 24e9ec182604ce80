use crate::solution::ConstraintViolation;

/// Represents a linear programming problem over non-negative variables
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct LpProblem {
    /// One name per column; also sizes every coefficient vector
    pub variables: Vec<String>,
    /// Objective function coefficients
    pub objective: Objective,
    pub constraints: Vec<Constraint>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Objective {
    pub coefficients: Vec<f64>,
    /// Minimize when true, maximize otherwise
    pub minimize: bool,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Row label, reported in violations and logs
    pub name: String,
    /// Dense row, one entry per variable
    pub coefficients: Vec<f64>,
    pub op: ConstraintOp,
    pub rhs: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

impl ConstraintOp {
    /// The operator obtained by multiplying both sides by -1
    pub fn flipped(self) -> Self {
        match self {
            ConstraintOp::Le => ConstraintOp::Ge,
            ConstraintOp::Ge => ConstraintOp::Le,
            ConstraintOp::Eq => ConstraintOp::Eq,
        }
    }
}

impl LpProblem {
    pub fn new(variables: Vec<String>) -> Self {
        let n = variables.len();
        Self {
            variables,
            objective: Objective {
                coefficients: vec![0.0; n],
                minimize: true,
            },
            constraints: Vec::new(),
        }
    }

    pub fn set_objective(&mut self, coefficients: Vec<f64>, minimize: bool) {
        self.objective = Objective { coefficients, minimize };
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, coefficients: Vec<f64>, op: ConstraintOp, rhs: f64) {
        self.constraints.push(Constraint {
            name: name.into(),
            coefficients,
            op,
            rhs,
        });
    }

    /// Add a constraint given as sparse `(variable, coefficient)` terms
    pub fn add_sparse_constraint(
        &mut self,
        name: impl Into<String>,
        terms: &[(usize, f64)],
        op: ConstraintOp,
        rhs: f64,
    ) {
        let mut coefficients = vec![0.0; self.num_variables()];
        for &(var, coef) in terms {
            coefficients[var] += coef;
        }
        self.add_constraint(name, coefficients, op, rhs);
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Objective value of an assignment, in the problem's own sense
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.objective
            .coefficients
            .iter()
            .zip(values)
            .map(|(c, v)| c * v)
            .sum()
    }

    /// Constraints violated by `values` beyond `tolerance`, worst first
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<ConstraintViolation> {
        let mut violations: Vec<ConstraintViolation> = self
            .constraints
            .iter()
            .filter_map(|c| {
                let lhs: f64 = c.coefficients.iter().zip(values).map(|(coef, v)| coef * v).sum();
                let amount = match c.op {
                    ConstraintOp::Le => lhs - c.rhs,
                    ConstraintOp::Ge => c.rhs - lhs,
                    ConstraintOp::Eq => (lhs - c.rhs).abs(),
                };
                (amount > tolerance).then(|| ConstraintViolation {
                    constraint: c.name.clone(),
                    op: c.op,
                    rhs: c.rhs,
                    lhs,
                    amount,
                })
            })
            .collect();

        violations.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        violations
    }
}

/// A linear program in which some variables must take integer values
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct MipProblem {
    pub lp: LpProblem,
    /// Indices of integer-constrained variables
    pub integers: Vec<usize>,
    /// Known upper bound per variable, infinite unless set by `add_binary`
    pub upper_bounds: Vec<f64>,
}

impl MipProblem {
    pub fn new(lp: LpProblem) -> Self {
        let upper_bounds = vec![f64::INFINITY; lp.num_variables()];
        Self {
            lp,
            integers: Vec::new(),
            upper_bounds,
        }
    }

    pub fn upper_bound(&self, var: usize) -> f64 {
        self.upper_bounds.get(var).copied().unwrap_or(f64::INFINITY)
    }

    /// Add a variable bounded to `{0, 1}` and return its index
    pub fn add_binary(&mut self, name: impl Into<String>) -> usize {
        let idx = self.add_continuous(name);
        self.integers.push(idx);
        self.upper_bounds[idx] = 1.0;
        let bound = format!("{}_ub", self.lp.variables[idx]);
        self.lp.add_sparse_constraint(bound, &[(idx, 1.0)], ConstraintOp::Le, 1.0);
        idx
    }

    /// Add a non-negative continuous variable and return its index
    pub fn add_continuous(&mut self, name: impl Into<String>) -> usize {
        let idx = self.lp.variables.len();
        self.lp.variables.push(name.into());
        self.lp.objective.coefficients.push(0.0);
        self.upper_bounds.resize(idx + 1, f64::INFINITY);
        for c in &mut self.lp.constraints {
            c.coefficients.push(0.0);
        }
        idx
    }

    pub fn is_integral(&self, values: &[f64], tolerance: f64) -> bool {
        self.integers
            .iter()
            .all(|&j| (values[j] - values[j].round()).abs() <= tolerance)
    }
}
