//! Exact assignment of schools to a fixed number of group slots.
//!
//! The model, for slots `g` and rate segments `k`:
//!
//! - `x[i,g]` binary, `Σ_g x[i,g] = 1`, and `Σ_i x[i,g] ≥ 1` unless empty
//!   slots are allowed. School `i` may only use slots `0..=i`, which removes
//!   relabelings of the same partition.
//! - `y[g,k]` binary, `Σ_k y[g,k] = 1`, selects the segment slot `g` is valued on.
//! - With `E_g = Σ e_i x[i,g]` and `I_g = Σ c_i x[i,g]` (`c_i` identified students):
//!   `y[g,k] = 1 ⇒ lower_k·E_g − δ ≤ I_g ≤ upper_k·E_g − δ` (big-M rows).
//!   Identified totals are whole millionths of a student, so with `δ` half a
//!   millionth the rows hold exactly when the group lies in `[lower_k, upper_k)`.
//! - `w_g ≤ a_k·E_g + b_k·I_g + M·(1 − y[g,k])`, maximize `Σ w_g`.
//!
//! The reported objective is always recomputed from the decoded grouping with
//! the exact rate function.

use std::time::Duration;

use cep_solver::{BranchAndBound, ConstraintOp, LpProblem, MipError, MipProblem, MipSolver, MipStatus, SolveLimits};

use crate::error::OptimizeError;
use crate::grouping::Grouping;
use crate::reimbursement::ReimbursementModel;
use crate::school::{ISP_SCALE, School, validate_schools};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ExactConfig {
    pub time_limit: Option<Duration>,
    pub node_limit: Option<usize>,
    /// Allow slots to stay empty, yielding at most `N` groups
    pub allow_empty_slots: bool,
}

impl Default for ExactConfig {
    fn default() -> Self {
        Self {
            time_limit: Some(Duration::from_secs(60)),
            node_limit: None,
            allow_empty_slots: false,
        }
    }
}

impl ExactConfig {
    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_node_limit(mut self, limit: Option<usize>) -> Self {
        self.node_limit = limit;
        self
    }

    pub fn with_allow_empty_slots(mut self, allow: bool) -> Self {
        self.allow_empty_slots = allow;
        self
    }

    fn limits(&self) -> SolveLimits {
        SolveLimits {
            time_limit: self.time_limit,
            node_limit: self.node_limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExactOutcome {
    pub grouping: Grouping,
    /// Objective of `grouping` under the exact rate function
    pub objective: f64,
    /// Objective reported by the linearized model
    pub model_objective: f64,
    pub status: MipStatus,
    pub nodes: usize,
}

/// The MIP together with where each school's assignment variables live
struct SlotModel {
    mip: MipProblem,
    /// Per school, `(slot, variable)` pairs
    assignments: Vec<Vec<(usize, usize)>>,
}

pub struct ExactOptimizer<S = BranchAndBound> {
    model: ReimbursementModel,
    solver: S,
    config: ExactConfig,
}

impl ExactOptimizer<BranchAndBound> {
    pub fn new(model: ReimbursementModel) -> Self {
        Self {
            model,
            solver: BranchAndBound::new(),
            config: ExactConfig::default(),
        }
    }
}

impl<S: MipSolver> ExactOptimizer<S> {
    pub fn with_solver<T: MipSolver>(self, solver: T) -> ExactOptimizer<T> {
        ExactOptimizer {
            model: self.model,
            solver,
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: ExactConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExactConfig {
        &self.config
    }

    /// Find the best assignment of `schools` to `slots` groups
    pub fn solve(&self, schools: &[School], slots: usize) -> Result<ExactOutcome, OptimizeError> {
        validate_schools(schools)?;
        if slots == 0 || slots > schools.len() {
            return Err(OptimizeError::Infeasible(format!(
                "group count {} must be between 1 and {}",
                slots,
                schools.len()
            )));
        }

        let slot_model = self.build(schools, slots);
        tracing::debug!(
            schools = schools.len(),
            slots,
            variables = slot_model.mip.lp.num_variables(),
            constraints = slot_model.mip.lp.num_constraints(),
            backend = self.solver.name(),
            "exact optimizer assigning"
        );

        let solution = self
            .solver
            .solve(&slot_model.mip, &self.config.limits())
            .map_err(|e| self.map_error(e, schools.len(), slots))?;

        if solution.status != MipStatus::Optimal {
            tracing::warn!(status = ?solution.status, nodes = solution.nodes, "search stopped early; result not proven optimal");
        }

        let grouping = decode(&slot_model, &solution.values, schools.len(), slots).map_err(|message| {
            OptimizeError::Backend {
                backend: self.solver.name().to_string(),
                message,
            }
        })?;
        let objective = self.model.global_objective(schools, &grouping)?;

        tracing::info!(
            groups = grouping.len(),
            objective,
            model_objective = solution.objective_value,
            nodes = solution.nodes,
            status = ?solution.status,
            "exact optimizer solved"
        );

        Ok(ExactOutcome {
            grouping,
            objective,
            model_objective: solution.objective_value,
            status: solution.status,
            nodes: solution.nodes,
        })
    }

    fn map_error(&self, error: MipError, schools: usize, slots: usize) -> OptimizeError {
        match error {
            MipError::Infeasible => {
                OptimizeError::Infeasible(format!("no assignment of {} schools to {} groups", schools, slots))
            }
            MipError::TimeLimit(limit) => OptimizeError::SolverTimeout(limit),
            MipError::NodeLimit(nodes) => {
                OptimizeError::Infeasible(format!("no feasible assignment within {} nodes", nodes))
            }
            other => OptimizeError::Backend {
                backend: self.solver.name().to_string(),
                message: other.to_string(),
            },
        }
    }

    fn build(&self, schools: &[School], slots: usize) -> SlotModel {
        let segments = self.model.schedule().segments();
        let total_enrollment: f64 = schools.iter().map(|s| s.enrollment as f64).sum();

        let margin = 0.5 / ISP_SCALE as f64;

        // |I_g − c·E_g| ≤ E_total for any fraction c
        let big_m_ratio = total_enrollment + 1.0;
        let max_rate = segments
            .iter()
            .map(|s| s.per_enrollment + s.per_identified.max(0.0))
            .fold(0.0, f64::max);
        let big_m_value = max_rate * total_enrollment + 1.0;

        let mut mip = MipProblem::new(LpProblem::new(Vec::new()));
        mip.lp.objective.minimize = false;

        let mut assignments = Vec::with_capacity(schools.len());
        let mut slot_members: Vec<Vec<(usize, &School)>> = vec![Vec::new(); slots];
        for (i, school) in schools.iter().enumerate() {
            let vars: Vec<(usize, usize)> = (0..slots.min(i + 1))
                .map(|g| (g, mip.add_binary(format!("x_{}_{}", i, g))))
                .collect();
            for &(g, var) in &vars {
                slot_members[g].push((var, school));
            }
            assignments.push(vars);
        }

        for (i, vars) in assignments.iter().enumerate() {
            let terms: Vec<(usize, f64)> = vars.iter().map(|&(_, var)| (var, 1.0)).collect();
            mip.lp.add_sparse_constraint(format!("assign_{}", i), &terms, ConstraintOp::Eq, 1.0);
        }

        for (g, members) in slot_members.iter().enumerate() {
            if !self.config.allow_empty_slots {
                let terms: Vec<(usize, f64)> = members.iter().map(|&(var, _)| (var, 1.0)).collect();
                mip.lp.add_sparse_constraint(format!("nonempty_{}", g), &terms, ConstraintOp::Ge, 1.0);
            }

            let value = mip.add_continuous(format!("w_{}", g));
            mip.lp.objective.coefficients[value] = 1.0;

            let selectors: Vec<usize> = (0..segments.len())
                .map(|k| mip.add_binary(format!("y_{}_{}", g, k)))
                .collect();
            let terms: Vec<(usize, f64)> = selectors.iter().map(|&y| (y, 1.0)).collect();
            mip.lp.add_sparse_constraint(format!("segment_{}", g), &terms, ConstraintOp::Eq, 1.0);

            for (segment, &y) in segments.iter().zip(&selectors) {
                // Σ (c_i − bound·e_i) x_ig is I_g − bound·E_g
                let offset_terms = |bound: f64| -> Vec<(usize, f64)> {
                    members
                        .iter()
                        .map(|&(var, s)| (var, s.identified() - bound * s.enrollment as f64))
                        .collect()
                };

                if segment.lower > 0.0 {
                    let mut terms = offset_terms(segment.lower);
                    terms.push((y, -big_m_ratio));
                    mip.lp.add_sparse_constraint(
                        format!("lower_{}_{}", g, y),
                        &terms,
                        ConstraintOp::Ge,
                        -big_m_ratio - margin,
                    );
                }
                if segment.upper.is_finite() {
                    let mut terms = offset_terms(segment.upper);
                    terms.push((y, big_m_ratio));
                    mip.lp.add_sparse_constraint(
                        format!("upper_{}_{}", g, y),
                        &terms,
                        ConstraintOp::Le,
                        big_m_ratio - margin,
                    );
                }

                let mut terms: Vec<(usize, f64)> = members
                    .iter()
                    .map(|&(var, s)| {
                        let earned = segment.per_enrollment * s.enrollment as f64 + segment.per_identified * s.identified();
                        (var, -earned)
                    })
                    .collect();
                terms.push((value, 1.0));
                terms.push((y, big_m_value));
                mip.lp.add_sparse_constraint(format!("value_{}_{}", g, y), &terms, ConstraintOp::Le, big_m_value);
            }
        }

        SlotModel { mip, assignments }
    }
}

fn decode(slot_model: &SlotModel, values: &[f64], school_count: usize, slots: usize) -> Result<Grouping, String> {
    if values.len() != slot_model.mip.lp.num_variables() || !slot_model.mip.is_integral(values, 1e-6) {
        return Err("backend returned a non-integral assignment".to_string());
    }

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); slots];
    for (i, vars) in slot_model.assignments.iter().enumerate() {
        let slot = vars
            .iter()
            .find(|&&(_, var)| values.get(var).is_some_and(|&v| v > 0.5))
            .map(|&(g, _)| g)
            .ok_or_else(|| format!("school {} left unassigned", i))?;
        groups[slot].push(i);
    }
    groups.retain(|members| !members.is_empty());
    Grouping::from_groups(groups, school_count).map_err(|e| e.to_string())
}
