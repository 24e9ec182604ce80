use cep_solver::{BranchAndBound, MipSolver, MipStatus};

use crate::error::{OptimizeError, ValidationError};
use crate::exact::{ExactConfig, ExactOptimizer};
use crate::greedy::{GreedyMerger, MergeStep, Termination};
use crate::grouping::Grouping;
use crate::reimbursement::{RateSchedule, ReimbursementModel};
use crate::school::{School, validate_schools};
use crate::aggregate::aggregate;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Agglomerative merging to a local optimum
    #[default]
    Greedy,
    /// Mixed-integer model solved to a global optimum for a fixed group count
    Exact,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct OptimizeConfig {
    pub schedule: RateSchedule,
    /// Relative improvement a greedy merge must exceed
    pub greedy_tolerance: f64,
    pub exact: ExactConfig,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            schedule: RateSchedule::default(),
            greedy_tolerance: 1e-9,
            exact: ExactConfig::default(),
        }
    }
}

impl OptimizeConfig {
    pub fn with_schedule(mut self, schedule: RateSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_greedy_tolerance(mut self, tolerance: f64) -> Self {
        self.greedy_tolerance = tolerance;
        self
    }

    pub fn with_exact(mut self, exact: ExactConfig) -> Self {
        self.exact = exact;
        self
    }
}

/// Metrics of one group in the final grouping
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct GroupReport {
    /// School indices into the input roster
    pub members: Vec<usize>,
    pub school_names: Vec<String>,
    pub weighted_isp: f64,
    pub reimbursement_rate: f64,
    pub total_enrollment: u64,
    pub reimbursement: f64,
    /// Fraction of all enrolled students in this group
    pub enrollment_share: f64,
    /// `reimbursement / roster enrollment`; sums to the overall rate
    pub rate_contribution: f64,
}

/// Objective of the two trivial groupings, for comparison
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baselines {
    pub all_separate: f64,
    pub all_together: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub enum Provenance {
    Greedy {
        steps: Vec<MergeStep>,
        termination: Termination,
    },
    Exact {
        status: MipStatus,
        nodes: usize,
        model_objective: f64,
    },
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub mode: Mode,
    pub schedule: RateSchedule,
    pub grouping: Grouping,
    pub groups: Vec<GroupReport>,
    /// Sum of group reimbursements; the maximized objective
    pub total_reimbursement: f64,
    pub total_enrollment: u64,
    /// `total_reimbursement / total_enrollment`
    pub overall_rate: f64,
    pub baselines: Baselines,
    pub provenance: Provenance,
}

/// Runs either strategy under one configuration
pub struct Optimizer<S = BranchAndBound> {
    model: ReimbursementModel,
    greedy: GreedyMerger,
    exact: ExactOptimizer<S>,
}

impl Optimizer<BranchAndBound> {
    pub fn new(config: OptimizeConfig) -> Self {
        let model = ReimbursementModel::new(config.schedule);
        Self {
            model,
            greedy: GreedyMerger::new(model).with_tolerance(config.greedy_tolerance),
            exact: ExactOptimizer::new(model).with_config(config.exact),
        }
    }
}

impl Default for Optimizer<BranchAndBound> {
    fn default() -> Self {
        Self::new(OptimizeConfig::default())
    }
}

impl<S: MipSolver> Optimizer<S> {
    /// Swap the backend used in exact mode
    pub fn with_solver<T: MipSolver>(self, solver: T) -> Optimizer<T> {
        Optimizer {
            model: self.model,
            greedy: self.greedy,
            exact: self.exact.with_solver(solver),
        }
    }

    pub fn optimize(
        &self,
        schools: &[School],
        mode: Mode,
        target_group_count: Option<usize>,
    ) -> Result<OptimizationResult, OptimizeError> {
        validate_schools(schools)?;

        let (grouping, provenance) = match mode {
            Mode::Greedy => {
                let outcome = self.greedy.run_from_singletons(schools, target_group_count)?;
                let provenance = Provenance::Greedy {
                    steps: outcome.steps,
                    termination: outcome.termination,
                };
                (outcome.grouping, provenance)
            }
            Mode::Exact => {
                let slots = target_group_count.ok_or(ValidationError::GroupCountRequired)?;
                let outcome = self.exact.solve(schools, slots)?;
                let provenance = Provenance::Exact {
                    status: outcome.status,
                    nodes: outcome.nodes,
                    model_objective: outcome.model_objective,
                };
                (outcome.grouping, provenance)
            }
        };

        self.report(schools, mode, grouping, provenance)
    }

    fn report(
        &self,
        schools: &[School],
        mode: Mode,
        grouping: Grouping,
        provenance: Provenance,
    ) -> Result<OptimizationResult, OptimizeError> {
        let total_enrollment: u64 = schools.iter().map(|s| s.enrollment).sum();
        let roster_size = total_enrollment as f64;

        let mut groups = Vec::with_capacity(grouping.len());
        for members in grouping.iter() {
            let metrics = aggregate(schools, members)?;
            let reimbursement = self.model.group_reimbursement(&metrics);
            groups.push(GroupReport {
                members: members.to_vec(),
                school_names: members.iter().map(|&i| schools[i].name.clone()).collect(),
                weighted_isp: metrics.weighted_isp,
                reimbursement_rate: self.model.group_rate(&metrics),
                total_enrollment: metrics.total_enrollment,
                reimbursement,
                enrollment_share: metrics.total_enrollment as f64 / roster_size,
                rate_contribution: reimbursement / roster_size,
            });
        }

        let total_reimbursement: f64 = groups.iter().map(|g| g.reimbursement).sum();
        let baselines = Baselines {
            all_separate: self.model.global_objective(schools, &Grouping::singletons(schools.len()))?,
            all_together: self.model.global_objective(schools, &Grouping::whole(schools.len()))?,
        };

        Ok(OptimizationResult {
            mode,
            schedule: self.model.schedule(),
            grouping,
            groups,
            total_reimbursement,
            total_enrollment,
            overall_rate: total_reimbursement / roster_size,
            baselines,
            provenance,
        })
    }
}

/// Optimize with the default configuration
pub fn optimize(
    schools: &[School],
    mode: Mode,
    target_group_count: Option<usize>,
) -> Result<OptimizationResult, OptimizeError> {
    Optimizer::default().optimize(schools, mode, target_group_count)
}
