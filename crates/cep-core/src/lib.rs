pub mod aggregate;
pub mod error;
pub mod exact;
pub mod greedy;
pub mod grouping;
pub mod optimize;
pub mod reimbursement;
pub mod school;

pub use aggregate::{GroupMetrics, aggregate};
pub use error::{OptimizeError, ValidationError};
pub use exact::{ExactConfig, ExactOptimizer, ExactOutcome};
pub use greedy::{GreedyMerger, GroupId, MergeOutcome, MergeStep, Termination};
pub use grouping::Grouping;
pub use optimize::{
    Baselines, GroupReport, Mode, OptimizationResult, OptimizeConfig, Optimizer, Provenance, optimize,
};
pub use reimbursement::{
    CEILING_ISP, ELIGIBILITY_ISP, FREE_RATE, ISP_MULTIPLIER, PAID_RATE, RateSchedule, RateSegment,
    ReimbursementModel,
};
pub use school::{ISP_SCALE, School, validate_schools};

pub use cep_solver::{BranchAndBound, MipError, MipSolution, MipSolver, MipStatus, SolveLimits};
