use std::time::Duration;

use thiserror::Error;

/// Problems with the input handed to the optimizer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("No schools to optimize")]
    NoSchools,
    #[error("School {index} ({name}) has non-positive enrollment")]
    NonPositiveEnrollment { index: usize, name: String },
    #[error("School {index} ({name}) has ISP {isp} outside [0, 1]")]
    IspOutOfRange { index: usize, name: String, isp: f64 },
    #[error("Grouping refers to unknown school {0}")]
    UnknownSchool(usize),
    #[error("School {0} appears in more than one group")]
    DuplicateSchool(usize),
    #[error("School {0} is not assigned to any group")]
    MissingSchool(usize),
    #[error("Group {0} of the grouping is empty")]
    EmptyCell(usize),
    #[error("Grouping covers {grouping} schools but {schools} were given")]
    SizeMismatch { grouping: usize, schools: usize },
    #[error("Target group count {requested} must be between 1 and {schools}")]
    InvalidGroupCount { requested: usize, schools: usize },
    #[error("Exact mode requires a group count")]
    GroupCountRequired,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizeError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Cannot aggregate an empty group")]
    InvalidGroup,
    #[error("Infeasible: {0}")]
    Infeasible(String),
    #[error("Solver found no assignment within {0:?}")]
    SolverTimeout(Duration),
    #[error("Solver {backend} failed: {message}")]
    Backend { backend: String, message: String },
}
