use crate::error::{OptimizeError, ValidationError};
use crate::school::{ISP_SCALE, School};

/// Aggregate figures of one group of schools.
///
/// Identified students are summed as integer millionths, so a group whose
/// true ISP sits on a rate boundary is classified on the right side of it.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupMetrics {
    /// Enrollment-weighted mean ISP of the members, correctly rounded
    pub weighted_isp: f64,
    pub total_enrollment: u64,
    /// Sum of `isp × enrollment` over the members, in millionths
    pub identified_micros: u128,
}

impl GroupMetrics {
    /// Metrics from totals; `total_enrollment` must be positive
    pub(crate) fn new(total_enrollment: u64, identified_micros: u128) -> Self {
        let scaled_enrollment = total_enrollment as f64 * ISP_SCALE as f64;
        Self {
            weighted_isp: identified_micros as f64 / scaled_enrollment,
            total_enrollment,
            identified_micros,
        }
    }

    /// Identified students in the group
    pub fn identified(&self) -> f64 {
        self.identified_micros as f64 / ISP_SCALE as f64
    }

    /// Whether the weighted ISP is at least `micros / ISP_SCALE`
    pub fn isp_at_least(&self, micros: u64) -> bool {
        self.identified_micros >= u128::from(micros) * u128::from(self.total_enrollment)
    }

    /// Metrics of the union of two disjoint groups
    pub fn combine(&self, other: &GroupMetrics) -> GroupMetrics {
        GroupMetrics::new(
            self.total_enrollment + other.total_enrollment,
            self.identified_micros + other.identified_micros,
        )
    }
}

/// Weighted ISP and total enrollment of the schools at `members`
pub fn aggregate(schools: &[School], members: &[usize]) -> Result<GroupMetrics, OptimizeError> {
    if members.is_empty() {
        return Err(OptimizeError::InvalidGroup);
    }

    let mut total_enrollment = 0u64;
    let mut identified_micros = 0u128;
    for &index in members {
        let school = schools.get(index).ok_or(ValidationError::UnknownSchool(index))?;
        total_enrollment += school.enrollment;
        identified_micros += school.identified_micros();
    }

    if total_enrollment == 0 {
        return Err(OptimizeError::InvalidGroup);
    }

    Ok(GroupMetrics::new(total_enrollment, identified_micros))
}
