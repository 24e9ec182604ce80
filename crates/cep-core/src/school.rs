use crate::error::ValidationError;

/// Resolution at which ISPs are aggregated: millionths of a student
pub const ISP_SCALE: u64 = 1_000_000;

/// A school as loaded from a roster. Immutable once loaded.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct School {
    pub name: String,
    /// District / LEA name
    pub district: String,
    pub state: String,
    pub enrollment: u64,
    /// Identified Student Percentage as a fraction in [0, 1]
    pub isp: f64,
}

impl School {
    pub fn new(name: impl Into<String>, enrollment: u64, isp: f64) -> Self {
        Self {
            name: name.into(),
            district: String::new(),
            state: String::new(),
            enrollment,
            isp,
        }
    }

    pub fn with_district(mut self, district: impl Into<String>) -> Self {
        self.district = district.into();
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    /// ISP in millionths, the unit group totals are summed in
    pub fn isp_micros(&self) -> u64 {
        (self.isp * ISP_SCALE as f64).round() as u64
    }

    /// Identified students in millionths of a student
    pub fn identified_micros(&self) -> u128 {
        u128::from(self.isp_micros()) * u128::from(self.enrollment)
    }

    /// Number of identified students, `isp × enrollment`
    pub fn identified(&self) -> f64 {
        self.identified_micros() as f64 / ISP_SCALE as f64
    }

    pub fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if self.enrollment == 0 {
            return Err(ValidationError::NonPositiveEnrollment {
                index,
                name: self.name.clone(),
            });
        }
        if !(0.0..=1.0).contains(&self.isp) {
            return Err(ValidationError::IspOutOfRange {
                index,
                name: self.name.clone(),
                isp: self.isp,
            });
        }
        Ok(())
    }
}

/// Check every school before any aggregation runs
pub fn validate_schools(schools: &[School]) -> Result<(), ValidationError> {
    if schools.is_empty() {
        return Err(ValidationError::NoSchools);
    }
    schools
        .iter()
        .enumerate()
        .try_for_each(|(index, school)| school.validate(index))
}
