//! Per-meal reimbursement rates as a function of a group's weighted ISP.
//!
//! Every schedule is a list of [`RateSegment`]s covering `[0, ∞)`. Inside a
//! segment a group earns `per_enrollment + per_identified × ISP` per student,
//! which is linear in the group's enrollment and identified-student totals.
//! The exact optimizer relies on that to linearize the objective.

use crate::aggregate::{GroupMetrics, aggregate};
use crate::error::OptimizeError;
use crate::grouping::Grouping;
use crate::school::{ISP_SCALE, School};

/// Rate paid per meal once a group reaches the ceiling ISP
pub const FREE_RATE: f64 = 4.5;
/// Rate paid per meal for non-identified students
pub const PAID_RATE: f64 = 0.5;
/// Multiplier applied to ISP to obtain the share claimed at the free rate
pub const ISP_MULTIPLIER: f64 = 1.6;
/// Weighted ISP at which every meal is claimed at the free rate
pub const CEILING_ISP: f64 = 0.625;
/// Minimum weighted ISP for program eligibility
pub const ELIGIBILITY_ISP: f64 = 0.25;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSegment {
    /// Inclusive lower ISP bound
    pub lower: f64,
    /// Exclusive upper ISP bound; infinite for the last segment
    pub upper: f64,
    pub per_enrollment: f64,
    pub per_identified: f64,
}

impl RateSegment {
    const fn new(lower: f64, upper: f64, per_enrollment: f64, per_identified: f64) -> Self {
        Self { lower, upper, per_enrollment, per_identified }
    }

    pub fn contains(&self, isp: f64) -> bool {
        isp >= self.lower && isp < self.upper
    }

    /// Integer form of [`RateSegment::contains`] for a group's exact totals
    pub fn contains_group(&self, metrics: &GroupMetrics) -> bool {
        metrics.isp_at_least(to_micros(self.lower))
            && (self.upper.is_infinite() || !metrics.isp_at_least(to_micros(self.upper)))
    }

    pub fn rate(&self, isp: f64) -> f64 {
        self.per_enrollment + self.per_identified * isp
    }
}

fn to_micros(isp: f64) -> u64 {
    (isp * ISP_SCALE as f64).round() as u64
}

// FREE_RATE·(I·1.6) + PAID_RATE·(1 − I) = PAID_RATE + (FREE_RATE·1.6 − PAID_RATE)·I
const BLENDED_PER_IDENTIFIED: f64 = FREE_RATE * ISP_MULTIPLIER - PAID_RATE;

const TWO_BRANCH: [RateSegment; 2] = [
    RateSegment::new(0.0, CEILING_ISP, PAID_RATE, BLENDED_PER_IDENTIFIED),
    RateSegment::new(CEILING_ISP, f64::INFINITY, FREE_RATE, 0.0),
];

const THREE_BRANCH: [RateSegment; 3] = [
    RateSegment::new(0.0, ELIGIBILITY_ISP, PAID_RATE, 0.0),
    RateSegment::new(ELIGIBILITY_ISP, CEILING_ISP, PAID_RATE, BLENDED_PER_IDENTIFIED),
    RateSegment::new(CEILING_ISP, f64::INFINITY, FREE_RATE, 0.0),
];

const COVERAGE: [RateSegment; 2] = [
    RateSegment::new(0.0, ELIGIBILITY_ISP, 0.0, 0.0),
    RateSegment::new(ELIGIBILITY_ISP, f64::INFINITY, 1.0, 0.0),
];

/// Selects the rate curve groups are valued with
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateSchedule {
    /// Ceiling rate at or above 62.5%, blended rate below
    #[default]
    TwoBranch,
    /// As `TwoBranch`, but groups under 25% earn only the paid rate
    ThreeBranch,
    /// Counts the students in groups at or above 25% (value 1 per student)
    Coverage,
}

impl RateSchedule {
    pub fn segments(&self) -> &'static [RateSegment] {
        match self {
            RateSchedule::TwoBranch => &TWO_BRANCH,
            RateSchedule::ThreeBranch => &THREE_BRANCH,
            RateSchedule::Coverage => &COVERAGE,
        }
    }
}

/// Pure valuation of groups and groupings under a [`RateSchedule`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReimbursementModel {
    schedule: RateSchedule,
}

impl ReimbursementModel {
    pub fn new(schedule: RateSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> RateSchedule {
        self.schedule
    }

    pub fn segment(&self, isp: f64) -> &'static RateSegment {
        let segments = self.schedule.segments();
        segments
            .iter()
            .find(|s| s.contains(isp))
            .unwrap_or(&segments[segments.len() - 1])
    }

    pub fn reimbursement_rate(&self, isp: f64) -> f64 {
        self.segment(isp).rate(isp)
    }

    /// Segment of a group, decided on its integer totals rather than the
    /// rounded `weighted_isp`
    pub fn group_segment(&self, metrics: &GroupMetrics) -> &'static RateSegment {
        let segments = self.schedule.segments();
        segments
            .iter()
            .find(|s| s.contains_group(metrics))
            .unwrap_or(&segments[segments.len() - 1])
    }

    pub fn group_rate(&self, metrics: &GroupMetrics) -> f64 {
        self.group_segment(metrics).rate(metrics.weighted_isp)
    }

    pub fn group_reimbursement(&self, metrics: &GroupMetrics) -> f64 {
        metrics.total_enrollment as f64 * self.group_rate(metrics)
    }

    pub fn global_objective(&self, schools: &[School], grouping: &Grouping) -> Result<f64, OptimizeError> {
        grouping.iter().try_fold(0.0, |total, members| {
            let metrics = aggregate(schools, members)?;
            Ok(total + self.group_reimbursement(&metrics))
        })
    }
}
