//! Greedy agglomerative merging.
//!
//! Groups live in an arena addressed by stable [`GroupId`]s. A merge retires
//! both inputs and allocates a fresh record for their union, so IDs are never
//! reused and a [`MergeStep`] history can name every group it touched.

use crate::aggregate::{GroupMetrics, aggregate};
use crate::error::{OptimizeError, ValidationError};
use crate::grouping::Grouping;
use crate::reimbursement::ReimbursementModel;
use crate::school::{School, validate_schools};

pub type GroupId = usize;

#[derive(Debug, Clone)]
struct GroupRecord {
    /// Ascending school indices
    members: Vec<usize>,
    metrics: GroupMetrics,
    value: f64,
}

#[derive(Debug, Clone, Default)]
struct GroupArena {
    records: Vec<GroupRecord>,
    /// Live IDs ordered by their smallest member
    live: Vec<GroupId>,
}

impl GroupArena {
    fn insert(&mut self, record: GroupRecord) -> GroupId {
        let id = self.records.len();
        let first = record.members[0];
        self.records.push(record);
        let at = self.live.partition_point(|&other| self.records[other].members[0] < first);
        self.live.insert(at, id);
        id
    }

    fn retire(&mut self, id: GroupId) {
        self.live.retain(|&other| other != id);
    }

    fn objective(&self) -> f64 {
        self.live.iter().map(|&id| self.records[id].value).sum()
    }

    fn to_grouping(&self, school_count: usize) -> Result<Grouping, ValidationError> {
        let groups = self.live.iter().map(|&id| self.records[id].members.clone()).collect();
        Grouping::from_groups(groups, school_count)
    }
}

/// One accepted merge
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MergeStep {
    pub retired: [GroupId; 2],
    pub created: GroupId,
    pub delta: f64,
    /// Global objective after the merge
    pub objective: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No pair of groups had a positive merge delta
    Converged,
    /// The live group count reached the target
    TargetReached,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub grouping: Grouping,
    pub objective: f64,
    pub steps: Vec<MergeStep>,
    pub termination: Termination,
}

/// Hill-climbing merger: repeatedly applies the single best pairwise merge
#[derive(Debug, Clone)]
pub struct GreedyMerger {
    model: ReimbursementModel,
    /// Relative size a delta must exceed to count as an improvement
    tolerance: f64,
}

impl GreedyMerger {
    pub fn new(model: ReimbursementModel) -> Self {
        Self { model, tolerance: 1e-9 }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn record(&self, members: Vec<usize>, metrics: GroupMetrics) -> GroupRecord {
        let value = self.model.group_reimbursement(&metrics);
        GroupRecord { members, metrics, value }
    }

    /// Merge from the singleton partition down toward `target_group_count`
    pub fn run_from_singletons(
        &self,
        schools: &[School],
        target_group_count: Option<usize>,
    ) -> Result<MergeOutcome, OptimizeError> {
        self.run(schools, Grouping::singletons(schools.len()), target_group_count)
    }

    /// Merge from `initial` until no merge improves the objective or the
    /// group count reaches `target_group_count` (default 1)
    pub fn run(
        &self,
        schools: &[School],
        initial: Grouping,
        target_group_count: Option<usize>,
    ) -> Result<MergeOutcome, OptimizeError> {
        validate_schools(schools)?;
        if initial.school_count() != schools.len() {
            return Err(ValidationError::SizeMismatch {
                grouping: initial.school_count(),
                schools: schools.len(),
            }
            .into());
        }
        let target = target_group_count.unwrap_or(1);
        if target == 0 || target > schools.len() {
            return Err(ValidationError::InvalidGroupCount {
                requested: target,
                schools: schools.len(),
            }
            .into());
        }

        let mut arena = GroupArena::default();
        for members in initial.into_groups() {
            let metrics = aggregate(schools, &members)?;
            arena.insert(self.record(members, metrics));
        }

        let mut objective = arena.objective();
        let mut steps = Vec::new();
        tracing::debug!(groups = arena.live.len(), target, objective, "greedy merge evaluating");

        let termination = loop {
            if arena.live.len() <= target {
                break Termination::TargetReached;
            }
            let Some((a, b, merged, delta)) = self.best_merge(&arena) else {
                break Termination::Converged;
            };

            let mut members = arena.records[a].members.clone();
            members.extend_from_slice(&arena.records[b].members);
            members.sort_unstable();

            arena.retire(a);
            arena.retire(b);
            let created = arena.insert(self.record(members, merged));
            objective += delta;

            tracing::debug!(
                retired_a = a,
                retired_b = b,
                created,
                delta,
                objective,
                groups = arena.live.len(),
                "merged groups"
            );
            steps.push(MergeStep {
                retired: [a, b],
                created,
                delta,
                objective,
            });
        };

        let grouping = arena.to_grouping(schools.len())?;
        let objective = arena.objective();
        tracing::info!(
            groups = grouping.len(),
            merges = steps.len(),
            objective,
            ?termination,
            "greedy merge finished"
        );

        Ok(MergeOutcome {
            grouping,
            objective,
            steps,
            termination,
        })
    }

    /// The pair with the largest improving delta. Live IDs are ordered by
    /// smallest member, so on exact ties the first pair visited wins.
    fn best_merge(&self, arena: &GroupArena) -> Option<(GroupId, GroupId, GroupMetrics, f64)> {
        let mut best: Option<(GroupId, GroupId, GroupMetrics, f64)> = None;

        for (pos, &a) in arena.live.iter().enumerate() {
            let left = &arena.records[a];
            for &b in &arena.live[pos + 1..] {
                let right = &arena.records[b];
                let merged = left.metrics.combine(&right.metrics);
                let delta = self.model.group_reimbursement(&merged) - left.value - right.value;

                let threshold = self.tolerance * (left.value.abs() + right.value.abs()).max(1.0);
                if delta <= threshold {
                    continue;
                }
                if best.as_ref().is_none_or(|&(_, _, _, best_delta)| delta > best_delta) {
                    best = Some((a, b, merged, delta));
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reimbursement::RateSchedule;

    fn merger() -> GreedyMerger {
        GreedyMerger::new(ReimbursementModel::default())
    }

    #[test]
    fn test_boundary_pair_stays_separate() {
        // Merged ISP is exactly 62.5% (900) while apart they earn 452 + 450
        let schools = vec![School::new("A", 100, 0.60), School::new("B", 100, 0.65)];
        let outcome = merger().run_from_singletons(&schools, None).unwrap();

        assert!(outcome.steps.is_empty());
        assert_eq!(outcome.termination, Termination::Converged);
        assert_eq!(outcome.grouping, Grouping::singletons(2));
        assert!((outcome.objective - 902.0).abs() < 1e-9);
    }

    #[test]
    fn test_lifts_school_to_ceiling() {
        // 0.90 + 0.50 at equal enrollment averages 0.70: 900 merged versus
        // 450 + 100·(0.5 + 6.7·0.5) = 835 apart
        let schools = vec![School::new("High", 100, 0.90), School::new("Mid", 100, 0.50)];
        let outcome = merger().run_from_singletons(&schools, None).unwrap();

        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].retired, [0, 1]);
        assert_eq!(outcome.steps[0].created, 2);
        assert!((outcome.steps[0].delta - 65.0).abs() < 1e-9);
        assert_eq!(outcome.grouping, Grouping::whole(2));
        assert!((outcome.objective - 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_picks_largest_delta_first() {
        // School 0 can lift either 1 or 2 to the ceiling; lifting 2 (the
        // lower ISP, larger enrollment) gains more
        let schools = vec![
            School::new("Anchor", 100, 0.95),
            School::new("Mid", 20, 0.55),
            School::new("Low", 40, 0.40),
        ];
        let outcome = merger().run_from_singletons(&schools, None).unwrap();

        assert_eq!(outcome.steps[0].retired, [0, 2]);
        for step in &outcome.steps {
            assert!(step.delta > 0.0);
        }
    }

    #[test]
    fn test_ties_resolved_by_smallest_members() {
        // Two identical high/low pairs produce identical deltas
        let schools = vec![
            School::new("H1", 100, 0.90),
            School::new("H2", 100, 0.90),
            School::new("L1", 100, 0.50),
            School::new("L2", 100, 0.50),
        ];
        let outcome = merger().run_from_singletons(&schools, Some(3)).unwrap();

        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].retired, [0, 2]);
        assert_eq!(outcome.termination, Termination::TargetReached);
        assert_eq!(outcome.grouping.groups(), &[vec![0, 2], vec![1], vec![3]]);
    }

    #[test]
    fn test_target_stops_merging() {
        let schools = vec![
            School::new("H1", 100, 0.90),
            School::new("L1", 100, 0.50),
            School::new("H2", 100, 0.90),
            School::new("L2", 100, 0.50),
        ];
        let outcome = merger().run_from_singletons(&schools, Some(3)).unwrap();
        assert_eq!(outcome.grouping.len(), 3);
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.termination, Termination::TargetReached);
    }

    #[test]
    fn test_linear_segment_merges_are_not_improvements() {
        // Inside one linear segment merging changes nothing but rounding
        let schools = vec![
            School::new("A", 137, 0.31),
            School::new("B", 211, 0.47),
            School::new("C", 89, 0.52),
        ];
        let outcome = merger().run_from_singletons(&schools, None).unwrap();
        assert!(outcome.steps.is_empty());
    }

    #[test]
    fn test_idempotent_at_convergence() {
        let schools = vec![
            School::new("A", 120, 0.92),
            School::new("B", 80, 0.41),
            School::new("C", 300, 0.58),
            School::new("D", 50, 0.12),
            School::new("E", 260, 0.71),
        ];
        let first = merger().run_from_singletons(&schools, None).unwrap();
        let second = merger().run(&schools, first.grouping.clone(), None).unwrap();

        assert!(second.steps.is_empty());
        assert_eq!(second.grouping, first.grouping);
    }

    #[test]
    fn test_coverage_schedule_pools_ineligible_schools() {
        // Alone only the first school is eligible; together all 300 are
        let schools = vec![
            School::new("A", 100, 0.50),
            School::new("B", 100, 0.15),
            School::new("C", 100, 0.15),
        ];
        let outcome = GreedyMerger::new(ReimbursementModel::new(RateSchedule::Coverage))
            .run_from_singletons(&schools, None)
            .unwrap();
        assert_eq!(outcome.objective, 300.0);
        assert_eq!(outcome.grouping.len(), 1);
    }

    #[test]
    fn test_rejects_bad_input() {
        let schools = vec![School::new("A", 0, 0.5)];
        assert!(matches!(
            merger().run_from_singletons(&schools, None),
            Err(OptimizeError::Validation(ValidationError::NonPositiveEnrollment { .. }))
        ));

        let schools = vec![School::new("A", 10, 0.5)];
        assert!(matches!(
            merger().run_from_singletons(&schools, Some(2)),
            Err(OptimizeError::Validation(ValidationError::InvalidGroupCount { .. }))
        ));
        assert!(matches!(
            merger().run(&schools, Grouping::singletons(2), None),
            Err(OptimizeError::Validation(ValidationError::SizeMismatch { .. }))
        ));
    }
}
