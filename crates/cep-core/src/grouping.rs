use crate::error::ValidationError;

/// A partition of school indices `0..school_count` into non-empty groups.
///
/// Kept in canonical form: members ascending within each group, groups
/// ordered by their smallest member. Two groupings are equal exactly when
/// they describe the same partition.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    groups: Vec<Vec<usize>>,
    school_count: usize,
}

impl Grouping {
    /// One group per school
    pub fn singletons(school_count: usize) -> Self {
        Self {
            groups: (0..school_count).map(|i| vec![i]).collect(),
            school_count,
        }
    }

    /// Every school in a single group
    pub fn whole(school_count: usize) -> Self {
        let groups = if school_count == 0 {
            Vec::new()
        } else {
            vec![(0..school_count).collect()]
        };
        Self { groups, school_count }
    }

    /// Build a grouping from explicit cells, checking the partition
    pub fn from_groups(groups: Vec<Vec<usize>>, school_count: usize) -> Result<Self, ValidationError> {
        let mut seen = vec![false; school_count];
        for (cell, members) in groups.iter().enumerate() {
            if members.is_empty() {
                return Err(ValidationError::EmptyCell(cell));
            }
            for &school in members {
                let slot = seen.get_mut(school).ok_or(ValidationError::UnknownSchool(school))?;
                if *slot {
                    return Err(ValidationError::DuplicateSchool(school));
                }
                *slot = true;
            }
        }
        if let Some(missing) = seen.iter().position(|&s| !s) {
            return Err(ValidationError::MissingSchool(missing));
        }

        let mut grouping = Self { groups, school_count };
        grouping.canonicalize();
        Ok(grouping)
    }

    fn canonicalize(&mut self) {
        for members in &mut self.groups {
            members.sort_unstable();
        }
        self.groups.sort_unstable_by_key(|members| members[0]);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn school_count(&self) -> usize {
        self.school_count
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.groups.iter().map(Vec::as_slice)
    }

    pub fn into_groups(self) -> Vec<Vec<usize>> {
        self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        let a = Grouping::from_groups(vec![vec![3, 1], vec![2, 0]], 4).unwrap();
        let b = Grouping::from_groups(vec![vec![0, 2], vec![1, 3]], 4).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.groups(), &[vec![0, 2], vec![1, 3]]);
    }

    #[test]
    fn test_partition_violations() {
        assert_eq!(
            Grouping::from_groups(vec![vec![0], vec![]], 1),
            Err(ValidationError::EmptyCell(1))
        );
        assert_eq!(
            Grouping::from_groups(vec![vec![0, 1], vec![1]], 2),
            Err(ValidationError::DuplicateSchool(1))
        );
        assert_eq!(
            Grouping::from_groups(vec![vec![0, 5]], 2),
            Err(ValidationError::UnknownSchool(5))
        );
        assert_eq!(
            Grouping::from_groups(vec![vec![0]], 3),
            Err(ValidationError::MissingSchool(1))
        );
    }

    #[test]
    fn test_extremes() {
        assert_eq!(Grouping::singletons(3).len(), 3);
        assert_eq!(Grouping::whole(3).groups(), &[vec![0, 1, 2]]);
        assert!(Grouping::whole(0).is_empty());
    }
}
