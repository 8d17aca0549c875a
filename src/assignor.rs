//! Deterministic partition assignment for group rebalances.

use std::collections::HashMap;

use crate::error::{Error, Result};

pub const ROUND_ROBIN_STRATEGY: &str = "roundrobin";

/// Assign partitions to members with the named strategy.
pub fn assign(
    strategy: &str,
    members: &[String],
    partitions: &[i32],
) -> Result<HashMap<String, Vec<i32>>> {
    match strategy {
        ROUND_ROBIN_STRATEGY => Ok(round_robin(members, partitions)),
        other => Err(Error::AssignmentStrategyNotSupported(other.to_string())),
    }
}

/// Round-robin over `sort(members) x sort(partitions)`.
///
/// Every member runs this over the same inputs and must land on the
/// same answer, so the inputs are sorted first and partition `i` goes
/// to member `i mod n`. Ownership counts end up within one of each
/// other.
pub fn round_robin(members: &[String], partitions: &[i32]) -> HashMap<String, Vec<i32>> {
    let mut members: Vec<&String> = members.iter().collect();
    members.sort();
    members.dedup();

    let mut partitions: Vec<i32> = partitions.to_vec();
    partitions.sort_unstable();

    let mut assignments: HashMap<String, Vec<i32>> = members
        .iter()
        .map(|member| ((*member).clone(), vec![]))
        .collect();

    if members.is_empty() {
        return assignments;
    }

    for (i, partition) in partitions.into_iter().enumerate() {
        let member = members[i % members.len()];
        if let Some(owned) = assignments.get_mut(member) {
            owned.push(partition);
        }
    }

    assignments
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn three_members_four_partitions() {
        let members = vec![
            String::from("m1"),
            String::from("m2"),
            String::from("m3"),
        ];
        let partitions = vec![0, 1, 2, 3];

        let assignments = assign(ROUND_ROBIN_STRATEGY, &members, &partitions).unwrap();

        assert_eq!(assignments.get("m1").unwrap(), &vec![0, 3]);
        assert_eq!(assignments.get("m2").unwrap(), &vec![1]);
        assert_eq!(assignments.get("m3").unwrap(), &vec![2]);
    }

    #[test]
    fn input_order_does_not_matter() {
        let shuffled = vec![
            String::from("m3"),
            String::from("m1"),
            String::from("m2"),
        ];
        let partitions = vec![3, 1, 0, 2];

        let assignments = round_robin(&shuffled, &partitions);

        assert_eq!(assignments.get("m1").unwrap(), &vec![0, 3]);
        assert_eq!(assignments.get("m2").unwrap(), &vec![1]);
        assert_eq!(assignments.get("m3").unwrap(), &vec![2]);
    }

    #[test]
    fn assignment_is_a_partition_of_the_set() {
        let members = vec![String::from("a"), String::from("b")];
        let partitions = vec![0, 1, 2, 3, 4];

        let assignments = round_robin(&members, &partitions);

        let mut all: Vec<i32> = assignments.values().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, partitions);

        // exclusivity: no partition appears under two members
        let a = assignments.get("a").unwrap();
        let b = assignments.get("b").unwrap();
        assert!(a.iter().all(|p| !b.contains(p)));
    }

    #[test]
    fn more_members_than_partitions() {
        let members = vec![
            String::from("m1"),
            String::from("m2"),
            String::from("m3"),
        ];
        let partitions = vec![0];

        let assignments = round_robin(&members, &partitions);
        assert_eq!(assignments.get("m1").unwrap(), &vec![0]);
        assert!(assignments.get("m2").unwrap().is_empty());
        assert!(assignments.get("m3").unwrap().is_empty());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = assign("sticky", &[], &[]).unwrap_err();
        assert_eq!(
            err,
            Error::AssignmentStrategyNotSupported(String::from("sticky"))
        );
    }
}
