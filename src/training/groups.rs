//! Group assignments and their per-epoch history.

use crate::core::GroupId;
use serde::{Deserialize, Serialize};

/// One group id per node. Fed to both DGA layers on the next forward pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLabels(Vec<GroupId>);

impl GroupLabels {
    /// Every node in group 0; the state before the first epoch.
    pub fn zeros(num_nodes: usize) -> Self {
        Self(vec![0; num_nodes])
    }

    /// Groups for the next epoch are the current predicted classes.
    pub fn from_predictions(predictions: Vec<GroupId>) -> Self {
        Self(predictions)
    }

    pub fn as_slice(&self) -> &[GroupId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of nodes assigned to `group`.
    pub fn count(&self, group: GroupId) -> usize {
        self.0.iter().filter(|&&g| g == group).count()
    }

    /// Number of nodes whose group differs from `other`.
    pub fn diff_count(&self, other: &GroupLabels) -> usize {
        self.0
            .iter()
            .zip(&other.0)
            .filter(|(a, b)| a != b)
            .count()
            + self.0.len().abs_diff(other.0.len())
    }
}

/// Group vector at the start of training followed by the one produced by
/// every epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupHistory {
    snapshots: Vec<GroupLabels>,
}

impl GroupHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, groups: GroupLabels) {
        self.snapshots.push(groups);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&GroupLabels> {
        self.snapshots.get(index)
    }

    pub fn last(&self) -> Option<&GroupLabels> {
        self.snapshots.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupLabels> {
        self.snapshots.iter()
    }

    /// Nodes that changed group between consecutive snapshots.
    pub fn changes(&self) -> Vec<usize> {
        self.snapshots
            .windows(2)
            .map(|pair| pair[1].diff_count(&pair[0]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_labels() {
        let zeros = GroupLabels::zeros(4);
        assert_eq!(zeros.count(0), 4);

        let next = GroupLabels::from_predictions(vec![0, 1, 1, 0]);
        assert_eq!(next.count(1), 2);
        assert_eq!(next.diff_count(&zeros), 2);
        assert_eq!(next.as_slice(), &[0, 1, 1, 0]);
    }

    #[test]
    fn test_history_changes() {
        let mut history = GroupHistory::new();
        history.push(GroupLabels::zeros(3));
        history.push(GroupLabels::from_predictions(vec![1, 0, 1]));
        history.push(GroupLabels::from_predictions(vec![1, 0, 0]));

        assert_eq!(history.len(), 3);
        assert_eq!(history.changes(), vec![2, 1]);
        assert_eq!(history.last().unwrap().as_slice(), &[1, 0, 0]);
    }
}
