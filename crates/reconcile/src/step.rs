//! Batch steps - named units of work bound to one resource

use crate::types::StepPolicy;
use std::collections::HashMap;

/// A transient, named unit of work
///
/// `O` is the operation tag understood by the [`StepHandler`](crate::StepHandler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStep<O> {
    /// Human-readable progress label
    pub label: String,
    /// Resource this step touches
    pub resource_id: String,
    /// Operation to carry out
    pub operation: O,
    /// What a failure means for the resource's later steps
    pub policy: StepPolicy,
}

impl<O> BatchStep<O> {
    /// Create a best-effort step
    pub fn new(label: impl Into<String>, resource_id: impl Into<String>, operation: O) -> Self {
        Self {
            label: label.into(),
            resource_id: resource_id.into(),
            operation,
            policy: StepPolicy::BestEffort,
        }
    }

    /// Create a step whose failure blocks the rest of its resource
    pub fn fail_fast(
        label: impl Into<String>,
        resource_id: impl Into<String>,
        operation: O,
    ) -> Self {
        Self {
            policy: StepPolicy::FailFast,
            ..Self::new(label, resource_id, operation)
        }
    }
}

/// Group steps by resource, keeping first-seen resource order and step order
/// within each group
pub fn group_by_resource<O>(steps: &[BatchStep<O>]) -> Vec<Vec<&BatchStep<O>>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&BatchStep<O>>> = Vec::new();

    for step in steps {
        let slot = *index.entry(step.resource_id.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(step);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_resource_keeps_order() {
        let steps = vec![
            BatchStep::new("a1", "a", 1),
            BatchStep::new("b1", "b", 2),
            BatchStep::new("a2", "a", 3),
            BatchStep::new("b2", "b", 4),
        ];
        let groups = group_by_resource(&steps);
        let labels: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.iter().map(|s| s.label.as_str()).collect())
            .collect();
        assert_eq!(labels, vec![vec!["a1", "a2"], vec!["b1", "b2"]]);
    }

    #[test]
    fn test_fail_fast_policy() {
        let step = BatchStep::fail_fast("create", "1", ());
        assert_eq!(step.policy, StepPolicy::FailFast);
        assert_eq!(BatchStep::new("x", "1", ()).policy, StepPolicy::BestEffort);
    }
}
