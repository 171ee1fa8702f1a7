//! Tracks fan-out groups: which child executions belong to which parent
//! and how their outcomes combine.

use crate::core::ExecutionStatus;
use crate::facilitate::ChildCombiner;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

struct ChildGroup {
    expected: usize,
    child_ids: Vec<Uuid>,
    completed: Vec<ExecutionStatus>,
    combiner: Arc<dyn ChildCombiner>,
    decided: bool,
}

/// Thread-safe registry of pending fan-out groups.
#[derive(Default)]
pub(crate) struct ChildTracker {
    groups: DashMap<Uuid, Mutex<ChildGroup>>,
    parent_of: DashMap<Uuid, Uuid>,
}

impl ChildTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a fan-out group under its parent node execution.
    pub(crate) fn register_group(&self, parent: Uuid, child_ids: Vec<Uuid>, combiner: Arc<dyn ChildCombiner>) {
        for child in &child_ids {
            self.parent_of.insert(*child, parent);
        }
        self.groups.insert(
            parent,
            Mutex::new(ChildGroup {
                expected: child_ids.len(),
                child_ids,
                completed: Vec::new(),
                combiner,
                decided: false,
            }),
        );
    }

    /// The parent a child execution reports to, if any.
    pub(crate) fn parent_of(&self, child: Uuid) -> Option<Uuid> {
        self.parent_of.get(&child).map(|p| *p)
    }

    /// Records a child outcome.
    ///
    /// Returns `Some((parent, combined))` when the combiner decides the
    /// parent outcome; further recordings for the group are no-ops.
    pub(crate) fn record(&self, child: Uuid, status: ExecutionStatus) -> Option<(Uuid, ExecutionStatus)> {
        let (_, parent) = self.parent_of.remove(&child)?;
        let decision = {
            let group_ref = self.groups.get(&parent)?;
            let mut group = group_ref.lock();
            if group.decided {
                None
            } else {
                group.completed.push(status);
                let decision = group.combiner.combine(&group.completed, group.expected);
                if decision.is_some() {
                    group.decided = true;
                    for child_id in &group.child_ids {
                        self.parent_of.remove(child_id);
                    }
                }
                decision
            }
        };
        decision.map(|combined| {
            self.groups.remove(&parent);
            (parent, combined)
        })
    }

    /// Removes a group, detaching its children; returns the child ids that
    /// had not yet reported.
    pub(crate) fn remove_group(&self, parent: Uuid) -> Vec<Uuid> {
        let Some((_, group)) = self.groups.remove(&parent) else {
            return Vec::new();
        };
        let group = group.into_inner();
        group
            .child_ids
            .iter()
            .filter(|child| self.parent_of.remove(*child).is_some())
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facilitate::AllSucceedCombiner;
    use crate::utils::generate_uuid;

    fn combiner() -> Arc<dyn ChildCombiner> {
        Arc::new(AllSucceedCombiner)
    }

    #[test]
    fn test_group_decides_when_all_succeed() {
        let tracker = ChildTracker::new();
        let parent = generate_uuid();
        let children: Vec<Uuid> = (0..3).map(|_| generate_uuid()).collect();
        tracker.register_group(parent, children.clone(), combiner());

        assert_eq!(tracker.record(children[0], ExecutionStatus::Succeeded), None);
        assert_eq!(tracker.record(children[1], ExecutionStatus::Succeeded), None);
        assert_eq!(
            tracker.record(children[2], ExecutionStatus::Succeeded),
            Some((parent, ExecutionStatus::Succeeded))
        );
    }

    #[test]
    fn test_first_failure_short_circuits() {
        let tracker = ChildTracker::new();
        let parent = generate_uuid();
        let children: Vec<Uuid> = (0..3).map(|_| generate_uuid()).collect();
        tracker.register_group(parent, children.clone(), combiner());

        assert_eq!(
            tracker.record(children[0], ExecutionStatus::Failed),
            Some((parent, ExecutionStatus::Failed))
        );
        // Late sibling completions are no-ops.
        assert_eq!(tracker.record(children[1], ExecutionStatus::Succeeded), None);
        assert_eq!(tracker.parent_of(children[2]), None);
    }

    #[test]
    fn test_remove_group_detaches_children() {
        let tracker = ChildTracker::new();
        let parent = generate_uuid();
        let children: Vec<Uuid> = (0..2).map(|_| generate_uuid()).collect();
        tracker.register_group(parent, children.clone(), combiner());

        let remaining = tracker.remove_group(parent);
        assert_eq!(remaining.len(), 2);
        assert_eq!(tracker.parent_of(children[0]), None);
        assert_eq!(tracker.record(children[1], ExecutionStatus::Succeeded), None);
    }

    #[test]
    fn test_unknown_child_is_noop() {
        let tracker = ChildTracker::new();
        assert_eq!(tracker.record(generate_uuid(), ExecutionStatus::Succeeded), None);
    }
}
