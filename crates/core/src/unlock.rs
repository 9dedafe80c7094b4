//! Decides which groups become reachable from the current completion data.
//!
//! Every call evaluates the whole graph rather than only the neighbours of
//! the last completed item. Results follow declaration order, which is the
//! order unlock events are emitted in.

use std::collections::BTreeSet;

use crate::model::{DependencyGraph, GroupDefinition, GroupId, ItemId};

/// True if at least one completed item belongs to `prerequisite`.
fn has_progress_in(prerequisite: &GroupId, completed: &[ItemId]) -> bool {
    completed.iter().any(|item| item.belongs_to(prerequisite))
}

/// True if every prerequisite of `group` has at least one completed item.
#[must_use]
pub fn prerequisites_met(group: &GroupDefinition, completed: &[ItemId]) -> bool {
    group
        .prerequisites()
        .iter()
        .all(|prerequisite| has_progress_in(prerequisite, completed))
}

/// Prerequisites of `group` that still lack a completed item.
#[must_use]
pub fn missing_prerequisites<'a>(
    group: &'a GroupDefinition,
    completed: &[ItemId],
) -> Vec<&'a GroupId> {
    group
        .prerequisites()
        .iter()
        .filter(|prerequisite| !has_progress_in(prerequisite, completed))
        .collect()
}

/// Groups not yet in `unlocked` whose prerequisites are all satisfied.
#[must_use]
pub fn newly_unlockable<'a>(
    graph: &'a DependencyGraph,
    unlocked: &BTreeSet<GroupId>,
    completed: &[ItemId],
) -> Vec<&'a GroupId> {
    graph
        .groups()
        .filter(|group| !unlocked.contains(group.id()))
        .filter(|group| prerequisites_met(group, completed))
        .map(GroupDefinition::id)
        .collect()
}
