//! Level arithmetic and achievement constructors.
//!
//! Everything here is stateless; callers pass in the values to evaluate.

use chrono::{DateTime, Utc};

use crate::model::{Achievement, GroupDefinition};

/// XP values used by the progress store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpRules {
    /// Awarded once per newly completed item.
    pub item_xp: u64,
    /// Awarded once per newly unlocked group.
    pub unlock_xp: u64,
    /// XP span of one level. Must be non-zero.
    pub xp_per_level: u64,
}

impl Default for XpRules {
    fn default() -> Self {
        Self {
            item_xp: 100,
            unlock_xp: 50,
            xp_per_level: 1000,
        }
    }
}

impl XpRules {
    #[must_use]
    pub fn level_for(&self, xp: u64) -> u32 {
        compute_level(xp, self.xp_per_level)
    }
}

/// `floor(xp / xp_per_level) + 1`, saturating at `u32::MAX`.
///
/// A zero `xp_per_level` is treated as 1.
#[must_use]
pub fn compute_level(xp: u64, xp_per_level: u64) -> u32 {
    let span = xp_per_level.max(1);
    u32::try_from(xp / span)
        .unwrap_or(u32::MAX)
        .saturating_add(1)
}

#[must_use]
pub fn should_award_level_achievement(old_level: u32, new_level: u32) -> bool {
    new_level > old_level
}

/// Ids of the milestone achievements.
pub const FIRST_STEPS_ID: &str = "first-steps";
pub const DEDICATED_LEARNER_ID: &str = "dedicated-learner";
pub const GALAXY_EXPLORER_ID: &str = "galaxy-explorer";

const DEDICATED_LEARNER_ITEMS: u32 = 10;

#[must_use]
pub fn level_achievement(level: u32, at: DateTime<Utc>) -> Achievement {
    Achievement::new(
        format!("level-{level}"),
        format!("Level {level}"),
        format!("Reached level {level}"),
        at,
        0,
    )
}

#[must_use]
pub fn explorer_achievement(group: &GroupDefinition, xp: u64, at: DateTime<Utc>) -> Achievement {
    Achievement::new(
        format!("group-{}", group.id()),
        format!("Explorer: {}", group.title()),
        format!("Unlocked {}", group.title()),
        at,
        u32::try_from(xp).unwrap_or(u32::MAX),
    )
}

#[must_use]
pub fn perfect_quiz_achievement(group: &GroupDefinition, at: DateTime<Utc>) -> Achievement {
    Achievement::new(
        format!("perfect-quiz-{}", group.id()),
        format!("Flawless: {}", group.title()),
        format!("Scored 100% on the {} quiz", group.title()),
        at,
        0,
    )
}

/// Snapshot values the milestone rules look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneInput {
    pub items_completed: u32,
    pub unlocked_groups: usize,
    pub total_groups: usize,
}

/// Milestone achievements the input qualifies for, in a fixed order.
///
/// Callers insert them idempotently, so already-earned ones are harmless.
#[must_use]
pub fn milestones(input: MilestoneInput, at: DateTime<Utc>) -> Vec<Achievement> {
    let mut earned = Vec::new();
    if input.items_completed >= 1 {
        earned.push(Achievement::new(
            FIRST_STEPS_ID,
            "First Steps",
            "Completed your first item",
            at,
            0,
        ));
    }
    if input.items_completed >= DEDICATED_LEARNER_ITEMS {
        earned.push(Achievement::new(
            DEDICATED_LEARNER_ID,
            "Dedicated Learner",
            format!("Completed {DEDICATED_LEARNER_ITEMS} items"),
            at,
            0,
        ));
    }
    if input.total_groups > 0 && input.unlocked_groups >= input.total_groups {
        earned.push(Achievement::new(
            GALAXY_EXPLORER_ID,
            "Galaxy Explorer",
            "Unlocked every group",
            at,
            0,
        ));
    }
    earned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentOutline, GroupId};
    use crate::time::fixed_now;

    #[test]
    fn level_follows_floor_division() {
        assert_eq!(compute_level(0, 1000), 1);
        assert_eq!(compute_level(999, 1000), 1);
        assert_eq!(compute_level(1000, 1000), 2);
        assert_eq!(compute_level(2999, 1000), 3);
        for xp in (0..10_000).step_by(137) {
            assert_eq!(u64::from(compute_level(xp, 1000)), xp / 1000 + 1);
        }
    }

    #[test]
    fn zero_span_does_not_divide_by_zero() {
        assert_eq!(compute_level(5, 0), 6);
    }

    #[test]
    fn level_achievement_only_on_increase() {
        assert!(should_award_level_achievement(1, 2));
        assert!(!should_award_level_achievement(2, 2));
        assert_eq!(level_achievement(2, fixed_now()).id, "level-2");
    }

    #[test]
    fn explorer_id_uses_group() {
        let group = GroupDefinition::new(
            GroupId::new("dom").unwrap(),
            "The DOM",
            vec![],
            1,
            ContentOutline::default(),
        );
        let award = explorer_achievement(&group, 50, fixed_now());
        assert_eq!(award.id, "group-dom");
        assert_eq!(award.xp_reward, 50);
    }

    #[test]
    fn milestones_match_thresholds() {
        let none = milestones(
            MilestoneInput {
                items_completed: 0,
                unlocked_groups: 1,
                total_groups: 3,
            },
            fixed_now(),
        );
        assert!(none.is_empty());

        let all = milestones(
            MilestoneInput {
                items_completed: 10,
                unlocked_groups: 3,
                total_groups: 3,
            },
            fixed_now(),
        );
        let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec![FIRST_STEPS_ID, DEDICATED_LEARNER_ID, GALAXY_EXPLORER_ID]);
    }
}
