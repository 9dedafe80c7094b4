use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::group::DependencyGraph;
use crate::model::ids::{GroupId, ItemId};

//
// ─── PROGRESS STATE ────────────────────────────────────────────────────────────
//

/// Learner progress through the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub unlocked_groups: BTreeSet<GroupId>,
    /// Completion order is kept for export; membership is what matters.
    pub completed_items: Vec<ItemId>,
    pub current_group: Option<GroupId>,
    /// Derived from `completed_items`; recomputed on every completion.
    pub overall_progress_percent: f64,
}

impl ProgressState {
    /// Fresh state with only `seed` unlocked and selected.
    #[must_use]
    pub fn seeded(seed: &GroupId) -> Self {
        Self {
            unlocked_groups: BTreeSet::from([seed.clone()]),
            completed_items: Vec::new(),
            current_group: Some(seed.clone()),
            overall_progress_percent: 0.0,
        }
    }

    #[must_use]
    pub fn is_completed(&self, item: &str) -> bool {
        self.completed_items.iter().any(|done| done.as_str() == item)
    }

    #[must_use]
    pub fn is_unlocked(&self, group: &str) -> bool {
        self.unlocked_groups.contains(group)
    }

    /// Completed items counted towards `group` by the prefix rule.
    #[must_use]
    pub fn completed_in(&self, group: &GroupId) -> u32 {
        let count = self
            .completed_items
            .iter()
            .filter(|item| item.belongs_to(group))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Recompute `overall_progress_percent` against the graph's total item count.
    ///
    /// Each declared group contributes at most its own `item_count`; items of
    /// undeclared groups contribute nothing.
    pub fn recompute_percent(&mut self, graph: &DependencyGraph) {
        let completed = graph
            .groups()
            .map(|group| self.completed_in(group.id()).min(group.item_count()))
            .fold(0u32, u32::saturating_add);
        self.overall_progress_percent = percent(completed, graph.total_items());
    }

    /// Shallow-merge the fields present in `patch`.
    pub fn apply(&mut self, patch: ProgressPatch) {
        if let Some(unlocked) = patch.unlocked_groups {
            self.unlocked_groups = unlocked;
        }
        if let Some(completed) = patch.completed_items {
            self.completed_items = completed;
        }
        if let Some(current) = patch.current_group {
            self.current_group = current;
        }
    }
}

/// Partial update for [`ProgressState`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressPatch {
    pub unlocked_groups: Option<BTreeSet<GroupId>>,
    pub completed_items: Option<Vec<ItemId>>,
    pub current_group: Option<Option<GroupId>>,
}

/// Per-group completion view, useful for UI.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupProgress {
    pub group_id: GroupId,
    pub unlocked: bool,
    pub completed: u32,
    pub total: u32,
    pub percent: f64,
}

impl GroupProgress {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

/// `done / total` as a percentage in `[0, 100]`; zero when `total` is zero.
#[must_use]
pub fn percent(done: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (f64::from(done) / f64::from(total) * 100.0).min(100.0)
}

//
// ─── USER ──────────────────────────────────────────────────────────────────────
//

/// XP and level. `level` always equals `total_xp / xp_per_level + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub level: u32,
    pub total_xp: u64,
}

impl Default for User {
    fn default() -> Self {
        Self {
            level: 1,
            total_xp: 0,
        }
    }
}

//
// ─── STATS ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub items_completed: u32,
    pub groups_explored: u32,
    pub quizzes_taken: u32,
    pub last_active_at: Option<DateTime<Utc>>,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// Learner preferences. Persisted alongside progress but never reset with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub sound_enabled: bool,
    pub animations_enabled: bool,
    pub show_hints: bool,
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            animations_enabled: true,
            show_hints: true,
            theme: Theme::Dark,
        }
    }
}

impl Settings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(value) = patch.sound_enabled {
            self.sound_enabled = value;
        }
        if let Some(value) = patch.animations_enabled {
            self.animations_enabled = value;
        }
        if let Some(value) = patch.show_hints {
            self.show_hints = value;
        }
        if let Some(value) = patch.theme {
            self.theme = value;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub sound_enabled: Option<bool>,
    pub animations_enabled: Option<bool>,
    pub show_hints: Option<bool>,
    pub theme: Option<Theme>,
}

//
// ─── QUIZ RECORDS ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    pub best_percent: u8,
    pub last_percent: u8,
    pub attempts: u32,
}

/// Quiz history keyed by group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRecords {
    pub groups: BTreeMap<GroupId, QuizScore>,
}

impl QuizRecords {
    /// Record an attempt (clamped to 100) and return the updated score.
    pub fn record(&mut self, group: GroupId, percent: u8) -> QuizScore {
        let percent = percent.min(100);
        let entry = self.groups.entry(group).or_default();
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_percent = percent;
        entry.best_percent = entry.best_percent.max(percent);
        *entry
    }

    #[must_use]
    pub fn get(&self, group: &str) -> Option<&QuizScore> {
        self.groups.get(group)
    }
}
