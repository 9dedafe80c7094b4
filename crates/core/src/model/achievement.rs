use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A one-time award. The `id` is unique across the learner's whole history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    /// Informational; the XP is granted by the action that earned the award.
    pub xp_reward: u32,
}

impl Achievement {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
        xp_reward: u32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            timestamp,
            xp_reward,
        }
    }
}

/// Insertion-ordered achievement list with idempotent insert by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AchievementLog(Vec<Achievement>);

impl AchievementLog {
    /// Insert unless an achievement with the same id exists. Returns true on insert.
    pub fn insert(&mut self, achievement: Achievement) -> bool {
        if self.contains(&achievement.id) {
            return false;
        }
        self.0.push(achievement);
        true
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|a| a.id == id)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Achievement] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop later duplicates, e.g. after decoding a hand-edited document.
    pub fn dedup_by_id(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.0.retain(|a| seen.insert(a.id.clone()));
    }
}
