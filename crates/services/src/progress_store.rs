//! Single source of truth for learner progress.
//!
//! Every public mutation follows the same sequence while holding the state
//! lock: mutate, recompute derived fields, persist, then notify listeners
//! with the already-persisted snapshot. Events raised by nested steps (XP,
//! level-ups, unlocks, achievements) are queued and delivered in the order
//! they were raised.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use orbit_core::model::{
    Achievement, DependencyGraph, GroupId, GroupProgress, ItemId, ProgressPatch, ProgressState,
    QuizRecords, QuizScore, Settings, SettingsPatch, Stats, User, percent,
};
use orbit_core::xp::{self, MilestoneInput, XpRules};
use orbit_core::{Clock, unlock};
use storage::repository::KeyValueStore;

use crate::document::{
    DOCUMENT_VERSION, ExportDocument, ProgressSnapshot, STORAGE_KEY, validate_import,
};
use crate::error::{ImportValidationError, ProgressError};
use crate::events::{EventBus, EventFilter, ProgressEvent, Subscription};

/// Tunables for a progress store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressConfig {
    /// The one group unlocked in a fresh state.
    pub seed_group: GroupId,
    pub xp: XpRules,
    pub storage_key: String,
}

impl ProgressConfig {
    /// Defaults for `graph`: its first root group is the seed.
    #[must_use]
    pub fn for_graph(graph: &DependencyGraph) -> Self {
        Self {
            seed_group: graph.seed_group().clone(),
            xp: XpRules::default(),
            storage_key: STORAGE_KEY.to_owned(),
        }
    }
}

//
// ─── MUTATION ──────────────────────────────────────────────────────────────────
//

/// One in-progress mutation: the state being changed plus queued events.
struct Mutation<'a> {
    data: &'a mut ProgressSnapshot,
    graph: &'a DependencyGraph,
    rules: XpRules,
    now: DateTime<Utc>,
    events: Vec<ProgressEvent>,
}

impl<'a> Mutation<'a> {
    fn new(
        data: &'a mut ProgressSnapshot,
        graph: &'a DependencyGraph,
        rules: XpRules,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            data,
            graph,
            rules,
            now,
            events: Vec::new(),
        }
    }

    fn emit(&mut self, event: ProgressEvent) {
        self.events.push(event);
    }

    fn touch(&mut self) {
        self.data.stats.last_active_at = Some(self.now);
    }

    fn add_achievement(&mut self, achievement: Achievement) -> bool {
        if !self.data.achievements.insert(achievement.clone()) {
            return false;
        }
        tracing::info!(achievement = %achievement.id, "achievement earned");
        self.emit(ProgressEvent::AchievementEarned(achievement));
        true
    }

    fn add_xp(&mut self, amount: u64) {
        let previous = self.data.user.level;
        let total_xp = self.data.user.total_xp.saturating_add(amount);
        let level = self.rules.level_for(total_xp);
        self.data.user.total_xp = total_xp;
        self.data.user.level = level;

        if xp::should_award_level_achievement(previous, level) {
            self.add_achievement(xp::level_achievement(level, self.now));
            tracing::info!(previous, level, "level up");
            self.emit(ProgressEvent::LevelUp { previous, level });
        }
        self.emit(ProgressEvent::XpGained { amount, total_xp });
    }

    fn unlock_group(&mut self, group: &GroupId) -> bool {
        if self.data.progress.is_unlocked(group.as_str()) {
            return false;
        }
        let Some(definition) = self.graph.get(group.as_str()) else {
            tracing::warn!(%group, "ignoring unlock of unknown group");
            return false;
        };
        let explorer = xp::explorer_achievement(definition, self.rules.unlock_xp, self.now);

        self.data.progress.unlocked_groups.insert(group.clone());
        self.data.stats.groups_explored = self.data.stats.groups_explored.saturating_add(1);
        self.add_xp(self.rules.unlock_xp);
        self.add_achievement(explorer);
        tracing::info!(%group, "group unlocked");
        self.emit(ProgressEvent::GroupUnlocked(group.clone()));
        true
    }

    fn check_milestones(&mut self) {
        let input = MilestoneInput {
            items_completed: self.data.stats.items_completed,
            unlocked_groups: self
                .graph
                .groups()
                .filter(|g| self.data.progress.is_unlocked(g.id().as_str()))
                .count(),
            total_groups: self.graph.len(),
        };
        for achievement in xp::milestones(input, self.now) {
            self.add_achievement(achievement);
        }
    }

    fn complete_item(&mut self, item: ItemId) -> bool {
        if self.data.progress.is_completed(item.as_str()) {
            return false;
        }
        self.data.progress.completed_items.push(item.clone());
        self.data.stats.items_completed = self.data.stats.items_completed.saturating_add(1);
        self.touch();
        self.add_xp(self.rules.item_xp);

        let newly: Vec<GroupId> = unlock::newly_unlockable(
            self.graph,
            &self.data.progress.unlocked_groups,
            &self.data.progress.completed_items,
        )
        .into_iter()
        .cloned()
        .collect();
        for group in &newly {
            self.unlock_group(group);
        }

        self.check_milestones();
        self.data.progress.recompute_percent(self.graph);
        tracing::debug!(%item, unlocked = newly.len(), "item completed");
        self.emit(ProgressEvent::ItemCompleted(item));
        true
    }

    fn into_events(self) -> Vec<ProgressEvent> {
        self.events
    }
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// Owns learner state, persists it through a `KeyValueStore`, and notifies
/// subscribers.
///
/// Persistence failures never surface to callers: they are logged and the
/// store keeps working in memory.
pub struct ProgressStore {
    graph: Arc<DependencyGraph>,
    config: ProgressConfig,
    clock: Clock,
    kv: Arc<dyn KeyValueStore>,
    state: Mutex<ProgressSnapshot>,
    events: EventBus,
}

impl ProgressStore {
    /// Create a store holding seeded defaults. Call [`ProgressStore::load`]
    /// to apply saved progress.
    #[must_use]
    pub fn new(
        graph: Arc<DependencyGraph>,
        config: ProgressConfig,
        clock: Clock,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        let state = Mutex::new(ProgressSnapshot::seeded(&config.seed_group));
        Self {
            graph,
            config,
            clock,
            kv,
            state,
            events: EventBus::new(),
        }
    }

    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    fn defaults(&self) -> ProgressSnapshot {
        ProgressSnapshot::seeded(&self.config.seed_group)
    }

    /// Restore invariants on a decoded document.
    fn normalize(&self, mut data: ProgressSnapshot) -> ProgressSnapshot {
        data.progress
            .unlocked_groups
            .insert(self.config.seed_group.clone());
        data.user.level = self.config.xp.level_for(data.user.total_xp);
        data.achievements.dedup_by_id();
        data.progress.recompute_percent(&self.graph);
        data
    }

    fn decode(&self, raw: Value) -> Result<ProgressSnapshot, serde_json::Error> {
        ProgressSnapshot::decode_over(&self.defaults(), raw).map(|data| self.normalize(data))
    }

    // ─── Persistence ──────────────────────────────────────────────────────────

    /// Apply the saved document, if any, over the defaults.
    ///
    /// Returns true if saved progress was applied. Read or decode failures are
    /// logged and leave the current state untouched.
    pub async fn load(&self) -> bool {
        let raw = match self.kv.get(&self.config.storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %self.config.storage_key, "no saved progress");
                return false;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to read saved progress, using defaults");
                return false;
            }
        };

        let decoded = serde_json::from_str::<Value>(&raw).and_then(|value| self.decode(value));
        match decoded {
            Ok(data) => {
                *self.state.lock().await = data;
                tracing::info!(key = %self.config.storage_key, "loaded saved progress");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "saved progress is unreadable, using defaults");
                false
            }
        }
    }

    /// Persist the current state.
    pub async fn save(&self) {
        let data = self.state.lock().await;
        self.persist(&data).await;
    }

    async fn persist(&self, data: &ProgressSnapshot) {
        let encoded = match serde_json::to_string(data) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode progress");
                return;
            }
        };
        if let Err(err) = self.kv.set(&self.config.storage_key, &encoded).await {
            tracing::warn!(error = %err, "failed to save progress, continuing in memory");
        }
    }

    /// Run `f` against the state, then persist and notify if it raised events.
    async fn mutate<R>(&self, f: impl FnOnce(&mut Mutation<'_>) -> R) -> R {
        let mut data = self.state.lock().await;
        let (result, events) = {
            let mut mutation =
                Mutation::new(&mut data, &self.graph, self.config.xp, self.clock.now());
            let result = f(&mut mutation);
            (result, mutation.into_events())
        };
        if events.is_empty() {
            return result;
        }

        self.persist(&data).await;
        self.events.publish(&events, &data);
        result
    }

    // ─── Reads ────────────────────────────────────────────────────────────────

    pub async fn get_progress(&self) -> ProgressState {
        self.state.lock().await.progress.clone()
    }

    pub async fn get_user(&self) -> User {
        self.state.lock().await.user
    }

    pub async fn get_achievements(&self) -> Vec<Achievement> {
        self.state.lock().await.achievements.as_slice().to_vec()
    }

    pub async fn get_settings(&self) -> Settings {
        self.state.lock().await.settings.clone()
    }

    pub async fn get_stats(&self) -> Stats {
        self.state.lock().await.stats.clone()
    }

    pub async fn get_quiz_records(&self) -> QuizRecords {
        self.state.lock().await.quiz.clone()
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().await.clone()
    }

    pub async fn is_group_unlocked(&self, group: &str) -> bool {
        self.state.lock().await.progress.is_unlocked(group)
    }

    pub async fn is_item_completed(&self, item: &str) -> bool {
        self.state.lock().await.progress.is_completed(item)
    }

    /// Completion of one group, or `None` if the graph does not declare it.
    pub async fn group_progress(&self, group: &str) -> Option<GroupProgress> {
        let definition = self.graph.get(group)?;
        let data = self.state.lock().await;
        Some(group_progress_of(&data.progress, definition.id(), definition.item_count()))
    }

    /// Completion of every group, in declaration order.
    pub async fn all_group_progress(&self) -> Vec<GroupProgress> {
        let data = self.state.lock().await;
        self.graph
            .groups()
            .map(|g| group_progress_of(&data.progress, g.id(), g.item_count()))
            .collect()
    }

    /// Prerequisites of `group` that still need a completed item.
    pub async fn missing_prerequisites(&self, group: &str) -> Option<Vec<GroupId>> {
        let definition = self.graph.get(group)?;
        let data = self.state.lock().await;
        Some(
            unlock::missing_prerequisites(definition, &data.progress.completed_items)
                .into_iter()
                .cloned()
                .collect(),
        )
    }

    // ─── Mutations ────────────────────────────────────────────────────────────

    /// Shallow-merge `patch` into the progress state.
    pub async fn update_progress(&self, patch: ProgressPatch) {
        self.mutate(|m| {
            m.data.progress.apply(patch);
            m.data.progress.recompute_percent(m.graph);
            let progress = m.data.progress.clone();
            m.emit(ProgressEvent::Progress(progress));
        })
        .await;
    }

    /// Mark `item` completed. Returns false if it already was.
    pub async fn complete_item(&self, item: ItemId) -> bool {
        self.mutate(|m| m.complete_item(item)).await
    }

    /// Unlock `group` directly. Returns false if it was already unlocked or
    /// is not part of the graph.
    pub async fn unlock_group(&self, group: &GroupId) -> bool {
        self.mutate(|m| {
            let unlocked = m.unlock_group(group);
            if unlocked {
                m.check_milestones();
            }
            unlocked
        })
        .await
    }

    pub async fn set_current_group(&self, group: Option<GroupId>) {
        self.mutate(|m| {
            m.data.progress.current_group.clone_from(&group);
            m.emit(ProgressEvent::CurrentGroupChanged(group));
        })
        .await;
    }

    pub async fn add_xp(&self, amount: u64) {
        self.mutate(|m| m.add_xp(amount)).await;
    }

    /// Record `achievement` unless its id was already earned.
    pub async fn add_achievement(&self, achievement: Achievement) -> bool {
        self.mutate(|m| m.add_achievement(achievement)).await
    }

    pub async fn update_settings(&self, patch: SettingsPatch) {
        self.mutate(|m| {
            m.data.settings.apply(patch);
            let settings = m.data.settings.clone();
            m.emit(ProgressEvent::SettingsUpdated(settings));
        })
        .await;
    }

    /// Record a quiz attempt for `group` as a percentage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UnknownGroup` if the graph does not declare `group`.
    pub async fn record_quiz_result(
        &self,
        group: &GroupId,
        percent: u8,
    ) -> Result<QuizScore, ProgressError> {
        let definition = self
            .graph
            .get(group.as_str())
            .ok_or_else(|| ProgressError::UnknownGroup(group.clone()))?
            .clone();

        let score = self
            .mutate(|m| {
                let score = m.data.quiz.record(group.clone(), percent);
                m.data.stats.quizzes_taken = m.data.stats.quizzes_taken.saturating_add(1);
                m.touch();
                if score.last_percent == 100 {
                    m.add_achievement(xp::perfect_quiz_achievement(&definition, m.now));
                }
                m.emit(ProgressEvent::QuizRecorded {
                    group: group.clone(),
                    score,
                });
                score
            })
            .await;
        Ok(score)
    }

    /// Reset progress, user, achievements, stats and quiz records to seed
    /// defaults. Settings are preserved.
    pub async fn reset_progress(&self) {
        let defaults = self.defaults();
        self.mutate(|m| {
            let settings = std::mem::take(&mut m.data.settings);
            *m.data = defaults;
            m.data.settings = settings;
            tracing::info!("progress reset");
            m.emit(ProgressEvent::ProgressReset);
        })
        .await;
    }

    // ─── Import / export ──────────────────────────────────────────────────────

    pub async fn export_document(&self) -> ExportDocument {
        ExportDocument {
            snapshot: self.snapshot().await,
            exported_at: self.clock.now(),
            version: DOCUMENT_VERSION.to_owned(),
        }
    }

    /// Replace all state with an exported document.
    ///
    /// # Errors
    ///
    /// Returns `ImportValidationError` if the document is malformed or lacks
    /// `user`, `progress` or `stats`; existing state is left untouched.
    pub async fn import_document(&self, raw: &str) -> Result<(), ImportValidationError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| ImportValidationError::Malformed(err.to_string()))?;
        validate_import(&value)?;
        let imported = self
            .decode(value)
            .map_err(|err| ImportValidationError::Decode(err.to_string()))?;

        self.mutate(|m| {
            *m.data = imported;
            tracing::info!("progress imported");
            m.emit(ProgressEvent::DataImported);
        })
        .await;
        Ok(())
    }

    // ─── Listeners ────────────────────────────────────────────────────────────

    /// Subscribe to every event.
    pub fn add_listener<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ProgressEvent, &ProgressSnapshot) + Send + Sync + 'static,
    {
        self.events.subscribe(EventFilter::All, handler)
    }

    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> Subscription
    where
        F: Fn(&ProgressEvent, &ProgressSnapshot) + Send + Sync + 'static,
    {
        self.events.subscribe(filter, handler)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }
}

fn group_progress_of(progress: &ProgressState, group: &GroupId, total: u32) -> GroupProgress {
    let completed = progress.completed_in(group);
    GroupProgress {
        group_id: group.clone(),
        unlocked: progress.is_unlocked(group.as_str()),
        completed,
        total,
        percent: percent(completed, total),
    }
}
