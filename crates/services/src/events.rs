//! Progress events and the listener registry that delivers them.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use orbit_core::model::{
    Achievement, GroupId, ItemId, ProgressState, QuizScore, Settings,
};

use crate::document::ProgressSnapshot;
use crate::error::ListenerError;

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// Discriminant of a [`ProgressEvent`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Progress,
    ItemCompleted,
    GroupUnlocked,
    CurrentGroupChanged,
    XpGained,
    LevelUp,
    AchievementEarned,
    ProgressReset,
    SettingsUpdated,
    DataImported,
    QuizRecorded,
}

impl EventKind {
    /// Wire name of the event, as seen by UI collaborators.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Progress => "progress",
            EventKind::ItemCompleted => "itemCompleted",
            EventKind::GroupUnlocked => "groupUnlocked",
            EventKind::CurrentGroupChanged => "currentGroupChanged",
            EventKind::XpGained => "xpGained",
            EventKind::LevelUp => "levelUp",
            EventKind::AchievementEarned => "achievementEarned",
            EventKind::ProgressReset => "progressReset",
            EventKind::SettingsUpdated => "settingsUpdated",
            EventKind::DataImported => "dataImported",
            EventKind::QuizRecorded => "quizRecorded",
        }
    }
}

/// Something changed in the progress store. Each variant carries its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress(ProgressState),
    ItemCompleted(ItemId),
    GroupUnlocked(GroupId),
    CurrentGroupChanged(Option<GroupId>),
    XpGained { amount: u64, total_xp: u64 },
    LevelUp { previous: u32, level: u32 },
    AchievementEarned(Achievement),
    ProgressReset,
    SettingsUpdated(Settings),
    DataImported,
    QuizRecorded { group: GroupId, score: QuizScore },
}

impl ProgressEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ProgressEvent::Progress(_) => EventKind::Progress,
            ProgressEvent::ItemCompleted(_) => EventKind::ItemCompleted,
            ProgressEvent::GroupUnlocked(_) => EventKind::GroupUnlocked,
            ProgressEvent::CurrentGroupChanged(_) => EventKind::CurrentGroupChanged,
            ProgressEvent::XpGained { .. } => EventKind::XpGained,
            ProgressEvent::LevelUp { .. } => EventKind::LevelUp,
            ProgressEvent::AchievementEarned(_) => EventKind::AchievementEarned,
            ProgressEvent::ProgressReset => EventKind::ProgressReset,
            ProgressEvent::SettingsUpdated(_) => EventKind::SettingsUpdated,
            ProgressEvent::DataImported => EventKind::DataImported,
            ProgressEvent::QuizRecorded { .. } => EventKind::QuizRecorded,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

//
// ─── FILTERS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventFilter {
    #[default]
    All,
    Only(Vec<EventKind>),
}

impl EventFilter {
    #[must_use]
    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self::Only(kinds.into_iter().collect())
    }

    #[must_use]
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(kinds) => kinds.contains(&kind),
        }
    }
}

//
// ─── BUS ───────────────────────────────────────────────────────────────────────
//

type Handler = Arc<dyn Fn(&ProgressEvent, &ProgressSnapshot) + Send + Sync>;

struct Listener {
    id: u64,
    filter: EventFilter,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<Listener>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered listener registry with per-listener panic isolation.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events accepted by `filter`.
    ///
    /// Handlers run in subscription order.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> Subscription
    where
        F: Fn(&ProgressEvent, &ProgressSnapshot) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push(Listener {
            id,
            filter,
            handler: Arc::new(handler),
        });
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    /// Deliver `events` in order to every matching listener.
    ///
    /// The registry lock is released before handlers run, so a handler may
    /// subscribe or unsubscribe. Panics are caught, logged, and returned.
    pub fn publish(
        &self,
        events: &[ProgressEvent],
        snapshot: &ProgressSnapshot,
    ) -> Vec<ListenerError> {
        let mut failures = Vec::new();
        for event in events {
            let kind = event.kind();
            let targets: Vec<(u64, Handler)> = lock(&self.registry)
                .listeners
                .iter()
                .filter(|l| l.filter.matches(kind))
                .map(|l| (l.id, Arc::clone(&l.handler)))
                .collect();

            for (id, handler) in targets {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(event, snapshot))) {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_owned())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_owned());
                    let failure = ListenerError {
                        listener: id,
                        event: kind.name(),
                        message,
                    };
                    tracing::error!(error = %failure, "progress listener failed");
                    failures.push(failure);
                }
            }
        }
        failures
    }
}

/// Handle returned by [`EventBus::subscribe`]; removes exactly that listener.
///
/// Dropping the handle keeps the listener registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = lock(&registry);
        let before = registry.listeners.len();
        registry.listeners.retain(|l| l.id != self.id);
        registry.listeners.len() != before
    }
}
