use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared, join_all, try_join_all};
use tokio::runtime::Handle;

use orbit_core::Clock;
use orbit_core::model::{
    ConceptBundle, DependencyGraph, GroupDefinition, GroupId, QuizDefinition,
};

use super::source::{ContentSource, quiz_item_id};
use crate::error::{AssemblyFailure, BundlePart, LoadError, SourceError};

/// Score needed to pass an assembled quiz.
pub const QUIZ_PASSING_PERCENT: u8 = 70;

type LoadResult = Result<Arc<ConceptBundle>, LoadError>;
type PendingLoad = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Default)]
struct LoaderState {
    cache: HashMap<GroupId, Arc<ConceptBundle>>,
    in_flight: HashMap<GroupId, PendingLoad>,
}

fn lock(state: &Mutex<LoaderState>) -> MutexGuard<'_, LoaderState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Point-in-time view of the loader's cache and registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_count: usize,
    pub in_flight_count: usize,
    /// Cached group ids, sorted.
    pub keys: Vec<GroupId>,
}

/// Loads concept bundles with at most one assembly in flight per group.
///
/// Concurrent callers for the same group share one pending load and receive
/// the same `Arc`. Once started, an assembly runs to completion or failure
/// whether or not anyone is still waiting. Successful bundles stay cached
/// until `clear_cache`; failures are never cached.
#[derive(Clone)]
pub struct ContentLoader {
    graph: Arc<DependencyGraph>,
    source: Arc<dyn ContentSource>,
    clock: Clock,
    state: Arc<Mutex<LoaderState>>,
}

impl ContentLoader {
    #[must_use]
    pub fn new(graph: Arc<DependencyGraph>, source: Arc<dyn ContentSource>, clock: Clock) -> Self {
        Self {
            graph,
            source,
            clock,
            state: Arc::default(),
        }
    }

    /// Return the bundle for `group`, assembling it if needed.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::UnknownGroup` if the graph does not declare
    /// `group`, and `LoadError::Assembly` if any part failed to load.
    pub async fn load_group(&self, group: &str) -> LoadResult {
        let pending = {
            let mut state = lock(&self.state);
            if let Some(bundle) = state.cache.get(group) {
                return Ok(Arc::clone(bundle));
            }
            if let Some(pending) = state.in_flight.get(group) {
                tracing::trace!(group, "joining in-flight load");
                pending.clone()
            } else {
                let definition = self
                    .graph
                    .get(group)
                    .ok_or_else(|| LoadError::UnknownGroup(group.to_owned()))?
                    .clone();
                let id = definition.id().clone();
                let pending = self.start(definition);
                state.in_flight.insert(id, pending.clone());
                if let Ok(runtime) = Handle::try_current() {
                    runtime.spawn(pending.clone());
                }
                pending
            }
        };
        pending.await
    }

    /// Build the shared future for one assembly. It settles the registry
    /// itself, and `load_group` drives a copy on the runtime, so a started
    /// load finishes even when every waiter has gone away.
    fn start(&self, definition: GroupDefinition) -> PendingLoad {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let clock = self.clock;
        tracing::debug!(group = %definition.id(), "assembling bundle");

        async move {
            let result = assemble(source.as_ref(), &definition, clock.now())
                .await
                .map(Arc::new)
                .map_err(LoadError::from);

            let mut state = lock(&state);
            state.in_flight.remove(definition.id());
            match &result {
                Ok(bundle) => {
                    state.cache.insert(definition.id().clone(), Arc::clone(bundle));
                    tracing::debug!(group = %definition.id(), "bundle cached");
                }
                Err(err) => tracing::warn!(error = %err, "bundle assembly failed"),
            }
            result
        }
        .boxed()
        .shared()
    }

    #[must_use]
    pub fn is_cached(&self, group: &str) -> bool {
        lock(&self.state).cache.contains_key(group)
    }

    /// Drop the listed groups from the cache, or everything for `None`.
    /// In-flight loads are left alone. Returns how many bundles were removed.
    pub fn clear_cache(&self, groups: Option<&[GroupId]>) -> usize {
        let mut state = lock(&self.state);
        let removed = match groups {
            None => {
                let count = state.cache.len();
                state.cache.clear();
                count
            }
            Some(groups) => groups
                .iter()
                .filter(|group| state.cache.remove(group.as_str()).is_some())
                .count(),
        };
        tracing::debug!(removed, "content cache cleared");
        removed
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        let state = lock(&self.state);
        let mut keys: Vec<GroupId> = state.cache.keys().cloned().collect();
        keys.sort();
        CacheStats {
            cached_count: state.cache.len(),
            in_flight_count: state.in_flight.len(),
            keys,
        }
    }

    /// Load several groups concurrently. Results follow the input order.
    pub async fn preload(&self, groups: &[GroupId]) -> Vec<(GroupId, LoadResult)> {
        let loads = groups.iter().map(|group| async move {
            (group.clone(), self.load_group(group.as_str()).await)
        });
        join_all(loads).await
    }
}

fn failure(
    group: &GroupDefinition,
    part: BundlePart,
) -> impl FnOnce(SourceError) -> AssemblyFailure + '_ {
    move |source| AssemblyFailure {
        group: group.id().clone(),
        part,
        source,
    }
}

/// Fetch every part of `group` concurrently. The first failure aborts the rest.
async fn assemble(
    source: &dyn ContentSource,
    group: &GroupDefinition,
    loaded_at: DateTime<Utc>,
) -> Result<ConceptBundle, AssemblyFailure> {
    let outline = group.outline();

    let overview = async {
        source
            .overview(group)
            .await
            .map_err(failure(group, BundlePart::Overview))
    };
    let sections = try_join_all(outline.sections.iter().map(|section_id| async move {
        source
            .section(group, section_id)
            .await
            .map_err(failure(group, BundlePart::Section(section_id.clone())))
    }));
    let exercises = try_join_all((1..=outline.exercises).map(|slot| async move {
        source
            .exercise(group, slot)
            .await
            .map_err(failure(group, BundlePart::Exercise(slot)))
    }));
    let questions = try_join_all((1..=outline.quiz_questions).map(|slot| async move {
        source
            .quiz_question(group, slot)
            .await
            .map_err(failure(group, BundlePart::QuizQuestion(slot)))
    }));

    let (overview, sections, exercises, questions) =
        futures::try_join!(overview, sections, exercises, questions)?;

    Ok(ConceptBundle {
        id: group.id().clone(),
        overview,
        sections,
        exercises,
        quiz: QuizDefinition {
            id: quiz_item_id(group),
            questions,
            passing_percent: QUIZ_PASSING_PERCENT,
        },
        loaded_at,
    })
}
