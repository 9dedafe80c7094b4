use std::sync::Arc;

use orbit_core::model::{DependencyGraph, QuizOutcome, QuizScore};
use storage::repository::Storage;

use crate::Clock;
use crate::content::{ContentLoader, ContentSource, SyntheticSource};
use crate::error::{AppServicesError, QuizAttemptError};
use crate::progress_store::{ProgressConfig, ProgressStore};

/// Owns the one progress store and content loader of an application.
#[derive(Clone)]
pub struct AppServices {
    graph: Arc<DependencyGraph>,
    progress: Arc<ProgressStore>,
    content: Arc<ContentLoader>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and load saved progress.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Sqlite` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        graph: DependencyGraph,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock, graph, Arc::new(SyntheticSource::new())).await)
    }

    /// Build services over an in-memory store; nothing outlives the process.
    pub async fn in_memory(clock: Clock, graph: DependencyGraph) -> Self {
        Self::from_storage(
            Storage::in_memory(),
            clock,
            graph,
            Arc::new(SyntheticSource::new()),
        )
        .await
    }

    /// Wire services over explicit storage and content source.
    pub async fn from_storage(
        storage: Storage,
        clock: Clock,
        graph: DependencyGraph,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        let graph = Arc::new(graph);
        let config = ProgressConfig::for_graph(&graph);
        let progress = Arc::new(ProgressStore::new(
            Arc::clone(&graph),
            config,
            clock,
            Arc::clone(&storage.kv),
        ));
        progress.load().await;
        let content = Arc::new(ContentLoader::new(Arc::clone(&graph), source, clock));

        Self {
            graph,
            progress,
            content,
        }
    }

    /// Parse a curriculum table, or fall back to the built-in one.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Graph` if `raw` is not a valid table.
    pub fn graph_from_json(raw: Option<&str>) -> Result<DependencyGraph, AppServicesError> {
        match raw {
            Some(raw) => Ok(DependencyGraph::from_json_str(raw)?),
            None => Ok(DependencyGraph::builtin()),
        }
    }

    /// Grade `answers` against the quiz of `group` and record the score.
    /// `answers[i]` is the chosen option for question `i`.
    ///
    /// # Errors
    ///
    /// Returns `QuizAttemptError::Load` if the group's content cannot be
    /// loaded and `QuizAttemptError::Grade` if the answer count does not
    /// match the quiz. Nothing is recorded in either case.
    pub async fn take_quiz(
        &self,
        group: &str,
        answers: &[usize],
    ) -> Result<(QuizOutcome, QuizScore), QuizAttemptError> {
        let bundle = self.content.load_group(group).await?;
        let outcome = bundle.quiz.grade(answers)?;
        let score = self
            .progress
            .record_quiz_result(&bundle.id, outcome.percent)
            .await?;
        tracing::debug!(group, percent = outcome.percent, passed = outcome.passed, "quiz graded");
        Ok((outcome, score))
    }

    #[must_use]
    pub fn graph(&self) -> Arc<DependencyGraph> {
        Arc::clone(&self.graph)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressStore> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn content(&self) -> Arc<ContentLoader> {
        Arc::clone(&self.content)
    }
}
