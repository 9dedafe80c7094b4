//! Shared error types for the services crate.

use std::fmt;

use thiserror::Error;

use orbit_core::model::{GraphError, GroupId, QuizError};
use storage::sqlite::SqliteInitError;

/// Errors reported by a `ContentSource` for one part of a bundle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SourceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("content source unavailable: {0}")]
    Unavailable(String),
}

/// Which part of a bundle failed to assemble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundlePart {
    Overview,
    Section(String),
    Exercise(u32),
    QuizQuestion(u32),
}

impl fmt::Display for BundlePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundlePart::Overview => f.write_str("overview"),
            BundlePart::Section(id) => write!(f, "section `{id}`"),
            BundlePart::Exercise(slot) => write!(f, "exercise #{slot}"),
            BundlePart::QuizQuestion(slot) => write!(f, "quiz question #{slot}"),
        }
    }
}

/// One of the concurrent bundle parts failed; nothing was cached.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to assemble {part} for `{group}`: {source}")]
pub struct AssemblyFailure {
    pub group: GroupId,
    pub part: BundlePart,
    #[source]
    pub source: SourceError,
}

/// Errors emitted by `ContentLoader`. Cloned to every waiter of a shared load.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoadError {
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error(transparent)]
    Assembly(#[from] AssemblyFailure),
}

/// Errors emitted by `ProgressStore` operations that take a group id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("unknown group `{0}`")]
    UnknownGroup(GroupId),
}

/// Errors emitted while grading and recording a quiz attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizAttemptError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Grade(#[from] QuizError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// An import document was rejected before any state changed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ImportValidationError {
    #[error("import document is not valid JSON: {0}")]
    Malformed(String),
    #[error("import document must be a JSON object")]
    NotAnObject,
    #[error("import document is missing `{0}`")]
    MissingKey(&'static str),
    #[error("import document field `{0}` must be an object")]
    InvalidKey(&'static str),
    #[error("import document could not be decoded: {0}")]
    Decode(String),
}

/// A listener panicked while handling an event. Logged, never propagated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("listener {listener} panicked on `{event}`: {message}")]
pub struct ListenerError {
    pub listener: u64,
    pub event: &'static str,
    pub message: String,
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}
