#![forbid(unsafe_code)]

pub mod app_services;
pub mod content;
pub mod document;
pub mod error;
pub mod events;
pub mod progress_store;

pub use orbit_core::Clock;

pub use app_services::AppServices;
pub use content::{CacheStats, ContentLoader, ContentSource, SyntheticSource};
pub use document::{ExportDocument, ProgressSnapshot, STORAGE_KEY};
pub use error::{
    AppServicesError, AssemblyFailure, BundlePart, ImportValidationError, ListenerError,
    LoadError, ProgressError, QuizAttemptError, SourceError,
};
pub use events::{EventBus, EventFilter, EventKind, ProgressEvent, Subscription};
pub use progress_store::{ProgressConfig, ProgressStore};
