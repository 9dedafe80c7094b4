//! Lazy, single-flight loading of concept bundles.

mod loader;
mod source;

pub use loader::{CacheStats, ContentLoader, QUIZ_PASSING_PERCENT};
pub use source::{ContentSource, SyntheticSource, exercise_item_id, quiz_item_id};
