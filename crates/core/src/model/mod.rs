mod achievement;
pub mod content;
mod group;
mod ids;
mod progress;

pub use achievement::{Achievement, AchievementLog};
pub use content::{
    ConceptBundle, Exercise, Overview, QuizDefinition, QuizError, QuizOutcome, QuizQuestion,
    Section,
};
pub use group::{ContentOutline, DependencyGraph, GraphError, GroupDefinition};
pub use ids::{GroupId, IdError, ItemId};
pub use progress::{
    GroupProgress, ProgressPatch, ProgressState, QuizRecords, QuizScore, Settings, SettingsPatch,
    Stats, Theme, User, percent,
};
