pub mod bundle;
pub mod quiz;

pub use bundle::{ConceptBundle, Exercise, Overview, Section};
pub use quiz::{QuizDefinition, QuizError, QuizOutcome, QuizQuestion};
