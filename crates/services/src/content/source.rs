use async_trait::async_trait;

use orbit_core::model::{Exercise, GroupDefinition, Overview, QuizQuestion, Section};

use crate::error::SourceError;

/// Where bundle parts come from.
///
/// Every method receives the static group definition, so sources can use the
/// declared outline without a second lookup. Slots are 1-based.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn overview(&self, group: &GroupDefinition) -> Result<Overview, SourceError>;

    async fn section(
        &self,
        group: &GroupDefinition,
        section_id: &str,
    ) -> Result<Section, SourceError>;

    async fn exercise(&self, group: &GroupDefinition, slot: u32) -> Result<Exercise, SourceError>;

    async fn quiz_question(
        &self,
        group: &GroupDefinition,
        slot: u32,
    ) -> Result<QuizQuestion, SourceError>;
}

/// Item id of exercise `slot` in `group`, e.g. `dom-ex2`.
#[must_use]
pub fn exercise_item_id(group: &GroupDefinition, slot: u32) -> String {
    format!("{}-ex{slot}", group.id())
}

/// Item id recorded when the quiz of `group` is passed, e.g. `dom-quiz`.
#[must_use]
pub fn quiz_item_id(group: &GroupDefinition) -> String {
    format!("{}-quiz", group.id())
}

/// Deterministic placeholder content derived from the group outline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticSource;

impl SyntheticSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn title_case(raw: &str) -> String {
    raw.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl ContentSource for SyntheticSource {
    async fn overview(&self, group: &GroupDefinition) -> Result<Overview, SourceError> {
        Ok(Overview {
            title: group.title().to_owned(),
            summary: format!("An introduction to {}.", group.title()),
            key_points: group
                .outline()
                .sections
                .iter()
                .map(String::as_str)
                .map(title_case)
                .collect(),
        })
    }

    async fn section(
        &self,
        group: &GroupDefinition,
        section_id: &str,
    ) -> Result<Section, SourceError> {
        if !group.outline().sections.iter().any(|s| s == section_id) {
            return Err(SourceError::NotFound(format!(
                "section `{section_id}` of `{}`",
                group.id()
            )));
        }
        Ok(Section {
            id: section_id.to_owned(),
            title: title_case(section_id),
            body: format!("{}: {}", group.title(), title_case(section_id)),
        })
    }

    async fn exercise(&self, group: &GroupDefinition, slot: u32) -> Result<Exercise, SourceError> {
        if slot == 0 || slot > group.outline().exercises {
            return Err(SourceError::NotFound(format!(
                "exercise #{slot} of `{}`",
                group.id()
            )));
        }
        Ok(Exercise {
            id: exercise_item_id(group, slot),
            slot,
            prompt: format!("{} practice #{slot}", group.title()),
            starter_code: None,
            hint: Some(format!("Review the {} overview.", group.title())),
        })
    }

    async fn quiz_question(
        &self,
        group: &GroupDefinition,
        slot: u32,
    ) -> Result<QuizQuestion, SourceError> {
        if slot == 0 || slot > group.outline().quiz_questions {
            return Err(SourceError::NotFound(format!(
                "quiz question #{slot} of `{}`",
                group.id()
            )));
        }
        Ok(QuizQuestion {
            id: format!("{}-q{slot}", group.id()),
            slot,
            prompt: format!("{} question #{slot}", group.title()),
            options: vec!["A".to_owned(), "B".to_owned(), "C".to_owned()],
            correct_option: 0,
            explanation: format!("See the {} sections.", group.title()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_core::model::DependencyGraph;

    fn dom() -> GroupDefinition {
        DependencyGraph::from_json_str(
            r#"{"dom": {"prerequisites": [], "itemCount": 2, "title": "The DOM", "sections": ["tree-walking"]}}"#,
        )
        .unwrap()
        .get("dom")
        .unwrap()
        .clone()
    }

    #[tokio::test]
    async fn synthetic_ids_follow_item_convention() {
        let source = SyntheticSource::new();
        let group = dom();

        let exercise = source.exercise(&group, 2).await.unwrap();
        assert_eq!(exercise.id, "dom-ex2");
        assert_eq!(quiz_item_id(&group), "dom-quiz");

        let section = source.section(&group, "tree-walking").await.unwrap();
        assert_eq!(section.title, "Tree Walking");
    }

    #[tokio::test]
    async fn out_of_outline_requests_are_not_found() {
        let source = SyntheticSource::new();
        let group = dom();

        assert!(matches!(
            source.exercise(&group, 3).await,
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            source.quiz_question(&group, 0).await,
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            source.section(&group, "missing").await,
            Err(SourceError::NotFound(_))
        ));
    }
}
