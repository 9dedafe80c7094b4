use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quiz::QuizDefinition;
use crate::model::ids::GroupId;

/// Introductory text shown before a group's sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
}

/// One reading section, in the order declared by the group outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    pub body: String,
}

/// A practice exercise filling one declared slot (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: String,
    pub slot: u32,
    pub prompt: String,
    pub starter_code: Option<String>,
    pub hint: Option<String>,
}

/// Fully assembled content for one group.
///
/// Bundles are immutable once assembled; the loader hands out shared
/// references to the cached instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptBundle {
    pub id: GroupId,
    pub overview: Overview,
    pub sections: Vec<Section>,
    pub exercises: Vec<Exercise>,
    pub quiz: QuizDefinition,
    pub loaded_at: DateTime<Utc>,
}

impl ConceptBundle {
    #[must_use]
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }
}
