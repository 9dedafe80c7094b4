use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{GroupId, IdError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphError {
    #[error("dependency graph must declare at least one group")]
    Empty,

    #[error("group `{0}` is declared more than once")]
    DuplicateGroup(GroupId),

    #[error("group `{group}` requires unknown group `{prerequisite}`")]
    UnknownPrerequisite {
        group: GroupId,
        prerequisite: GroupId,
    },

    #[error("group `{0}` lists itself as a prerequisite")]
    SelfPrerequisite(GroupId),

    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error("invalid dependency table: {0}")]
    Parse(String),
}

//
// ─── GROUP DEFINITION ──────────────────────────────────────────────────────────
//

/// Declared shape of a group's content, used by the content loader.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentOutline {
    /// Section ids in reading order.
    pub sections: Vec<String>,
    /// Number of exercise slots.
    pub exercises: u32,
    /// Number of quiz question slots.
    pub quiz_questions: u32,
}

/// Static configuration for one group. Never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDefinition {
    id: GroupId,
    title: String,
    prerequisites: Vec<GroupId>,
    item_count: u32,
    outline: ContentOutline,
}

impl GroupDefinition {
    #[must_use]
    pub fn new(
        id: GroupId,
        title: impl Into<String>,
        prerequisites: Vec<GroupId>,
        item_count: u32,
        outline: ContentOutline,
    ) -> Self {
        let mut seen = HashSet::new();
        let prerequisites = prerequisites
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .collect();
        Self {
            id,
            title: title.into(),
            prerequisites,
            item_count,
            outline,
        }
    }

    #[must_use]
    pub fn id(&self) -> &GroupId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn prerequisites(&self) -> &[GroupId] {
        &self.prerequisites
    }

    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    #[must_use]
    pub fn outline(&self) -> &ContentOutline {
        &self.outline
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.prerequisites.is_empty()
    }
}

//
// ─── DEPENDENCY GRAPH ──────────────────────────────────────────────────────────
//

/// Raw table entry as written in curriculum files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    prerequisites: Vec<String>,
    item_count: u32,
    #[serde(default)]
    sections: Vec<String>,
    #[serde(default)]
    exercises: Option<u32>,
    #[serde(default)]
    quiz_questions: Option<u32>,
}

/// Prerequisite graph over groups, kept in declaration order.
///
/// Declaration order is the tie-break for everything that walks the graph
/// (unlock events, progress listings), so it must stay stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    groups: Vec<GroupDefinition>,
    index: HashMap<GroupId, usize>,
}

impl DependencyGraph {
    /// Build a validated graph.
    ///
    /// # Errors
    ///
    /// Returns `GraphError` if the list is empty, an id repeats, or a
    /// prerequisite names an undeclared group.
    pub fn new(groups: Vec<GroupDefinition>) -> Result<Self, GraphError> {
        if groups.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut index = HashMap::with_capacity(groups.len());
        for (pos, group) in groups.iter().enumerate() {
            if index.insert(group.id().clone(), pos).is_some() {
                return Err(GraphError::DuplicateGroup(group.id().clone()));
            }
        }

        for group in &groups {
            for prerequisite in group.prerequisites() {
                if prerequisite == group.id() {
                    return Err(GraphError::SelfPrerequisite(group.id().clone()));
                }
                if !index.contains_key(prerequisite) {
                    return Err(GraphError::UnknownPrerequisite {
                        group: group.id().clone(),
                        prerequisite: prerequisite.clone(),
                    });
                }
            }
        }

        Ok(Self { groups, index })
    }

    /// Parse the `{groupId: {prerequisites, itemCount, ...}}` table.
    ///
    /// Missing section lists default to a single `intro` section; missing
    /// exercise and quiz counts default to `itemCount`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Parse` for malformed JSON and the validation
    /// errors of [`DependencyGraph::new`].
    pub fn from_json_str(raw: &str) -> Result<Self, GraphError> {
        let table: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(raw).map_err(|err| GraphError::Parse(err.to_string()))?;

        let mut groups = Vec::with_capacity(table.len());
        for (key, value) in table {
            let entry: TableEntry = serde_json::from_value(value)
                .map_err(|err| GraphError::Parse(format!("{key}: {err}")))?;
            let id = GroupId::new(key)?;
            let prerequisites = entry
                .prerequisites
                .into_iter()
                .map(GroupId::new)
                .collect::<Result<Vec<_>, _>>()?;
            let sections = if entry.sections.is_empty() {
                vec!["intro".to_owned()]
            } else {
                entry.sections
            };
            let outline = ContentOutline {
                sections,
                exercises: entry.exercises.unwrap_or(entry.item_count),
                quiz_questions: entry.quiz_questions.unwrap_or(entry.item_count),
            };
            let title = entry.title.unwrap_or_else(|| id.to_string());
            groups.push(GroupDefinition::new(
                id,
                title,
                prerequisites,
                entry.item_count,
                outline,
            ));
        }

        Self::new(groups)
    }

    /// The curriculum shipped with the application.
    #[must_use]
    pub fn builtin() -> Self {
        fn outline(sections: &[&str], exercises: u32, quiz_questions: u32) -> ContentOutline {
            ContentOutline {
                sections: sections.iter().map(|s| (*s).to_owned()).collect(),
                exercises,
                quiz_questions,
            }
        }
        fn id(raw: &'static str) -> GroupId {
            GroupId::from_static(raw)
        }

        let groups = vec![
            GroupDefinition::new(
                id("basics"),
                "JavaScript Basics",
                vec![],
                5,
                outline(&["variables", "types", "operators", "control-flow"], 3, 5),
            ),
            GroupDefinition::new(
                id("functions"),
                "Functions & Scope",
                vec![id("basics")],
                4,
                outline(&["declarations", "closures", "this"], 3, 4),
            ),
            GroupDefinition::new(
                id("dom"),
                "The DOM",
                vec![id("basics")],
                4,
                outline(&["tree", "selection", "manipulation"], 3, 4),
            ),
            GroupDefinition::new(
                id("events"),
                "Events",
                vec![id("dom")],
                3,
                outline(&["listeners", "propagation", "delegation"], 2, 3),
            ),
            GroupDefinition::new(
                id("async"),
                "Asynchronous JavaScript",
                vec![id("functions"), id("events")],
                5,
                outline(&["callbacks", "promises", "async-await", "event-loop"], 4, 5),
            ),
            GroupDefinition::new(
                id("modules"),
                "Modules & Tooling",
                vec![id("functions")],
                3,
                outline(&["imports", "bundling"], 2, 3),
            ),
        ];

        let index = groups
            .iter()
            .enumerate()
            .map(|(pos, group)| (group.id().clone(), pos))
            .collect();
        Self { groups, index }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&GroupDefinition> {
        self.index.get(id).map(|pos| &self.groups[*pos])
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Groups in declaration order.
    pub fn groups(&self) -> impl Iterator<Item = &GroupDefinition> {
        self.groups.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sum of `item_count` over all groups.
    #[must_use]
    pub fn total_items(&self) -> u32 {
        self.groups
            .iter()
            .fold(0_u32, |acc, g| acc.saturating_add(g.item_count()))
    }

    /// First declared group without prerequisites.
    #[must_use]
    pub fn first_root(&self) -> Option<&GroupId> {
        self.groups.iter().find(|g| g.is_root()).map(GroupDefinition::id)
    }

    /// Group unlocked in a fresh state: the first root, or the first declared
    /// group when every group has prerequisites.
    #[must_use]
    pub fn seed_group(&self) -> &GroupId {
        // `new` rejects empty graphs.
        self.first_root().unwrap_or_else(|| self.groups[0].id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gid(raw: &str) -> GroupId {
        GroupId::new(raw).unwrap()
    }

    #[test]
    fn parses_table_in_declaration_order() {
        let graph = DependencyGraph::from_json_str(
            r#"{
                "basics": {"prerequisites": [], "itemCount": 1},
                "events": {"prerequisites": ["dom"], "itemCount": 2},
                "dom": {"prerequisites": ["basics"], "itemCount": 3, "sections": ["tree", "nodes"]}
            }"#,
        )
        .unwrap();

        let order: Vec<&str> = graph.groups().map(|g| g.id().as_str()).collect();
        assert_eq!(order, vec!["basics", "events", "dom"]);

        let dom = graph.get("dom").unwrap();
        assert_eq!(dom.prerequisites(), &[gid("basics")]);
        assert_eq!(dom.outline().sections, vec!["tree", "nodes"]);
        assert_eq!(dom.outline().exercises, 3);
        assert_eq!(graph.get("basics").unwrap().outline().sections, vec!["intro"]);
        assert_eq!(graph.total_items(), 6);
    }

    #[test]
    fn rejects_unknown_prerequisite() {
        let err = DependencyGraph::from_json_str(
            r#"{"dom": {"prerequisites": ["basics"], "itemCount": 1}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownPrerequisite {
                group: gid("dom"),
                prerequisite: gid("basics"),
            }
        );
    }

    #[test]
    fn rejects_duplicates_and_empty_tables() {
        let basics = GroupDefinition::new(gid("basics"), "B", vec![], 1, ContentOutline::default());
        assert_eq!(
            DependencyGraph::new(vec![basics.clone(), basics]),
            Err(GraphError::DuplicateGroup(gid("basics")))
        );
        assert_eq!(DependencyGraph::new(vec![]), Err(GraphError::Empty));
    }

    #[test]
    fn rejects_self_prerequisite() {
        let looped = GroupDefinition::new(
            gid("loop"),
            "Loop",
            vec![gid("loop")],
            1,
            ContentOutline::default(),
        );
        assert_eq!(
            DependencyGraph::new(vec![looped]),
            Err(GraphError::SelfPrerequisite(gid("loop")))
        );
    }

    #[test]
    fn builtin_graph_is_valid() {
        let builtin = DependencyGraph::builtin();
        let rebuilt = DependencyGraph::new(builtin.groups().cloned().collect()).unwrap();
        assert_eq!(rebuilt, builtin);
        assert_eq!(builtin.first_root(), Some(&gid("basics")));
        assert_eq!(builtin.seed_group(), &gid("basics"));
    }

    #[test]
    fn seed_falls_back_to_first_declared_group() {
        let a = GroupDefinition::new(gid("a"), "A", vec![gid("b")], 1, ContentOutline::default());
        let b = GroupDefinition::new(gid("b"), "B", vec![gid("a")], 1, ContentOutline::default());
        let cyclic = DependencyGraph::new(vec![a, b]).unwrap();
        assert_eq!(cyclic.first_root(), None);
        assert_eq!(cyclic.seed_group(), &gid("a"));
    }

    #[test]
    fn duplicate_prerequisites_collapse() {
        let def = GroupDefinition::new(
            gid("dom"),
            "DOM",
            vec![gid("basics"), gid("basics")],
            1,
            ContentOutline::default(),
        );
        assert_eq!(def.prerequisites().len(), 1);
    }
}
