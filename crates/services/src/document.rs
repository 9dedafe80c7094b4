//! The persisted learner document and its merge-over-defaults decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use orbit_core::model::{
    AchievementLog, GroupId, ProgressState, QuizRecords, Settings, Stats, User,
};

use crate::error::ImportValidationError;

/// Storage key holding the whole document.
pub const STORAGE_KEY: &str = "orbit.progress";

/// Version written into exports.
pub const DOCUMENT_VERSION: &str = "1.0";

const REQUIRED_IMPORT_KEYS: [&str; 3] = ["user", "progress", "stats"];

/// Complete learner state, as persisted and as handed to listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub user: User,
    pub progress: ProgressState,
    pub achievements: AchievementLog,
    pub settings: Settings,
    pub stats: Stats,
    pub quiz: QuizRecords,
}

impl ProgressSnapshot {
    /// Seed defaults: only `seed` unlocked, level 1, nothing earned.
    #[must_use]
    pub fn seeded(seed: &GroupId) -> Self {
        Self {
            user: User::default(),
            progress: ProgressState::seeded(seed),
            achievements: AchievementLog::default(),
            settings: Settings::default(),
            stats: Stats::default(),
            quiz: QuizRecords::default(),
        }
    }

    /// Decode `saved` by overlaying it onto `defaults` field by field.
    ///
    /// Fields missing from `saved` keep their default values, so documents
    /// written before a field existed still load.
    ///
    /// # Errors
    ///
    /// Returns the serde error if an overlaid field has the wrong shape.
    pub fn decode_over(defaults: &Self, saved: Value) -> Result<Self, serde_json::Error> {
        let base = serde_json::to_value(defaults)?;
        serde_json::from_value(merge_over_defaults(base, saved))
    }
}

/// Snapshot plus export metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(flatten)]
    pub snapshot: ProgressSnapshot,
    pub exported_at: DateTime<Utc>,
    pub version: String,
}

/// Overlay each known top-level section of `saved` onto `defaults`.
///
/// Object sections merge one level deep; any other value replaces the
/// default. Keys absent from `defaults` are dropped.
#[must_use]
pub fn merge_over_defaults(defaults: Value, saved: Value) -> Value {
    let (Value::Object(mut base), Value::Object(saved)) = (defaults, saved) else {
        return Value::Null;
    };

    for (key, saved_section) in saved {
        let Some(slot) = base.get_mut(&key) else {
            continue;
        };
        match (slot, saved_section) {
            (Value::Object(fields), Value::Object(saved_fields)) => {
                for (field, value) in saved_fields {
                    fields.insert(field, value);
                }
            }
            (slot, saved_section) => *slot = saved_section,
        }
    }

    Value::Object(base)
}

/// Check the top-level shape of an import before touching any state.
///
/// # Errors
///
/// Returns `ImportValidationError` if the value is not an object or a
/// required section is missing or not an object.
pub fn validate_import(raw: &Value) -> Result<(), ImportValidationError> {
    let Value::Object(map) = raw else {
        return Err(ImportValidationError::NotAnObject);
    };
    for key in REQUIRED_IMPORT_KEYS {
        match map.get(key) {
            None => return Err(ImportValidationError::MissingKey(key)),
            Some(Value::Object(_)) => {}
            Some(_) => return Err(ImportValidationError::InvalidKey(key)),
        }
    }
    Ok(())
}
