//! Reading, migrating and writing the persisted progress and template
//! documents.
//!
//! Both documents are stored as `{"version": 1, "data": ...}`. Older builds
//! wrote the payload without the envelope, so loading first classifies the
//! raw JSON into a [`StoredDocument`] and then maps each historical shape to
//! the current one. Loading never fails: anything unreadable becomes empty.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::merge::merge;
use crate::model::{ProgressRecord, ProgressStore, TemplateRecord};
use crate::normalize::{ExerciseKey, normalize};

/// Envelope version written by this build.
pub const CURRENT_VERSION: u64 = 1;

/// The shapes a persisted document has had over time.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredDocument {
    /// Nothing stored yet, or the text is not JSON at all.
    Missing,
    /// A bare JSON array written before the envelope existed.
    LegacyArray(Vec<Value>),
    /// A bare object without a `version` field: the object is the data.
    LegacyObject(Map<String, Value>),
    /// The current `{version, data}` envelope.
    Versioned { version: u64, data: Value },
}

impl StoredDocument {
    /// Classify raw document text. Arrays are checked first, then objects
    /// without a version, then versioned envelopes.
    pub fn parse(text: Option<&str>) -> Self {
        let Some(text) = text else {
            return Self::Missing;
        };
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_value(value),
            Err(e) => {
                log::warn!("Stored document is not valid JSON, starting empty: {e}");
                Self::Missing
            }
        }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::LegacyArray(items),
            Value::Object(map) if !map.contains_key("version") => Self::LegacyObject(map),
            Value::Object(mut map) => {
                let version = map.get("version").and_then(Value::as_u64).unwrap_or(0);
                let data = map.remove("data").unwrap_or(Value::Null);
                Self::Versioned { version, data }
            }
            _ => Self::Missing,
        }
    }

    /// Unwrap the payload of a versioned document, warning about versions
    /// newer than this build understands.
    fn into_payload(self) -> Option<Value> {
        match self {
            Self::Missing => None,
            Self::LegacyArray(items) => Some(Value::Array(items)),
            Self::LegacyObject(map) => Some(Value::Object(map)),
            Self::Versioned { version, data } => {
                if version > CURRENT_VERSION {
                    log::warn!("Unknown document version {version}, reading data anyway");
                }
                Some(data)
            }
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    version: u64,
    data: &'a T,
}

fn wrap<T: Serialize>(data: &T) -> Result<String> {
    Ok(serde_json::to_string(&Envelope {
        version: CURRENT_VERSION,
        data,
    })?)
}

/// Deserialize each record of a key → record object, skipping records that
/// do not parse. Keys are taken as stored; see [`migrate_keys`].
pub fn records_from_map(map: Map<String, Value>) -> ProgressStore {
    let mut store = ProgressStore::new();
    for (key, value) in map {
        match serde_json::from_value::<ProgressRecord>(value) {
            Ok(record) => {
                store.insert(ExerciseKey::from_stored(key), record);
            }
            Err(e) => log::warn!("Skipping unreadable progress record {key:?}: {e}"),
        }
    }
    store
}

/// Parse the progress document into a migrated store.
///
/// A legacy bare array never held valid progress data and yields an empty
/// store.
pub fn load_progress(text: Option<&str>) -> ProgressStore {
    let raw = match StoredDocument::parse(text) {
        StoredDocument::LegacyArray(_) => ProgressStore::new(),
        doc => match doc.into_payload() {
            Some(Value::Object(map)) => records_from_map(map),
            _ => ProgressStore::new(),
        },
    };
    migrate_keys(raw)
}

/// Serialize the progress store inside the versioned envelope.
pub fn encode_progress(store: &ProgressStore) -> Result<String> {
    wrap(store)
}

/// Re-key every record from its display name and merge records whose keys
/// collapse together. Histories come out sorted newest first and capped.
/// Running it on an already migrated store changes nothing.
pub fn migrate_keys(raw: ProgressStore) -> ProgressStore {
    let mut migrated = ProgressStore::new();
    for (old_key, mut record) in raw {
        record.tidy_history();
        let mut key = if record.name.trim().is_empty() {
            normalize(old_key.as_str())
        } else {
            normalize(&record.name)
        };
        if key.is_empty() {
            key = old_key;
        }
        if key.is_empty() {
            log::warn!("Dropping progress record without a name or key");
            continue;
        }
        let record = match migrated.remove(&key) {
            Some(existing) => {
                log::info!("Merging progress records that share key {key:?}");
                merge(&existing, &record)
            }
            None => record,
        };
        migrated.insert(key, record);
    }
    migrated
}

/// Parse the templates document. Legacy bare arrays are still valid
/// template lists; entries that do not parse are skipped.
pub fn load_templates(text: Option<&str>) -> Vec<TemplateRecord> {
    let items = match StoredDocument::parse(text).into_payload() {
        Some(Value::Array(items)) => items,
        Some(_) => {
            log::warn!("Templates document has an unexpected shape, starting empty");
            Vec::new()
        }
        None => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<TemplateRecord>(item) {
            Ok(t) => Some(t),
            Err(e) => {
                log::warn!("Skipping unreadable template: {e}");
                None
            }
        })
        .collect()
}

/// Serialize the templates inside the versioned envelope.
pub fn encode_templates(templates: &[TemplateRecord]) -> Result<String> {
    wrap(&templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HISTORY_LIMIT;
    use chrono::{Days, NaiveDate};
    use serde_json::json;

    #[test]
    fn classifies_shapes_in_priority_order() {
        assert_eq!(StoredDocument::parse(None), StoredDocument::Missing);
        assert_eq!(StoredDocument::parse(Some("not json")), StoredDocument::Missing);
        assert!(matches!(StoredDocument::parse(Some("[]")), StoredDocument::LegacyArray(_)));
        assert!(matches!(
            StoredDocument::parse(Some(r#"{"squat":{}}"#)),
            StoredDocument::LegacyObject(_)
        ));
        assert!(matches!(
            StoredDocument::parse(Some(r#"{"version":3,"data":{}}"#)),
            StoredDocument::Versioned { version: 3, .. }
        ));
    }

    #[test]
    fn load_tolerates_every_known_shape() {
        assert!(load_progress(None).is_empty());
        assert!(load_progress(Some("{broken")).is_empty());
        assert!(load_progress(Some(r#"[{"name":"Squat"}]"#)).is_empty());

        let legacy = json!({"Squat": {"name": "Squat", "bestReps": 5}}).to_string();
        let store = load_progress(Some(&legacy));
        assert_eq!(store[&normalize("squat")].best_reps, 5);

        let future =
            json!({"version": 9, "data": {"squat": {"name": "Squat", "bestReps": 7}}}).to_string();
        assert_eq!(load_progress(Some(&future))[&normalize("squat")].best_reps, 7);
    }

    #[test]
    fn unreadable_records_are_skipped() {
        let doc = json!({"version": 1, "data": {
            "squat": {"name": "Squat", "bestReps": 5},
            "bench": {"name": "Bench", "bestReps": "lots"}
        }})
        .to_string();
        let store = load_progress(Some(&doc));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn null_counters_keep_the_record() {
        let doc = json!({"version": 1, "data": {"plank": {
            "name": "Plank",
            "bestReps": 3,
            "bestWeight": null,
            "bestWeightReps": null,
            "history": []
        }}})
        .to_string();
        let store = load_progress(Some(&doc));
        let plank = &store[&normalize("plank")];
        assert_eq!(plank.best_reps, 3);
        assert_eq!(plank.best_weight, None);
        assert_eq!(plank.best_weight_reps, 0);
    }

    #[test]
    fn loaded_history_is_sorted_and_capped() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let history: Vec<Value> = (0..35u64)
            .map(|i| {
                // Oldest first, the way some clients appended.
                let date = start + Days::new(i);
                json!({"date": date.to_string(), "bestReps": i})
            })
            .collect();
        let doc = json!({"version": 1, "data": {"row": {"name": "Row", "history": history}}});
        let store = load_progress(Some(&doc.to_string()));
        let row = &store[&normalize("row")];
        assert_eq!(row.history.len(), HISTORY_LIMIT);
        assert_eq!(row.history[0].date, start + Days::new(34));
        assert_eq!(row.history[HISTORY_LIMIT - 1].date, start + Days::new(5));
    }

    #[test]
    fn migration_merges_colliding_keys() {
        let raw = records_from_map(
            json!({
                "Bench Press": {
                    "name": "Bench Press", "bestReps": 5, "bestWeight": 145.0, "bestWeightReps": 3
                },
                "bench-press": {
                    "name": "BENCH  press!", "bestReps": 8, "bestWeight": 135.0, "bestWeightReps": 8
                },
                "old key": {"name": "  ", "bestReps": 1}
            })
            .as_object()
            .unwrap()
            .clone(),
        );
        let migrated = migrate_keys(raw);
        assert_eq!(migrated.len(), 2);
        let bench = &migrated[&normalize("bench press")];
        assert_eq!(bench.best_reps, 8);
        assert_eq!(bench.best_weight, Some(145.0));
        assert_eq!(bench.name, "BENCH  press!");
        assert!(migrated.contains_key(&normalize("old key")));

        assert_eq!(migrate_keys(migrated.clone()), migrated);
    }

    #[test]
    fn progress_encodes_with_envelope() {
        let mut store = ProgressStore::new();
        store.insert(normalize("Squat"), ProgressRecord::new("Squat"));
        let text = encode_progress(&store).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["data"]["squat"]["name"], "Squat");
        assert_eq!(load_progress(Some(&text)), store);
    }

    #[test]
    fn templates_with_text_numbers_are_kept() {
        let doc = json!({"version": 1, "data": [{
            "id": "a",
            "name": "Legs",
            "workouts": [{"name": "Squat", "sets": [{"weight": "225", "reps": "5"}]}]
        }]});
        let templates = load_templates(Some(&doc.to_string()));
        assert_eq!(templates.len(), 1);
        let set = templates[0].workouts[0].sets[0];
        assert_eq!((set.weight, set.reps), (Some(225.0), Some(5)));
    }

    #[test]
    fn templates_accept_legacy_and_versioned() {
        let legacy = load_templates(Some(r#"[{"name":"Push Day"}]"#));
        assert_eq!(legacy.len(), 1);
        assert_eq!(legacy[0].name, "Push Day");
        assert!(legacy[0].workouts.is_empty());

        let text = encode_templates(&legacy).unwrap();
        assert_eq!(load_templates(Some(&text)), legacy);
        assert!(load_templates(Some(r#"{"name":"x"}"#)).is_empty());
    }
}
