//! Persisted data model: logged sets, history points, progress records and
//! routine templates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::normalize::ExerciseKey;
use crate::session::{parse_reps, parse_weight};

/// Number of history points kept per exercise.
pub const HISTORY_LIMIT: usize = 30;

/// Set weight written by any client: a number or the text typed into the
/// form. Negative or unreadable values count as missing.
pub fn lenient_weight<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().filter(|w| w.is_finite() && *w >= 0.0),
        Value::String(s) => parse_weight(&s),
        _ => None,
    })
}

/// Set reps written by any client, read like [`lenient_weight`].
/// Fractions are truncated.
pub fn lenient_reps<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().and_then(count_from_f64),
        Value::String(s) => parse_reps(&s),
        _ => None,
    })
}

/// Counters such as `bestReps`. `null` reads as 0 and numeric text is
/// accepted; any other text is an error.
pub fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let n = match Value::deserialize(d)? {
        Value::Null => return Ok(0),
        Value::String(s) if s.trim().is_empty() => return Ok(0),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.and_then(count_from_f64)
        .ok_or_else(|| D::Error::custom("expected a non-negative count"))
}

fn count_from_f64(n: f64) -> Option<u32> {
    (n.is_finite() && n >= 0.0 && n <= f64::from(u32::MAX)).then(|| n as u32)
}

/// One logged set. Either field may be missing while logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetEntry {
    #[serde(deserialize_with = "lenient_weight")]
    pub weight: Option<f64>,
    #[serde(deserialize_with = "lenient_reps")]
    pub reps: Option<u32>,
}

impl SetEntry {
    /// A set counts only if it has a positive weight or positive reps.
    pub fn is_meaningful(&self) -> bool {
        self.weight.is_some_and(|w| w > 0.0) || self.reps.is_some_and(|r| r > 0)
    }

    /// `weight * reps` when both are positive.
    pub fn volume(&self) -> Option<f64> {
        match (self.weight, self.reps) {
            (Some(w), Some(r)) if w > 0.0 && r > 0 => Some(w * f64::from(r)),
            _ => None,
        }
    }
}

/// Outcome of one calendar day for one exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "lenient_count")]
    pub best_reps: u32,
    #[serde(default, deserialize_with = "lenient_weight")]
    pub best_weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub best_weight_reps: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sets: Vec<SetEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_volume: Option<f64>,
}

/// Durable per-exercise record of personal bests and recent history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Display name, in the casing last used to log it.
    pub name: String,
    #[serde(deserialize_with = "lenient_count")]
    pub best_reps: u32,
    pub best_reps_date: Option<NaiveDate>,
    #[serde(deserialize_with = "lenient_weight")]
    pub best_weight: Option<f64>,
    #[serde(deserialize_with = "lenient_count")]
    pub best_weight_reps: u32,
    pub best_weight_date: Option<NaiveDate>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Newest first, at most [`HISTORY_LIMIT`] entries.
    pub history: Vec<HistoryPoint>,
}

impl ProgressRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Insert `point`, replacing any point already recorded for its date.
    pub fn upsert_history(&mut self, point: HistoryPoint) {
        self.history.retain(|p| p.date != point.date);
        self.history.push(point);
        self.tidy_history();
    }

    /// Sort newest first and drop everything past [`HISTORY_LIMIT`].
    pub fn tidy_history(&mut self) {
        self.history.sort_by(|a, b| b.date.cmp(&a.date));
        self.history.truncate(HISTORY_LIMIT);
    }
}

/// Returns true when `(weight, reps)` beats `(best, best_reps)`: a higher
/// weight wins, an equal weight needs more reps, and any weight beats none.
pub fn weight_beats(weight: Option<f64>, reps: u32, best: Option<f64>, best_reps: u32) -> bool {
    match (weight, best) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(w), Some(b)) => w > b || (w == b && reps > best_reps),
    }
}

/// Mapping from exercise key to its record. Ordered so every traversal, and
/// therefore the similarity heuristic, is deterministic.
pub type ProgressStore = BTreeMap<ExerciseKey, ProgressRecord>;

/// One exercise inside a routine template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateWorkout {
    pub name: String,
    pub sets: Vec<SetEntry>,
}

/// A saved routine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    pub workouts: Vec<TemplateWorkout>,
}

impl TemplateRecord {
    /// Create a routine with a fresh id.
    pub fn new(name: impl Into<String>, workouts: Vec<TemplateWorkout>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            workouts,
        }
    }
}
