//! Folding one "save progress" action into the progress store.
//!
//! A save receives every workout entry the user filled in. Entries are
//! grouped by exercise key, summarized (max reps, best weight, volume) and
//! folded into the records: personal bests only move up and today's history
//! point replaces any earlier point from the same day.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{HistoryPoint, ProgressRecord, ProgressStore, SetEntry, weight_beats};
use crate::normalize::{ExerciseKey, normalize};
use crate::similarity::find_similar;

static LEADING_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[+-]?\d+").unwrap());
static LEADING_FLOAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").unwrap());

/// Reps as typed: the leading integer, if it is positive. `"8 reps"` is 8,
/// `"5.5"` is 5.
pub fn parse_reps(raw: &str) -> Option<u32> {
    let m = LEADING_INT.find(raw)?;
    let reps: i64 = m.as_str().trim().parse().ok()?;
    u32::try_from(reps).ok().filter(|r| *r > 0)
}

/// Weight as typed: the leading decimal number, if it is positive.
pub fn parse_weight(raw: &str) -> Option<f64> {
    let m = LEADING_FLOAT.find(raw)?;
    let weight: f64 = m.as_str().trim().parse().ok()?;
    (weight.is_finite() && weight > 0.0).then_some(weight)
}

/// One set exactly as entered in the logging form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSet {
    pub weight: String,
    pub reps: String,
}

impl RawSet {
    pub fn new(weight: impl Into<String>, reps: impl Into<String>) -> Self {
        Self {
            weight: weight.into(),
            reps: reps.into(),
        }
    }

    pub fn parse(&self) -> SetEntry {
        SetEntry {
            weight: parse_weight(&self.weight),
            reps: parse_reps(&self.reps),
        }
    }
}

/// One exercise entry of a save action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutInput {
    pub name: String,
    pub sets: Vec<RawSet>,
}

/// Asked when a new exercise name looks like an existing one.
pub trait MergePrompt {
    /// Return true to log `new_name` under the existing exercise.
    fn same_exercise(&mut self, new_name: &str, existing_name: &str) -> bool;
}

impl<F: FnMut(&str, &str) -> bool> MergePrompt for F {
    fn same_exercise(&mut self, new_name: &str, existing_name: &str) -> bool {
        self(new_name, existing_name)
    }
}

/// Answers every prompt the same way without asking.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl MergePrompt for FixedAnswer {
    fn same_exercise(&mut self, _new_name: &str, _existing_name: &str) -> bool {
        self.0
    }
}

/// What one save did for one exercise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub raw_name: String,
    pub max_reps: u32,
    pub best_weight: Option<f64>,
    pub best_weight_reps: u32,
    pub sets: Vec<SetEntry>,
    keep_existing_name: bool,
}

impl SessionSummary {
    fn new(raw_name: &str, redirected: bool) -> Self {
        Self {
            raw_name: raw_name.to_string(),
            keep_existing_name: redirected,
            ..Self::default()
        }
    }

    fn add(&mut self, set: SetEntry) {
        let reps = set.reps.unwrap_or(0);
        self.max_reps = self.max_reps.max(reps);
        if weight_beats(set.weight, reps, self.best_weight, self.best_weight_reps) {
            self.best_weight = set.weight;
            self.best_weight_reps = reps;
        }
        self.sets.push(set);
    }

    /// Sum of `weight * reps` over sets that have both.
    pub fn total_volume(&self) -> f64 {
        self.sets.iter().filter_map(SetEntry::volume).sum()
    }

    pub fn history_point(&self, date: NaiveDate) -> HistoryPoint {
        HistoryPoint {
            date,
            best_reps: self.max_reps,
            best_weight: self.best_weight,
            best_weight_reps: self.best_weight_reps,
            sets: self.sets.clone(),
            total_volume: Some(self.total_volume()),
        }
    }
}

/// Keys touched by a save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub updated: Vec<ExerciseKey>,
    pub created: Vec<ExerciseKey>,
    /// Exercises whose best reps or best weight improved.
    pub personal_records: Vec<ExerciseKey>,
}

impl SaveOutcome {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty()
    }
}

/// Summarize `workouts` and fold them into `store` as of `today`.
///
/// Entries without a name or without a meaningful set are ignored, so an
/// empty batch leaves the store untouched. When a new name resembles an
/// existing record, `prompt` is asked once per distinct name for this call
/// and an accepted answer sends the sets to the existing record.
pub fn save_from_workouts(
    workouts: &[WorkoutInput],
    store: &mut ProgressStore,
    today: NaiveDate,
    now: DateTime<Utc>,
    prompt: &mut dyn MergePrompt,
) -> SaveOutcome {
    let sessions = summarize(workouts, store, prompt);
    let mut outcome = SaveOutcome::default();

    for (key, session) in sessions {
        let created = !store.contains_key(&key);
        let record = store
            .entry(key.clone())
            .or_insert_with(|| ProgressRecord::new(session.raw_name.clone()));
        if !session.keep_existing_name {
            record.name = session.raw_name.clone();
        }

        let mut improved = false;
        if session.max_reps > record.best_reps {
            record.best_reps = session.max_reps;
            record.best_reps_date = Some(today);
            improved = true;
        }
        if weight_beats(
            session.best_weight,
            session.best_weight_reps,
            record.best_weight,
            record.best_weight_reps,
        ) {
            record.best_weight = session.best_weight;
            record.best_weight_reps = session.best_weight_reps;
            record.best_weight_date = Some(today);
            improved = true;
        }
        record.last_updated = Some(now);
        record.upsert_history(session.history_point(today));

        if created {
            outcome.created.push(key.clone());
        } else if improved {
            outcome.personal_records.push(key.clone());
        }
        outcome.updated.push(key);
    }
    outcome
}

/// Group the meaningful sets of `workouts` by their final exercise key.
pub fn summarize(
    workouts: &[WorkoutInput],
    store: &ProgressStore,
    prompt: &mut dyn MergePrompt,
) -> BTreeMap<ExerciseKey, SessionSummary> {
    let mut resolved: HashMap<ExerciseKey, (ExerciseKey, bool)> = HashMap::new();
    let mut sessions: BTreeMap<ExerciseKey, SessionSummary> = BTreeMap::new();

    for workout in workouts {
        let name = workout.name.trim();
        let base = normalize(name);
        if base.is_empty() {
            continue;
        }
        let sets: Vec<SetEntry> = workout
            .sets
            .iter()
            .map(RawSet::parse)
            .filter(SetEntry::is_meaningful)
            .collect();
        if sets.is_empty() {
            continue;
        }

        let (key, redirected) = resolved
            .entry(base.clone())
            .or_insert_with(|| resolve_key(name, base, store, prompt))
            .clone();

        let session = sessions
            .entry(key)
            .or_insert_with(|| SessionSummary::new(name, redirected));
        if !redirected {
            session.raw_name = name.to_string();
            session.keep_existing_name = false;
        }
        for set in sets {
            session.add(set);
        }
    }
    sessions
}

fn resolve_key(
    name: &str,
    base: ExerciseKey,
    store: &ProgressStore,
    prompt: &mut dyn MergePrompt,
) -> (ExerciseKey, bool) {
    if store.contains_key(&base) {
        return (base, false);
    }
    match find_similar(name, store) {
        Some(similar) if prompt.same_exercise(name, &similar.name) => {
            log::info!("Logging {name:?} as existing exercise {:?}", similar.name);
            (similar.key, true)
        }
        _ => (base, false),
    }
}
