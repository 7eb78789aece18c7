//! Combining two progress records that describe the same exercise.

use std::collections::BTreeMap;

use crate::model::{HistoryPoint, ProgressRecord, weight_beats};

/// Merge two records into one, keeping the better personal records and the
/// union of both histories.
///
/// Best-of selection does not depend on argument order; on a full tie the
/// date, name and history point of `a` are kept.
pub fn merge(a: &ProgressRecord, b: &ProgressRecord) -> ProgressRecord {
    let name = if b.name.chars().count() > a.name.chars().count() {
        b.name.clone()
    } else {
        a.name.clone()
    };

    let (best_reps, best_reps_date) = if b.best_reps > a.best_reps {
        (b.best_reps, b.best_reps_date)
    } else {
        (a.best_reps, a.best_reps_date)
    };

    let b_heavier = weight_beats(
        b.best_weight,
        b.best_weight_reps,
        a.best_weight,
        a.best_weight_reps,
    );
    let weight_side = if b_heavier { b } else { a };

    let mut merged = ProgressRecord {
        name,
        best_reps,
        best_reps_date,
        best_weight: weight_side.best_weight,
        best_weight_reps: weight_side.best_weight_reps,
        best_weight_date: weight_side.best_weight_date,
        last_updated: a.last_updated.max(b.last_updated),
        history: merge_history(&a.history, &b.history),
    };
    merged.tidy_history();
    merged
}

fn merge_history(a: &[HistoryPoint], b: &[HistoryPoint]) -> Vec<HistoryPoint> {
    let mut by_date: BTreeMap<_, HistoryPoint> = BTreeMap::new();
    for p in a {
        by_date.insert(p.date, p.clone());
    }
    for p in b {
        match by_date.get(&p.date) {
            Some(existing) if !point_beats(p, existing) => {}
            _ => {
                by_date.insert(p.date, p.clone());
            }
        }
    }
    by_date.into_values().collect()
}

/// Same-date collision rule: a heavier point wins; when neither point has a
/// weight the one with more reps wins.
fn point_beats(p: &HistoryPoint, existing: &HistoryPoint) -> bool {
    match (p.best_weight, existing.best_weight) {
        (None, None) => p.best_reps > existing.best_reps,
        (w, e) => weight_beats(w, 0, e, 0),
    }
}
