//! Duplicate detection for newly typed exercise names.

use crate::model::ProgressStore;
use crate::normalize::ExerciseKey;

/// An existing record that looks like the same exercise as a new name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarMatch {
    pub key: ExerciseKey,
    pub name: String,
}

fn first_word(name: &str) -> Option<String> {
    name.split_whitespace().next().map(str::to_lowercase)
}

/// Look for an existing record whose display name shares its first word
/// with `raw_name`, e.g. "Bench" against "Bench Press".
///
/// This returns the first hit in key order, not the closest one. Callers
/// use it to ask the user; nothing is merged automatically.
pub fn find_similar(raw_name: &str, store: &ProgressStore) -> Option<SimilarMatch> {
    let candidate = raw_name.trim().to_lowercase();
    let cand_first = first_word(&candidate)?;

    store.iter().find_map(|(key, record)| {
        let existing = record.name.trim().to_lowercase();
        let ex_first = first_word(&existing)?;
        let related = existing.contains(&cand_first) || candidate.contains(&ex_first);
        (cand_first == ex_first && related).then(|| SimilarMatch {
            key: key.clone(),
            name: record.name.clone(),
        })
    })
}

/// Best fuzzy match for a lookup by name, used for "did you mean" hints.
///
/// Only keys scoring at least `0.6` normalized Levenshtein similarity are
/// considered.
pub fn closest_key<'a>(query: &str, store: &'a ProgressStore) -> Option<&'a ExerciseKey> {
    let query = crate::normalize::normalize(query);
    if query.is_empty() {
        return None;
    }
    store
        .keys()
        .map(|k| (k, strsim::normalized_levenshtein(query.as_str(), k.as_str())))
        .filter(|(_, score)| *score >= 0.6)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(k, _)| k)
}
