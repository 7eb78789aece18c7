use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalized identity of an exercise.
///
/// Keys are produced by [`normalize`]; an empty key means "no identity" and
/// is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExerciseKey(String);

impl ExerciseKey {
    /// Wrap a string that is already in normalized form, e.g. a key read
    /// back from storage.
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ExerciseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize a free-text exercise name.
///
/// The name is lowercased, every character that is neither a word character
/// nor whitespace is removed, whitespace runs collapse to one space and the
/// ends are trimmed. Punctuation goes first so that `"a - b"` ends up as
/// `"a b"` in a single pass.
pub fn normalize(raw: &str) -> ExerciseKey {
    if raw.trim().is_empty() {
        return ExerciseKey::default();
    }
    let lower = raw.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lower, "");
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    ExerciseKey(collapsed.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_case_punctuation_and_spacing() {
        assert_eq!(normalize("Bench  Press!"), normalize("bench press"));
        assert_eq!(normalize("  Pull-Up / Chin ").as_str(), "pullup chin");
        assert_eq!(normalize("Lying Leg Curl (Machine)").as_str(), "lying leg curl machine");
    }

    #[test]
    fn empty_input_has_no_identity() {
        assert!(normalize("").is_empty());
        assert!(normalize("   \t").is_empty());
        assert!(normalize("?!").is_empty());
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "Bench  Press!",
            "a - b",
            " DB Row, single-arm ",
            "Squat\t\t(High Bar)",
            "Überzug",
            "",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(once.as_str()), once, "input {raw:?}");
        }
    }
}
