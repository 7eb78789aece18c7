//! Progress tracking for a lifting log.
//!
//! Logged sets are grouped under normalized exercise keys, folded into a
//! ledger of personal records with a dated history, and persisted through a
//! small key-value abstraction. Backups and routine share codes are plain
//! text so they can be copied between devices.

pub mod charts;
pub mod codec;
pub mod config;
pub mod error;
pub mod export;
pub mod merge;
pub mod mirror;
pub mod model;
pub mod normalize;
pub mod session;
pub mod similarity;
pub mod storage;
pub mod store;
pub mod tracker;

pub use error::{Error, Result};
pub use model::{
    HistoryPoint, ProgressRecord, ProgressStore, SetEntry, TemplateRecord, TemplateWorkout,
};
pub use normalize::{ExerciseKey, normalize};
pub use session::{FixedAnswer, MergePrompt, RawSet, SaveOutcome, WorkoutInput};
pub use tracker::{Change, Tracker};
