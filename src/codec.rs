//! Portable text encodings: the full backup blob and per-routine share
//! codes.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{
    ProgressStore, SetEntry, TemplateRecord, TemplateWorkout, lenient_reps, lenient_weight,
};
use crate::store::{CURRENT_VERSION, migrate_keys};

/// Prefix of the current share code format.
pub const SHARE_PREFIX: &str = "C1:";
/// Prefix of the first share code format, still accepted on import.
pub const LEGACY_SHARE_PREFIX: &str = "CIROUTINEv1:";
/// Name given to shared routines that arrive without one.
pub const DEFAULT_SHARED_NAME: &str = "Shared Routine";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupRef<'a> {
    templates: &'a [TemplateRecord],
    progress_data: &'a ProgressStore,
    version: u64,
}

/// Sections recovered from a backup. A section is `None` when the backup
/// did not carry it, in which case the current value must be kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupContents {
    pub templates: Option<Vec<TemplateRecord>>,
    pub progress: Option<ProgressStore>,
}

/// Serialize templates and progress as a single-line JSON backup.
pub fn export_full(templates: &[TemplateRecord], store: &ProgressStore) -> Result<String> {
    Ok(serde_json::to_string(&BackupRef {
        templates,
        progress_data: store,
        version: CURRENT_VERSION,
    })?)
}

/// Decode a backup produced by [`export_full`].
///
/// The text is decoded completely before anything is returned, so a
/// malformed backup never leads to a partial restore. Very old backups were
/// a base64 encoded template array; those are still understood.
pub fn import_full(text: &str) -> Result<BackupContents> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidBackup("paste a backup code first".into()));
    }
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(e) => decode_base64_json(text).ok_or_else(|| Error::InvalidBackup(e.to_string()))?,
    };

    match value {
        Value::Array(items) => Ok(BackupContents {
            templates: Some(parse_templates(Value::Array(items))?),
            progress: None,
        }),
        Value::Object(mut doc) => {
            let templates = match doc.remove("templates") {
                Some(items @ Value::Array(_)) => Some(parse_templates(items)?),
                _ => None,
            };
            let progress = match doc.remove("progressData") {
                Some(data @ Value::Object(_)) => {
                    let raw: ProgressStore = serde_json::from_value(data)
                        .map_err(|e| Error::InvalidBackup(format!("progress data: {e}")))?;
                    Some(migrate_keys(raw))
                }
                _ => None,
            };
            Ok(BackupContents { templates, progress })
        }
        _ => Err(Error::InvalidBackup("paste the whole code".into())),
    }
}

fn parse_templates(items: Value) -> Result<Vec<TemplateRecord>> {
    serde_json::from_value(items).map_err(|e| Error::InvalidBackup(format!("templates: {e}")))
}

fn decode_base64_json(text: &str) -> Option<Value> {
    let bytes = STANDARD.decode(text).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[derive(Serialize, Deserialize)]
struct CompactSet {
    #[serde(default, deserialize_with = "lenient_weight")]
    w: Option<f64>,
    #[serde(default, deserialize_with = "lenient_reps")]
    r: Option<u32>,
}

impl From<&SetEntry> for CompactSet {
    fn from(set: &SetEntry) -> Self {
        Self {
            w: set.weight,
            r: set.reps,
        }
    }
}

impl From<CompactSet> for SetEntry {
    fn from(set: CompactSet) -> Self {
        Self {
            weight: set.w,
            reps: set.r,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CompactWorkout {
    #[serde(default)]
    n: String,
    #[serde(default)]
    s: Vec<CompactSet>,
}

#[derive(Serialize, Deserialize)]
struct CompactRoutine {
    #[serde(default)]
    n: String,
    #[serde(default)]
    w: Vec<CompactWorkout>,
}

/// The first share code format spelled fields out in full.
#[derive(Deserialize)]
struct LegacyRoutine {
    #[serde(default)]
    name: String,
    #[serde(default)]
    workouts: Vec<TemplateWorkout>,
}

/// Encode one routine as a compact share code.
pub fn export_share_code(template: &TemplateRecord) -> Result<String> {
    let compact = CompactRoutine {
        n: template.name.clone(),
        w: template
            .workouts
            .iter()
            .map(|wk| CompactWorkout {
                n: wk.name.clone(),
                s: wk.sets.iter().map(CompactSet::from).collect(),
            })
            .collect(),
    };
    let json = serde_json::to_string(&compact)?;
    Ok(format!("{SHARE_PREFIX}{}", STANDARD.encode(json)))
}

/// Decode a share code in the current or the legacy format.
///
/// Returns `None` for anything that is not a valid code so the caller can
/// treat the text as a plain routine name instead.
pub fn import_share_code(text: &str) -> Option<TemplateRecord> {
    let text = text.trim();
    let (name, workouts) = if let Some(payload) = text.strip_prefix(SHARE_PREFIX) {
        let routine: CompactRoutine = decode_payload(payload)?;
        let workouts = routine
            .w
            .into_iter()
            .map(|wk| TemplateWorkout {
                name: wk.n,
                sets: wk.s.into_iter().map(SetEntry::from).collect(),
            })
            .collect();
        (routine.n, workouts)
    } else if let Some(payload) = text.strip_prefix(LEGACY_SHARE_PREFIX) {
        let routine: LegacyRoutine = decode_payload(payload)?;
        (routine.name, routine.workouts)
    } else {
        return None;
    };

    let name = if name.trim().is_empty() {
        DEFAULT_SHARED_NAME.to_string()
    } else {
        name.trim().to_string()
    };
    Some(TemplateRecord::new(name, workouts))
}

fn decode_payload<T: for<'de> Deserialize<'de>>(payload: &str) -> Option<T> {
    let bytes = match STANDARD.decode(payload.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::debug!("Share code is not valid base64: {e}");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            log::debug!("Share code payload is not a routine: {e}");
            None
        }
    }
}
