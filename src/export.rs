use crate::error::Result;
use crate::model::ProgressStore;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Serialize `rows` as CSV with a header taken from the row type.
fn write_rows<T: Serialize>(writer: impl Write, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    exercise: &'a str,
    date: NaiveDate,
    best_reps: u32,
    best_weight: Option<f64>,
    best_weight_reps: u32,
    total_volume: Option<f64>,
}

#[derive(Debug, Serialize)]
struct RecordRow<'a> {
    exercise: &'a str,
    best_reps: u32,
    best_reps_date: Option<NaiveDate>,
    best_weight: Option<f64>,
    best_weight_reps: u32,
    best_weight_date: Option<NaiveDate>,
    sessions: usize,
}

/// One row per history point, newest first within each exercise.
pub fn write_history_csv(writer: impl Write, store: &ProgressStore) -> Result<()> {
    let rows = store.values().flat_map(|rec| {
        rec.history.iter().map(|p| HistoryRow {
            exercise: &rec.name,
            date: p.date,
            best_reps: p.best_reps,
            best_weight: p.best_weight,
            best_weight_reps: p.best_weight_reps,
            total_volume: p.total_volume,
        })
    });
    write_rows(writer, rows)
}

/// One row of personal records per exercise.
pub fn write_records_csv(writer: impl Write, store: &ProgressStore) -> Result<()> {
    let rows = store.values().map(|rec| RecordRow {
        exercise: &rec.name,
        best_reps: rec.best_reps,
        best_reps_date: rec.best_reps_date,
        best_weight: rec.best_weight,
        best_weight_reps: rec.best_weight_reps,
        best_weight_date: rec.best_weight_date,
        sessions: rec.history.len(),
    });
    write_rows(writer, rows)
}

pub fn save_history_csv<P: AsRef<Path>>(path: P, store: &ProgressStore) -> Result<()> {
    write_history_csv(std::fs::File::create(path)?, store)
}

pub fn save_records_csv<P: AsRef<Path>>(path: P, store: &ProgressStore) -> Result<()> {
    write_records_csv(std::fs::File::create(path)?, store)
}
