// Chart data derived from a record's history
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

use crate::model::{ProgressRecord, ProgressStore};

/// Value plotted on the y-axis of a progress chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Heaviest weight of the day.
    BestWeight,
    /// Most reps in one set that day.
    BestReps,
    /// Total `weight * reps` of the day.
    Volume,
}

/// Second series drawn over the raw points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smoothing {
    /// Mean of the last `n` sessions.
    Trailing(usize),
    /// Exponential average with a span of `n` days. A gap between sessions
    /// decays the average as if every missed day had been a step.
    Exponential(usize),
}

/// A named series of `[x, y]` points, oldest first. `x` is the number of
/// days since the common era so dates plot on a linear axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: Vec<[f64; 2]>,
}

/// Build the chart series for one record.
///
/// History points without a value for `metric` (e.g. no weight logged) are
/// left out. A smoothed series is added when `smoothing` spans more than
/// one step and there are at least two points.
pub fn history_series(
    record: &ProgressRecord,
    metric: Metric,
    smoothing: Option<Smoothing>,
) -> Vec<Series> {
    let mut history: Vec<_> = record.history.iter().collect();
    history.sort_by_key(|p| p.date);

    let points: Vec<[f64; 2]> = history
        .into_iter()
        .filter_map(|p| {
            let y = match metric {
                Metric::BestWeight => p.best_weight?,
                Metric::BestReps => f64::from(p.best_reps),
                Metric::Volume => p.total_volume?,
            };
            Some([day_number(p.date), y])
        })
        .collect();

    let smoothed = match smoothing {
        _ if points.len() < 2 => None,
        Some(Smoothing::Trailing(n)) if n > 1 => {
            Some((format!("{} MA", record.name), trailing_mean(&points, n)))
        }
        Some(Smoothing::Exponential(n)) if n > 1 => {
            Some((format!("{} EMA", record.name), decayed_average(&points, n)))
        }
        _ => None,
    };

    let mut series = vec![Series {
        name: record.name.clone(),
        points,
    }];
    if let Some((name, points)) = smoothed {
        series.push(Series { name, points });
    }
    series
}

fn day_number(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce())
}

/// Each point becomes the mean of itself and up to `n - 1` earlier points.
fn trailing_mean(points: &[[f64; 2]], n: usize) -> Vec<[f64; 2]> {
    let n = n.max(1);
    (0..points.len())
        .map(|i| {
            let window = &points[(i + 1).saturating_sub(n)..=i];
            let mean = window.iter().map(|p| p[1]).sum::<f64>() / window.len() as f64;
            [points[i][0], mean]
        })
        .collect()
}

/// Exponential average where the carried weight shrinks with the number
/// of days since the previous point.
fn decayed_average(points: &[[f64; 2]], span: usize) -> Vec<[f64; 2]> {
    let keep = 1.0 - 2.0 / (span as f64 + 1.0);
    let mut out: Vec<[f64; 2]> = Vec::with_capacity(points.len());
    for &[x, y] in points {
        let avg = match out.last() {
            None => y,
            Some(&[prev_x, prev_avg]) => {
                let carry = keep.powf((x - prev_x).max(1.0));
                carry * prev_avg + (1.0 - carry) * y
            }
        };
        out.push([x, avg]);
    }
    out
}

/// Group exercises by the first letter of their display name for the
/// alphabetical listing. Letters are upper-cased; names are sorted
/// case-insensitively within a letter. Records without a name are skipped.
pub fn letter_grid(store: &ProgressStore) -> BTreeMap<char, Vec<String>> {
    let mut grid: BTreeMap<char, Vec<String>> = BTreeMap::new();
    for record in store.values() {
        let name = record.name.trim();
        if let Some(first) = name.chars().next() {
            let letter = first.to_uppercase().next().unwrap_or(first);
            grid.entry(letter).or_default().push(name.to_string());
        }
    }
    for names in grid.values_mut() {
        names.sort_by_key(|n| n.to_lowercase());
    }
    grid
}
