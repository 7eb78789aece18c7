//! Command line front end for the progress tracker.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Duration, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use code_and_iron::charts::{Metric, Smoothing, history_series, letter_grid};
use code_and_iron::config::{DATA_DIR_ENV, Settings};
use code_and_iron::export::{save_history_csv, save_records_csv};
use code_and_iron::similarity::closest_key;
use code_and_iron::storage::FileStore;
use code_and_iron::{
    Error, MergePrompt, ProgressRecord, RawSet, Result, TemplateWorkout, Tracker, WorkoutInput,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Track lifting progress, personal records and routines",
    long_about = None
)]
struct Cli {
    /// Directory holding progress and routines
    #[arg(long, global = true, env = DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save one session. Each entry is `NAME:SET,SET,...` with sets written
    /// as `WEIGHTxREPS`, `xREPS` or `WEIGHTx`
    Log {
        #[arg(required = true)]
        entries: Vec<String>,
        /// Date of the session ('today', 'yesterday' or YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Show personal records, for every exercise or one
    Show { exercise: Option<String> },
    /// Show the saved history of one exercise
    History { exercise: String },
    /// Print chart points for one exercise
    Chart {
        exercise: String,
        #[arg(long, value_enum, default_value = "weight")]
        metric: MetricArg,
        /// Add a moving average over this many sessions
        #[arg(long)]
        smooth: Option<usize>,
        /// Use an exponential average spanning this many days instead
        #[arg(long, requires = "smooth")]
        ema: bool,
    },
    /// List exercises grouped by first letter
    Letters,
    /// Create or restore a full backup
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Manage saved routines
    Routine {
        #[command(subcommand)]
        action: RoutineAction,
    },
    /// Write history (or personal records) to a CSV file
    ExportCsv {
        path: PathBuf,
        #[arg(long)]
        records: bool,
    },
    /// Delete all progress and routines
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Show the saved settings, or change them
    Config {
        /// Store progress and routines in this directory from now on
        #[arg(long)]
        set_data_dir: Option<PathBuf>,
        /// How to answer "same exercise?" questions
        #[arg(long, value_enum)]
        merge: Option<MergeMode>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum MergeMode {
    Ask,
    Always,
    Never,
}

impl MergeMode {
    fn answer(self) -> Option<bool> {
        match self {
            MergeMode::Ask => None,
            MergeMode::Always => Some(true),
            MergeMode::Never => Some(false),
        }
    }
}

#[derive(Subcommand, Debug)]
enum BackupAction {
    /// Print a backup code
    Export,
    /// Restore from a backup code, overwriting current data
    Import {
        code: String,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RoutineAction {
    /// Save a routine from `NAME:SET,...` entries
    Add { name: String, entries: Vec<String> },
    List,
    Delete { id: String },
    /// Print a share code for a routine
    Share { id: String },
    /// Import a share code, or create an empty routine with this name
    Import { text: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum MetricArg {
    Weight,
    Reps,
    Volume,
}

impl From<MetricArg> for Metric {
    fn from(value: MetricArg) -> Self {
        match value {
            MetricArg::Weight => Metric::BestWeight,
            MetricArg::Reps => Metric::BestReps,
            MetricArg::Volume => Metric::Volume,
        }
    }
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    match s.to_lowercase().as_str() {
        "today" => Ok(Local::now().date_naive()),
        "yesterday" => Ok((Local::now() - Duration::days(1)).date_naive()),
        _ => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            format!("Invalid date '{s}'. Use 'today', 'yesterday' or YYYY-MM-DD.")
        }),
    }
}

/// Split `NAME:SET,SET` into a workout entry. Sets are kept as typed; the
/// tracker decides which of them are meaningful.
fn parse_entry(entry: &str) -> WorkoutInput {
    let (name, sets) = entry.split_once(':').unwrap_or((entry, ""));
    let sets = sets
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.split_once(['x', 'X', '*']) {
            Some((weight, reps)) => RawSet::new(weight.trim(), reps.trim()),
            None => RawSet::new("", s),
        })
        .collect();
    WorkoutInput {
        name: name.trim().to_string(),
        sets,
    }
}

fn confirm(message: &str) -> bool {
    print!("{message} [y/N] ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Asks on the terminal unless the settings fix the answer.
struct TerminalPrompt {
    auto: Option<bool>,
}

impl MergePrompt for TerminalPrompt {
    fn same_exercise(&mut self, new_name: &str, existing_name: &str) -> bool {
        self.auto.unwrap_or_else(|| {
            confirm(&format!(
                "\"{new_name}\" looks like \"{existing_name}\". Log it as the same exercise?"
            ))
        })
    }
}

fn fmt_weight(weight: Option<f64>) -> String {
    weight.map(|w| format!("{w:.1}")).unwrap_or_else(|| "-".into())
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
}

fn print_record(rec: &ProgressRecord) {
    println!(
        "{:<28} reps {:>4} ({})  weight {:>7} x {:<3} ({})",
        rec.name,
        rec.best_reps,
        fmt_date(rec.best_reps_date),
        fmt_weight(rec.best_weight),
        rec.best_weight_reps,
        fmt_date(rec.best_weight_date),
    )
}

fn find_record<'a>(tracker: &'a Tracker<FileStore>, name: &str) -> Result<&'a ProgressRecord> {
    if let Some(rec) = tracker.record(name) {
        return Ok(rec);
    }
    let hint = closest_key(name, tracker.progress())
        .and_then(|k| tracker.progress().get(k))
        .map(|r| format!(" (did you mean \"{}\"?)", r.name))
        .unwrap_or_default();
    Err(Error::NotFound(format!("no progress for \"{name}\"{hint}")))
}

fn merge_label(answer: Option<bool>) -> &'static str {
    match answer {
        None => "ask",
        Some(true) => "always",
        Some(false) => "never",
    }
}

fn configure(
    mut settings: Settings,
    data_dir: Option<PathBuf>,
    merge: Option<MergeMode>,
) -> Result<()> {
    let changed = data_dir.is_some() || merge.is_some();
    if let Some(dir) = data_dir {
        settings.data_dir = Some(dir);
    }
    if let Some(mode) = merge {
        settings.auto_merge = mode.answer();
    }
    if changed {
        settings.save()?;
        info!("Settings saved");
    }
    let shown = |p: Option<PathBuf>| {
        p.map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".into())
    };
    println!("settings file: {}", shown(Settings::path()));
    println!("data dir:      {}", shown(settings.data_dir()));
    println!("merge:         {}", merge_label(settings.auto_merge));
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load();
    let command = match cli.command {
        Command::Config { set_data_dir, merge } => {
            return configure(settings, set_data_dir, merge);
        }
        command => command,
    };
    let dir = cli
        .data_dir
        .or_else(|| settings.data_dir())
        .ok_or_else(|| Error::InvalidInput("no data directory; pass --data-dir".into()))?;
    info!("Using data directory {}", dir.display());
    let mut tracker = Tracker::load(FileStore::new(dir));

    match command {
        Command::Log { entries, date } => {
            let workouts: Vec<WorkoutInput> = entries.iter().map(|e| parse_entry(e)).collect();
            let mut prompt = TerminalPrompt {
                auto: settings.auto_merge,
            };
            let outcome = match date {
                Some(date) => tracker.save_workouts_on(&workouts, date, Utc::now(), &mut prompt),
                None => tracker.save_workouts(&workouts, &mut prompt),
            };
            if outcome.is_empty() {
                println!("Nothing to save: enter a name and at least one weight or rep count.");
            }
            for key in &outcome.updated {
                if let Some(rec) = tracker.progress().get(key) {
                    let tag = if outcome.created.contains(key) {
                        " (new)"
                    } else if outcome.personal_records.contains(key) {
                        " (new PR!)"
                    } else {
                        ""
                    };
                    println!("Saved {}{tag}", rec.name);
                }
            }
        }
        Command::Show { exercise } => match exercise {
            Some(name) => print_record(find_record(&tracker, &name)?),
            None => {
                if tracker.progress().is_empty() {
                    println!("No progress saved yet.");
                }
                for rec in tracker.progress().values() {
                    print_record(rec);
                }
            }
        },
        Command::History { exercise } => {
            let rec = find_record(&tracker, &exercise)?;
            println!("{}", rec.name);
            for p in &rec.history {
                println!(
                    "  {}  reps {:>4}  weight {:>7} x {:<3}  volume {:>9}",
                    p.date,
                    p.best_reps,
                    fmt_weight(p.best_weight),
                    p.best_weight_reps,
                    fmt_weight(p.total_volume),
                );
            }
        }
        Command::Chart {
            exercise,
            metric,
            smooth,
            ema,
        } => {
            let rec = find_record(&tracker, &exercise)?;
            let smoothing = smooth.map(|n| {
                if ema {
                    Smoothing::Exponential(n)
                } else {
                    Smoothing::Trailing(n)
                }
            });
            for series in history_series(rec, metric.into(), smoothing) {
                println!("{}", series.name);
                for [x, y] in series.points {
                    let date = NaiveDate::from_num_days_from_ce_opt(x as i32);
                    println!("  {}  {y:.1}", fmt_date(date));
                }
            }
        }
        Command::Letters => {
            for (letter, names) in letter_grid(tracker.progress()) {
                println!("{letter}: {}", names.join(", "));
            }
        }
        Command::Backup {
            action: BackupAction::Export,
        } => println!("{}", tracker.export_backup()?),
        Command::Backup {
            action: BackupAction::Import { code, yes },
        } => {
            if yes || confirm("Restore backup? This overwrites everything.") {
                tracker.import_backup(&code)?;
                println!("Backup restored!");
            }
        }
        Command::Routine { action } => run_routine(&mut tracker, action)?,
        Command::ExportCsv { path, records } => {
            if records {
                save_records_csv(&path, tracker.progress())?;
            } else {
                save_history_csv(&path, tracker.progress())?;
            }
            println!("Wrote {}", path.display());
        }
        Command::Reset { yes } => {
            if yes || confirm("RESET ALL DATA?") {
                tracker.reset();
                println!("All data deleted.");
            }
        }
        Command::Config { .. } => unreachable!("config is handled before loading data"),
    }
    Ok(())
}

fn run_routine(tracker: &mut Tracker<FileStore>, action: RoutineAction) -> Result<()> {
    match action {
        RoutineAction::Add { name, entries } => {
            let workouts = entries
                .iter()
                .map(|e| {
                    let input = parse_entry(e);
                    TemplateWorkout {
                        name: input.name,
                        sets: input.sets.iter().map(RawSet::parse).collect(),
                    }
                })
                .collect();
            let tpl = tracker.add_template(&name, workouts)?;
            println!("Routine saved: {} ({})", tpl.name, tpl.id);
        }
        RoutineAction::List => {
            if tracker.templates().is_empty() {
                println!("No routines saved yet.");
            }
            for tpl in tracker.templates() {
                let names: Vec<&str> = tpl.workouts.iter().map(|w| w.name.as_str()).collect();
                println!("{}  {}  [{}]", tpl.id, tpl.name, names.join(", "));
            }
        }
        RoutineAction::Delete { id } => {
            let removed = tracker.delete_template(&id)?;
            println!("Routine deleted: {}", removed.name);
        }
        RoutineAction::Share { id } => println!("{}", tracker.share_template(&id)?),
        RoutineAction::Import { text } => {
            let tpl = tracker.import_routine(&text)?;
            println!("Routine added: {} ({} exercises)", tpl.name, tpl.workouts.len());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
