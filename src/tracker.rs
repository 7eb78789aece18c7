//! The service that owns the progress store and the routine templates.
//!
//! All mutation goes through a [`Tracker`]: it loads both documents from a
//! [`KeyValueStore`], hands out read-only snapshots, folds sessions in,
//! persists after every change and notifies subscribers. Persistence
//! failures are logged and never undo the in-memory change.

use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::codec::{export_full, export_share_code, import_full, import_share_code};
use crate::error::{Error, Result};
use crate::mirror::{CloudDocument, RemoteMirror};
use crate::model::{ProgressRecord, ProgressStore, TemplateRecord, TemplateWorkout};
use crate::normalize::normalize;
use crate::session::{MergePrompt, SaveOutcome, WorkoutInput, save_from_workouts};
use crate::storage::{KeyValueStore, PROGRESS_KEY, TEMPLATE_KEY};
use crate::store::{encode_progress, encode_templates, load_progress, load_templates, migrate_keys};

/// What changed, passed to subscribers so dependent views can refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Progress,
    Templates,
    Reset,
}

type Listener = Box<dyn FnMut(Change)>;

pub struct Tracker<S: KeyValueStore> {
    storage: S,
    progress: ProgressStore,
    templates: Vec<TemplateRecord>,
    listeners: Vec<Listener>,
    mirror: Option<(Box<dyn RemoteMirror>, String)>,
}

impl<S: KeyValueStore> Tracker<S> {
    /// Load progress and templates from `storage`. Unreadable or missing
    /// documents start empty.
    pub fn load(storage: S) -> Self {
        let progress = load_progress(read(&storage, PROGRESS_KEY).as_deref());
        let templates = load_templates(read(&storage, TEMPLATE_KEY).as_deref());
        log::info!(
            "Loaded {} exercises and {} routines",
            progress.len(),
            templates.len()
        );
        Self {
            storage,
            progress,
            templates,
            listeners: Vec::new(),
            mirror: None,
        }
    }

    /// Mirror every saved change to `mirror` under `user_id`.
    pub fn with_mirror(
        mut self,
        mirror: Box<dyn RemoteMirror>,
        user_id: impl Into<String>,
    ) -> Self {
        self.mirror = Some((mirror, user_id.into()));
        self
    }

    pub fn subscribe(&mut self, listener: impl FnMut(Change) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub fn templates(&self) -> &[TemplateRecord] {
        &self.templates
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Look up a record by any spelling of its name.
    pub fn record(&self, name: &str) -> Option<&ProgressRecord> {
        self.progress.get(&normalize(name))
    }

    /// Fold one save action in, dated today in local time.
    pub fn save_workouts(
        &mut self,
        workouts: &[WorkoutInput],
        prompt: &mut dyn MergePrompt,
    ) -> SaveOutcome {
        self.save_workouts_on(workouts, Local::now().date_naive(), Utc::now(), prompt)
    }

    pub fn save_workouts_on(
        &mut self,
        workouts: &[WorkoutInput],
        today: NaiveDate,
        now: DateTime<Utc>,
        prompt: &mut dyn MergePrompt,
    ) -> SaveOutcome {
        let outcome = save_from_workouts(workouts, &mut self.progress, today, now, prompt);
        if outcome.is_empty() {
            log::debug!("Nothing meaningful to save");
            return outcome;
        }
        log::info!("Saved progress for {} exercises", outcome.updated.len());
        self.commit(Change::Progress);
        outcome
    }

    /// Replace the whole progress store, e.g. with a snapshot pulled from
    /// another device. Keys are migrated before the store is saved.
    pub fn replace_progress(&mut self, store: ProgressStore) {
        self.progress = migrate_keys(store);
        self.commit(Change::Progress);
    }

    pub fn replace_templates(&mut self, templates: Vec<TemplateRecord>) {
        self.templates = templates;
        self.commit(Change::Templates);
    }

    pub fn export_backup(&self) -> Result<String> {
        export_full(&self.templates, &self.progress)
    }

    /// Restore a backup. Sections missing from the backup are kept; a
    /// backup that fails to decode changes nothing.
    pub fn import_backup(&mut self, text: &str) -> Result<()> {
        let contents = import_full(text)?;
        if let Some(templates) = contents.templates {
            self.replace_templates(templates);
        }
        if let Some(progress) = contents.progress {
            self.replace_progress(progress);
        }
        log::info!("Backup restored");
        Ok(())
    }

    pub fn add_template(
        &mut self,
        name: &str,
        workouts: Vec<TemplateWorkout>,
    ) -> Result<&TemplateRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("enter a routine name".into()));
        }
        self.templates.push(TemplateRecord::new(name, workouts));
        self.commit(Change::Templates);
        self.last_template()
    }

    pub fn delete_template(&mut self, id: &str) -> Result<TemplateRecord> {
        let idx = self.template_index(id)?;
        let removed = self.templates.remove(idx);
        self.commit(Change::Templates);
        Ok(removed)
    }

    pub fn share_template(&self, id: &str) -> Result<String> {
        let idx = self.template_index(id)?;
        export_share_code(&self.templates[idx])
    }

    /// Import a share code, or create an empty routine named after the text
    /// when it is not a share code.
    pub fn import_routine(&mut self, text: &str) -> Result<&TemplateRecord> {
        match import_share_code(text) {
            Some(template) => {
                self.templates.push(template);
                self.commit(Change::Templates);
                self.last_template()
            }
            None => self.add_template(text, Vec::new()),
        }
    }

    /// Clear all progress and templates, in memory and in storage.
    pub fn reset(&mut self) {
        self.progress.clear();
        self.templates.clear();
        for key in [PROGRESS_KEY, TEMPLATE_KEY] {
            if let Err(e) = self.storage.remove(key) {
                log::error!("Failed to remove {key}: {e}");
            }
        }
        log::info!("All data reset");
        self.notify(Change::Reset);
        self.push_mirror();
    }

    pub fn cloud_document(&self) -> CloudDocument {
        CloudDocument {
            templates: self.templates.clone(),
            progress_data: self.progress.clone(),
            updated_at: Some(Utc::now()),
        }
    }

    /// Overwrite local state with the mirrored document, if there is one.
    /// Returns whether anything was replaced.
    pub fn pull_from_mirror(&mut self) -> Result<bool> {
        let Some((mirror, user_id)) = self.mirror.as_mut() else {
            return Err(Error::Mirror("no mirror configured".into()));
        };
        let Some(doc) = mirror.pull(user_id)? else {
            return Ok(false);
        };
        self.templates = doc.templates;
        self.progress = migrate_keys(doc.progress_data);
        self.persist_templates();
        self.persist_progress();
        self.notify(Change::Templates);
        self.notify(Change::Progress);
        Ok(true)
    }

    fn template_index(&self, id: &str) -> Result<usize> {
        self.templates
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::NotFound(format!("routine {id}")))
    }

    fn last_template(&self) -> Result<&TemplateRecord> {
        self.templates
            .last()
            .ok_or_else(|| Error::NotFound("routine".into()))
    }

    fn commit(&mut self, change: Change) {
        match change {
            Change::Progress => self.persist_progress(),
            Change::Templates => self.persist_templates(),
            Change::Reset => {}
        }
        self.notify(change);
        self.push_mirror();
    }

    fn persist_progress(&mut self) {
        let result = encode_progress(&self.progress)
            .and_then(|text| self.storage.set(PROGRESS_KEY, &text));
        if let Err(e) = result {
            log::error!("Failed to save progress: {e}");
        }
    }

    fn persist_templates(&mut self) {
        let result = encode_templates(&self.templates)
            .and_then(|text| self.storage.set(TEMPLATE_KEY, &text));
        if let Err(e) = result {
            log::error!("Failed to save routines: {e}");
        }
    }

    fn notify(&mut self, change: Change) {
        for listener in &mut self.listeners {
            listener(change);
        }
    }

    fn push_mirror(&mut self) {
        if self.mirror.is_none() {
            return;
        }
        let doc = self.cloud_document();
        if let Some((mirror, user_id)) = self.mirror.as_mut() {
            if let Err(e) = mirror.push(user_id, &doc) {
                log::warn!("Failed to mirror data for {user_id}: {e}");
            }
        }
    }
}

fn read<S: KeyValueStore>(storage: &S, key: &str) -> Option<String> {
    storage.get(key).unwrap_or_else(|e| {
        log::error!("Failed to read {key}: {e}");
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FixedAnswer, RawSet};
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn bench(sets: &[(&str, &str)]) -> Vec<WorkoutInput> {
        vec![WorkoutInput {
            name: "Bench Press".into(),
            sets: sets.iter().map(|(w, r)| RawSet::new(*w, *r)).collect(),
        }]
    }

    fn save_on(
        tracker: &mut Tracker<impl KeyValueStore>,
        date: &str,
        workouts: &[WorkoutInput],
    ) -> SaveOutcome {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        tracker.save_workouts_on(workouts, d(date), now, &mut FixedAnswer(false))
    }

    /// Storage whose writes always fail.
    #[derive(Default)]
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }
        fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }
        fn remove(&mut self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeMirror {
        docs: Rc<RefCell<Vec<CloudDocument>>>,
        remote: Option<CloudDocument>,
    }

    impl RemoteMirror for FakeMirror {
        fn push(&mut self, _user_id: &str, doc: &CloudDocument) -> Result<()> {
            self.docs.borrow_mut().push(doc.clone());
            Ok(())
        }
        fn pull(&mut self, _user_id: &str) -> Result<Option<CloudDocument>> {
            Ok(self.remote.clone())
        }
    }

    #[test]
    fn saves_persist_and_reload() {
        let mut tracker = Tracker::load(MemoryStore::default());
        save_on(&mut tracker, "2024-01-01", &bench(&[("135", "5"), ("145", "3")]));
        save_on(&mut tracker, "2024-01-01", &bench(&[("150", "2")]));

        let reloaded = Tracker::load(tracker.storage().clone());
        let rec = reloaded.record("bench press!").unwrap();
        assert_eq!(rec.best_weight, Some(150.0));
        assert_eq!(rec.best_weight_reps, 2);
        assert_eq!(rec.best_reps, 5);
        assert_eq!(rec.history.len(), 1);
        assert_eq!(rec.history[0].total_volume, Some(300.0));
        assert_eq!(reloaded.progress(), tracker.progress());
    }

    #[test]
    fn empty_save_touches_nothing() {
        let mut tracker = Tracker::load(MemoryStore::default());
        let calls = Rc::new(RefCell::new(0));
        let seen = calls.clone();
        tracker.subscribe(move |_| *seen.borrow_mut() += 1);

        let outcome = save_on(&mut tracker, "2024-01-01", &bench(&[("", ""), ("0", "")]));
        assert!(outcome.is_empty());
        assert_eq!(*calls.borrow(), 0);
        assert_eq!(tracker.storage().get(PROGRESS_KEY).unwrap(), None);
    }

    #[test]
    fn listeners_hear_about_changes() {
        let mut tracker = Tracker::load(MemoryStore::default());
        let changes = Rc::new(RefCell::new(Vec::new()));
        let seen = changes.clone();
        tracker.subscribe(move |c| seen.borrow_mut().push(c));

        save_on(&mut tracker, "2024-01-01", &bench(&[("135", "5")]));
        tracker.add_template("Push", Vec::new()).unwrap();
        tracker.reset();
        assert_eq!(
            *changes.borrow(),
            vec![Change::Progress, Change::Templates, Change::Reset]
        );
    }

    #[test]
    fn failed_writes_keep_memory_state() {
        let mut tracker = Tracker::load(BrokenStore);
        let outcome = save_on(&mut tracker, "2024-01-01", &bench(&[("135", "5")]));
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(tracker.record("Bench Press").unwrap().best_reps, 5);
    }

    #[test]
    fn restore_with_empty_progress_overwrites_everything() {
        let mut tracker = Tracker::load(MemoryStore::default());
        save_on(&mut tracker, "2024-01-01", &bench(&[("135", "5")]));
        tracker.add_template("Old Routine", Vec::new()).unwrap();

        let backup = serde_json::json!({
            "templates": [{"id": "t1", "name": "New Routine", "workouts": []}],
            "progressData": {}
        });
        tracker.import_backup(&backup.to_string()).unwrap();
        assert!(tracker.progress().is_empty());
        assert_eq!(tracker.templates().len(), 1);
        assert_eq!(tracker.templates()[0].name, "New Routine");

        let reloaded = Tracker::load(tracker.storage().clone());
        assert!(reloaded.progress().is_empty());
        assert_eq!(reloaded.templates()[0].id, "t1");
    }

    #[test]
    fn restored_history_is_newest_first() {
        let mut tracker = Tracker::load(MemoryStore::default());
        let backup = serde_json::json!({"progressData": {"squat": {
            "name": "Squat",
            "history": [
                {"date": "2024-01-01", "bestReps": 5},
                {"date": "2024-01-05", "bestReps": 6}
            ]
        }}});
        tracker.import_backup(&backup.to_string()).unwrap();
        let squat = tracker.record("Squat").unwrap();
        assert_eq!(squat.history[0].date, d("2024-01-05"));
        assert_eq!(squat.history[1].date, d("2024-01-01"));
    }

    #[test]
    fn invalid_backup_leaves_state_untouched() {
        let mut tracker = Tracker::load(MemoryStore::default());
        save_on(&mut tracker, "2024-01-01", &bench(&[("135", "5")]));
        tracker.add_template("Keep Me", Vec::new()).unwrap();
        let before = (tracker.progress().clone(), tracker.templates().to_vec());

        assert!(tracker.import_backup("{\"templates\":[], \"progressData\": {").is_err());
        assert!(tracker
            .import_backup(r#"{"templates":[],"progressData":{"x":{"bestReps":"many"}}}"#)
            .is_err());
        assert_eq!((tracker.progress().clone(), tracker.templates().to_vec()), before);
    }

    #[test]
    fn backup_roundtrip_between_trackers() {
        let mut source = Tracker::load(MemoryStore::default());
        save_on(&mut source, "2024-01-01", &bench(&[("135", "5"), ("145", "3")]));
        source
            .add_template(
                "Push",
                vec![TemplateWorkout {
                    name: "Bench Press".into(),
                    sets: vec![RawSet::new("135", "5").parse()],
                }],
            )
            .unwrap();
        let code = source.export_backup().unwrap();

        let mut target = Tracker::load(MemoryStore::default());
        target.import_backup(&code).unwrap();
        assert_eq!(target.progress(), source.progress());
        assert_eq!(target.templates(), source.templates());
    }

    #[test]
    fn routine_library() {
        let mut tracker = Tracker::load(MemoryStore::default());
        assert!(matches!(tracker.add_template("  ", Vec::new()), Err(Error::InvalidInput(_))));

        let id = tracker.add_template("Legs", Vec::new()).unwrap().id.clone();
        let code = tracker.share_template(&id).unwrap();
        let imported = tracker.import_routine(&code).unwrap().clone();
        assert_eq!(imported.name, "Legs");
        assert_ne!(imported.id, id);

        let plain = tracker.import_routine("Arm Day").unwrap().clone();
        assert_eq!(plain.name, "Arm Day");
        assert!(plain.workouts.is_empty());
        assert_eq!(tracker.templates().len(), 3);

        assert_eq!(tracker.delete_template(&id).unwrap().name, "Legs");
        assert!(matches!(tracker.delete_template(&id), Err(Error::NotFound(_))));
        assert_eq!(Tracker::load(tracker.storage().clone()).templates().len(), 2);
    }

    #[test]
    fn reset_clears_storage() {
        let mut tracker = Tracker::load(MemoryStore::default());
        save_on(&mut tracker, "2024-01-01", &bench(&[("135", "5")]));
        tracker.add_template("Push", Vec::new()).unwrap();
        tracker.reset();
        assert!(tracker.progress().is_empty());
        let reloaded = Tracker::load(tracker.storage().clone());
        assert!(reloaded.progress().is_empty());
        assert!(reloaded.templates().is_empty());
    }

    #[test]
    fn mirror_receives_pushes_and_pull_replaces() {
        let mirror = FakeMirror::default();
        let pushed = mirror.docs.clone();
        let mut tracker =
            Tracker::load(MemoryStore::default()).with_mirror(Box::new(mirror), "lifter");
        save_on(&mut tracker, "2024-01-01", &bench(&[("135", "5")]));
        assert_eq!(pushed.borrow().len(), 1);
        assert_eq!(&pushed.borrow()[0].progress_data, tracker.progress());

        // No remote document: nothing changes.
        assert!(!tracker.pull_from_mirror().unwrap());
        assert_eq!(tracker.progress().len(), 1);

        let remote = CloudDocument {
            templates: vec![TemplateRecord::new("Remote", Vec::new())],
            progress_data: ProgressStore::new(),
            updated_at: None,
        };
        let mut tracker = Tracker::load(tracker.storage().clone()).with_mirror(
            Box::new(FakeMirror {
                remote: Some(remote),
                ..FakeMirror::default()
            }),
            "lifter",
        );
        assert!(tracker.pull_from_mirror().unwrap());
        assert!(tracker.progress().is_empty());
        assert_eq!(tracker.templates()[0].name, "Remote");
    }

    #[test]
    fn pull_without_mirror_is_an_error() {
        let mut tracker = Tracker::load(MemoryStore::default());
        assert!(matches!(tracker.pull_from_mirror(), Err(Error::Mirror(_))));
    }
}
