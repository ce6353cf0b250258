//! The tracker: owns all state and its persistence.
//!
//! `Tracker` is the single entry point for the presentation layer. It routes
//! events to the playback and review controllers, applies library and
//! settings mutations, and writes every change through the settings store.
//!
//! Persistence is optimistic: in-memory state changes first, and a failed
//! write is reported as a [`Notice`] instead of being rolled back.

use crate::backup::{self, BackupDocument, ImportSummary};
use crate::blob::BlobStore;
use crate::clock::Clock;
use crate::config::PlaybackConfig;
use crate::ingest::{self, MetadataProbe};
use crate::migrate;
use crate::playback::{apply_streak_rules, MediaPlayer, PlaybackController, ProgressCtx};
use crate::review::{PendingReview, ReviewController, Selection};
use crate::settings::{keys, SettingsStore};
use crate::wal::{self, IntentLog, IntentSink, ProgressIntent};
use crate::{
    AppSettings, Collection, Difficulty, Error, Lesson, LessonId, Library, Result,
    CUSTOM_ARTWORK_KEY,
};
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};

const SETTINGS_KEYS: &[&str] = &[
    keys::APP_TITLE,
    keys::THEME,
    keys::STREAK,
    keys::HIDE_COMPLETED,
    keys::REVIEW_MODE,
    keys::CUSTOM_ARTWORK,
    keys::COMPLETION_SOUND,
    keys::COLLECTIONS_VIEW,
    keys::PLAY_ON_NAVIGATE,
];

const PROGRESS_KEYS: &[&str] = &[keys::LESSONS, keys::STREAK];

/// A non-fatal problem the user should be told about
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
}

/// Result of adding files to the library
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub added: Vec<LessonId>,
    pub duplicates: usize,
    pub dropped: usize,
}

/// Snapshot of streak progress for display
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreakSummary {
    pub enabled: bool,
    pub difficulty: Difficulty,
    pub current_streak: u32,
    pub goal: usize,
    pub completed_today: usize,
    pub today_complete: bool,
    pub recent: Vec<NaiveDate>,
}

pub struct Tracker<S: SettingsStore, B: BlobStore> {
    library: Library,
    settings: AppSettings,
    playback: PlaybackController,
    review: ReviewController,
    settings_store: S,
    blobs: B,
    intents: Option<IntentLog>,
    clock: Box<dyn Clock>,
    notices: Vec<Notice>,
}

impl<S: SettingsStore, B: BlobStore> Tracker<S, B> {
    /// Load state from the stores, migrating it first if needed
    pub fn open(
        mut settings_store: S,
        blobs: B,
        clock: Box<dyn Clock>,
        config: &PlaybackConfig,
    ) -> Self {
        let mut notices = Vec::new();
        if let Err(e) = migrate::run(&mut settings_store) {
            tracing::warn!("Settings migration could not be saved: {}", e);
            notices.push(Notice {
                message: format!("Could not save upgraded settings: {}", e),
            });
        }

        let defaults = AppSettings::default();
        let settings = AppSettings {
            app_title: settings_store.get(keys::APP_TITLE, defaults.app_title),
            theme: settings_store.get(keys::THEME, defaults.theme),
            streak: settings_store.get(keys::STREAK, defaults.streak),
            hide_completed: settings_store.get(keys::HIDE_COMPLETED, defaults.hide_completed),
            review_mode_enabled: settings_store
                .get(keys::REVIEW_MODE, defaults.review_mode_enabled),
            custom_artwork: settings_store.get(keys::CUSTOM_ARTWORK, defaults.custom_artwork),
            completion_sound: settings_store
                .get(keys::COMPLETION_SOUND, defaults.completion_sound),
            use_collections_view: settings_store
                .get(keys::COLLECTIONS_VIEW, defaults.use_collections_view),
            play_on_navigate: settings_store
                .get(keys::PLAY_ON_NAVIGATE, defaults.play_on_navigate),
        };

        let lessons: Vec<Lesson> = load_list(&settings_store, keys::LESSONS);
        let collections: Vec<Collection> = load_list(&settings_store, keys::COLLECTIONS);
        let library = Library::new(lessons, collections)
            .with_tolerance(config.completion_tolerance_seconds);

        let mut playback = PlaybackController::new(config.debounce());
        let mut quiet = NullPlayer;
        playback.set_rate(config.default_playback_rate, &mut quiet);

        tracing::info!(
            "Loaded {} lessons, {} collections",
            library.lessons().len(),
            library.collections().len()
        );

        Self {
            library,
            settings,
            playback,
            review: ReviewController::default(),
            settings_store,
            blobs,
            intents: None,
            clock,
            notices,
        }
    }

    /// Attach a write-ahead intent log, replaying what it holds
    pub fn with_intent_log(mut self, log: IntentLog) -> Self {
        match log.read_all() {
            Ok(intents) if !intents.is_empty() => {
                if wal::replay(&mut self.library, &intents) > 0 {
                    self.save(&[keys::LESSONS]);
                }
                // Compact only once the replayed state is safely stored
                if self.notices.is_empty() {
                    if let Err(e) = log.compact() {
                        tracing::warn!("Failed to compact intent log: {}", e);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => self.storage_failure("read the progress log", &e),
        }
        self.intents = Some(log);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn pending_review(&self) -> Option<&PendingReview> {
        self.review.pending()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn settings_store(&self) -> &S {
        &self.settings_store
    }

    pub fn settings_store_mut(&mut self) -> &mut S {
        &mut self.settings_store
    }

    pub fn blob_store(&self) -> &B {
        &self.blobs
    }

    pub fn blob_store_mut(&mut self) -> &mut B {
        &mut self.blobs
    }

    /// Drain accumulated notices
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn streak_summary(&self) -> StreakSummary {
        let today = self.today();
        let streak = &self.settings.streak;
        StreakSummary {
            enabled: streak.enabled,
            difficulty: streak.difficulty,
            current_streak: streak.display_streak(today),
            goal: streak.difficulty.goal(),
            completed_today: streak.completed_count(today),
            today_complete: streak.is_today_complete(today),
            recent: streak.recent_history(today, 7),
        }
    }

    // ========================================================================
    // Playback and review
    // ========================================================================

    pub fn select_lesson(&mut self, id: &str, player: &mut dyn MediaPlayer) -> Selection {
        let review_enabled = self.settings.review_mode_enabled;
        let (mut ctx, playback, review) = self.parts();
        let selection = review.select(&mut ctx, playback, review_enabled, id, player);
        self.commit(false);
        selection
    }

    pub fn confirm_review(&mut self, player: &mut dyn MediaPlayer) -> Option<LessonId> {
        let (mut ctx, playback, review) = self.parts();
        let started = review.confirm(&mut ctx, playback, player);
        self.commit(started.is_some());
        started
    }

    pub fn skip_review(&mut self, player: &mut dyn MediaPlayer) -> Option<LessonId> {
        let (mut ctx, playback, review) = self.parts();
        let started = review.skip(&mut ctx, playback, player);
        self.commit(false);
        started
    }

    pub fn on_loaded(&mut self, duration: f64, player: &mut dyn MediaPlayer) {
        let (mut ctx, playback, _) = self.parts();
        playback.on_loaded(&mut ctx, duration, player);
        self.commit(true);
    }

    /// Record a playhead position; persisted once playback goes quiet
    pub fn on_time_update(&mut self, seconds: f64) {
        let now = self.clock.now();
        self.playback.on_time_update(now, seconds);
    }

    /// Persist a debounced position whose quiet period has elapsed
    pub fn tick(&mut self) {
        let now = self.clock.now();
        let (mut ctx, playback, _) = self.parts();
        playback.poll(&mut ctx, now);
        self.commit(false);
    }

    /// Persist any pending position immediately
    pub fn flush(&mut self) {
        let (mut ctx, playback, _) = self.parts();
        playback.flush(&mut ctx);
        self.commit(false);
    }

    pub fn on_ended(&mut self, player: &mut dyn MediaPlayer) -> Option<LessonId> {
        let (mut ctx, playback, _) = self.parts();
        let next = playback.on_ended(&mut ctx, player);
        self.commit(false);
        next
    }

    pub fn seek(&mut self, seconds: f64, player: &mut dyn MediaPlayer) {
        let (mut ctx, playback, _) = self.parts();
        playback.seek(&mut ctx, seconds, player);
        self.commit(false);
    }

    pub fn pause(&mut self, player: &mut dyn MediaPlayer) {
        let (mut ctx, playback, _) = self.parts();
        playback.pause(&mut ctx, player);
        self.commit(false);
    }

    pub fn resume(&mut self, player: &mut dyn MediaPlayer) {
        self.playback.resume(player);
    }

    pub fn set_playback_rate(&mut self, rate: f64, player: &mut dyn MediaPlayer) {
        self.playback.set_rate(rate, player);
    }

    // ========================================================================
    // Library mutations
    // ========================================================================

    /// Probe files and add the new ones, storing their bytes
    pub fn add_files(&mut self, paths: &[PathBuf], probe: &dyn MetadataProbe) -> AddOutcome {
        let report = ingest::probe_files(paths, probe);
        let mut outcome = AddOutcome {
            dropped: report.dropped.len(),
            ..Default::default()
        };

        let mut fresh = Vec::new();
        for candidate in report.candidates {
            let id = candidate.lesson.id.clone();
            if self.library.get(&id).is_some() || outcome.added.contains(&id) {
                outcome.duplicates += 1;
                continue;
            }
            if let Err(e) = self.blobs.put(&id, &candidate.bytes) {
                self.storage_failure(&format!("store audio for {}", candidate.lesson.name), &e);
                outcome.dropped += 1;
                continue;
            }
            outcome.added.push(id);
            fresh.push(candidate.lesson);
        }

        if self.library.add_lessons(fresh) > 0 {
            self.save(&[keys::LESSONS]);
        }
        outcome
    }

    /// Add a URL-backed lesson; returns false if it already exists
    pub fn add_static(&mut self, url: &str, name: &str, duration: f64) -> bool {
        let added = self.library.add_lessons([Lesson::from_url(url, name, duration)]) > 0;
        if added {
            self.save(&[keys::LESSONS]);
        }
        added
    }

    /// Manually flip completion, keeping the streak in step
    pub fn toggle_completion(&mut self, id: &str) -> Option<bool> {
        let (mut ctx, playback, _) = self.parts();
        playback.flush(&mut ctx);

        let completed = ctx.library.toggle_completion(id)?;
        if completed {
            apply_streak_rules(&mut ctx, id, true);
        } else {
            ctx.streak.unrecord_completion(id, ctx.today);
        }
        playback.sync_live_position(ctx.library);
        self.commit(true);
        Some(completed)
    }

    pub fn move_to_collection(&mut self, id: &str, collection_id: Option<&str>) -> bool {
        let moved = self.library.move_to_collection(id, collection_id);
        if moved {
            self.save(&[keys::LESSONS]);
        }
        moved
    }

    /// Delete a lesson and, for uploads, its stored audio
    pub fn delete_lesson(&mut self, id: &str) -> bool {
        self.playback.forget(id);
        if self
            .review
            .pending()
            .is_some_and(|p| p.review == id || p.target == id)
        {
            self.review.cancel();
        }
        self.flush();

        let Some(lesson) = self.library.remove(id) else {
            return false;
        };
        if let Some(key) = lesson.blob_key() {
            if let Err(e) = self.blobs.delete(key) {
                self.storage_failure(&format!("delete audio for {}", lesson.name), &e);
            }
        }
        tracing::info!("Deleted lesson {}", lesson.name);
        self.save(&[keys::LESSONS]);
        true
    }

    /// Delete every lesson and its stored audio; artwork is kept
    pub fn delete_all(&mut self) -> usize {
        self.playback.forget_all();
        self.review.cancel();
        let removed = self.library.remove_all();

        let result = if self.settings.custom_artwork.is_none() {
            self.blobs.clear()
        } else {
            removed
                .iter()
                .filter_map(Lesson::blob_key)
                .try_for_each(|key| self.blobs.delete(key))
        };
        if let Err(e) = result {
            self.storage_failure("delete stored audio", &e);
        }

        tracing::info!("Deleted all {} lessons", removed.len());
        self.save(&[keys::LESSONS]);
        removed.len()
    }

    /// Rewind every lesson; the streak count and history survive
    pub fn reset_progress(&mut self) {
        let (mut ctx, playback, _) = self.parts();
        playback.flush(&mut ctx);
        ctx.library.reset_all();
        ctx.streak.clear_today();
        playback.sync_live_position(ctx.library);
        self.commit(true);
        tracing::info!("Reset progress of all lessons");
    }

    // ========================================================================
    // Collections
    // ========================================================================

    pub fn create_collection(&mut self, name: &str) -> Option<Collection> {
        let collection = self.library.create_collection(name)?.clone();
        self.save(&[keys::COLLECTIONS]);
        Some(collection)
    }

    pub fn rename_collection(&mut self, id: &str, name: &str) -> bool {
        let renamed = self.library.rename_collection(id, name);
        if renamed {
            self.save(&[keys::COLLECTIONS]);
        }
        renamed
    }

    /// Delete a collection; its lessons become uncategorized
    pub fn delete_collection(&mut self, id: &str) -> Option<usize> {
        let reassigned = self.library.delete_collection(id)?;
        self.save(&[keys::LESSONS, keys::COLLECTIONS]);
        Some(reassigned)
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Change settings and persist them
    pub fn update_settings(&mut self, f: impl FnOnce(&mut AppSettings)) {
        f(&mut self.settings);
        self.settings.app_title = self.settings.app_title.trim().to_string();
        self.save(SETTINGS_KEYS);
    }

    /// Store custom artwork bytes under the reserved key
    pub fn set_custom_artwork(&mut self, bytes: &[u8]) -> bool {
        if let Err(e) = self.blobs.put(CUSTOM_ARTWORK_KEY, bytes) {
            self.storage_failure("store artwork", &e);
            return false;
        }
        self.settings.custom_artwork = Some(CUSTOM_ARTWORK_KEY.to_string());
        self.save(&[keys::CUSTOM_ARTWORK]);
        true
    }

    pub fn clear_custom_artwork(&mut self) {
        if let Err(e) = self.blobs.delete(CUSTOM_ARTWORK_KEY) {
            self.storage_failure("delete artwork", &e);
        }
        self.settings.custom_artwork = None;
        self.save(&[keys::CUSTOM_ARTWORK]);
    }

    pub fn custom_artwork(&self) -> Option<Vec<u8>> {
        let key = self.settings.custom_artwork.as_deref()?;
        match self.blobs.get(key) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to read artwork: {}", e);
                None
            }
        }
    }

    // ========================================================================
    // Backup
    // ========================================================================

    /// Snapshot everything, including any not-yet-flushed position
    pub fn export_document(&mut self) -> BackupDocument {
        self.flush();
        backup::export(&self.library, &self.settings)
    }

    /// Write a backup into `dir` under the conventional file name
    pub fn export_to(&mut self, dir: &Path) -> Result<PathBuf> {
        let document = self.export_document();
        let path = dir.join(backup::export_filename(self.today()));
        std::fs::create_dir_all(dir)?;
        std::fs::write(&path, backup::to_json(&document)?)?;
        tracing::info!("Exported backup to {:?}", path);
        Ok(path)
    }

    /// Merge a backup document into the live state
    ///
    /// Nothing changes if the document fails validation.
    pub fn import_json(&mut self, json: &str) -> Result<ImportSummary> {
        let plan = backup::parse_import(json)?;
        self.flush();
        self.review.cancel();

        let summary = backup::apply(plan, &mut self.library, &mut self.settings);
        self.playback.sync_live_position(&self.library);

        let mut all_keys = vec![keys::LESSONS, keys::COLLECTIONS];
        all_keys.extend_from_slice(SETTINGS_KEYS);
        self.save(&all_keys);
        Ok(summary)
    }

    pub fn import_file(&mut self, path: &Path) -> Result<ImportSummary> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::ImportValidation(format!("cannot read {:?}: {}", path, e)))?;
        self.import_json(&json)
    }

    /// Flush pending progress and release the stores
    pub fn shutdown(mut self) -> Result<Vec<Notice>> {
        self.flush();
        self.blobs.close()?;
        Ok(self.notices)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn parts(&mut self) -> (ProgressCtx<'_>, &mut PlaybackController, &mut ReviewController) {
        let today = self.clock.today();
        (
            ProgressCtx {
                library: &mut self.library,
                streak: &mut self.settings.streak,
                today,
            },
            &mut self.playback,
            &mut self.review,
        )
    }

    /// Log and persist whatever the controllers changed
    fn commit(&mut self, state_changed: bool) {
        let writes = self.playback.take_writes();
        if writes.is_empty() && !state_changed {
            return;
        }

        if let Some(log) = self.intents.as_mut() {
            for write in &writes {
                let intent = ProgressIntent {
                    lesson_id: write.lesson_id.clone(),
                    progress_seconds: write.progress_seconds,
                    is_completed: write.is_completed,
                    recorded_at: Utc::now(),
                };
                if let Err(e) = log.append(&intent) {
                    tracing::warn!("Failed to log progress intent: {}", e);
                    break;
                }
            }
        }

        self.save(PROGRESS_KEYS);
    }

    /// Write the given keys; returns false (and raises a notice) on failure
    fn save(&mut self, which: &[&str]) -> bool {
        let mut entries: Vec<(&str, Value)> = Vec::with_capacity(which.len());
        for &key in which {
            match self.value_for(key) {
                Ok(value) => entries.push((key, value)),
                Err(e) => {
                    self.storage_failure(&format!("serialize {}", key), &Error::from(e));
                    return false;
                }
            }
        }
        if let Err(e) = self.settings_store.set_many(entries) {
            self.storage_failure("save changes", &e);
            return false;
        }

        // The full lesson list is on disk; older intents are now stale
        if which.contains(&keys::LESSONS) {
            if let Some(log) = &self.intents {
                if let Err(e) = log.compact() {
                    tracing::warn!("Failed to compact intent log: {}", e);
                }
            }
        }
        true
    }

    fn value_for(&self, key: &str) -> serde_json::Result<Value> {
        let s = &self.settings;
        match key {
            keys::LESSONS => serde_json::to_value(self.library.lessons()),
            keys::COLLECTIONS => serde_json::to_value(self.library.collections()),
            keys::APP_TITLE => serde_json::to_value(&s.app_title),
            keys::THEME => serde_json::to_value(&s.theme),
            keys::STREAK => serde_json::to_value(&s.streak),
            keys::HIDE_COMPLETED => serde_json::to_value(s.hide_completed),
            keys::REVIEW_MODE => serde_json::to_value(s.review_mode_enabled),
            keys::CUSTOM_ARTWORK => serde_json::to_value(&s.custom_artwork),
            keys::COMPLETION_SOUND => serde_json::to_value(&s.completion_sound),
            keys::COLLECTIONS_VIEW => serde_json::to_value(s.use_collections_view),
            keys::PLAY_ON_NAVIGATE => serde_json::to_value(s.play_on_navigate),
            _ => Ok(Value::Null),
        }
    }

    fn storage_failure(&mut self, action: &str, error: &Error) {
        tracing::warn!("Failed to {}: {}", action, error);
        self.notices.push(Notice {
            message: format!("Could not {}: {}", action, error),
        });
    }
}

/// Read a list setting element by element, dropping unreadable entries
fn load_list<T: DeserializeOwned>(store: &impl SettingsStore, key: &str) -> Vec<T> {
    let Some(Value::Array(items)) = store.get_raw(key) else {
        return Vec::new();
    };
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Dropping unreadable {} entry #{}: {}", key, index, e);
                None
            }
        })
        .collect()
}

/// Sink for player commands issued before any player is attached
struct NullPlayer;

impl MediaPlayer for NullPlayer {
    fn open(&mut self, _lesson: &Lesson) {}
    fn seek(&mut self, _seconds: f64) {}
    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn set_playback_rate(&mut self, _rate: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::clock::ManualClock;
    use crate::playback::HeadlessPlayer;
    use crate::settings::{JsonSettingsStore, MemorySettingsStore};
    use std::rc::Rc;
    use std::time::Duration;

    type TestTracker = Tracker<MemorySettingsStore, MemoryBlobStore>;

    fn clock() -> Rc<ManualClock> {
        Rc::new(ManualClock::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()))
    }

    fn seeded_store(lessons: &[Lesson]) -> MemorySettingsStore {
        let mut store = MemorySettingsStore::new();
        store.set(keys::SCHEMA_VERSION, &migrate::SCHEMA_VERSION).unwrap();
        store.set(keys::LESSONS, lessons).unwrap();
        store
    }

    fn tracker_with(lessons: &[Lesson], clock: &Rc<ManualClock>) -> TestTracker {
        crate::logging::init_test();
        Tracker::open(
            seeded_store(lessons),
            MemoryBlobStore::new(),
            Box::new(Rc::clone(clock)),
            &PlaybackConfig::default(),
        )
    }

    fn two_lessons() -> Vec<Lesson> {
        vec![
            Lesson::uploaded("l1", "1", 60.0),
            Lesson::uploaded("l2", "2", 60.0),
        ]
    }

    fn stored_lessons(tracker: &TestTracker) -> Vec<Lesson> {
        tracker.settings_store().get(keys::LESSONS, Vec::new())
    }

    #[test]
    fn test_debounced_position_persisted_after_quiet_period() {
        let clock = clock();
        let mut tracker = tracker_with(&two_lessons(), &clock);
        let mut player = HeadlessPlayer::default();

        tracker.select_lesson("l1", &mut player);
        tracker.on_time_update(12.0);
        tracker.tick();
        assert_eq!(stored_lessons(&tracker)[0].progress_seconds, 0.0);

        clock.advance(Duration::from_millis(500));
        tracker.tick();
        assert_eq!(stored_lessons(&tracker)[0].progress_seconds, 12.0);
    }

    #[test]
    fn test_review_scenario_end_to_end() {
        let clock = clock();
        let mut tracker = tracker_with(&two_lessons(), &clock);
        let mut player = HeadlessPlayer::default();
        tracker.update_settings(|s| {
            s.review_mode_enabled = true;
            s.streak.enabled = true;
        });
        tracker.toggle_completion("l1");
        assert_eq!(tracker.streak_summary().current_streak, 1);

        let selection = tracker.select_lesson("l2", &mut player);
        assert!(matches!(selection, Selection::ReviewOffered(_)));

        assert_eq!(tracker.confirm_review(&mut player).as_deref(), Some("l1"));
        let stored = stored_lessons(&tracker);
        assert!(!stored[0].is_completed);
        assert_eq!(stored[0].progress_seconds, 0.0);

        assert_eq!(tracker.on_ended(&mut player).as_deref(), Some("l2"));
        assert!(stored_lessons(&tracker)[0].is_completed);
        assert_eq!(tracker.playback().active(), Some("l2"));
        assert_eq!(tracker.streak_summary().current_streak, 1);
    }

    #[test]
    fn test_streak_across_days() {
        let clock = clock();
        let mut tracker = tracker_with(&two_lessons(), &clock);
        let mut player = HeadlessPlayer::default();
        tracker.update_settings(|s| s.streak.enabled = true);

        tracker.select_lesson("l1", &mut player);
        tracker.seek(60.0, &mut player);
        assert!(tracker.streak_summary().today_complete);

        clock.next_day();
        assert!(!tracker.streak_summary().today_complete);
        assert_eq!(tracker.streak_summary().current_streak, 1);

        tracker.select_lesson("l2", &mut player);
        tracker.on_ended(&mut player);
        let summary = tracker.streak_summary();
        assert_eq!(summary.current_streak, 2);
        assert_eq!(summary.recent.len(), 2);

        let stored: crate::StreakState = tracker
            .settings_store()
            .get(keys::STREAK, Default::default());
        assert_eq!(stored.current_streak, 2);
    }

    #[test]
    fn test_storage_failure_raises_notice_without_rollback() {
        let clock = clock();
        let mut tracker = tracker_with(&two_lessons(), &clock);
        tracker.settings_store_mut().fail_writes = true;

        assert_eq!(tracker.toggle_completion("l1"), Some(true));
        assert!(tracker.library().get("l1").unwrap().is_completed);

        let notices = tracker.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("save changes"));
        assert!(tracker.take_notices().is_empty());
    }

    #[test]
    fn test_intent_log_recovers_lost_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("intents.wal");
        let clock = clock();

        let mut tracker =
            tracker_with(&two_lessons(), &clock).with_intent_log(IntentLog::new(&log_path));
        let mut player = HeadlessPlayer::default();
        tracker.settings_store_mut().fail_writes = true;
        tracker.select_lesson("l1", &mut player);
        tracker.seek(33.0, &mut player);
        assert!(!tracker.take_notices().is_empty());
        drop(tracker);

        // The settings write never landed; the log still holds the intent
        let recovered =
            tracker_with(&two_lessons(), &clock).with_intent_log(IntentLog::new(&log_path));
        assert_eq!(recovered.library().get("l1").unwrap().progress_seconds, 33.0);
        assert_eq!(stored_lessons(&recovered)[0].progress_seconds, 33.0);
        assert!(IntentLog::new(&log_path).read_all().unwrap().is_empty());
    }

    #[test]
    fn test_successful_write_compacts_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("intents.wal");
        let clock = clock();
        let mut tracker =
            tracker_with(&two_lessons(), &clock).with_intent_log(IntentLog::new(&log_path));
        let mut player = HeadlessPlayer::default();

        tracker.select_lesson("l1", &mut player);
        tracker.seek(10.0, &mut player);
        assert!(IntentLog::new(&log_path).read_all().unwrap().is_empty());
    }

    #[test]
    fn test_add_files_stores_bytes_and_skips_duplicates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("01.mp3");
        std::fs::write(&path, b"audio").unwrap();
        let clock = clock();
        let mut tracker = tracker_with(&[], &clock);

        let probe = ingest::DeclaredDuration(Some(90.0));
        let first = tracker.add_files(&[path.clone(), path.clone()], &probe);
        assert_eq!(first.added.len(), 1);
        assert_eq!(first.duplicates, 1);

        let id = &first.added[0];
        assert_eq!(tracker.blob_store().get(id).unwrap(), Some(b"audio".to_vec()));
        assert_eq!(stored_lessons(&tracker).len(), 1);

        let second = tracker.add_files(&[path], &probe);
        assert!(second.added.is_empty());
        assert_eq!(second.duplicates, 1);
    }

    #[test]
    fn test_blob_failure_drops_candidate() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.mp3");
        std::fs::write(&path, b"audio").unwrap();
        let clock = clock();
        let mut tracker = tracker_with(&[], &clock);
        tracker.blob_store_mut().fail_writes = true;

        let outcome = tracker.add_files(&[path], &ingest::DeclaredDuration(None));
        assert_eq!(outcome.dropped, 1);
        assert!(tracker.library().lessons().is_empty());
        assert_eq!(tracker.take_notices().len(), 1);
    }

    #[test]
    fn test_delete_lesson_releases_blob_and_playback() {
        let clock = clock();
        let mut tracker = tracker_with(&two_lessons(), &clock);
        tracker.blob_store_mut().put("l1", b"x").unwrap();
        let mut player = HeadlessPlayer::default();
        tracker.select_lesson("l1", &mut player);
        tracker.on_time_update(5.0);

        assert!(tracker.delete_lesson("l1"));
        assert!(tracker.blob_store().is_empty());
        assert!(tracker.playback().active().is_none());
        assert_eq!(stored_lessons(&tracker).len(), 1);
        assert!(!tracker.delete_lesson("l1"));
    }

    #[test]
    fn test_delete_all_keeps_artwork() {
        let clock = clock();
        let mut tracker = tracker_with(&two_lessons(), &clock);
        tracker.blob_store_mut().put("l1", b"x").unwrap();
        tracker.blob_store_mut().put("l2", b"y").unwrap();
        assert!(tracker.set_custom_artwork(b"png"));

        assert_eq!(tracker.delete_all(), 2);
        assert_eq!(tracker.blob_store().len(), 1);
        assert_eq!(tracker.custom_artwork(), Some(b"png".to_vec()));
        assert!(stored_lessons(&tracker).is_empty());
    }

    #[test]
    fn test_reset_progress_keeps_streak() {
        let clock = clock();
        let mut tracker = tracker_with(&two_lessons(), &clock);
        tracker.update_settings(|s| s.streak.enabled = true);
        tracker.toggle_completion("l1");

        tracker.reset_progress();
        assert!(tracker.library().lessons().iter().all(|l| !l.is_started()));
        let summary = tracker.streak_summary();
        assert_eq!(summary.current_streak, 1);
        assert_eq!(summary.completed_today, 0);
    }

    #[test]
    fn test_delete_collection_persists_reassignment() {
        let clock = clock();
        let mut tracker = tracker_with(&two_lessons(), &clock);
        let collection = tracker.create_collection("Unit 1").unwrap();
        tracker.move_to_collection("l1", Some(&collection.id));

        assert_eq!(tracker.delete_collection(&collection.id), Some(1));
        assert!(stored_lessons(&tracker)[0].collection_id.is_none());
        let stored: Vec<Collection> = tracker.settings_store().get(keys::COLLECTIONS, Vec::new());
        assert!(stored.is_empty());
    }

    #[test]
    fn test_failed_import_changes_nothing() {
        let clock = clock();
        let mut tracker = tracker_with(&two_lessons(), &clock);
        let before = tracker.settings().clone();

        let result = tracker.import_json(r#"{"appTitle": "X", "lessons": 5}"#);
        assert!(matches!(result, Err(Error::ImportValidation(_))));
        assert_eq!(tracker.settings(), &before);
    }

    #[test]
    fn test_export_then_import_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let mut tracker = tracker_with(&two_lessons(), &clock);
        let mut player = HeadlessPlayer::default();
        tracker.select_lesson("l2", &mut player);
        tracker.on_time_update(20.0);

        let path = tracker.export_to(temp_dir.path()).unwrap();
        assert!(path.ends_with("audio-player-backup-2024-05-01.json"));

        tracker.reset_progress();
        let summary = tracker.import_file(&path).unwrap();
        assert_eq!(summary.lessons_updated, 2);
        assert_eq!(tracker.library().get("l2").unwrap().progress_seconds, 20.0);
        assert_eq!(tracker.playback().live_position(), 20.0);
    }

    #[test]
    fn test_corrupt_lesson_entry_does_not_drop_library() {
        let mut store = seeded_store(&two_lessons());
        let mut lessons = store.get_raw(keys::LESSONS).unwrap();
        lessons
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"id": 7}));
        store.set_raw(keys::LESSONS, lessons).unwrap();

        let tracker: TestTracker = Tracker::open(
            store,
            MemoryBlobStore::new(),
            Box::new(clock()),
            &PlaybackConfig::default(),
        );
        assert_eq!(tracker.library().lessons().len(), 2);
    }

    #[test]
    fn test_shutdown_flushes_pending_position() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings_path = temp_dir.path().join("settings.json");
        let open_json = |clock: &Rc<ManualClock>| {
            Tracker::open(
                JsonSettingsStore::open(&settings_path).unwrap(),
                MemoryBlobStore::new(),
                Box::new(Rc::clone(clock)),
                &PlaybackConfig::default(),
            )
        };
        let clock = clock();

        let mut tracker = open_json(&clock);
        tracker.add_static("https://example.com/1.mp3", "1", 60.0);
        let mut player = HeadlessPlayer::default();
        tracker.select_lesson("https://example.com/1.mp3", &mut player);
        tracker.on_time_update(45.0);
        assert!(tracker.playback().has_pending_flush());

        let notices = tracker.shutdown().unwrap();
        assert!(notices.is_empty());

        let reopened = open_json(&clock);
        let lesson = reopened.library().get("https://example.com/1.mp3").unwrap();
        assert_eq!(lesson.progress_seconds, 45.0);
    }

    #[test]
    fn test_explicit_unmark_survives_restart_after_failed_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("intents.wal");
        let clock = clock();

        let mut tracker =
            tracker_with(&two_lessons(), &clock).with_intent_log(IntentLog::new(&log_path));
        let mut player = HeadlessPlayer::default();
        tracker.select_lesson("l1", &mut player);

        // Completion is logged but never reaches the settings store
        tracker.settings_store_mut().fail_writes = true;
        tracker.seek(60.0, &mut player);
        assert_eq!(IntentLog::new(&log_path).read_all().unwrap().len(), 1);

        tracker.settings_store_mut().fail_writes = false;
        assert_eq!(tracker.toggle_completion("l1"), Some(false));
        assert!(IntentLog::new(&log_path).read_all().unwrap().is_empty());

        let stored = stored_lessons(&tracker);
        drop(tracker);
        let restarted =
            tracker_with(&stored, &clock).with_intent_log(IntentLog::new(&log_path));
        let lesson = restarted.library().get("l1").unwrap();
        assert!(!lesson.is_completed);
        assert_eq!(lesson.progress_seconds, 0.0);
    }
}
