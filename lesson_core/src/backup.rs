//! Backup export and import.
//!
//! Export writes the whole library and settings bundle as one flat JSON
//! document. Import is a merge, not a restore:
//! - settings present in the document overwrite the live value; absent
//!   ones are left alone
//! - only lessons already in the library are touched, and only their
//!   progress, completion and collection
//! - lessons that exist only in the document are ignored
//!
//! The whole document is validated before anything is applied, so a
//! failed import never leaves partial changes behind.

use crate::migrate::{self, SCHEMA_VERSION};
use crate::{AppSettings, Collection, Error, Lesson, LessonId, Library, Result, StreakState};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Portable snapshot of all user state
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub schema_version: u32,
    pub lessons: Vec<Lesson>,
    pub collections: Vec<Collection>,
    #[serde(flatten)]
    pub settings: AppSettings,
}

/// Progress fields copied from an imported lesson record
#[derive(Clone, Debug, PartialEq)]
pub struct ImportedProgress {
    pub progress_seconds: f64,
    pub is_completed: bool,
    pub collection_id: Option<String>,
}

/// Settings fields found in an imported document
#[derive(Clone, Debug, Default)]
pub struct SettingsPatch {
    pub app_title: Option<String>,
    pub theme: Option<String>,
    pub streak: Option<StreakState>,
    pub hide_completed: Option<bool>,
    pub review_mode_enabled: Option<bool>,
    pub custom_artwork: Option<Option<String>>,
    pub completion_sound: Option<String>,
    pub use_collections_view: Option<bool>,
    pub play_on_navigate: Option<bool>,
}

/// A fully validated import, ready to apply
#[derive(Clone, Debug)]
pub struct ImportPlan {
    pub schema_version: u32,
    pub lessons: HashMap<LessonId, ImportedProgress>,
    pub collections: Option<Vec<Collection>>,
    pub settings: SettingsPatch,
}

/// What an applied import changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub lessons_updated: usize,
    pub lessons_ignored: usize,
    pub settings_applied: usize,
    pub collections_replaced: bool,
}

/// Snapshot the current state
pub fn export(library: &Library, settings: &AppSettings) -> BackupDocument {
    BackupDocument {
        schema_version: SCHEMA_VERSION,
        lessons: library.lessons().to_vec(),
        collections: library.collections().to_vec(),
        settings: settings.clone(),
    }
}

/// Conventional file name for a backup taken on `date`
pub fn export_filename(date: NaiveDate) -> String {
    format!("audio-player-backup-{}.json", crate::clock::iso_date(date))
}

pub fn to_json(document: &BackupDocument) -> Result<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Validate an imported document without touching any state
pub fn parse_import(json: &str) -> Result<ImportPlan> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| Error::ImportValidation(format!("not a valid backup file: {}", e)))?;
    let Value::Object(mut doc) = value else {
        return Err(Error::ImportValidation("backup must be a JSON object".into()));
    };

    let lessons = match doc.get("lessons") {
        Some(Value::Array(records)) => parse_lessons(records),
        Some(_) => return Err(Error::ImportValidation("'lessons' must be a list".into())),
        None => return Err(Error::ImportValidation("missing 'lessons' field".into())),
    };

    let schema_version = match doc.get("schemaVersion") {
        None => 1,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| Error::ImportValidation("'schemaVersion' must be a number".into()))?,
    };
    if schema_version > SCHEMA_VERSION {
        return Err(Error::ImportValidation(format!(
            "backup schema {} is newer than supported ({})",
            schema_version, SCHEMA_VERSION
        )));
    }
    if schema_version < 2 {
        if let Some(streak) = doc.get_mut("streakData") {
            migrate::upgrade_streak_value(streak);
        }
    }

    let settings = SettingsPatch {
        app_title: field(&doc, "appTitle")?,
        theme: field(&doc, "theme")?,
        streak: field(&doc, "streakData")?,
        hide_completed: field(&doc, "hideCompleted")?,
        review_mode_enabled: field(&doc, "reviewModeEnabled")?,
        custom_artwork: field(&doc, "customArtwork")?,
        completion_sound: field(&doc, "completionSound")?,
        use_collections_view: field(&doc, "useCollectionsView")?,
        play_on_navigate: field(&doc, "playOnNavigate")?,
    };

    Ok(ImportPlan {
        schema_version,
        lessons,
        collections: field(&doc, "collections")?,
        settings,
    })
}

/// Apply a validated import to live state
pub fn apply(plan: ImportPlan, library: &mut Library, settings: &mut AppSettings) -> ImportSummary {
    let mut summary = ImportSummary::default();
    let patch = plan.settings;

    let mut set = |applied: bool| {
        if applied {
            summary.settings_applied += 1;
        }
    };
    set(assign(&mut settings.app_title, patch.app_title));
    set(assign(&mut settings.theme, patch.theme));
    set(assign(&mut settings.streak, patch.streak));
    set(assign(&mut settings.hide_completed, patch.hide_completed));
    set(assign(&mut settings.review_mode_enabled, patch.review_mode_enabled));
    set(assign(&mut settings.custom_artwork, patch.custom_artwork));
    set(assign(&mut settings.completion_sound, patch.completion_sound));
    set(assign(&mut settings.use_collections_view, patch.use_collections_view));
    set(assign(&mut settings.play_on_navigate, patch.play_on_navigate));

    if let Some(collections) = plan.collections {
        library.replace_collections(collections);
        summary.collections_replaced = true;
    }

    let live_ids: Vec<LessonId> = library.lessons().iter().map(|l| l.id.clone()).collect();
    for id in &live_ids {
        if let Some(imported) = plan.lessons.get(id) {
            library.restore_progress(id, imported.progress_seconds, imported.is_completed);
            library.set_collection_unchecked(id, imported.collection_id.clone());
            summary.lessons_updated += 1;
        }
    }
    summary.lessons_ignored = plan
        .lessons
        .keys()
        .filter(|id| !live_ids.contains(id))
        .count();
    library.drop_dangling_collection_refs();

    tracing::info!(
        "Imported backup (schema {}): {} lessons updated, {} ignored, {} settings",
        plan.schema_version,
        summary.lessons_updated,
        summary.lessons_ignored,
        summary.settings_applied
    );
    summary
}

/// Parse lesson records leniently; entries without an id are skipped
fn parse_lessons(records: &[Value]) -> HashMap<LessonId, ImportedProgress> {
    let mut lessons = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        let Some(id) = record.get("id").and_then(Value::as_str) else {
            tracing::warn!("Skipping imported lesson #{} without an id", index);
            continue;
        };
        let progress_seconds = record
            .get("progressSeconds")
            .and_then(Value::as_f64)
            .filter(|p| p.is_finite() && *p >= 0.0)
            .unwrap_or(0.0);
        lessons.insert(
            id.to_string(),
            ImportedProgress {
                progress_seconds,
                is_completed: record
                    .get("isCompleted")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                collection_id: record
                    .get("collectionId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
        );
    }
    lessons
}

/// Deserialize an optional top-level field; present but malformed is fatal
fn field<T: DeserializeOwned>(doc: &Map<String, Value>, key: &str) -> Result<Option<T>> {
    match doc.get(key) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| Error::ImportValidation(format!("invalid '{}': {}", key, e))),
    }
}

fn assign<T>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *slot = value;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Difficulty;
    use serde_json::json;

    fn library() -> Library {
        let mut lib = Library::new(
            vec![
                Lesson::uploaded("a", "a", 100.0),
                Lesson::uploaded("b", "b", 100.0),
            ],
            vec![],
        );
        lib.update_progress("a", 10.0);
        lib.update_progress("b", 5.0);
        lib
    }

    fn import(
        json: Value,
        library: &mut Library,
        settings: &mut AppSettings,
    ) -> Result<ImportSummary> {
        let plan = parse_import(&json.to_string())?;
        Ok(apply(plan, library, settings))
    }

    #[test]
    fn test_merge_updates_only_matching_lessons() {
        let mut lib = library();
        let mut settings = AppSettings::default();

        let summary = import(
            json!({
                "lessons": [
                    {"id": "a", "progressSeconds": 40.0, "isCompleted": true},
                    {"id": "new", "progressSeconds": 3.0}
                ]
            }),
            &mut lib,
            &mut settings,
        )
        .unwrap();

        let a = lib.get("a").unwrap();
        assert_eq!(a.progress_seconds, 40.0);
        assert!(a.is_completed);
        assert_eq!(lib.get("b").unwrap().progress_seconds, 5.0);
        assert!(lib.get("new").is_none());
        assert_eq!(summary.lessons_updated, 1);
        assert_eq!(summary.lessons_ignored, 1);
        assert_eq!(summary.settings_applied, 0);
    }

    #[test]
    fn test_missing_subfields_default() {
        let mut lib = library();
        let cid = lib.create_collection("Unit").unwrap().id.clone();
        lib.move_to_collection("a", Some(&cid));
        lib.toggle_completion("a");
        let mut settings = AppSettings::default();

        import(json!({"lessons": [{"id": "a"}]}), &mut lib, &mut settings).unwrap();

        let a = lib.get("a").unwrap();
        assert_eq!(a.progress_seconds, 0.0);
        assert!(!a.is_completed);
        assert!(a.collection_id.is_none());
    }

    #[test]
    fn test_missing_lessons_field_is_fatal() {
        let mut lib = library();
        let mut settings = AppSettings::default();
        let result = import(json!({"appTitle": "Changed"}), &mut lib, &mut settings);
        assert!(matches!(result, Err(Error::ImportValidation(_))));
        assert_eq!(settings.app_title, AppSettings::default().app_title);

        let result = import(json!({"lessons": {"id": "a"}}), &mut lib, &mut settings);
        assert!(matches!(result, Err(Error::ImportValidation(_))));
    }

    #[test]
    fn test_unparsable_document_is_fatal() {
        assert!(matches!(
            parse_import("not json"),
            Err(Error::ImportValidation(_))
        ));
        assert!(matches!(
            parse_import("[1, 2]"),
            Err(Error::ImportValidation(_))
        ));
    }

    #[test]
    fn test_malformed_setting_aborts_without_changes() {
        let mut lib = library();
        let mut settings = AppSettings::default();
        let result = import(
            json!({
                "lessons": [{"id": "a", "progressSeconds": 90.0}],
                "appTitle": "New title",
                "hideCompleted": "yes"
            }),
            &mut lib,
            &mut settings,
        );
        assert!(result.is_err());
        assert_eq!(settings.app_title, AppSettings::default().app_title);
        assert_eq!(lib.get("a").unwrap().progress_seconds, 10.0);
    }

    #[test]
    fn test_present_settings_overwrite_absent_ones_survive() {
        let mut lib = library();
        let mut settings = AppSettings {
            theme: "light".into(),
            review_mode_enabled: true,
            ..Default::default()
        };

        let summary = import(
            json!({
                "schemaVersion": 2,
                "lessons": [],
                "appTitle": "French",
                "hideCompleted": true,
                "streakData": {"enabled": true, "difficulty": "extreme", "currentStreak": 9}
            }),
            &mut lib,
            &mut settings,
        )
        .unwrap();

        assert_eq!(summary.settings_applied, 3);
        assert_eq!(settings.app_title, "French");
        assert!(settings.hide_completed);
        assert_eq!(settings.streak.difficulty, Difficulty::Extreme);
        assert_eq!(settings.streak.current_streak, 9);
        assert_eq!(settings.theme, "light");
        assert!(settings.review_mode_enabled);
    }

    #[test]
    fn test_collections_replaced_and_dangling_refs_cleared() {
        let mut lib = library();
        let mut settings = AppSettings::default();

        import(
            json!({
                "lessons": [
                    {"id": "a", "collectionId": "c1"},
                    {"id": "b", "collectionId": "gone"}
                ],
                "collections": [{"id": "c1", "name": "Unit 1"}]
            }),
            &mut lib,
            &mut settings,
        )
        .unwrap();

        assert_eq!(lib.collections().len(), 1);
        assert_eq!(lib.get("a").unwrap().collection_id.as_deref(), Some("c1"));
        assert!(lib.get("b").unwrap().collection_id.is_none());
    }

    #[test]
    fn test_legacy_streak_completions_dropped() {
        let mut lib = library();
        let mut settings = AppSettings::default();
        import(
            json!({
                "lessons": [],
                "streakData": {"enabled": true, "completedToday": ["a"]}
            }),
            &mut lib,
            &mut settings,
        )
        .unwrap();
        assert!(settings.streak.completed_today.is_empty());
    }

    #[test]
    fn test_newer_schema_rejected() {
        let result = parse_import(&json!({"schemaVersion": 99, "lessons": []}).to_string());
        assert!(matches!(result, Err(Error::ImportValidation(_))));
    }

    #[test]
    fn test_export_shape_and_reimport() {
        let mut lib = library();
        let mut settings = AppSettings {
            app_title: "Mine".into(),
            ..Default::default()
        };
        let doc = export(&lib, &settings);
        let json = to_json(&doc).unwrap();

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(value["appTitle"], "Mine");
        assert!(value["streakData"].is_object());
        assert!(value["lessons"].is_array());
        assert!(value.get("playOnNavigate").is_some());

        lib.reset_all();
        settings.app_title = "Other".into();
        apply(parse_import(&json).unwrap(), &mut lib, &mut settings);
        assert_eq!(lib.get("a").unwrap().progress_seconds, 10.0);
        assert_eq!(settings.app_title, "Mine");
    }

    #[test]
    fn test_export_filename() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        assert_eq!(export_filename(date), "audio-player-backup-2024-12-01.json");
    }
}
