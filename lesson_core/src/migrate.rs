//! Schema versioning for persisted settings and backups.
//!
//! Version history:
//! - 1: unversioned data. Lessons may be stored under `podcasts`; the streak
//!   record may lack `completionDate`, in which case `completedToday` cannot
//!   be attributed to a day.
//! - 2: explicit `schemaVersion`; streak record always carries
//!   `completionDate`.

use crate::settings::{keys, SettingsStore};
use crate::Result;
use serde_json::Value;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 2;

const LEGACY_LESSONS_KEY: &str = "podcasts";

/// Bring a settings store up to `SCHEMA_VERSION`
///
/// Runs once at load time. Returns the version found before migrating.
pub fn run(store: &mut impl SettingsStore) -> Result<u32> {
    if store.is_empty() {
        store.set(keys::SCHEMA_VERSION, &SCHEMA_VERSION)?;
        return Ok(SCHEMA_VERSION);
    }

    let found: u32 = store.get(keys::SCHEMA_VERSION, 1);
    if found >= SCHEMA_VERSION {
        return Ok(found);
    }

    tracing::info!("Migrating settings from schema {} to {}", found, SCHEMA_VERSION);

    let mut updates: Vec<(&str, Value)> = Vec::new();
    if found < 2 {
        if !store.contains(keys::LESSONS) {
            if let Some(legacy) = store.get_raw(LEGACY_LESSONS_KEY) {
                updates.push((keys::LESSONS, legacy));
            }
        }
        if let Some(mut streak) = store.get_raw(keys::STREAK) {
            if upgrade_streak_value(&mut streak) {
                updates.push((keys::STREAK, streak));
            }
        }
    }
    updates.push((keys::SCHEMA_VERSION, Value::from(SCHEMA_VERSION)));
    store.set_many(updates)?;

    if store.contains(LEGACY_LESSONS_KEY) {
        store.remove(LEGACY_LESSONS_KEY)?;
    }
    Ok(found)
}

/// Upgrade a version-1 streak record in place
///
/// Without a `completionDate` the stored completions cannot be trusted, so
/// they are dropped. Returns true if the value changed.
pub fn upgrade_streak_value(streak: &mut Value) -> bool {
    let Some(record) = streak.as_object_mut() else {
        return false;
    };
    if record.contains_key("completionDate") {
        return false;
    }
    record.insert("completionDate".into(), Value::Null);
    record.insert("completedToday".into(), Value::Array(Vec::new()));
    true
}
