//! CSV report of listening progress.

use crate::{Library, Result};
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    name: &'a str,
    collection: &'a str,
    progress_seconds: f64,
    duration_seconds: f64,
    percent: f64,
    completed: bool,
    id: &'a str,
}

/// Write one row per lesson, in display order
///
/// Returns the number of rows written.
pub fn write_report(library: &Library, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    let lessons = library.sorted();
    for lesson in &lessons {
        let collection = lesson
            .collection_id
            .as_deref()
            .and_then(|id| library.collection(id))
            .map(|c| c.name.as_str())
            .unwrap_or("");
        let percent = if lesson.is_completed {
            100.0
        } else if lesson.duration_seconds > 0.0 {
            (lesson.progress_seconds / lesson.duration_seconds * 100.0).round()
        } else {
            0.0
        };
        writer.serialize(CsvRow {
            name: &lesson.name,
            collection,
            progress_seconds: lesson.progress_seconds,
            duration_seconds: lesson.duration_seconds,
            percent,
            completed: lesson.is_completed,
            id: &lesson.id,
        })?;
    }
    writer.flush()?;

    tracing::info!("Wrote report of {} lessons to {:?}", lessons.len(), path);
    Ok(lessons.len())
}
