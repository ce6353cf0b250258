//! Write-ahead intent log for playback progress.
//!
//! Every debounced progress flush is appended to a JSONL (JSON Lines) file
//! before the settings store is written. If the settings write is lost, the
//! intents are replayed onto the library at the next startup.

use crate::{Library, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A recorded progress write for one lesson
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressIntent {
    pub lesson_id: String,
    pub progress_seconds: f64,
    pub is_completed: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Intent sink trait for persisting progress intents
pub trait IntentSink {
    fn append(&mut self, intent: &ProgressIntent) -> Result<()>;
}

/// JSONL-based intent log with file locking
#[derive(Debug)]
pub struct IntentLog {
    path: PathBuf,
}

impl IntentLog {
    /// Create an intent log for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Read every intent in append order, skipping unparsable lines
    pub fn read_all(&self) -> Result<Vec<ProgressIntent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let reader = BufReader::new(&file);
        let mut intents = Vec::new();
        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ProgressIntent>(&line) {
                Ok(intent) => intents.push(intent),
                Err(e) => {
                    tracing::warn!("Failed to parse intent at line {}: {}", line_num + 1, e);
                }
            }
        }

        file.unlock()?;
        tracing::debug!("Read {} intents from log", intents.len());
        Ok(intents)
    }

    /// Drop all intents once their effects are safely persisted
    pub fn compact(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.lock_exclusive()?;
        file.set_len(0)?;
        file.sync_all()?;
        file.unlock()?;
        tracing::debug!("Compacted intent log {:?}", self.path);
        Ok(())
    }
}

impl IntentSink for IntentLog {
    fn append(&mut self, intent: &ProgressIntent) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(intent)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        tracing::debug!(
            "Logged intent {} @ {:.1}s",
            intent.lesson_id,
            intent.progress_seconds
        );
        Ok(())
    }
}

/// Apply intents to a library; later intents for a lesson win
///
/// A lesson that is already complete stays complete. Intents for lessons
/// no longer in the library are ignored. Returns the number applied.
pub fn replay(library: &mut Library, intents: &[ProgressIntent]) -> usize {
    let mut applied = 0;
    for intent in intents {
        let Some(existing) = library.get(&intent.lesson_id) else {
            continue;
        };
        let completed = existing.is_completed || intent.is_completed;
        if library.restore_progress(&intent.lesson_id, intent.progress_seconds, completed) {
            applied += 1;
        }
    }
    if applied > 0 {
        tracing::info!("Replayed {} progress intents", applied);
    }
    applied
}
