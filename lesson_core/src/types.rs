//! Core domain types for the lesson tracker.
//!
//! This module defines the records that are persisted and exchanged:
//! - Lessons and where their audio comes from
//! - Collections (user folders)
//! - Streak state and difficulty
//! - The settings bundle carried by backups

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Stable lesson identifier.
pub type LessonId = String;

/// Reserved blob-store key for the user's custom artwork.
pub const CUSTOM_ARTWORK_KEY: &str = "custom-artwork";

// ============================================================================
// Lesson Types
// ============================================================================

/// Which collaborator supplies the audio bytes for a lesson
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StorageKind {
    Static,
    UserUploaded,
}

/// Location of a lesson's audio
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SourceRef {
    /// Remote or bundled asset, fetched directly
    Url(String),
    /// Key into the blob store
    BlobKey(String),
}

/// A playable audio lesson
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: LessonId,
    pub name: String,
    pub source_ref: SourceRef,
    /// `0.0` means the duration has not been probed yet
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub progress_seconds: f64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub collection_id: Option<String>,
    pub storage_kind: StorageKind,
}

impl Lesson {
    /// A lesson whose bytes live in the blob store under its own id.
    pub fn uploaded(
        id: impl Into<LessonId>,
        name: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        let id = id.into();
        Self {
            source_ref: SourceRef::BlobKey(id.clone()),
            id,
            name: name.into(),
            duration_seconds,
            progress_seconds: 0.0,
            is_completed: false,
            collection_id: None,
            storage_kind: StorageKind::UserUploaded,
        }
    }

    /// A lesson backed by a URL; the URL doubles as the id.
    pub fn from_url(
        url: impl Into<String>,
        name: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        let url = url.into();
        Self {
            id: url.clone(),
            name: name.into(),
            source_ref: SourceRef::Url(url),
            duration_seconds,
            progress_seconds: 0.0,
            is_completed: false,
            collection_id: None,
            storage_kind: StorageKind::Static,
        }
    }

    /// Whether any listening has been recorded
    pub fn is_started(&self) -> bool {
        self.is_completed || self.progress_seconds > 0.0
    }

    /// Blob key to delete when this lesson is removed, if any
    pub fn blob_key(&self) -> Option<&str> {
        match (&self.storage_kind, &self.source_ref) {
            (StorageKind::UserUploaded, SourceRef::BlobKey(key)) => Some(key),
            _ => None,
        }
    }
}

/// A user-defined folder of lessons
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collection {
    pub id: String,
    pub name: String,
}

// ============================================================================
// Streak Types
// ============================================================================

/// Streak difficulty, mapping to a daily goal
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Any listening activity earns the day
    Easy,
    #[default]
    Normal,
    Hard,
    Extreme,
}

impl Difficulty {
    /// Number of distinct lessons to complete for the day's award
    pub fn goal(self) -> usize {
        match self {
            Difficulty::Easy | Difficulty::Normal => 1,
            Difficulty::Hard => 2,
            Difficulty::Extreme => 3,
        }
    }

    /// Easy streaks count activity, not completions
    pub fn is_activity_based(self) -> bool {
        self == Difficulty::Easy
    }
}

impl std::str::FromStr for Difficulty {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            "extreme" => Ok(Difficulty::Extreme),
            other => Err(crate::Error::Other(format!("Unknown difficulty: {}", other))),
        }
    }
}

/// Daily listening streak
///
/// `completed_today` is only meaningful while `completion_date` is today;
/// readers treat it as empty otherwise.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StreakState {
    pub enabled: bool,
    pub difficulty: Difficulty,
    pub last_awarded_date: Option<NaiveDate>,
    pub current_streak: u32,
    pub history: BTreeSet<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub completed_today: BTreeSet<LessonId>,
}

// ============================================================================
// Settings Bundle
// ============================================================================

/// Every user-facing setting, persisted and carried by backups
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub app_title: String,
    pub theme: String,
    #[serde(rename = "streakData")]
    pub streak: StreakState,
    pub hide_completed: bool,
    pub review_mode_enabled: bool,
    pub custom_artwork: Option<String>,
    pub completion_sound: String,
    pub use_collections_view: bool,
    pub play_on_navigate: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_title: "Audio Lessons".into(),
            theme: "dark".into(),
            streak: StreakState::default(),
            hide_completed: false,
            review_mode_enabled: false,
            custom_artwork: None,
            completion_sound: "chime".into(),
            use_collections_view: false,
            play_on_navigate: false,
        }
    }
}
