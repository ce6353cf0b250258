#![forbid(unsafe_code)]

//! Core model and logic for the audio lesson tracker.
//!
//! This crate provides:
//! - Domain types (lessons, collections, streaks, settings)
//! - Library ordering, progress and collection management
//! - Playback, review and streak rules
//! - Persistence (settings store, blob store, intent log, migrations)
//! - Backup import/export and CSV reports

pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod logging;
pub mod library;
pub mod streak;
pub mod blob;
pub mod settings;
pub mod migrate;
pub mod wal;
pub mod playback;
pub mod review;
pub mod backup;
pub mod ingest;
pub mod report;
pub mod tracker;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use library::Library;
pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use settings::{JsonSettingsStore, MemorySettingsStore, SettingsStore};
pub use wal::{IntentLog, IntentSink, ProgressIntent};
pub use playback::{HeadlessPlayer, MediaPlayer, PlaybackController};
pub use review::{PendingReview, Selection};
pub use backup::{BackupDocument, ImportSummary};
pub use ingest::{DeclaredDuration, MetadataProbe};
pub use tracker::{AddOutcome, Notice, StreakSummary, Tracker};
