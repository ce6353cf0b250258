//! Playback progress controller.
//!
//! Translates media player events into library and streak updates:
//! - `loaded` records a first duration probe and resumes from the stored position
//! - `time_update` moves the live position at once and schedules a
//!   debounced write
//! - `seek` writes immediately
//! - `ended` completes the lesson and advances to a queued lesson, if any
//!
//! Only one flush ticket exists at a time. Every teardown path (pause,
//! lesson switch, shutdown) flushes it instead of dropping it.

use crate::{Error, Lesson, LessonId, Library, Result, StreakState};
use chrono::NaiveDate;
use std::time::{Duration, Instant};

/// Default quiet period before a position is persisted
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

pub const MIN_PLAYBACK_RATE: f64 = 0.5;
pub const MAX_PLAYBACK_RATE: f64 = 3.0;

/// Commands accepted by the external media player
pub trait MediaPlayer {
    /// Load a lesson's audio and bring the player into view
    fn open(&mut self, lesson: &Lesson);
    fn seek(&mut self, seconds: f64);
    fn play(&mut self);
    fn pause(&mut self);
    fn set_playback_rate(&mut self, rate: f64);
}

/// A command issued to a [`HeadlessPlayer`]
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerCommand {
    Open(LessonId),
    Seek(f64),
    Play,
    Pause,
    SetPlaybackRate(f64),
}

/// Player without audio output that records the commands it receives
#[derive(Debug, Default)]
pub struct HeadlessPlayer {
    pub commands: Vec<PlayerCommand>,
}

impl MediaPlayer for HeadlessPlayer {
    fn open(&mut self, lesson: &Lesson) {
        self.commands.push(PlayerCommand::Open(lesson.id.clone()));
    }

    fn seek(&mut self, seconds: f64) {
        self.commands.push(PlayerCommand::Seek(seconds));
    }

    fn play(&mut self) {
        self.commands.push(PlayerCommand::Play);
    }

    fn pause(&mut self) {
        self.commands.push(PlayerCommand::Pause);
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.commands.push(PlayerCommand::SetPlaybackRate(rate));
    }
}

/// Mutable state the controllers coordinate
pub struct ProgressCtx<'a> {
    pub library: &'a mut Library,
    pub streak: &'a mut StreakState,
    pub today: NaiveDate,
}

/// A position written to the library
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressWrite {
    pub lesson_id: LessonId,
    pub progress_seconds: f64,
    pub is_completed: bool,
    pub became_completed: bool,
    pub streak_awarded: bool,
}

#[derive(Clone, Debug)]
struct FlushTicket {
    lesson_id: LessonId,
    position: f64,
    due: Instant,
}

/// Check a playhead position reported from outside the player
pub fn validate_position(seconds: f64) -> Result<f64> {
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(Error::Other(format!(
            "Position must be a non-negative number of seconds, got {}",
            seconds
        )))
    }
}

/// Apply the streak side effects of a progress write
///
/// Easy difficulty counts every write as activity; other difficulties only
/// count an incomplete-to-complete transition.
pub fn apply_streak_rules(
    ctx: &mut ProgressCtx<'_>,
    lesson_id: &str,
    became_completed: bool,
) -> bool {
    if !ctx.streak.enabled {
        return false;
    }
    if ctx.streak.difficulty.is_activity_based() {
        ctx.streak.record_activity(ctx.today)
    } else if became_completed {
        ctx.streak.record_completion(lesson_id, ctx.today)
    } else {
        false
    }
}

/// Tracks the active lesson and its live position
#[derive(Debug)]
pub struct PlaybackController {
    active: Option<LessonId>,
    live_position: f64,
    playing: bool,
    rate: f64,
    pending: Option<FlushTicket>,
    queued_next: Option<LessonId>,
    debounce: Duration,
    writes: Vec<ProgressWrite>,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl PlaybackController {
    pub fn new(debounce: Duration) -> Self {
        Self {
            active: None,
            live_position: 0.0,
            playing: false,
            rate: 1.0,
            pending: None,
            queued_next: None,
            debounce,
            writes: Vec::new(),
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn live_position(&self) -> f64 {
        self.live_position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn queued_next(&self) -> Option<&str> {
        self.queued_next.as_deref()
    }

    pub fn has_pending_flush(&self) -> bool {
        self.pending.is_some()
    }

    /// Progress writes made since the last call, oldest first
    pub fn take_writes(&mut self) -> Vec<ProgressWrite> {
        std::mem::take(&mut self.writes)
    }

    /// Start a lesson from its stored position, replacing current playback
    pub fn start(
        &mut self,
        ctx: &mut ProgressCtx<'_>,
        id: &str,
        player: &mut dyn MediaPlayer,
    ) -> bool {
        self.flush(ctx);
        let Some(lesson) = ctx.library.get(id) else {
            tracing::debug!("Cannot start unknown lesson {}", id);
            return false;
        };

        self.active = Some(lesson.id.clone());
        self.live_position = lesson.progress_seconds;
        self.playing = true;
        player.open(lesson);
        player.play();
        tracing::info!("Playing {} from {:.1}s", lesson.name, lesson.progress_seconds);
        true
    }

    /// Media metadata became available for the active lesson
    pub fn on_loaded(
        &mut self,
        ctx: &mut ProgressCtx<'_>,
        duration: f64,
        player: &mut dyn MediaPlayer,
    ) {
        let Some(id) = self.active.clone() else {
            return;
        };
        if ctx.library.get(&id).is_some_and(|l| l.duration_seconds == 0.0) {
            ctx.library.update_duration(&id, duration);
        }
        if let Some(lesson) = ctx.library.get(&id) {
            self.live_position = lesson.progress_seconds;
            player.seek(lesson.progress_seconds);
            player.set_playback_rate(self.rate);
        }
    }

    /// Playhead moved during normal playback
    pub fn on_time_update(&mut self, now: Instant, seconds: f64) {
        let Some(id) = self.active.clone() else {
            return;
        };
        if let Err(e) = validate_position(seconds) {
            tracing::warn!("Ignoring time update: {}", e);
            return;
        }
        self.live_position = seconds;
        self.pending = Some(FlushTicket {
            lesson_id: id,
            position: seconds,
            due: now + self.debounce,
        });
    }

    /// Flush the pending position if its quiet period has elapsed
    pub fn poll(&mut self, ctx: &mut ProgressCtx<'_>, now: Instant) -> bool {
        let due = self.pending.as_ref().is_some_and(|t| t.due <= now);
        if due {
            self.flush(ctx)
        } else {
            false
        }
    }

    /// Write the pending position now, if there is one
    pub fn flush(&mut self, ctx: &mut ProgressCtx<'_>) -> bool {
        let Some(ticket) = self.pending.take() else {
            return false;
        };
        self.write_progress(ctx, &ticket.lesson_id, ticket.position)
    }

    /// User moved the scrubber; written without debouncing
    pub fn seek(
        &mut self,
        ctx: &mut ProgressCtx<'_>,
        seconds: f64,
        player: &mut dyn MediaPlayer,
    ) {
        let Some(id) = self.active.clone() else {
            return;
        };
        if let Err(e) = validate_position(seconds) {
            tracing::warn!("Ignoring seek: {}", e);
            return;
        }
        self.pending = None;
        self.live_position = seconds;
        self.write_progress(ctx, &id, seconds);
        player.seek(self.live_position);
    }

    pub fn pause(&mut self, ctx: &mut ProgressCtx<'_>, player: &mut dyn MediaPlayer) {
        self.flush(ctx);
        if self.playing {
            self.playing = false;
            player.pause();
        }
    }

    pub fn resume(&mut self, player: &mut dyn MediaPlayer) {
        if self.active.is_some() && !self.playing {
            self.playing = true;
            player.play();
        }
    }

    /// Toggle play/pause on the active lesson; returns whether it now plays
    pub fn toggle(&mut self, ctx: &mut ProgressCtx<'_>, player: &mut dyn MediaPlayer) -> bool {
        if self.playing {
            self.pause(ctx, player);
        } else {
            self.resume(player);
        }
        self.playing
    }

    /// The active lesson played to its end
    ///
    /// Returns the queued lesson that was started, if any.
    pub fn on_ended(
        &mut self,
        ctx: &mut ProgressCtx<'_>,
        player: &mut dyn MediaPlayer,
    ) -> Option<LessonId> {
        let id = self.active.clone()?;
        self.flush(ctx);

        if let Some(changed) = ctx.library.mark_completed(&id) {
            let streak_awarded = apply_streak_rules(ctx, &id, changed);
            if let Some(lesson) = ctx.library.get(&id) {
                self.live_position = lesson.progress_seconds;
                self.writes.push(ProgressWrite {
                    lesson_id: id.clone(),
                    progress_seconds: lesson.progress_seconds,
                    is_completed: true,
                    became_completed: changed,
                    streak_awarded,
                });
            }
        }

        if let Some(next) = self.queued_next.take() {
            if self.start(ctx, &next, player) {
                return Some(next);
            }
        }
        self.playing = false;
        player.pause();
        None
    }

    pub fn set_rate(&mut self, rate: f64, player: &mut dyn MediaPlayer) {
        let rate = if rate.is_finite() {
            rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
        } else {
            1.0
        };
        self.rate = rate;
        player.set_playback_rate(rate);
    }

    /// Re-read the live position after the stored one changed underneath
    pub fn sync_live_position(&mut self, library: &Library) {
        if let Some(lesson) = self.active.as_deref().and_then(|id| library.get(id)) {
            self.live_position = lesson.progress_seconds;
        }
    }

    /// Reserve the single follow-up slot
    pub fn queue_next(&mut self, id: impl Into<LessonId>) {
        self.queued_next = Some(id.into());
    }

    /// Flush and release the active lesson
    pub fn stop(&mut self, ctx: &mut ProgressCtx<'_>) {
        self.flush(ctx);
        self.active = None;
        self.playing = false;
        self.live_position = 0.0;
    }

    /// Drop every reference to a lesson that no longer exists
    pub fn forget(&mut self, id: &str) {
        if self.pending.as_ref().is_some_and(|t| t.lesson_id == id) {
            self.pending = None;
        }
        if self.queued_next.as_deref() == Some(id) {
            self.queued_next = None;
        }
        if self.active.as_deref() == Some(id) {
            self.active = None;
            self.playing = false;
            self.live_position = 0.0;
        }
    }

    /// Drop all lesson references (library cleared)
    pub fn forget_all(&mut self) {
        self.pending = None;
        self.queued_next = None;
        self.active = None;
        self.playing = false;
        self.live_position = 0.0;
    }

    fn write_progress(&mut self, ctx: &mut ProgressCtx<'_>, id: &str, seconds: f64) -> bool {
        let Some(change) = ctx.library.update_progress(id, seconds) else {
            tracing::debug!("Dropping progress for missing lesson {}", id);
            return false;
        };
        let streak_awarded = apply_streak_rules(ctx, id, change.became_completed);
        let is_completed = ctx.library.get(id).is_some_and(|l| l.is_completed);

        self.writes.push(ProgressWrite {
            lesson_id: id.to_string(),
            progress_seconds: change.progress_seconds,
            is_completed,
            became_completed: change.became_completed,
            streak_awarded,
        });
        true
    }
}
