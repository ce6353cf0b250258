//! Review flow: offer to replay the previous lesson before a new one.
//!
//! When review mode is on and the lesson before the selected one (in
//! display order) is already completed, selection pauses at a prompt.
//! Confirming rewinds the previous lesson, plays it, and queues the
//! selected lesson to start when it ends. Skipping starts the selected
//! lesson directly.

use crate::playback::{MediaPlayer, PlaybackController, ProgressCtx};
use crate::LessonId;

/// A review offer awaiting the user's answer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingReview {
    pub review: LessonId,
    pub target: LessonId,
}

/// Outcome of selecting a lesson
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// The lesson was already active; playback was toggled
    Toggled { playing: bool },
    /// The lesson started playing
    Started(LessonId),
    /// The caller must ask whether to review first
    ReviewOffered(PendingReview),
    /// No such lesson
    NotFound,
}

#[derive(Debug, Default)]
pub struct ReviewController {
    pending: Option<PendingReview>,
}

impl ReviewController {
    pub fn pending(&self) -> Option<&PendingReview> {
        self.pending.as_ref()
    }

    /// Handle a lesson-selection request
    pub fn select(
        &mut self,
        ctx: &mut ProgressCtx<'_>,
        playback: &mut PlaybackController,
        review_enabled: bool,
        id: &str,
        player: &mut dyn MediaPlayer,
    ) -> Selection {
        if playback.active() == Some(id) {
            let playing = playback.toggle(ctx, player);
            return Selection::Toggled { playing };
        }

        self.pending = None;
        let Some(lesson) = ctx.library.get(id) else {
            return Selection::NotFound;
        };
        let target = lesson.id.clone();

        if review_enabled {
            if let Some(previous) = ctx.library.previous_in_order(id) {
                if previous.is_completed {
                    let offer = PendingReview {
                        review: previous.id.clone(),
                        target,
                    };
                    tracing::debug!("Offering review of {} before {}", offer.review, offer.target);
                    self.pending = Some(offer.clone());
                    return Selection::ReviewOffered(offer);
                }
            }
        }

        if playback.start(ctx, &target, player) {
            Selection::Started(target)
        } else {
            Selection::NotFound
        }
    }

    /// Accept the pending review
    ///
    /// Returns the lesson that started playing.
    pub fn confirm(
        &mut self,
        ctx: &mut ProgressCtx<'_>,
        playback: &mut PlaybackController,
        player: &mut dyn MediaPlayer,
    ) -> Option<LessonId> {
        let offer = self.pending.take()?;

        // A pending write for the review lesson must land before the rewind
        playback.flush(ctx);

        if !ctx.library.reset_lesson(&offer.review) {
            tracing::debug!("Review lesson {} vanished; starting target", offer.review);
            return playback
                .start(ctx, &offer.target, player)
                .then_some(offer.target);
        }
        if !ctx.streak.difficulty.is_activity_based() {
            ctx.streak.unrecord_completion(&offer.review, ctx.today);
        }

        playback.queue_next(offer.target.clone());
        if playback.start(ctx, &offer.review, player) {
            tracing::info!("Reviewing {} before {}", offer.review, offer.target);
            Some(offer.review)
        } else {
            None
        }
    }

    /// Decline the pending review and start the selected lesson
    pub fn skip(
        &mut self,
        ctx: &mut ProgressCtx<'_>,
        playback: &mut PlaybackController,
        player: &mut dyn MediaPlayer,
    ) -> Option<LessonId> {
        let offer = self.pending.take()?;
        playback
            .start(ctx, &offer.target, player)
            .then_some(offer.target)
    }

    /// Discard any pending offer
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::HeadlessPlayer;
    use crate::{Difficulty, Lesson, Library, StreakState};
    use chrono::NaiveDate;

    struct Fixture {
        library: Library,
        streak: StreakState,
        today: NaiveDate,
        playback: PlaybackController,
        review: ReviewController,
        player: HeadlessPlayer,
    }

    impl Fixture {
        /// L1 completed, L2 not started
        fn new() -> Self {
            let mut library = Library::new(
                vec![
                    Lesson::uploaded("l2", "2", 60.0),
                    Lesson::uploaded("l1", "1", 60.0),
                ],
                vec![],
            );
            library.toggle_completion("l1");
            let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
            let mut streak = StreakState {
                enabled: true,
                difficulty: Difficulty::Normal,
                ..Default::default()
            };
            streak.record_completion("l1", today);

            Self {
                library,
                streak,
                today,
                playback: PlaybackController::default(),
                review: ReviewController::default(),
                player: HeadlessPlayer::default(),
            }
        }

        fn select(&mut self, id: &str, review_enabled: bool) -> Selection {
            let mut ctx = ProgressCtx {
                library: &mut self.library,
                streak: &mut self.streak,
                today: self.today,
            };
            self.review
                .select(&mut ctx, &mut self.playback, review_enabled, id, &mut self.player)
        }

        fn confirm(&mut self) -> Option<LessonId> {
            let mut ctx = ProgressCtx {
                library: &mut self.library,
                streak: &mut self.streak,
                today: self.today,
            };
            self.review.confirm(&mut ctx, &mut self.playback, &mut self.player)
        }

        fn skip(&mut self) -> Option<LessonId> {
            let mut ctx = ProgressCtx {
                library: &mut self.library,
                streak: &mut self.streak,
                today: self.today,
            };
            self.review.skip(&mut ctx, &mut self.playback, &mut self.player)
        }

        fn ended(&mut self) -> Option<LessonId> {
            let mut ctx = ProgressCtx {
                library: &mut self.library,
                streak: &mut self.streak,
                today: self.today,
            };
            self.playback.on_ended(&mut ctx, &mut self.player)
        }
    }

    #[test]
    fn test_review_confirm_then_auto_advance() {
        let mut f = Fixture::new();

        let selection = f.select("l2", true);
        assert_eq!(
            selection,
            Selection::ReviewOffered(PendingReview {
                review: "l1".into(),
                target: "l2".into(),
            })
        );
        assert!(f.playback.active().is_none());

        assert_eq!(f.confirm().as_deref(), Some("l1"));
        let l1 = f.library.get("l1").unwrap();
        assert!(!l1.is_completed);
        assert_eq!(l1.progress_seconds, 0.0);
        assert_eq!(f.playback.active(), Some("l1"));
        assert_eq!(f.playback.queued_next(), Some("l2"));
        assert!(!f.streak.completed_today.contains("l1"));
        // Award already granted today survives the rewind
        assert_eq!(f.streak.current_streak, 1);

        assert_eq!(f.ended().as_deref(), Some("l2"));
        assert_eq!(f.playback.active(), Some("l2"));
        assert!(f.library.get("l1").unwrap().is_completed);
    }

    #[test]
    fn test_skip_starts_target() {
        let mut f = Fixture::new();
        f.select("l2", true);
        assert_eq!(f.skip().as_deref(), Some("l2"));
        assert!(f.review.pending().is_none());
        assert!(f.library.get("l1").unwrap().is_completed);
        assert!(f.playback.queued_next().is_none());
    }

    #[test]
    fn test_review_disabled_starts_directly() {
        let mut f = Fixture::new();
        assert_eq!(f.select("l2", false), Selection::Started("l2".into()));
    }

    #[test]
    fn test_first_lesson_or_incomplete_previous_starts_directly() {
        let mut f = Fixture::new();
        assert_eq!(f.select("l1", true), Selection::Started("l1".into()));

        let mut f = Fixture::new();
        f.library.toggle_completion("l1");
        assert_eq!(f.select("l2", true), Selection::Started("l2".into()));
    }

    #[test]
    fn test_selecting_active_lesson_toggles() {
        let mut f = Fixture::new();
        f.select("l2", false);
        assert_eq!(f.select("l2", true), Selection::Toggled { playing: false });
        assert_eq!(f.select("l2", true), Selection::Toggled { playing: true });
    }

    #[test]
    fn test_unknown_lesson() {
        let mut f = Fixture::new();
        assert_eq!(f.select("zzz", true), Selection::NotFound);
        assert!(f.confirm().is_none());
    }
}
