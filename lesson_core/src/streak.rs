//! Daily streak bookkeeping.
//!
//! Rules:
//! - Easy difficulty awards the day on any listening activity
//! - Other difficulties award the day once `goal()` distinct lessons are
//!   completed on that date
//! - At most one award per calendar date; an award extends the streak only
//!   if the previous award was exactly the day before, otherwise it restarts
//!   at 1
//! - Awards are never revoked by unrecording a completion

use crate::{Difficulty, StreakState};
use chrono::NaiveDate;

/// Number of distinct award dates kept in `history`
pub const HISTORY_LIMIT: usize = 365;

impl StreakState {
    /// Award today for listening activity (easy difficulty only)
    ///
    /// Returns true when a new award was granted.
    pub fn record_activity(&mut self, today: NaiveDate) -> bool {
        if !self.difficulty.is_activity_based() {
            tracing::debug!("Ignoring activity on {:?} difficulty", self.difficulty);
            return false;
        }
        if self.last_awarded_date == Some(today) {
            return false;
        }
        self.award(today);
        true
    }

    /// Count a completed lesson towards today's goal
    ///
    /// Returns true when this completion granted today's award.
    pub fn record_completion(&mut self, lesson_id: &str, today: NaiveDate) -> bool {
        if self.difficulty.is_activity_based() {
            return false;
        }
        self.roll_to(today);
        self.completed_today.insert(lesson_id.to_string());

        if self.completed_today.len() >= self.difficulty.goal()
            && self.last_awarded_date != Some(today)
        {
            self.award(today);
            return true;
        }
        false
    }

    /// Withdraw a lesson from today's completions (award, if any, is kept)
    pub fn unrecord_completion(&mut self, lesson_id: &str, today: NaiveDate) {
        if self.difficulty.is_activity_based() {
            return;
        }
        self.roll_to(today);
        if self.completed_today.remove(lesson_id) {
            tracing::debug!("Unrecorded completion of {} for {}", lesson_id, today);
        }
    }

    /// Whether today's goal is currently met
    pub fn is_today_complete(&self, today: NaiveDate) -> bool {
        if self.difficulty.is_activity_based() {
            return self.last_awarded_date == Some(today);
        }
        self.completed_count(today) >= self.difficulty.goal()
    }

    /// Completions counted for `today`, treating a stale set as empty
    pub fn completed_count(&self, today: NaiveDate) -> usize {
        if self.completion_date == Some(today) {
            self.completed_today.len()
        } else {
            0
        }
    }

    /// Streak as it should be displayed on `today`
    ///
    /// The stored count is only extended when an award happens, so a streak
    /// whose last award is older than yesterday is already broken.
    pub fn display_streak(&self, today: NaiveDate) -> u32 {
        match self.last_awarded_date {
            Some(last) if last == today || Some(last) == today.pred_opt() => self.current_streak,
            _ => 0,
        }
    }

    /// Change difficulty; applies to subsequent calls only
    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        if self.difficulty != difficulty {
            tracing::info!("Streak difficulty {:?} -> {:?}", self.difficulty, difficulty);
            self.difficulty = difficulty;
        }
    }

    /// Forget today's completions, keeping the streak count and history
    pub fn clear_today(&mut self) {
        self.completed_today.clear();
    }

    /// Award dates within the `days` days ending on `today`, oldest first
    pub fn recent_history(&self, today: NaiveDate, days: u64) -> Vec<NaiveDate> {
        let start = today
            .checked_sub_days(chrono::Days::new(days.saturating_sub(1)))
            .unwrap_or(NaiveDate::MIN);
        self.history.range(start..=today).copied().collect()
    }

    /// Reset the completion set if it belongs to another day
    fn roll_to(&mut self, today: NaiveDate) {
        if self.completion_date != Some(today) {
            self.completed_today.clear();
            self.completion_date = Some(today);
        }
    }

    fn award(&mut self, today: NaiveDate) {
        let yesterday = today.pred_opt();
        if self.last_awarded_date.is_some() && self.last_awarded_date == yesterday {
            self.current_streak += 1;
        } else {
            self.current_streak = 1;
        }
        self.last_awarded_date = Some(today);

        self.history.insert(today);
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_first();
        }

        tracing::info!(
            "Streak awarded for {}: {} day(s)",
            today,
            self.current_streak
        );
    }
}
