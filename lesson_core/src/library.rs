//! Lesson and collection store.
//!
//! All operations that reference an unknown id are no-ops; callers can
//! race UI actions against deferred writes without special handling.

use crate::{Collection, Lesson, LessonId};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Seconds before the end at which a lesson counts as finished
pub const COMPLETION_TOLERANCE_SECONDS: f64 = 1.0;

/// Result of a progress write on an existing lesson
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressChange {
    /// Stored position after clamping
    pub progress_seconds: f64,
    /// The write moved the lesson from incomplete to complete
    pub became_completed: bool,
}

/// In-memory lesson library
#[derive(Clone, Debug)]
pub struct Library {
    lessons: Vec<Lesson>,
    collections: Vec<Collection>,
    tolerance: f64,
}

impl Default for Library {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl Library {
    pub fn new(lessons: Vec<Lesson>, collections: Vec<Collection>) -> Self {
        let mut library = Self {
            lessons: Vec::new(),
            collections,
            tolerance: COMPLETION_TOLERANCE_SECONDS,
        };
        library.add_lessons(lessons);
        library
    }

    /// Override the completion tolerance
    pub fn with_tolerance(mut self, seconds: f64) -> Self {
        self.tolerance = seconds.max(0.0);
        self
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    pub fn get(&self, id: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id == id)
    }

    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.id == id)
    }

    /// Resolve a lesson by id, falling back to a case-insensitive name match
    pub fn find(&self, query: &str) -> Option<&Lesson> {
        self.get(query).or_else(|| {
            self.lessons
                .iter()
                .find(|l| l.name.eq_ignore_ascii_case(query.trim()))
        })
    }

    /// Resolve a collection by id or case-insensitive name
    pub fn find_collection(&self, query: &str) -> Option<&Collection> {
        self.collection(query).or_else(|| {
            self.collections
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(query.trim()))
        })
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Lesson> {
        self.lessons.iter_mut().find(|l| l.id == id)
    }

    // ========================================================================
    // Lesson mutations
    // ========================================================================

    /// Append lessons whose ids are not yet known; existing entries win
    ///
    /// Returns the number of lessons added.
    pub fn add_lessons(&mut self, batch: impl IntoIterator<Item = Lesson>) -> usize {
        let mut known: HashSet<LessonId> = self.lessons.iter().map(|l| l.id.clone()).collect();
        let mut added = 0;
        for lesson in batch {
            if !known.insert(lesson.id.clone()) {
                tracing::debug!("Skipping duplicate lesson {}", lesson.id);
                continue;
            }
            self.lessons.push(lesson);
            added += 1;
        }
        added
    }

    /// Store a playback position, completing the lesson within tolerance
    ///
    /// Never reverts a completed lesson. Returns `None` for unknown ids.
    pub fn update_progress(&mut self, id: &str, seconds: f64) -> Option<ProgressChange> {
        let tolerance = self.tolerance;
        let lesson = self.get_mut(id)?;
        lesson.progress_seconds = clamp_progress(seconds, lesson.duration_seconds);

        let mut became_completed = false;
        if !lesson.is_completed
            && lesson.duration_seconds > 0.0
            && lesson.progress_seconds >= lesson.duration_seconds - tolerance
        {
            lesson.is_completed = true;
            became_completed = true;
            tracing::debug!("Lesson {} reached completion", id);
        }

        Some(ProgressChange {
            progress_seconds: lesson.progress_seconds,
            became_completed,
        })
    }

    /// Record a probed duration; only the first non-zero probe sticks
    pub fn update_duration(&mut self, id: &str, seconds: f64) -> bool {
        let Some(lesson) = self.get_mut(id) else {
            return false;
        };
        if lesson.duration_seconds != 0.0 || !seconds.is_finite() || seconds <= 0.0 {
            return false;
        }
        lesson.duration_seconds = seconds;
        tracing::debug!("Lesson {} duration set to {:.1}s", id, seconds);
        true
    }

    /// Flip completion with full-reset semantics
    ///
    /// Completing moves the position to the end; un-completing rewinds to 0.
    /// Returns the new completion state.
    pub fn toggle_completion(&mut self, id: &str) -> Option<bool> {
        let lesson = self.get_mut(id)?;
        lesson.is_completed = !lesson.is_completed;
        lesson.progress_seconds = if lesson.is_completed {
            lesson.duration_seconds
        } else {
            0.0
        };
        Some(lesson.is_completed)
    }

    /// Force a lesson to completed (end of playback)
    ///
    /// Returns `Some(true)` if this call changed it from incomplete.
    pub fn mark_completed(&mut self, id: &str) -> Option<bool> {
        let lesson = self.get_mut(id)?;
        if lesson.duration_seconds > 0.0 {
            lesson.progress_seconds = lesson.duration_seconds;
        }
        let changed = !lesson.is_completed;
        lesson.is_completed = true;
        Some(changed)
    }

    /// Rewind a lesson to unplayed
    pub fn reset_lesson(&mut self, id: &str) -> bool {
        match self.get_mut(id) {
            Some(lesson) => {
                lesson.progress_seconds = 0.0;
                lesson.is_completed = false;
                true
            }
            None => false,
        }
    }

    /// Rewind every lesson to unplayed
    pub fn reset_all(&mut self) {
        for lesson in &mut self.lessons {
            lesson.progress_seconds = 0.0;
            lesson.is_completed = false;
        }
    }

    /// Restore progress recorded elsewhere (backup or intent log)
    ///
    /// Completion is taken as given, not re-derived from the position.
    pub fn restore_progress(
        &mut self,
        id: &str,
        progress_seconds: f64,
        is_completed: bool,
    ) -> bool {
        match self.get_mut(id) {
            Some(lesson) => {
                lesson.progress_seconds = clamp_progress(progress_seconds, lesson.duration_seconds);
                lesson.is_completed = is_completed;
                true
            }
            None => false,
        }
    }

    /// Move a lesson into a collection, or to uncategorized with `None`
    pub fn move_to_collection(&mut self, id: &str, collection_id: Option<&str>) -> bool {
        if let Some(cid) = collection_id {
            if self.collection(cid).is_none() {
                tracing::debug!("Unknown collection {}", cid);
                return false;
            }
        }
        match self.get_mut(id) {
            Some(lesson) => {
                lesson.collection_id = collection_id.map(str::to_string);
                true
            }
            None => false,
        }
    }

    /// Assign a collection id without validating it (backup merge)
    pub(crate) fn set_collection_unchecked(&mut self, id: &str, collection_id: Option<String>) {
        if let Some(lesson) = self.get_mut(id) {
            lesson.collection_id = collection_id;
        }
    }

    /// Remove a lesson, returning it so its bytes can be released
    pub fn remove(&mut self, id: &str) -> Option<Lesson> {
        let index = self.lessons.iter().position(|l| l.id == id)?;
        Some(self.lessons.remove(index))
    }

    /// Remove every lesson
    pub fn remove_all(&mut self) -> Vec<Lesson> {
        std::mem::take(&mut self.lessons)
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Create a collection; blank names are ignored
    pub fn create_collection(&mut self, name: &str) -> Option<&Collection> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.collections.push(Collection {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        });
        self.collections.last()
    }

    pub fn rename_collection(&mut self, id: &str, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        match self.collections.iter_mut().find(|c| c.id == id) {
            Some(collection) => {
                collection.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Delete a collection, moving its lessons to uncategorized
    ///
    /// Returns how many lessons were reassigned, or `None` if unknown.
    pub fn delete_collection(&mut self, id: &str) -> Option<usize> {
        let index = self.collections.iter().position(|c| c.id == id)?;
        self.collections.remove(index);

        let mut reassigned = 0;
        for lesson in &mut self.lessons {
            if lesson.collection_id.as_deref() == Some(id) {
                lesson.collection_id = None;
                reassigned += 1;
            }
        }
        Some(reassigned)
    }

    /// Replace all collections, clearing lesson references that now dangle
    pub(crate) fn replace_collections(&mut self, collections: Vec<Collection>) {
        self.collections = collections;
        self.drop_dangling_collection_refs();
    }

    pub(crate) fn drop_dangling_collection_refs(&mut self) -> usize {
        let known: HashSet<&str> = self.collections.iter().map(|c| c.id.as_str()).collect();
        let mut cleared = 0;
        for lesson in &mut self.lessons {
            if let Some(cid) = lesson.collection_id.as_deref() {
                if !known.contains(cid) {
                    lesson.collection_id = None;
                    cleared += 1;
                }
            }
        }
        cleared
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Lessons in display order
    pub fn sorted(&self) -> Vec<&Lesson> {
        let mut lessons: Vec<&Lesson> = self.lessons.iter().collect();
        lessons.sort_by(|a, b| compare_names(&a.name, &b.name));
        lessons
    }

    /// The lesson immediately before `id` in display order
    pub fn previous_in_order(&self, id: &str) -> Option<&Lesson> {
        let sorted = self.sorted();
        let index = sorted.iter().position(|l| l.id == id)?;
        index.checked_sub(1).map(|i| sorted[i])
    }

    /// Lessons to show, in display order
    pub fn visible(&self, hide_completed: bool) -> Vec<&Lesson> {
        self.sorted()
            .into_iter()
            .filter(|l| !(hide_completed && l.is_completed))
            .collect()
    }

    /// Visible lessons grouped by collection, uncategorized last
    pub fn grouped(&self, hide_completed: bool) -> Vec<(Option<&Collection>, Vec<&Lesson>)> {
        let visible = self.visible(hide_completed);
        let mut groups: Vec<(Option<&Collection>, Vec<&Lesson>)> = self
            .collections
            .iter()
            .map(|c| {
                let members = visible
                    .iter()
                    .copied()
                    .filter(|l| l.collection_id.as_deref() == Some(c.id.as_str()))
                    .collect();
                (Some(c), members)
            })
            .collect();

        let uncategorized: Vec<&Lesson> = visible
            .iter()
            .copied()
            .filter(|l| l.collection_id.is_none())
            .collect();
        if !uncategorized.is_empty() {
            groups.push((None, uncategorized));
        }
        groups
    }
}

/// Clamp a position to `[0, duration]` (no upper bound while duration is unknown)
pub fn clamp_progress(seconds: f64, duration: f64) -> f64 {
    debug_assert!(
        seconds.is_finite() && seconds >= 0.0,
        "invalid progress value {}",
        seconds
    );
    if !seconds.is_finite() || seconds < 0.0 {
        return 0.0;
    }
    if duration > 0.0 {
        seconds.min(duration)
    } else {
        seconds
    }
}

/// Numeric-aware name ordering
///
/// Two all-digit names compare by value; a digit name sorts before a
/// non-digit one; everything else compares case-insensitively.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    match (as_integer(a), as_integer(b)) {
        (Some(x), Some(y)) => x.len().cmp(&y.len()).then_with(|| x.cmp(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

/// Digits of an all-digit name with leading zeros stripped
fn as_integer(name: &str) -> Option<&str> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let trimmed = name.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(id: &str, duration: f64) -> Lesson {
        Lesson::uploaded(id, id, duration)
    }

    fn library() -> Library {
        Library::new(vec![lesson("a", 100.0), lesson("b", 0.0)], vec![])
    }

    #[test]
    fn test_completion_tolerance() {
        let mut lib = library();

        let change = lib.update_progress("a", 98.5).unwrap();
        assert!(!change.became_completed);
        assert!(!lib.get("a").unwrap().is_completed);

        let change = lib.update_progress("a", 99.0).unwrap();
        assert!(change.became_completed);
        assert!(lib.get("a").unwrap().is_completed);

        // Rewinding does not un-complete
        let change = lib.update_progress("a", 50.0).unwrap();
        assert!(!change.became_completed);
        let a = lib.get("a").unwrap();
        assert!(a.is_completed);
        assert_eq!(a.progress_seconds, 50.0);
    }

    #[test]
    fn test_unknown_duration_never_completes() {
        let mut lib = library();
        let change = lib.update_progress("b", 5000.0).unwrap();
        assert!(!change.became_completed);
        assert_eq!(change.progress_seconds, 5000.0);
    }

    #[test]
    fn test_progress_clamped_to_duration() {
        let mut lib = library();
        let change = lib.update_progress("a", 250.0).unwrap();
        assert_eq!(change.progress_seconds, 100.0);
    }

    #[test]
    fn test_missing_lesson_is_noop() {
        let mut lib = library();
        assert!(lib.update_progress("nope", 1.0).is_none());
        assert!(!lib.update_duration("nope", 1.0));
        assert!(lib.toggle_completion("nope").is_none());
        assert!(lib.remove("nope").is_none());
        assert!(!lib.move_to_collection("nope", None));
    }

    #[test]
    fn test_duration_first_write_wins() {
        let mut lib = library();
        assert!(lib.update_duration("b", 42.0));
        assert!(!lib.update_duration("b", 60.0));
        assert!(!lib.update_duration("a", 10.0));
        assert_eq!(lib.get("b").unwrap().duration_seconds, 42.0);
        assert_eq!(lib.get("a").unwrap().duration_seconds, 100.0);
    }

    #[test]
    fn test_zero_duration_probe_ignored() {
        let mut lib = library();
        assert!(!lib.update_duration("b", 0.0));
        assert!(lib.update_duration("b", 30.0));
    }

    #[test]
    fn test_toggle_completion_full_reset() {
        let mut lib = library();
        lib.update_progress("a", 30.0);

        assert_eq!(lib.toggle_completion("a"), Some(true));
        assert_eq!(lib.get("a").unwrap().progress_seconds, 100.0);

        assert_eq!(lib.toggle_completion("a"), Some(false));
        assert_eq!(lib.get("a").unwrap().progress_seconds, 0.0);
    }

    #[test]
    fn test_add_lessons_existing_wins() {
        let mut lib = library();
        let mut replacement = lesson("a", 5.0);
        replacement.name = "replacement".into();

        let added = lib.add_lessons(vec![replacement, lesson("c", 1.0), lesson("c", 2.0)]);
        assert_eq!(added, 1);
        assert_eq!(lib.lessons().len(), 3);
        assert_eq!(lib.get("a").unwrap().name, "a");
        assert_eq!(lib.get("c").unwrap().duration_seconds, 1.0);
    }

    #[test]
    fn test_delete_collection_reassigns_lessons() {
        let mut lib = library();
        let cid = lib.create_collection("  Grammar  ").unwrap().id.clone();
        assert_eq!(lib.collection(&cid).unwrap().name, "Grammar");

        assert!(lib.move_to_collection("a", Some(&cid)));
        assert!(lib.move_to_collection("b", Some(&cid)));

        assert_eq!(lib.delete_collection(&cid), Some(2));
        assert_eq!(lib.lessons().len(), 2);
        assert!(lib.lessons().iter().all(|l| l.collection_id.is_none()));
        assert!(lib.collections().is_empty());
    }

    #[test]
    fn test_move_to_unknown_collection_rejected() {
        let mut lib = library();
        assert!(!lib.move_to_collection("a", Some("missing")));
        assert!(lib.get("a").unwrap().collection_id.is_none());
    }

    #[test]
    fn test_blank_collection_names_rejected() {
        let mut lib = library();
        assert!(lib.create_collection("   ").is_none());
        let cid = lib.create_collection("Verbs").unwrap().id.clone();
        assert!(!lib.rename_collection(&cid, " "));
        assert!(lib.rename_collection(&cid, " Nouns "));
        assert_eq!(lib.find_collection("nouns").unwrap().id, cid);
    }

    #[test]
    fn test_sort_order() {
        let lib = Library::new(
            ["10", "2", "Intro", "1"].iter().map(|n| lesson(n, 0.0)).collect(),
            vec![],
        );
        let names: Vec<&str> = lib.sorted().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["1", "2", "10", "Intro"]);
    }

    #[test]
    fn test_sort_is_case_insensitive_and_handles_leading_zeros() {
        assert_eq!(compare_names("apple", "Banana"), Ordering::Less);
        assert_eq!(compare_names("007", "7"), Ordering::Equal);
        assert_eq!(compare_names("09", "10"), Ordering::Less);
        assert_eq!(compare_names("1.5", "2"), Ordering::Greater);
    }

    #[test]
    fn test_previous_in_order() {
        let lib = Library::new(vec![lesson("2", 0.0), lesson("1", 0.0)], vec![]);
        assert_eq!(lib.previous_in_order("2").unwrap().id, "1");
        assert!(lib.previous_in_order("1").is_none());
    }

    #[test]
    fn test_visible_hides_completed() {
        let mut lib = library();
        lib.toggle_completion("a");
        let ids: Vec<&str> = lib.visible(true).iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(lib.visible(false).len(), 2);
    }

    #[test]
    fn test_grouped_puts_uncategorized_last() {
        let mut lib = library();
        let cid = lib.create_collection("Unit 1").unwrap().id.clone();
        lib.move_to_collection("b", Some(&cid));

        let groups = lib.grouped(false);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.unwrap().id, cid);
        assert_eq!(groups[0].1[0].id, "b");
        assert!(groups[1].0.is_none());
        assert_eq!(groups[1].1[0].id, "a");
    }

    #[test]
    fn test_reset_all() {
        let mut lib = library();
        lib.update_progress("a", 100.0);
        lib.update_progress("b", 12.0);
        lib.reset_all();
        assert!(lib.lessons().iter().all(|l| !l.is_started()));
    }

    #[test]
    fn test_remove_all() {
        let mut lib = library();
        let removed = lib.remove_all();
        assert_eq!(removed.len(), 2);
        assert!(lib.lessons().is_empty());
    }
}
