//! Round history.
//!
//! The whole list is one document. It is loaded once when the history is
//! opened and written back in full after every mutation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::storage::{load_document, save_document, BlobStore, StoreError, GAMES_KEY};

/// Hole counts a round may have.
pub const VALID_HOLE_COUNTS: [u8; 2] = [9, 18];

/// Longest accepted course name.
pub const MAX_COURSE_NAME_LENGTH: usize = 120;

/// Result type for round history operations.
pub type RoundResult<T> = std::result::Result<T, RoundError>;

/// Errors from [`RoundHistory`].
#[derive(Debug, Error)]
pub enum RoundError {
    /// No round with this id.
    #[error("Round not found: {0}")]
    NotFound(Uuid),

    /// A round field is invalid.
    #[error("Invalid round: {field} {message}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The history could not be loaded or saved.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lifecycle of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RoundStatus {
    /// Played to the end.
    Completed,
    /// Being played now.
    InProgress,
    /// Scheduled.
    Upcoming,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::InProgress => "in-progress",
            Self::Upcoming => "upcoming",
        })
    }
}

impl FromStr for RoundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "in-progress" => Ok(Self::InProgress),
            "upcoming" => Ok(Self::Upcoming),
            other => Err(format!(
                "unknown round status '{other}', expected completed, in-progress or upcoming"
            )),
        }
    }
}

/// Score on one hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HoleScore {
    /// Hole number, starting at 1.
    #[schema(example = 1)]
    pub hole: u8,
    /// Par for the hole.
    #[schema(example = 4)]
    pub par: u8,
    /// Strokes taken.
    #[schema(example = 5)]
    pub score: u8,
}

/// Fields supplied when creating or replacing a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "course": "Pebble Creek Golf Club",
    "date": "2024-01-15",
    "players": 4,
    "score": 89,
    "par": 72,
    "holes": 18,
    "duration": "4h 32m",
    "weather": "Sunny, 72°F",
    "status": "completed"
}))]
pub struct RoundDraft {
    /// Course name.
    pub course: String,
    /// Day of the round.
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    /// Number of players.
    pub players: u8,
    /// Total strokes; 0 until played.
    #[serde(default)]
    pub score: u16,
    /// Course par.
    pub par: u16,
    /// Holes played, 9 or 18.
    pub holes: u8,
    /// Display duration such as "4h 32m"; empty until played.
    #[serde(default)]
    pub duration: String,
    /// Free-form weather description.
    #[serde(default)]
    pub weather: String,
    /// Round status.
    pub status: RoundStatus,
    /// Per-hole scores, if recorded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scorecard: Vec<HoleScore>,
}

impl RoundDraft {
    /// Check field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`RoundError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> RoundResult<()> {
        let course = self.course.trim();
        if course.is_empty() {
            return Err(invalid("course", "must not be empty"));
        }
        if course.chars().count() > MAX_COURSE_NAME_LENGTH {
            return Err(invalid(
                "course",
                format!("must be at most {MAX_COURSE_NAME_LENGTH} characters"),
            ));
        }
        if self.players == 0 {
            return Err(invalid("players", "must be at least 1"));
        }
        if !VALID_HOLE_COUNTS.contains(&self.holes) {
            return Err(invalid("holes", "must be 9 or 18"));
        }
        if self.par == 0 {
            return Err(invalid("par", "must be positive"));
        }
        if self.status == RoundStatus::Completed && self.score == 0 {
            return Err(invalid("score", "must be set for a completed round"));
        }
        if let Some(hole) = self
            .scorecard
            .iter()
            .find(|h| h.hole == 0 || h.hole > self.holes)
        {
            return Err(invalid(
                "scorecard",
                format!("hole {} is outside 1..={}", hole.hole, self.holes),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> RoundError {
    RoundError::Invalid {
        field,
        message: message.into(),
    }
}

/// A persisted round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoundRecord {
    /// Round id.
    pub id: Uuid,
    /// Round fields.
    #[serde(flatten)]
    pub round: RoundDraft,
}

impl RoundRecord {
    /// Strokes over (positive) or under (negative) par.
    #[must_use]
    pub fn to_par(&self) -> i32 {
        i32::from(self.round.score) - i32::from(self.round.par)
    }
}

/// Which rounds to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoundFilter {
    /// Every round.
    #[default]
    All,
    /// Only rounds with this status.
    Status(RoundStatus),
}

impl RoundFilter {
    fn matches(self, record: &RoundRecord) -> bool {
        match self {
            Self::All => true,
            Self::Status(status) => record.round.status == status,
        }
    }
}

/// Aggregate statistics over completed rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "total_rounds": 4,
    "rounds_played": 3,
    "average_score": 89,
    "best_score": 85
}))]
pub struct RoundStats {
    /// Rounds of any status.
    pub total_rounds: usize,
    /// Completed rounds.
    pub rounds_played: usize,
    /// Mean score of completed rounds, rounded; 0 when none.
    pub average_score: u32,
    /// Lowest completed score; 0 when none.
    pub best_score: u32,
}

/// Round history backed by a [`BlobStore`].
///
/// The in-memory list only changes once the store has accepted it.
pub struct RoundHistory {
    store: Arc<dyn BlobStore>,
    rounds: Vec<RoundRecord>,
}

impl RoundHistory {
    /// Load the history from `store`. A missing document is an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored document cannot be read or parsed.
    pub fn load(store: Arc<dyn BlobStore>) -> RoundResult<Self> {
        let rounds = load_document(store.as_ref(), GAMES_KEY)?.unwrap_or_default();
        Ok(Self { store, rounds })
    }

    /// Rounds matching `filter`, in stored order.
    #[must_use]
    pub fn list(&self, filter: RoundFilter) -> Vec<RoundRecord> {
        self.rounds
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Every round, in stored order.
    #[must_use]
    pub fn all(&self) -> &[RoundRecord] {
        &self.rounds
    }

    /// Look up a round.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&RoundRecord> {
        self.rounds.iter().find(|r| r.id == id)
    }

    /// Add a round and save.
    ///
    /// # Errors
    ///
    /// Returns a validation error or a store error.
    pub fn add(&mut self, draft: RoundDraft) -> RoundResult<RoundRecord> {
        draft.validate()?;
        let record = RoundRecord {
            id: Uuid::new_v4(),
            round: draft,
        };
        let mut next = self.rounds.clone();
        next.push(record.clone());
        self.commit(next)?;
        info!(round_id = %record.id, course = %record.round.course, "round added");
        Ok(record)
    }

    /// Replace the fields of round `id` and save.
    ///
    /// # Errors
    ///
    /// Returns [`RoundError::NotFound`], a validation error, or a store error.
    pub fn update(&mut self, id: Uuid, draft: RoundDraft) -> RoundResult<RoundRecord> {
        draft.validate()?;
        let index = self.index_of(id)?;
        let mut next = self.rounds.clone();
        next[index].round = draft;
        let updated = next[index].clone();
        self.commit(next)?;
        Ok(updated)
    }

    /// Change only the status of round `id` and save.
    ///
    /// # Errors
    ///
    /// Returns [`RoundError::NotFound`], a validation error, or a store error.
    pub fn set_status(&mut self, id: Uuid, status: RoundStatus) -> RoundResult<RoundRecord> {
        let mut draft = self
            .get(id)
            .ok_or(RoundError::NotFound(id))?
            .round
            .clone();
        draft.status = status;
        self.update(id, draft)
    }

    /// Delete round `id` and save.
    ///
    /// # Errors
    ///
    /// Returns [`RoundError::NotFound`] or a store error.
    pub fn remove(&mut self, id: Uuid) -> RoundResult<RoundRecord> {
        let index = self.index_of(id)?;
        let mut next = self.rounds.clone();
        let removed = next.remove(index);
        self.commit(next)?;
        info!(round_id = %id, "round removed");
        Ok(removed)
    }

    /// Replace the whole list and save.
    ///
    /// # Errors
    ///
    /// Returns the first validation error, or a store error.
    pub fn replace_all(&mut self, rounds: Vec<RoundRecord>) -> RoundResult<()> {
        for record in &rounds {
            record.round.validate()?;
        }
        self.commit(rounds)
    }

    /// Drop every round and delete the stored document.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn clear(&mut self) -> RoundResult<()> {
        self.store.remove(GAMES_KEY)?;
        self.rounds.clear();
        Ok(())
    }

    /// Statistics over completed rounds.
    #[must_use]
    pub fn stats(&self) -> RoundStats {
        let completed: Vec<u32> = self
            .rounds
            .iter()
            .filter(|r| r.round.status == RoundStatus::Completed)
            .map(|r| u32::from(r.round.score))
            .collect();

        let rounds_played = completed.len();
        let (average_score, best_score) = if completed.is_empty() {
            (0, 0)
        } else {
            let total: u64 = completed.iter().map(|&s| u64::from(s)).sum();
            let count = rounds_played as u64;
            let average = (total * 2 + count) / (count * 2);
            (
                u32::try_from(average).unwrap_or(u32::MAX),
                completed.iter().copied().min().unwrap_or(0),
            )
        };

        RoundStats {
            total_rounds: self.rounds.len(),
            rounds_played,
            average_score,
            best_score,
        }
    }

    fn index_of(&self, id: Uuid) -> RoundResult<usize> {
        self.rounds
            .iter()
            .position(|r| r.id == id)
            .ok_or(RoundError::NotFound(id))
    }

    fn commit(&mut self, rounds: Vec<RoundRecord>) -> RoundResult<()> {
        save_document(self.store.as_ref(), GAMES_KEY, &rounds)?;
        self.rounds = rounds;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn draft(course: &str, score: u16, status: RoundStatus) -> RoundDraft {
        RoundDraft {
            course: course.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            players: 4,
            score,
            par: 72,
            holes: 18,
            duration: "4h 32m".to_string(),
            weather: "Sunny, 72°F".to_string(),
            status,
            scorecard: Vec::new(),
        }
    }

    fn history() -> (Arc<MemoryBlobStore>, RoundHistory) {
        let store = Arc::new(MemoryBlobStore::new());
        let history = RoundHistory::load(store.clone()).unwrap();
        (store, history)
    }

    #[test]
    fn test_missing_document_is_empty_history() {
        let (_, history) = history();
        assert!(history.all().is_empty());
        assert_eq!(history.stats(), RoundStats::default());
    }

    #[test]
    fn test_every_mutation_saves_whole_list() {
        let (store, mut history) = history();

        let first = history
            .add(draft("Pebble Creek Golf Club", 89, RoundStatus::Completed))
            .unwrap();
        history
            .add(draft("Augusta National", 0, RoundStatus::Upcoming))
            .unwrap();

        let reloaded = RoundHistory::load(store.clone()).unwrap();
        assert_eq!(reloaded.all().len(), 2);

        history.remove(first.id).unwrap();
        let reloaded = RoundHistory::load(store).unwrap();
        assert_eq!(reloaded.all().len(), 1);
        assert_eq!(reloaded.all()[0].round.course, "Augusta National");
    }

    #[test]
    fn test_failed_save_leaves_history_unchanged() {
        let (store, mut history) = history();
        let kept = history
            .add(draft("Pebble Creek Golf Club", 89, RoundStatus::Completed))
            .unwrap();
        store.set_read_only(true);

        assert!(matches!(
            history.add(draft("Augusta National", 78, RoundStatus::Completed)),
            Err(RoundError::Store(_))
        ));
        assert!(history
            .update(kept.id, draft("Renamed", 70, RoundStatus::Completed))
            .is_err());
        assert!(history
            .set_status(kept.id, RoundStatus::InProgress)
            .is_err());
        assert!(history.remove(kept.id).is_err());
        assert!(history.replace_all(Vec::new()).is_err());

        assert_eq!(history.all(), std::slice::from_ref(&kept));
        assert_eq!(history.stats().rounds_played, 1);
        assert_eq!(history.stats().best_score, 89);

        store.set_read_only(false);
        history
            .add(draft("Augusta National", 78, RoundStatus::Completed))
            .unwrap();
        let reloaded = RoundHistory::load(store).unwrap();
        assert_eq!(reloaded.all().len(), 2);
        assert_eq!(reloaded.all()[0], kept);
    }

    #[test]
    fn test_stored_format_uses_flat_fields() {
        let (store, mut history) = history();
        history
            .add(draft("Oakmont Country Club", 92, RoundStatus::InProgress))
            .unwrap();

        let raw = store.get(GAMES_KEY).unwrap().unwrap();
        let first = &raw[0];
        assert_eq!(first["course"], "Oakmont Country Club");
        assert_eq!(first["status"], "in-progress");
        assert_eq!(first["date"], "2024-01-15");
        assert!(first.get("scorecard").is_none());
    }

    #[test]
    fn test_filter_by_status() {
        let (_, mut history) = history();
        history.add(draft("A", 89, RoundStatus::Completed)).unwrap();
        history.add(draft("B", 0, RoundStatus::Upcoming)).unwrap();
        history.add(draft("C", 85, RoundStatus::Completed)).unwrap();

        assert_eq!(history.list(RoundFilter::All).len(), 3);
        let completed = history.list(RoundFilter::Status(RoundStatus::Completed));
        assert_eq!(
            completed.iter().map(|r| r.round.course.as_str()).collect::<Vec<_>>(),
            vec!["A", "C"]
        );
        assert!(history
            .list(RoundFilter::Status(RoundStatus::InProgress))
            .is_empty());
    }

    #[test]
    fn test_stats_over_completed_rounds() {
        let (_, mut history) = history();
        history.add(draft("A", 89, RoundStatus::Completed)).unwrap();
        history.add(draft("B", 92, RoundStatus::Completed)).unwrap();
        history.add(draft("C", 0, RoundStatus::Upcoming)).unwrap();
        history.add(draft("D", 85, RoundStatus::Completed)).unwrap();

        let stats = history.stats();
        assert_eq!(stats.total_rounds, 4);
        assert_eq!(stats.rounds_played, 3);
        // (89 + 92 + 85) / 3 = 88.67
        assert_eq!(stats.average_score, 89);
        assert_eq!(stats.best_score, 85);
    }

    #[test]
    fn test_set_status_and_update() {
        let (_, mut history) = history();
        let record = history.add(draft("A", 0, RoundStatus::Upcoming)).unwrap();

        let started = history.set_status(record.id, RoundStatus::InProgress).unwrap();
        assert_eq!(started.round.status, RoundStatus::InProgress);

        // Completing without a score is rejected.
        assert!(matches!(
            history.set_status(record.id, RoundStatus::Completed),
            Err(RoundError::Invalid { field: "score", .. })
        ));

        let finished = history
            .update(record.id, draft("A", 78, RoundStatus::Completed))
            .unwrap();
        assert_eq!(finished.to_par(), 6);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (_, mut history) = history();
        let id = Uuid::new_v4();
        assert!(matches!(history.remove(id), Err(RoundError::NotFound(_))));
        assert!(matches!(
            history.update(id, draft("A", 80, RoundStatus::Completed)),
            Err(RoundError::NotFound(_))
        ));
    }

    #[test]
    fn test_validation() {
        let mut bad = draft("  ", 80, RoundStatus::Completed);
        assert!(matches!(
            bad.validate(),
            Err(RoundError::Invalid { field: "course", .. })
        ));

        bad = draft("A", 80, RoundStatus::Completed);
        bad.holes = 12;
        assert!(matches!(
            bad.validate(),
            Err(RoundError::Invalid { field: "holes", .. })
        ));

        bad = draft("A", 80, RoundStatus::Completed);
        bad.players = 0;
        assert!(matches!(
            bad.validate(),
            Err(RoundError::Invalid { field: "players", .. })
        ));

        bad = draft("A", 80, RoundStatus::Completed);
        bad.holes = 9;
        bad.scorecard = vec![HoleScore {
            hole: 10,
            par: 4,
            score: 5,
        }];
        assert!(matches!(
            bad.validate(),
            Err(RoundError::Invalid { field: "scorecard", .. })
        ));
    }

    #[test]
    fn test_clear_removes_document() {
        let (store, mut history) = history();
        history.add(draft("A", 80, RoundStatus::Completed)).unwrap();
        history.clear().unwrap();

        assert!(history.all().is_empty());
        assert!(store.get(GAMES_KEY).unwrap().is_none());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("in-progress".parse::<RoundStatus>(), Ok(RoundStatus::InProgress));
        assert!("finished".parse::<RoundStatus>().is_err());
        assert_eq!(RoundStatus::Upcoming.to_string(), "upcoming");
    }
}
