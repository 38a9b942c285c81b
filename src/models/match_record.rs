//! Match submissions and the append-only match log entries they produce.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{EntityId, GroupId, MatchId, MatchTally, PlayerId, TeamId};

/// Upper bound for a side's score and for any single goal or assist count.
pub const MAX_SCORE: u32 = 999;

/// Result of a match from one side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Win,
    Loss,
    Draw,
}

/// Overall outcome of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    TeamA,
    TeamB,
    Draw,
}

impl MatchOutcome {
    pub fn from_scores(score_a: u32, score_b: u32) -> Self {
        match score_a.cmp(&score_b) {
            std::cmp::Ordering::Greater => MatchOutcome::TeamA,
            std::cmp::Ordering::Less => MatchOutcome::TeamB,
            std::cmp::Ordering::Equal => MatchOutcome::Draw,
        }
    }

    /// Result for the given side.
    pub fn result_for(&self, side: Side) -> MatchResult {
        match (self, side) {
            (MatchOutcome::Draw, _) => MatchResult::Draw,
            (MatchOutcome::TeamA, Side::A) | (MatchOutcome::TeamB, Side::B) => MatchResult::Win,
            _ => MatchResult::Loss,
        }
    }
}

/// Which roster of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// Submission validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchValidationError {
    #[error("Roster {0} is empty")]
    EmptyRoster(&'static str),

    #[error("Invalid player identity: {0:?}")]
    InvalidPlayer(String),

    #[error("Invalid team identity: {0:?}")]
    InvalidTeam(String),

    #[error("Player {0} appears more than once")]
    DuplicatePlayer(PlayerId),

    #[error("Both sides are the same team: {0}")]
    SameTeam(TeamId),

    #[error("Roster {side} has {value} {field}, more than {}", MAX_SCORE)]
    OutOfRange {
        side: &'static str,
        field: &'static str,
        value: u64,
    },
}

/// One player's line on a roster.
///
/// Entries without `player_id` are name-only placeholders: their goals count toward the
/// side's score but nobody is credited for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub assists: u32,
}

impl RosterEntry {
    pub fn new(player_id: impl Into<PlayerId>, goals: u32, assists: u32) -> Self {
        Self {
            player_id: Some(player_id.into()),
            display_name: None,
            goals,
            assists,
        }
    }

    pub fn placeholder(display_name: impl Into<String>, goals: u32) -> Self {
        Self {
            player_id: None,
            display_name: Some(display_name.into()),
            goals,
            assists: 0,
        }
    }

    /// The identity to credit, if this entry has a usable one.
    pub fn credited_id(&self) -> Option<&PlayerId> {
        self.player_id
            .as_ref()
            .filter(|id| !id.as_str().trim().is_empty())
    }
}

/// One side of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSide {
    #[serde(default)]
    pub team_id: Option<TeamId>,
    pub roster: Vec<RosterEntry>,
    /// Explicit final score. Defaults to the sum of the roster's goals.
    #[serde(default)]
    pub score: Option<u32>,
}

impl MatchSide {
    pub fn new(roster: Vec<RosterEntry>) -> Self {
        Self {
            team_id: None,
            roster,
            score: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<TeamId>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_score(mut self, score: u32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn score(&self) -> u32 {
        self.score.unwrap_or_else(|| {
            self.roster
                .iter()
                .fold(0u32, |total, e| total.saturating_add(e.goals))
        })
    }

    fn check_range(&self, label: &'static str) -> Result<(), MatchValidationError> {
        let out_of_range = |field, value: u64| MatchValidationError::OutOfRange {
            side: label,
            field,
            value,
        };
        for entry in &self.roster {
            if entry.goals > MAX_SCORE {
                return Err(out_of_range("goals", entry.goals as u64));
            }
            if entry.assists > MAX_SCORE {
                return Err(out_of_range("assists", entry.assists as u64));
            }
        }
        let roster_goals: u64 = self.roster.iter().map(|e| e.goals as u64).sum();
        if roster_goals > MAX_SCORE as u64 {
            return Err(out_of_range("goals", roster_goals));
        }
        if let Some(score) = self.score.filter(|s| *s > MAX_SCORE) {
            return Err(out_of_range("score", score as u64));
        }
        Ok(())
    }

    /// Roster entries with a stable identity.
    pub fn credited(&self) -> impl Iterator<Item = (&PlayerId, &RosterEntry)> {
        self.roster
            .iter()
            .filter_map(|e| e.credited_id().map(|id| (id, e)))
    }
}

/// A finished match as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSubmission {
    pub team_a: MatchSide,
    pub team_b: MatchSide,
    #[serde(default)]
    pub played_at: Option<DateTime<Utc>>,
}

impl MatchSubmission {
    pub fn new(team_a: MatchSide, team_b: MatchSide) -> Self {
        Self {
            team_a,
            team_b,
            played_at: None,
        }
    }

    pub fn side(&self, side: Side) -> &MatchSide {
        match side {
            Side::A => &self.team_a,
            Side::B => &self.team_b,
        }
    }

    pub fn outcome(&self) -> MatchOutcome {
        MatchOutcome::from_scores(self.team_a.score(), self.team_b.score())
    }

    /// Both team ids, when this is a team match.
    pub fn teams(&self) -> Option<(&TeamId, &TeamId)> {
        match (&self.team_a.team_id, &self.team_b.team_id) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    /// Check the submission before anything is written.
    pub fn validate(&self) -> Result<(), MatchValidationError> {
        if self.team_a.roster.is_empty() {
            return Err(MatchValidationError::EmptyRoster("A"));
        }
        if self.team_b.roster.is_empty() {
            return Err(MatchValidationError::EmptyRoster("B"));
        }

        self.team_a.check_range("A")?;
        self.team_b.check_range("B")?;

        let mut seen = HashSet::new();
        for side in [&self.team_a, &self.team_b] {
            if let Some(team_id) = &side.team_id {
                if !team_id.is_valid_key() {
                    return Err(MatchValidationError::InvalidTeam(team_id.to_string()));
                }
            }
            for (player_id, _) in side.credited() {
                if !player_id.is_valid_key() {
                    return Err(MatchValidationError::InvalidPlayer(player_id.to_string()));
                }
                if !seen.insert(player_id) {
                    return Err(MatchValidationError::DuplicatePlayer(player_id.clone()));
                }
            }
        }

        if let Some((a, b)) = self.teams() {
            if a == b {
                return Err(MatchValidationError::SameTeam(a.clone()));
            }
        }

        Ok(())
    }

    /// Per-player tallies for every credited player, with the side they played on.
    pub fn tallies(&self) -> Vec<(Side, &PlayerId, &RosterEntry, MatchTally)> {
        let outcome = self.outcome();
        let mut tallies = Vec::new();
        for side in [Side::A, Side::B] {
            let result = outcome.result_for(side);
            for (player_id, entry) in self.side(side).credited() {
                tallies.push((
                    side,
                    player_id,
                    entry,
                    MatchTally {
                        goals: entry.goals,
                        assists: entry.assists,
                        result,
                    },
                ));
            }
        }
        tallies
    }
}

/// An immutable match log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub id: MatchId,
    pub group_id: GroupId,
    pub timestamp: DateTime<Utc>,
    pub team_a: MatchSide,
    pub team_b: MatchSide,
    pub score_a: u32,
    pub score_b: u32,
    pub outcome: MatchOutcome,
}

impl MatchRecord {
    /// Build the log entry for a submission committed at `document_version`.
    pub fn from_submission(
        group_id: &GroupId,
        submission: &MatchSubmission,
        timestamp: DateTime<Utc>,
        document_version: u64,
    ) -> Self {
        let id = EntityId::generate(&[
            group_id.as_str(),
            &timestamp.to_rfc3339(),
            &document_version.to_string(),
        ]);
        Self {
            id,
            group_id: group_id.clone(),
            timestamp,
            team_a: submission.team_a.clone(),
            team_b: submission.team_b.clone(),
            score_a: submission.team_a.score(),
            score_b: submission.team_b.score(),
            outcome: submission.outcome(),
        }
    }
}

/// An in-progress match persisted in the group document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMatch {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submission: MatchSubmission,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(entries: Vec<RosterEntry>) -> MatchSide {
        MatchSide::new(entries)
    }

    #[test]
    fn test_outcome_from_scores() {
        assert_eq!(MatchOutcome::from_scores(3, 1), MatchOutcome::TeamA);
        assert_eq!(MatchOutcome::from_scores(0, 2), MatchOutcome::TeamB);
        assert_eq!(MatchOutcome::from_scores(2, 2), MatchOutcome::Draw);
    }

    #[test]
    fn test_result_for_side() {
        assert_eq!(MatchOutcome::TeamA.result_for(Side::A), MatchResult::Win);
        assert_eq!(MatchOutcome::TeamA.result_for(Side::B), MatchResult::Loss);
        assert_eq!(MatchOutcome::TeamB.result_for(Side::B), MatchResult::Win);
        assert_eq!(MatchOutcome::Draw.result_for(Side::A), MatchResult::Draw);
    }

    #[test]
    fn test_score_defaults_to_roster_goals_including_placeholders() {
        let s = side(vec![
            RosterEntry::new("p1", 2, 0),
            RosterEntry::placeholder("Guest", 1),
        ]);
        assert_eq!(s.score(), 3);
        assert_eq!(s.clone().with_score(5).score(), 5);
        assert_eq!(s.credited().count(), 1);
    }

    #[test]
    fn test_validate_rejects_empty_roster() {
        let sub = MatchSubmission::new(side(vec![RosterEntry::new("p1", 0, 0)]), side(vec![]));
        assert_eq!(sub.validate(), Err(MatchValidationError::EmptyRoster("B")));
    }

    #[test]
    fn test_validate_rejects_duplicate_player() {
        let sub = MatchSubmission::new(
            side(vec![RosterEntry::new("p1", 0, 0)]),
            side(vec![RosterEntry::new("p1", 1, 0)]),
        );
        assert_eq!(
            sub.validate(),
            Err(MatchValidationError::DuplicatePlayer(PlayerId::from("p1")))
        );
    }

    #[test]
    fn test_validate_rejects_dotted_identity() {
        let sub = MatchSubmission::new(
            side(vec![RosterEntry::new("p.1", 0, 0)]),
            side(vec![RosterEntry::new("p2", 0, 0)]),
        );
        assert!(matches!(
            sub.validate(),
            Err(MatchValidationError::InvalidPlayer(_))
        ));
    }

    #[test]
    fn test_validate_rejects_same_team() {
        let sub = MatchSubmission::new(
            side(vec![RosterEntry::new("p1", 0, 0)]).with_team("t1"),
            side(vec![RosterEntry::new("p2", 0, 0)]).with_team("t1"),
        );
        assert_eq!(
            sub.validate(),
            Err(MatchValidationError::SameTeam(TeamId::from("t1")))
        );
    }

    #[test]
    fn test_validate_rejects_oversized_tallies() {
        let sub = MatchSubmission::new(
            side(vec![
                RosterEntry::new("a", u32::MAX, 0),
                RosterEntry::new("b", 1, 0),
            ]),
            side(vec![RosterEntry::new("p2", 0, 0)]),
        );
        assert_eq!(
            sub.validate(),
            Err(MatchValidationError::OutOfRange {
                side: "A",
                field: "goals",
                value: u32::MAX as u64,
            })
        );
        assert_eq!(sub.team_a.score(), u32::MAX);

        let summed = MatchSubmission::new(
            side(vec![RosterEntry::new("p1", 0, 0)]),
            side(vec![
                RosterEntry::new("p2", MAX_SCORE, 0),
                RosterEntry::placeholder("Guest", 1),
            ]),
        );
        assert!(matches!(
            summed.validate(),
            Err(MatchValidationError::OutOfRange { side: "B", .. })
        ));

        let assists = MatchSubmission::new(
            side(vec![RosterEntry::new("p1", 0, MAX_SCORE + 1)]),
            side(vec![RosterEntry::new("p2", 0, 0)]),
        );
        assert!(matches!(
            assists.validate(),
            Err(MatchValidationError::OutOfRange { field: "assists", .. })
        ));

        let explicit = MatchSubmission::new(
            side(vec![RosterEntry::new("p1", 0, 0)]).with_score(MAX_SCORE + 1),
            side(vec![RosterEntry::new("p2", 0, 0)]),
        );
        assert!(explicit.validate().is_err());

        let at_cap = MatchSubmission::new(
            side(vec![RosterEntry::new("p1", MAX_SCORE, MAX_SCORE)]),
            side(vec![RosterEntry::new("p2", 0, 0)]),
        );
        assert!(at_cap.validate().is_ok());
    }

    #[test]
    fn test_placeholders_are_not_credited() {
        let sub = MatchSubmission::new(
            side(vec![
                RosterEntry::new("p1", 1, 0),
                RosterEntry::placeholder("Guest", 1),
            ]),
            side(vec![RosterEntry::new("p2", 0, 0)]),
        );
        assert!(sub.validate().is_ok());

        let tallies = sub.tallies();
        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].3.result, MatchResult::Win);
        assert_eq!(tallies[1].3.result, MatchResult::Loss);
    }

    #[test]
    fn test_submission_deserializes_from_camel_case() {
        let json = r#"{
            "teamA": {"teamId": "t1", "roster": [{"playerId": "p1", "goals": 2, "assists": 1}]},
            "teamB": {"roster": [{"displayName": "Guest", "goals": 1}], "score": 1}
        }"#;
        let sub: MatchSubmission = serde_json::from_str(json).unwrap();
        assert_eq!(sub.team_a.team_id, Some(TeamId::from("t1")));
        assert_eq!(sub.team_a.score(), 2);
        assert_eq!(sub.team_b.roster[0].player_id, None);
        assert_eq!(sub.outcome(), MatchOutcome::TeamA);
    }

    #[test]
    fn test_match_record_from_submission() {
        let sub = MatchSubmission::new(
            side(vec![RosterEntry::new("p1", 1, 0)]),
            side(vec![RosterEntry::new("p2", 1, 0)]),
        );
        let ts = DateTime::parse_from_rfc3339("2025-06-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = MatchRecord::from_submission(&GroupId::from("g1"), &sub, ts, 4);

        assert_eq!(record.outcome, MatchOutcome::Draw);
        assert_eq!(record.score_a, 1);
        assert_eq!(record.score_b, 1);
        assert_eq!(record.id.as_str().len(), 16);
    }
}
