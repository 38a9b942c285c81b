//! Cumulative, season-scoped ranking records.

use serde::{Deserialize, Serialize};

use super::{MatchResult, TeamId};
use crate::calculate::{self, accumulate_points, match_points};

/// One player's goals and assists in a single match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTally {
    pub goals: u32,
    pub assists: u32,
    pub result: MatchResult,
}

/// A player's cumulative statistics across the Group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRankingEntry {
    pub display_name: String,
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub draws: u32,
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub points: f64,
}

impl PlayerRankingEntry {
    /// Create a zeroed entry.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            games_played: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            goals: 0,
            assists: 0,
            points: 0.0,
        }
    }

    /// Fold one match into the entry.
    pub fn record(&mut self, tally: MatchTally) {
        self.games_played = self.games_played.saturating_add(1);
        self.goals = self.goals.saturating_add(tally.goals);
        self.assists = self.assists.saturating_add(tally.assists);
        match tally.result {
            MatchResult::Win => self.wins = self.wins.saturating_add(1),
            MatchResult::Loss => self.losses = self.losses.saturating_add(1),
            MatchResult::Draw => self.draws = self.draws.saturating_add(1),
        }
        self.points = accumulate_points(
            self.points,
            match_points(tally.goals, tally.assists, tally.result),
        );
    }

    /// Zero every counter, keeping the display name.
    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.display_name));
    }

    pub fn win_rate(&self) -> f64 {
        calculate::calculate_win_rate(self.wins, self.losses, self.draws)
    }
}

/// A team's cumulative standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRankingEntry {
    pub id: TeamId,
    pub display_name: String,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub draws: u32,
    #[serde(default)]
    pub goals_for: u32,
    #[serde(default)]
    pub goals_against: u32,
    #[serde(default)]
    pub goal_diff: i64,
    #[serde(default)]
    pub points: u32,
}

impl TeamRankingEntry {
    /// Create a zeroed entry.
    pub fn new(id: TeamId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            wins: 0,
            losses: 0,
            draws: 0,
            goals_for: 0,
            goals_against: 0,
            goal_diff: 0,
            points: 0,
        }
    }

    /// Fold one match into the standings.
    ///
    /// Goal difference and points are recomputed from the counters after they are
    /// accumulated.
    pub fn record(&mut self, goals_for: u32, goals_against: u32, result: MatchResult) {
        self.goals_for = self.goals_for.saturating_add(goals_for);
        self.goals_against = self.goals_against.saturating_add(goals_against);
        match result {
            MatchResult::Win => self.wins = self.wins.saturating_add(1),
            MatchResult::Loss => self.losses = self.losses.saturating_add(1),
            MatchResult::Draw => self.draws = self.draws.saturating_add(1),
        }
        self.goal_diff = calculate::goal_difference(self.goals_for, self.goals_against);
        self.points = calculate::standings_points(self.wins, self.draws, self.losses);
    }

    pub fn games_played(&self) -> u32 {
        self.wins
            .saturating_add(self.losses)
            .saturating_add(self.draws)
    }

    /// Zero every counter, keeping id and display name.
    pub fn reset(&mut self) {
        *self = Self::new(self.id.clone(), std::mem::take(&mut self.display_name));
    }
}

/// A player's contribution within one specific team.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerTeamPlayerStats {
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub draws: u32,
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub points: f64,
}

impl PerTeamPlayerStats {
    pub fn record(&mut self, tally: MatchTally) {
        self.games_played = self.games_played.saturating_add(1);
        self.goals = self.goals.saturating_add(tally.goals);
        self.assists = self.assists.saturating_add(tally.assists);
        match tally.result {
            MatchResult::Win => self.wins = self.wins.saturating_add(1),
            MatchResult::Loss => self.losses = self.losses.saturating_add(1),
            MatchResult::Draw => self.draws = self.draws.saturating_add(1),
        }
        self.points = accumulate_points(
            self.points,
            match_points(tally.goals, tally.assists, tally.result),
        );
    }
}
