//! Score formulas and ranking order.
//!
//! Two independent formulas live here and nowhere else:
//! - Player points: goals, assists, participation and an outcome bonus
//! - Team standings: 3 / 1 / 0 points for win / draw / loss
//!
//! Champion resolution and leaderboards use the comparators below so that every
//! ordering in the crate agrees.

use std::cmp::Ordering;

use crate::models::{MatchResult, PlayerId, PlayerRankingEntry, TeamId, TeamRankingEntry};

/// Points per goal scored.
pub const GOAL_POINTS: f64 = 2.0;

/// Points per assist.
pub const ASSIST_POINTS: f64 = 1.0;

/// Points for taking part in a match.
pub const PARTICIPATION_POINTS: f64 = 0.5;

/// Outcome bonus for a win.
pub const WIN_BONUS: f64 = 7.0;

/// Outcome bonus for a loss.
pub const LOSS_PENALTY: f64 = -6.0;

/// Outcome bonus for a draw.
pub const DRAW_BONUS: f64 = 1.0;

/// Standings points for a team win.
pub const STANDINGS_WIN: u32 = 3;

/// Standings points for a team draw.
pub const STANDINGS_DRAW: u32 = 1;

/// Standings points for a team loss.
pub const STANDINGS_LOSS: u32 = 0;

/// Outcome bonus for a single match result.
pub fn outcome_bonus(result: MatchResult) -> f64 {
    match result {
        MatchResult::Win => WIN_BONUS,
        MatchResult::Loss => LOSS_PENALTY,
        MatchResult::Draw => DRAW_BONUS,
    }
}

/// Point delta for one player's tally in one match.
pub fn match_points(goals: u32, assists: u32, result: MatchResult) -> f64 {
    goals as f64 * GOAL_POINTS
        + assists as f64 * ASSIST_POINTS
        + PARTICIPATION_POINTS
        + outcome_bonus(result)
}

/// Fold a match delta into a cumulative total, never going below zero.
pub fn accumulate_points(prior: f64, delta: f64) -> f64 {
    (prior + delta).max(0.0)
}

/// Standings points from accumulated counters.
pub fn standings_points(wins: u32, draws: u32, losses: u32) -> u32 {
    wins.saturating_mul(STANDINGS_WIN)
        .saturating_add(draws.saturating_mul(STANDINGS_DRAW))
        .saturating_add(losses.saturating_mul(STANDINGS_LOSS))
}

/// Goal difference from accumulated goals for and against.
pub fn goal_difference(goals_for: u32, goals_against: u32) -> i64 {
    goals_for as i64 - goals_against as i64
}

/// Calculate win rate from wins/losses/draws.
pub fn calculate_win_rate(wins: u32, losses: u32, draws: u32) -> f64 {
    let total = wins as u64 + losses as u64 + draws as u64;
    if total == 0 {
        0.0
    } else {
        wins as f64 / total as f64
    }
}

/// Player order: points descending, then fewer games played, then identity.
pub fn compare_players(
    a: (&PlayerId, &PlayerRankingEntry),
    b: (&PlayerId, &PlayerRankingEntry),
) -> Ordering {
    b.1.points
        .total_cmp(&a.1.points)
        .then_with(|| a.1.games_played.cmp(&b.1.games_played))
        .then_with(|| a.0.cmp(b.0))
}

/// Team order: standings points, goal difference, goals for (all descending), then identity.
pub fn compare_teams(
    a: (&TeamId, &TeamRankingEntry),
    b: (&TeamId, &TeamRankingEntry),
) -> Ordering {
    b.1.points
        .cmp(&a.1.points)
        .then_with(|| b.1.goal_diff.cmp(&a.1.goal_diff))
        .then_with(|| b.1.goals_for.cmp(&a.1.goals_for))
        .then_with(|| a.0.cmp(b.0))
}
