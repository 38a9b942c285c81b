//! The shared Group document.
//!
//! Everything the season engine mutates lives in one document per Group so that a
//! single compare-and-swap write can cover a whole match or a whole season rollover.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    DraftMatch, GroupId, PerTeamPlayerStats, PlayerId, PlayerRankingEntry, Season, TeamId,
    TeamRankingEntry,
};
use crate::calculate::{compare_players, compare_teams};

/// Document field holding the season record.
pub const FIELD_SEASON: &str = "season";
/// Document field holding the player ranking.
pub const FIELD_RANKING: &str = "ranking";
/// Document field holding the team ranking.
pub const FIELD_TEAM_RANKING: &str = "rankingTimes";
/// Document field holding per-team player statistics.
pub const FIELD_TEAM_PLAYER_STATS: &str = "estatisticasTime";
/// Document field holding the in-progress match.
pub const FIELD_DRAFT: &str = "draftMatch";
/// Document field holding the member set.
pub const FIELD_MEMBERS: &str = "members";

/// Per-team, per-player statistics table.
pub type TeamPlayerStats = BTreeMap<TeamId, BTreeMap<PlayerId, PerTeamPlayerStats>>;

/// A Group and its season state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDocument {
    pub id: GroupId,
    pub name: String,
    pub owner: PlayerId,
    #[serde(default)]
    pub members: BTreeSet<PlayerId>,
    #[serde(default)]
    pub season: Option<Season>,
    #[serde(default)]
    pub ranking: BTreeMap<PlayerId, PlayerRankingEntry>,
    #[serde(default, rename = "rankingTimes")]
    pub team_ranking: BTreeMap<TeamId, TeamRankingEntry>,
    #[serde(default, rename = "estatisticasTime")]
    pub team_player_stats: TeamPlayerStats,
    #[serde(default)]
    pub draft_match: Option<DraftMatch>,
    /// Write counter maintained by the document store.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl GroupDocument {
    /// Create a new group. The owner is always a member.
    pub fn new(
        id: GroupId,
        name: impl Into<String>,
        owner: PlayerId,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut members = BTreeSet::new();
        members.insert(owner.clone());
        Self {
            id,
            name: name.into(),
            owner,
            members,
            season: None,
            ranking: BTreeMap::new(),
            team_ranking: BTreeMap::new(),
            team_player_stats: BTreeMap::new(),
            draft_match: None,
            version: 0,
            created_at,
        }
    }

    pub fn is_member(&self, player_id: &PlayerId) -> bool {
        self.members.contains(player_id)
    }

    /// Players sorted best first.
    pub fn player_standings(&self) -> Vec<(&PlayerId, &PlayerRankingEntry)> {
        let mut entries: Vec<_> = self.ranking.iter().collect();
        entries.sort_by(|a, b| compare_players(*a, *b));
        entries
    }

    /// Teams sorted best first.
    pub fn team_standings(&self) -> Vec<(&TeamId, &TeamRankingEntry)> {
        let mut entries: Vec<_> = self.team_ranking.iter().collect();
        entries.sort_by(|a, b| compare_teams(*a, *b));
        entries
    }
}
