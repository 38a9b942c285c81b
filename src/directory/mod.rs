//! Identity and team roster lookups.
//!
//! Display names are only needed when a ranking entry is created; team rosters are only
//! needed for champion notifications. Both are collaborators owned by the surrounding
//! application, so the engine sees them through these traits.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::{PlayerId, TeamId};

/// Directory lookup errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read directory file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse directory file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A member of a team roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub player_id: PlayerId,
    #[serde(default)]
    pub is_captain: bool,
}

/// Player profile lookup.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn display_name(&self, player_id: &PlayerId) -> Result<Option<String>, DirectoryError>;
}

/// Team lookup.
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn team_name(&self, team_id: &TeamId) -> Result<Option<String>, DirectoryError>;

    async fn team_members(&self, team_id: &TeamId) -> Result<Vec<TeamMember>, DirectoryError>;
}

#[derive(Debug, Clone, Deserialize)]
struct PlayerRecord {
    id: PlayerId,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TeamRecord {
    id: TeamId,
    name: String,
    #[serde(default)]
    captain: Option<PlayerId>,
    #[serde(default)]
    members: Vec<PlayerId>,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    players: Vec<PlayerRecord>,
    #[serde(default)]
    teams: Vec<TeamRecord>,
}

#[derive(Debug, Clone)]
struct TeamInfo {
    name: String,
    members: Vec<TeamMember>,
}

/// Directory loaded once from a TOML roster file.
///
/// ```toml
/// [[players]]
/// id = "p1"
/// name = "Ana"
///
/// [[teams]]
/// id = "reds"
/// name = "Reds"
/// captain = "p1"
/// members = ["p1", "p2"]
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    players: HashMap<PlayerId, String>,
    teams: HashMap<TeamId, TeamInfo>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML roster.
    pub fn from_toml(contents: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile = toml::from_str(contents)?;
        let mut directory = Self::new();
        for player in file.players {
            directory = directory.with_player(player.id, player.name);
        }
        for team in file.teams {
            let members = team
                .members
                .into_iter()
                .map(|player_id| TeamMember {
                    is_captain: team.captain.as_ref() == Some(&player_id),
                    player_id,
                })
                .collect();
            directory = directory.with_team(team.id, team.name, members);
        }
        Ok(directory)
    }

    /// Load a TOML roster file.
    pub fn from_file(path: &Path) -> Result<Self, DirectoryError> {
        let contents = std::fs::read_to_string(path)?;
        let directory = Self::from_toml(&contents)?;
        info!(
            "Loaded directory from {:?}: {} players, {} teams",
            path,
            directory.players.len(),
            directory.teams.len()
        );
        Ok(directory)
    }

    pub fn with_player(mut self, id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        self.players.insert(id.into(), name.into());
        self
    }

    pub fn with_team(
        mut self,
        id: impl Into<TeamId>,
        name: impl Into<String>,
        members: Vec<TeamMember>,
    ) -> Self {
        self.teams.insert(
            id.into(),
            TeamInfo {
                name: name.into(),
                members,
            },
        );
        self
    }
}

#[async_trait]
impl ProfileDirectory for StaticDirectory {
    async fn display_name(&self, player_id: &PlayerId) -> Result<Option<String>, DirectoryError> {
        Ok(self.players.get(player_id).cloned())
    }
}

#[async_trait]
impl TeamDirectory for StaticDirectory {
    async fn team_name(&self, team_id: &TeamId) -> Result<Option<String>, DirectoryError> {
        Ok(self.teams.get(team_id).map(|t| t.name.clone()))
    }

    async fn team_members(&self, team_id: &TeamId) -> Result<Vec<TeamMember>, DirectoryError> {
        Ok(self
            .teams
            .get(team_id)
            .map(|t| t.members.clone())
            .unwrap_or_default())
    }
}
