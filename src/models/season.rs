//! Seasons - time-boxed scoring windows with a single champion.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::EntityId;

/// Season lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonStatus {
    Awaiting,
    Active,
    Ended,
}

/// Which leaderboard a season ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonScope {
    /// The Group's player ranking.
    Group,
    /// The Group's team ranking.
    Team,
}

impl SeasonScope {
    pub fn other(&self) -> Self {
        match self {
            SeasonScope::Group => SeasonScope::Team,
            SeasonScope::Team => SeasonScope::Group,
        }
    }
}

impl std::fmt::Display for SeasonScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeasonScope::Group => write!(f, "group"),
            SeasonScope::Team => write!(f, "team"),
        }
    }
}

impl std::str::FromStr for SeasonScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "group" | "player" => Ok(SeasonScope::Group),
            "team" => Ok(SeasonScope::Team),
            other => Err(format!("unknown season scope: {}", other)),
        }
    }
}

/// Season state machine errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeasonError {
    #[error("Season name must not be empty")]
    EmptyName,

    #[error("Season must end after it starts ({start} >= {end})")]
    InvalidBounds {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Season starting at {start} cannot run for {length}")]
    LengthOutOfRange {
        start: DateTime<Utc>,
        length: chrono::Duration,
    },

    #[error("A {active} season is still running")]
    Conflict { active: SeasonScope },

    #[error("Season has already ended")]
    Ended,

    #[error("Season end time has passed; it is awaiting finalization")]
    Expired,
}

/// Snapshot of the winner taken at finalization, before the reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Champion {
    pub id: EntityId,
    pub display_name: String,
    pub points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_diff: Option<i64>,
}

/// Changes an owner may apply to a running season.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// A season record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SeasonStatus,
    pub scope: SeasonScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub champion: Option<Champion>,
}

fn validate_bounds(
    name: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), SeasonError> {
    if name.trim().is_empty() {
        return Err(SeasonError::EmptyName);
    }
    if end <= start {
        return Err(SeasonError::InvalidBounds { start, end });
    }
    Ok(())
}

impl Season {
    /// End time for a season of `length` starting at `start`.
    pub fn end_after(
        start: DateTime<Utc>,
        length: chrono::Duration,
    ) -> Result<DateTime<Utc>, SeasonError> {
        start
            .checked_add_signed(length)
            .ok_or(SeasonError::LengthOutOfRange { start, length })
    }

    /// Start a fresh season window.
    ///
    /// The season is `Active` immediately unless its start time is still in the future.
    pub fn start(
        scope: SeasonScope,
        name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, SeasonError> {
        let name = name.into();
        validate_bounds(&name, start_time, end_time)?;

        let status = if now < start_time {
            SeasonStatus::Awaiting
        } else {
            SeasonStatus::Active
        };

        Ok(Self {
            name: name.trim().to_string(),
            start_time,
            end_time,
            status,
            scope,
            champion: None,
        })
    }

    /// Check whether a season of `scope` may replace `existing`.
    ///
    /// A running season of the other scope blocks the start. A running season of the
    /// same scope is simply restarted.
    pub fn ensure_can_start(
        existing: Option<&Season>,
        scope: SeasonScope,
    ) -> Result<(), SeasonError> {
        match existing {
            Some(season) if season.scope != scope && season.is_running() => {
                Err(SeasonError::Conflict {
                    active: season.scope,
                })
            }
            _ => Ok(()),
        }
    }

    /// Not yet ended.
    pub fn is_running(&self) -> bool {
        self.status != SeasonStatus::Ended
    }

    /// Time left until the end, negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.end_time - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) <= Duration::zero()
    }

    /// Whether an awaiting season has reached its start time.
    pub fn should_activate(&self, now: DateTime<Utc>) -> bool {
        self.status == SeasonStatus::Awaiting && now >= self.start_time
    }

    /// Apply an owner edit. Status is never changed here.
    pub fn apply_edit(&mut self, edit: &SeasonEdit, now: DateTime<Utc>) -> Result<(), SeasonError> {
        if self.status == SeasonStatus::Ended {
            return Err(SeasonError::Ended);
        }
        if self.is_expired(now) {
            return Err(SeasonError::Expired);
        }

        let name = edit.name.clone().unwrap_or_else(|| self.name.clone());
        let start = edit.start_time.unwrap_or(self.start_time);
        let end = edit.end_time.unwrap_or(self.end_time);
        validate_bounds(&name, start, end)?;

        self.name = name.trim().to_string();
        self.start_time = start;
        self.end_time = end;
        Ok(())
    }
}
