//! Season lifecycle and ranking aggregation engine.
//!
//! Every mutation of a Group document is a read-merge-write cycle through
//! [`SeasonEngine::commit`]: read the document, plan a field patch against what was read,
//! and write it with the read version as the compare-and-swap token. A conflicting write
//! from another client makes the cycle start over from a fresh read, so plans always see
//! the latest state, including a season some other observer has just ended.
//!
//! - `aggregate`: player and team ranking folds for a finished match
//! - `season`: start / edit / activate
//! - `finalize`: champion resolution and season rollover
//! - `fanout`: champion notifications
//! - `countdown`: per-client expiry observer
//! - `drafts`: the single in-progress match per Group

pub mod aggregate;
pub mod countdown;
pub mod drafts;
pub mod fanout;
pub mod finalize;
pub mod season;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::directory::{ProfileDirectory, StaticDirectory, TeamDirectory};
use crate::models::{
    GroupDocument, GroupId, MatchRecord, MatchValidationError, PlayerId, PlayerRankingEntry,
    SeasonError, TeamId, TeamRankingEntry, FIELD_MEMBERS, FIELD_RANKING,
};
use crate::notify::Notifier;
use crate::storage::{DocumentStore, FieldPatch, MatchLog, StorageError};

pub use aggregate::MatchReceipt;
pub use countdown::{CountdownHandle, CountdownMonitor, CountdownState};
pub use fanout::FanoutReport;
pub use finalize::{FinalizeOutcome, FinalizeReport};

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid match: {0}")]
    InvalidMatch(#[from] MatchValidationError),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{0}")]
    Season(#[from] SeasonError),

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Group already exists: {0}")]
    GroupExists(GroupId),

    #[error("Group {0} has no season")]
    NoSeason(GroupId),

    #[error("No matching draft match: {0}")]
    DraftNotFound(String),

    #[error("Gave up on {group} after {attempts} conflicting writes")]
    Contention { group: GroupId, attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Whether the error is a season scope conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Season(SeasonError::Conflict { .. }))
    }
}

/// Retry policy for conflicting writes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 10,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((self.initial_delay_ms as f64 * factor) as u64)
    }
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock tests move by hand.
#[cfg(test)]
pub struct ManualClock(std::sync::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(std::sync::Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// What a planning step decided to do with the document it read.
pub(crate) enum Plan<T> {
    Write(FieldPatch, T),
    Skip(T),
}

/// Result of a commit cycle.
pub(crate) struct Committed<T> {
    pub value: T,
    /// New document version, `None` when the plan skipped the write.
    pub version: Option<u64>,
}

/// A ranked player row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStanding {
    pub rank: usize,
    pub player_id: PlayerId,
    pub win_rate: f64,
    #[serde(flatten)]
    pub entry: PlayerRankingEntry,
}

/// A ranked team row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStanding {
    pub rank: usize,
    pub team_id: TeamId,
    #[serde(flatten)]
    pub entry: TeamRankingEntry,
}

/// Both leaderboards of a Group.
#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    pub players: Vec<PlayerStanding>,
    pub teams: Vec<TeamStanding>,
}

/// The season engine.
pub struct SeasonEngine {
    store: Arc<dyn DocumentStore>,
    matches: Arc<dyn MatchLog>,
    notifier: Arc<dyn Notifier>,
    profiles: Arc<dyn ProfileDirectory>,
    teams: Arc<dyn TeamDirectory>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    season_length: chrono::Duration,
}

impl SeasonEngine {
    /// Create an engine with an empty directory, the system clock and default retries.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        matches: Arc<dyn MatchLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let directory = Arc::new(StaticDirectory::new());
        Self {
            store,
            matches,
            notifier,
            profiles: directory.clone(),
            teams: directory,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            season_length: chrono::Duration::days(7),
        }
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileDirectory>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_teams(mut self, teams: Arc<dyn TeamDirectory>) -> Self {
        self.teams = teams;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Length used when a season is started without an explicit end time.
    pub fn with_season_length(mut self, length: chrono::Duration) -> Self {
        self.season_length = length;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn season_length(&self) -> chrono::Duration {
        self.season_length
    }

    /// Read a Group document.
    pub async fn get_group(&self, group_id: &GroupId) -> Result<GroupDocument, EngineError> {
        self.store
            .read(group_id)
            .await?
            .ok_or_else(|| EngineError::GroupNotFound(group_id.clone()))
    }

    /// Create a Group. Every member, owner included, starts with a zeroed ranking entry.
    pub async fn create_group(
        &self,
        group_id: Option<GroupId>,
        name: &str,
        owner: PlayerId,
        members: Vec<PlayerId>,
    ) -> Result<GroupDocument, EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("group name must not be empty".into()));
        }

        let now = self.clock.now();
        let group_id = group_id
            .unwrap_or_else(|| GroupId::from(uuid::Uuid::new_v4().simple().to_string()));
        for id in std::iter::once(&group_id)
            .chain(std::iter::once(&owner))
            .chain(members.iter())
        {
            if !id.is_valid_key() {
                return Err(EngineError::Validation(format!("invalid identity {:?}", id.as_str())));
            }
        }
        if group_id.as_str().contains(['/', '\\']) {
            return Err(EngineError::Validation(format!(
                "group id must not contain path separators: {:?}",
                group_id.as_str()
            )));
        }

        let mut doc = GroupDocument::new(group_id.clone(), name.trim(), owner, now);
        doc.members.extend(members);
        for member in doc.members.clone() {
            let name = self.display_name(&member, None).await;
            doc.ranking.insert(member, PlayerRankingEntry::new(name));
        }

        match self.store.create(&doc).await {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(id)) => return Err(EngineError::GroupExists(id)),
            Err(e) => return Err(e.into()),
        }

        info!(
            "Created group {} with {} members",
            group_id,
            doc.members.len()
        );
        self.get_group(&group_id).await
    }

    /// Add a member, creating their ranking entry if it does not exist yet.
    pub async fn add_member(
        &self,
        group_id: &GroupId,
        player_id: PlayerId,
        display_name: Option<String>,
    ) -> Result<bool, EngineError> {
        if !player_id.is_valid_key() {
            return Err(EngineError::Validation(format!(
                "invalid identity {:?}",
                player_id.as_str()
            )));
        }

        let name = self.display_name(&player_id, display_name.as_deref()).await;
        let committed = self
            .commit(group_id, |doc| {
                if doc.is_member(&player_id) && doc.ranking.contains_key(&player_id) {
                    return Ok(Plan::Skip(false));
                }
                let mut patch = FieldPatch::new();
                if !doc.is_member(&player_id) {
                    let mut members = doc.members.clone();
                    members.insert(player_id.clone());
                    patch.set(FIELD_MEMBERS, &members)?;
                }
                if !doc.ranking.contains_key(&player_id) {
                    patch.set(
                        &format!("{}.{}", FIELD_RANKING, player_id),
                        &PlayerRankingEntry::new(name.clone()),
                    )?;
                }
                Ok(Plan::Write(patch, true))
            })
            .await?;

        if committed.value {
            info!("Added member {} to group {}", player_id, group_id);
        }
        Ok(committed.value)
    }

    /// Sorted player and team leaderboards.
    pub async fn leaderboard(&self, group_id: &GroupId) -> Result<Leaderboard, EngineError> {
        let doc = self.get_group(group_id).await?;
        let players = doc
            .player_standings()
            .into_iter()
            .enumerate()
            .map(|(i, (id, entry))| PlayerStanding {
                rank: i + 1,
                player_id: id.clone(),
                win_rate: entry.win_rate(),
                entry: entry.clone(),
            })
            .collect();
        let teams = doc
            .team_standings()
            .into_iter()
            .enumerate()
            .map(|(i, (id, entry))| TeamStanding {
                rank: i + 1,
                team_id: id.clone(),
                entry: entry.clone(),
            })
            .collect();
        Ok(Leaderboard { players, teams })
    }

    /// The match log of a Group, oldest first.
    pub async fn list_matches(&self, group_id: &GroupId) -> Result<Vec<MatchRecord>, EngineError> {
        self.get_group(group_id).await?;
        Ok(self.matches.list(group_id).await?)
    }

    /// Current countdown for a Group as seen by this process's clock.
    pub async fn countdown(&self, group_id: &GroupId) -> Result<CountdownState, EngineError> {
        let doc = self.get_group(group_id).await?;
        Ok(CountdownState::observe(Some(&doc), self.clock.now()))
    }

    /// Display name for a new entry: profile, then the caller's fallback, then the id.
    pub(crate) async fn display_name(&self, player_id: &PlayerId, fallback: Option<&str>) -> String {
        match self.profiles.display_name(player_id).await {
            Ok(Some(name)) => return name,
            Ok(None) => {}
            Err(e) => warn!("Profile lookup for {} failed: {}", player_id, e),
        }
        fallback
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| player_id.to_string())
    }

    /// Run a read-plan-write cycle with compare-and-swap on the document version.
    pub(crate) async fn commit<T, F>(
        &self,
        group_id: &GroupId,
        mut plan: F,
    ) -> Result<Committed<T>, EngineError>
    where
        F: FnMut(&GroupDocument) -> Result<Plan<T>, EngineError>,
    {
        let mut attempt = 0u32;
        loop {
            let doc = self.get_group(group_id).await?;
            let (patch, value) = match plan(&doc)? {
                Plan::Skip(value) => {
                    return Ok(Committed {
                        value,
                        version: None,
                    })
                }
                Plan::Write(patch, value) => (patch, value),
            };

            match self.store.merge(group_id, doc.version, &patch).await {
                Ok(version) => {
                    return Ok(Committed {
                        value,
                        version: Some(version),
                    })
                }
                Err(StorageError::VersionConflict { actual, .. }) => {
                    attempt += 1;
                    if attempt > self.retry.max_retries {
                        warn!(
                            "Giving up on {} after {} version conflicts",
                            group_id, attempt
                        );
                        return Err(EngineError::Contention {
                            group: group_id.clone(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        "Version conflict on {} (read {}, now {}), retry {} in {:?}",
                        group_id, doc.version, actual, attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Members of `doc` plus `new_members`, if that adds anyone.
pub(crate) fn grown_members<'a>(
    doc: &GroupDocument,
    new_members: impl Iterator<Item = &'a PlayerId>,
) -> Option<BTreeSet<PlayerId>> {
    let mut members = doc.members.clone();
    let before = members.len();
    members.extend(new_members.cloned());
    (members.len() > before).then_some(members)
}
