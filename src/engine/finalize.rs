//! Season finalization.
//!
//! Ending a season is one conditional write: `season.status = ended`, the champion
//! snapshot and the reset of the season's ranking all land together or not at all.
//! Concurrent observers race on the document version; the loser re-reads, sees the
//! season already ended and stops. Only the winner notifies the champion.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, error, info};

use super::{EngineError, FanoutReport, Plan, SeasonEngine};
use crate::models::{
    Champion, EntityId, GroupDocument, GroupId, PerTeamPlayerStats, SeasonScope, SeasonStatus,
    FIELD_RANKING, FIELD_SEASON, FIELD_TEAM_PLAYER_STATS, FIELD_TEAM_RANKING,
};
use crate::storage::{FieldPatch, StorageError};

/// What a finalization attempt did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// This call ended the season.
    Finalized(FinalizeReport),
    /// Another observer ended it first.
    AlreadyEnded,
    /// The end time has not been reached.
    NotExpired { remaining_seconds: i64 },
}

/// Details of a season this call ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeReport {
    pub season_name: String,
    pub scope: SeasonScope,
    pub champion: Option<Champion>,
    pub entries_reset: usize,
    pub notifications: FanoutReport,
    pub version: u64,
}

/// The top entry of the season's ranking, if anyone played.
pub fn resolve_champion(doc: &GroupDocument, scope: SeasonScope) -> Option<Champion> {
    match scope {
        SeasonScope::Group => doc
            .player_standings()
            .into_iter()
            .find(|(_, entry)| entry.games_played > 0)
            .map(|(id, entry)| Champion {
                id: id.clone(),
                display_name: entry.display_name.clone(),
                points: entry.points,
                goal_diff: None,
            }),
        SeasonScope::Team => doc
            .team_standings()
            .into_iter()
            .find(|(_, entry)| entry.games_played() > 0)
            .map(|(id, entry)| Champion {
                id: EntityId::from(id.as_str()),
                display_name: entry.display_name.clone(),
                points: f64::from(entry.points),
                goal_diff: Some(entry.goal_diff),
            }),
    }
}

/// Patch ending the season, recording the champion and zeroing the season's ranking.
///
/// Returns the patch and the number of entries reset.
pub fn finalization_patch(
    doc: &GroupDocument,
    scope: SeasonScope,
    champion: Option<&Champion>,
) -> Result<(FieldPatch, usize), StorageError> {
    let mut patch = FieldPatch::new();
    patch.set(&format!("{}.status", FIELD_SEASON), &SeasonStatus::Ended)?;
    patch.set(&format!("{}.champion", FIELD_SEASON), &champion)?;

    let reset = match scope {
        SeasonScope::Group => {
            let mut ranking = doc.ranking.clone();
            ranking.values_mut().for_each(|entry| entry.reset());
            patch.set(FIELD_RANKING, &ranking)?;
            ranking.len()
        }
        SeasonScope::Team => {
            let mut teams = doc.team_ranking.clone();
            teams.values_mut().for_each(|entry| entry.reset());
            patch.set(FIELD_TEAM_RANKING, &teams)?;

            let stats: BTreeMap<_, BTreeMap<_, _>> = doc
                .team_player_stats
                .iter()
                .map(|(team, players)| {
                    let zeroed = players
                        .keys()
                        .map(|player| (player.clone(), PerTeamPlayerStats::default()))
                        .collect();
                    (team.clone(), zeroed)
                })
                .collect();
            patch.set(FIELD_TEAM_PLAYER_STATS, &stats)?;
            teams.len()
        }
    };

    Ok((patch, reset))
}

enum Decision {
    Finalize {
        season_name: String,
        scope: SeasonScope,
        champion: Option<Champion>,
        entries_reset: usize,
    },
    AlreadyEnded,
    NotExpired(chrono::Duration),
}

impl SeasonEngine {
    /// End the season if its end time has passed and nobody has ended it yet.
    ///
    /// Safe to call from any number of observers at once: exactly one of them gets
    /// `Finalized` and sends the champion notifications.
    pub async fn finalize_season(&self, group_id: &GroupId) -> Result<FinalizeOutcome, EngineError> {
        let now = self.clock.now();
        let committed = self
            .commit(group_id, |doc| {
                let season = doc
                    .season
                    .as_ref()
                    .ok_or_else(|| EngineError::NoSeason(doc.id.clone()))?;
                if season.status == SeasonStatus::Ended {
                    return Ok(Plan::Skip(Decision::AlreadyEnded));
                }
                if !season.is_expired(now) {
                    return Ok(Plan::Skip(Decision::NotExpired(season.remaining(now))));
                }

                let champion = resolve_champion(doc, season.scope);
                let (patch, entries_reset) =
                    finalization_patch(doc, season.scope, champion.as_ref())?;
                Ok(Plan::Write(
                    patch,
                    Decision::Finalize {
                        season_name: season.name.clone(),
                        scope: season.scope,
                        champion,
                        entries_reset,
                    },
                ))
            })
            .await
            .inspect_err(|e| {
                if matches!(e, EngineError::Storage(_) | EngineError::Contention { .. }) {
                    error!(
                        "Finalization of group {} failed, season left as it was: {}",
                        group_id, e
                    );
                }
            })?;

        match committed.value {
            Decision::AlreadyEnded => {
                debug!("Season in group {} was already ended", group_id);
                Ok(FinalizeOutcome::AlreadyEnded)
            }
            Decision::NotExpired(remaining) => Ok(FinalizeOutcome::NotExpired {
                remaining_seconds: remaining.num_seconds(),
            }),
            Decision::Finalize {
                season_name,
                scope,
                champion,
                entries_reset,
            } => {
                match &champion {
                    Some(c) => info!(
                        "Season {:?} in group {} ended, champion {} with {} points",
                        season_name, group_id, c.display_name, c.points
                    ),
                    None => info!(
                        "Season {:?} in group {} ended without a champion",
                        season_name, group_id
                    ),
                }

                let notifications = match &champion {
                    Some(c) => self.notify_champion(&season_name, scope, c).await,
                    None => FanoutReport::default(),
                };

                Ok(FinalizeOutcome::Finalized(FinalizeReport {
                    season_name,
                    scope,
                    champion,
                    entries_reset,
                    notifications,
                    version: committed.version.unwrap_or_default(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration;
    use tokio::sync::watch;

    use super::*;
    use crate::directory::{StaticDirectory, TeamMember};
    use crate::engine::test_support::*;
    use crate::models::{MatchSide, MatchSubmission, PlayerId, RosterEntry, TeamId};
    use crate::notify::MockNotifier;
    use crate::storage::{DocumentStore, MemoryMatchLog, MemoryStore};

    fn pickup(a: Vec<RosterEntry>, b: Vec<RosterEntry>) -> MatchSubmission {
        MatchSubmission::new(MatchSide::new(a), MatchSide::new(b))
    }

    async fn short_season(h: &Harness, id: &GroupId, scope: SeasonScope) {
        h.engine
            .start_season(id, scope, "Sprint", None, Some(t0() + Duration::seconds(60)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_finalize_resolves_champion_and_resets() {
        let h = harness();
        let id = group(&h, &["p1", "p2"]).await;
        short_season(&h, &id, SeasonScope::Group).await;
        h.engine
            .record_match(
                &id,
                pickup(
                    vec![RosterEntry::new("p1", 2, 1)],
                    vec![RosterEntry::new("p2", 1, 0)],
                ),
            )
            .await
            .unwrap();

        h.clock.advance(Duration::seconds(61));
        let report = match h.engine.finalize_season(&id).await.unwrap() {
            FinalizeOutcome::Finalized(report) => report,
            other => panic!("expected finalization, got {:?}", other),
        };

        let champion = report.champion.unwrap();
        assert_eq!(champion.id.as_str(), "p1");
        assert_eq!(champion.points, 12.5);
        assert_eq!(report.entries_reset, 3);
        assert_eq!(report.notifications.delivered, 1);

        let doc = h.engine.get_group(&id).await.unwrap();
        let season = doc.season.unwrap();
        assert_eq!(season.status, SeasonStatus::Ended);
        assert_eq!(season.champion.unwrap().id.as_str(), "p1");
        assert!(doc
            .ranking
            .values()
            .all(|e| e.points == 0.0 && e.games_played == 0 && e.wins == 0));
        assert!(doc.ranking.contains_key(&PlayerId::from("p2")));
        assert_eq!(h.notifier.sent()[0].recipient.as_str(), "p1");
    }

    #[tokio::test]
    async fn test_finalize_before_expiry_does_nothing() {
        let h = harness();
        let id = group(&h, &[]).await;
        short_season(&h, &id, SeasonScope::Group).await;
        let before = h.engine.get_group(&id).await.unwrap().version;

        h.clock.advance(Duration::seconds(20));
        let outcome = h.engine.finalize_season(&id).await.unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::NotExpired {
                remaining_seconds: 40
            }
        );
        assert_eq!(h.engine.get_group(&id).await.unwrap().version, before);
    }

    #[tokio::test]
    async fn test_second_finalization_is_a_no_op() {
        let h = harness();
        let id = group(&h, &["p1", "p2"]).await;
        short_season(&h, &id, SeasonScope::Group).await;
        h.engine
            .record_match(
                &id,
                pickup(
                    vec![RosterEntry::new("p1", 1, 0)],
                    vec![RosterEntry::new("p2", 0, 0)],
                ),
            )
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(5));

        assert!(matches!(
            h.engine.finalize_season(&id).await.unwrap(),
            FinalizeOutcome::Finalized(_)
        ));
        let version = h.engine.get_group(&id).await.unwrap().version;

        assert_eq!(
            h.engine.finalize_season(&id).await.unwrap(),
            FinalizeOutcome::AlreadyEnded
        );
        assert_eq!(h.engine.get_group(&id).await.unwrap().version, version);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_finalizers_notify_once() {
        let h = harness();
        let id = group(&h, &["p1", "p2"]).await;
        short_season(&h, &id, SeasonScope::Group).await;
        h.engine
            .record_match(
                &id,
                pickup(
                    vec![RosterEntry::new("p1", 1, 0)],
                    vec![RosterEntry::new("p2", 0, 0)],
                ),
            )
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(5));

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let engine = h.engine.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move { engine.finalize_season(&id).await }));
        }

        let mut finalized = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                FinalizeOutcome::Finalized(_) => finalized += 1,
                FinalizeOutcome::AlreadyEnded => {}
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(finalized, 1);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_finalize_without_games_has_no_champion() {
        let h = harness();
        let id = group(&h, &["p1"]).await;
        short_season(&h, &id, SeasonScope::Group).await;
        h.clock.advance(Duration::minutes(2));

        let FinalizeOutcome::Finalized(report) = h.engine.finalize_season(&id).await.unwrap()
        else {
            panic!("expected finalization");
        };
        assert!(report.champion.is_none());
        assert_eq!(report.notifications, FanoutReport::default());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_finalize_without_season() {
        let h = harness();
        let id = group(&h, &[]).await;
        let err = h.engine.finalize_season(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::NoSeason(_)));
    }

    #[tokio::test]
    async fn test_team_season_champion_by_goal_difference() {
        let directory = StaticDirectory::new().with_team(
            "c",
            "Team C",
            vec![
                TeamMember {
                    player_id: PlayerId::from("p5"),
                    is_captain: true,
                },
                TeamMember {
                    player_id: PlayerId::from("p6"),
                    is_captain: false,
                },
            ],
        );
        let h = harness_with(MockNotifier::new(), directory);
        let id = group(&h, &[]).await;
        short_season(&h, &id, SeasonScope::Team).await;

        // B and C both finish on 3 points; C has the better goal difference
        let team = |team: &str, player: &str, goals: u32| {
            MatchSide::new(vec![RosterEntry::new(player, goals, 0)]).with_team(team)
        };
        for submission in [
            MatchSubmission::new(team("b", "p3", 1), team("a", "p1", 0)),
            MatchSubmission::new(team("c", "p5", 3), team("a", "p2", 0)),
        ] {
            h.engine.record_match(&id, submission).await.unwrap();
        }

        h.clock.advance(Duration::minutes(2));
        let FinalizeOutcome::Finalized(report) = h.engine.finalize_season(&id).await.unwrap()
        else {
            panic!("expected finalization");
        };
        let champion = report.champion.unwrap();
        assert_eq!(champion.id.as_str(), "c");
        assert_eq!(champion.goal_diff, Some(3));
        assert_eq!(champion.points, 3.0);
        assert_eq!(report.notifications.delivered, 2);

        let doc = h.engine.get_group(&id).await.unwrap();
        assert!(doc.team_ranking.values().all(|t| t.games_played() == 0));
        assert_eq!(
            doc.team_player_stats[&TeamId::from("c")][&PlayerId::from("p5")],
            PerTeamPlayerStats::default()
        );
        // Player ranking is not part of a team season's reset
        assert_eq!(doc.ranking[&PlayerId::from("p5")].games_played, 1);
    }

    /// Fails the first `failures` merges with a version conflict.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn read(&self, id: &GroupId) -> Result<Option<GroupDocument>, StorageError> {
            self.inner.read(id).await
        }

        async fn create(&self, doc: &GroupDocument) -> Result<(), StorageError> {
            self.inner.create(doc).await
        }

        async fn merge(
            &self,
            id: &GroupId,
            expected_version: u64,
            patch: &FieldPatch,
        ) -> Result<u64, StorageError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StorageError::VersionConflict {
                    id: id.clone(),
                    expected: expected_version,
                    actual: expected_version + 1,
                });
            }
            self.inner.merge(id, expected_version, patch).await
        }

        async fn subscribe(
            &self,
            id: &GroupId,
        ) -> Result<watch::Receiver<Option<GroupDocument>>, StorageError> {
            self.inner.subscribe(id).await
        }

        async fn list(&self) -> Result<Vec<GroupId>, StorageError> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_finalize_gives_up_after_persistent_conflicts() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(0),
        });
        let notifier = Arc::new(MockNotifier::new());
        let clock = Arc::new(crate::engine::ManualClock::new(t0()));
        let engine = SeasonEngine::new(store.clone(), Arc::new(MemoryMatchLog::new()), notifier.clone())
            .with_clock(clock.clone())
            .with_retry_policy(crate::engine::RetryPolicy {
                max_retries: 2,
                initial_delay_ms: 1,
                backoff_multiplier: 1.0,
            });
        let id = engine
            .create_group(None, "G", PlayerId::from("p1"), vec![])
            .await
            .unwrap()
            .id;
        engine
            .start_season(&id, SeasonScope::Group, "S", None, Some(t0() + Duration::seconds(1)))
            .await
            .unwrap();
        clock.advance(Duration::seconds(2));

        store.failures.store(10, Ordering::SeqCst);
        let err = engine.finalize_season(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Contention { attempts: 3, .. }));
        assert!(notifier.sent().is_empty());
        assert_eq!(
            store.read(&id).await.unwrap().unwrap().season.unwrap().status,
            SeasonStatus::Active
        );

        // One transient conflict is absorbed by the retry
        store.failures.store(1, Ordering::SeqCst);
        assert!(matches!(
            engine.finalize_season(&id).await.unwrap(),
            FinalizeOutcome::Finalized(_)
        ));
    }
}
