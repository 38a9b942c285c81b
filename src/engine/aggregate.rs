//! Ranking aggregation for finished matches.
//!
//! A match becomes one field patch: one `ranking.<player>` entry per credited player,
//! and for team matches one `rankingTimes.<team>` entry per side plus the
//! `estatisticasTime.<team>.<player>` lines. Everything is folded from the document
//! the commit cycle read, so a retry after a conflict re-folds on fresh data.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{grown_members, Committed, EngineError, Plan, SeasonEngine};
use crate::models::{
    GroupDocument, GroupId, MatchId, MatchOutcome, MatchRecord, MatchSubmission, PlayerId,
    PlayerRankingEntry, Side, TeamId, TeamRankingEntry, FIELD_DRAFT, FIELD_MEMBERS,
    FIELD_RANKING, FIELD_TEAM_PLAYER_STATS, FIELD_TEAM_RANKING,
};
use crate::storage::{FieldPatch, StorageError};

/// Display names resolved before the commit, used only for entries created by this match.
#[derive(Debug, Default, Clone)]
pub struct ResolvedNames {
    players: HashMap<PlayerId, String>,
    teams: HashMap<TeamId, String>,
}

impl ResolvedNames {
    fn player(&self, id: &PlayerId) -> String {
        self.players
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn team(&self, id: &TeamId) -> String {
        self.teams.get(id).cloned().unwrap_or_else(|| id.to_string())
    }
}

/// Result of recording a match.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReceipt {
    pub match_id: MatchId,
    pub outcome: MatchOutcome,
    pub score_a: u32,
    pub score_b: u32,
    pub players_credited: usize,
    pub team_match: bool,
    pub version: u64,
    /// Whether the match log append succeeded.
    pub logged: bool,
}

/// Patch folding one match into every player entry it credits.
pub fn player_ranking_patch(
    doc: &GroupDocument,
    submission: &MatchSubmission,
    names: &ResolvedNames,
) -> Result<FieldPatch, StorageError> {
    let mut patch = FieldPatch::new();
    let tallies = submission.tallies();

    for (_, player_id, _, tally) in &tallies {
        let mut entry = doc
            .ranking
            .get(*player_id)
            .cloned()
            .unwrap_or_else(|| PlayerRankingEntry::new(names.player(player_id)));
        entry.record(*tally);
        patch.set(&format!("{}.{}", FIELD_RANKING, player_id), &entry)?;
    }

    if let Some(members) = grown_members(doc, tallies.iter().map(|(_, id, _, _)| *id)) {
        patch.set(FIELD_MEMBERS, &members)?;
    }

    Ok(patch)
}

/// Patch folding one team match into both team entries and the per-team player lines.
///
/// Empty for matches without a team on both sides.
pub fn team_ranking_patch(
    doc: &GroupDocument,
    submission: &MatchSubmission,
    names: &ResolvedNames,
) -> Result<FieldPatch, StorageError> {
    let mut patch = FieldPatch::new();
    let Some((team_a, team_b)) = submission.teams() else {
        return Ok(patch);
    };

    let outcome = submission.outcome();
    let score_a = submission.team_a.score();
    let score_b = submission.team_b.score();

    for (side, team_id, goals_for, goals_against) in [
        (Side::A, team_a, score_a, score_b),
        (Side::B, team_b, score_b, score_a),
    ] {
        let mut entry = doc
            .team_ranking
            .get(team_id)
            .cloned()
            .unwrap_or_else(|| TeamRankingEntry::new(team_id.clone(), names.team(team_id)));
        entry.record(goals_for, goals_against, outcome.result_for(side));
        patch.set(&format!("{}.{}", FIELD_TEAM_RANKING, team_id), &entry)?;
    }

    for (side, player_id, _, tally) in submission.tallies() {
        let team_id = match side {
            Side::A => team_a,
            Side::B => team_b,
        };
        let mut stats = doc
            .team_player_stats
            .get(team_id)
            .and_then(|players| players.get(player_id))
            .cloned()
            .unwrap_or_default();
        stats.record(tally);
        patch.set(
            &format!("{}.{}.{}", FIELD_TEAM_PLAYER_STATS, team_id, player_id),
            &stats,
        )?;
    }

    Ok(patch)
}

/// Both aggregations as a single patch.
pub fn match_patch(
    doc: &GroupDocument,
    submission: &MatchSubmission,
    names: &ResolvedNames,
) -> Result<FieldPatch, StorageError> {
    let mut patch = player_ranking_patch(doc, submission, names)?;
    patch.extend(team_ranking_patch(doc, submission, names)?);
    Ok(patch)
}

impl SeasonEngine {
    /// Record a finished match: update rankings in one write, then append it to the log.
    pub async fn record_match(
        &self,
        group_id: &GroupId,
        submission: MatchSubmission,
    ) -> Result<MatchReceipt, EngineError> {
        self.commit_match(group_id, submission, None).await
    }

    /// Shared path for direct submissions and finished drafts.
    ///
    /// With `draft_id`, the draft must still be the current one and is cleared in the
    /// same write.
    pub(crate) async fn commit_match(
        &self,
        group_id: &GroupId,
        submission: MatchSubmission,
        draft_id: Option<Uuid>,
    ) -> Result<MatchReceipt, EngineError> {
        submission.validate()?;
        let names = self.resolve_names(&submission).await;

        let Committed { version, .. } = self
            .commit(group_id, |doc| {
                if let Some(draft_id) = draft_id {
                    match &doc.draft_match {
                        Some(draft) if draft.id == draft_id => {}
                        _ => return Err(EngineError::DraftNotFound(draft_id.to_string())),
                    }
                }

                let mut patch = match_patch(doc, &submission, &names)?;
                if draft_id.is_some() {
                    patch.set(FIELD_DRAFT, &serde_json::Value::Null)?;
                }
                Ok(Plan::Write(patch, ()))
            })
            .await?;
        let version = version.unwrap_or_default();

        let timestamp = submission.played_at.unwrap_or_else(|| self.clock.now());
        let record = MatchRecord::from_submission(group_id, &submission, timestamp, version);
        let logged = match self.matches.append(&record).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Match {} was ranked in group {} but could not be logged: {}",
                    record.id, group_id, e
                );
                false
            }
        };

        let receipt = MatchReceipt {
            match_id: record.id,
            outcome: record.outcome,
            score_a: record.score_a,
            score_b: record.score_b,
            players_credited: submission.tallies().len(),
            team_match: submission.teams().is_some(),
            version,
            logged,
        };
        info!(
            "Recorded match {} in group {}: {}-{} ({} players credited)",
            receipt.match_id, group_id, receipt.score_a, receipt.score_b, receipt.players_credited
        );
        Ok(receipt)
    }

    /// Look up display names for everyone a match may create an entry for.
    async fn resolve_names(&self, submission: &MatchSubmission) -> ResolvedNames {
        let mut names = ResolvedNames::default();
        for (_, player_id, entry, _) in submission.tallies() {
            let name = self
                .display_name(player_id, entry.display_name.as_deref())
                .await;
            names.players.insert(player_id.clone(), name);
        }

        if let Some((team_a, team_b)) = submission.teams() {
            for team_id in [team_a, team_b] {
                match self.teams.team_name(team_id).await {
                    Ok(Some(name)) => {
                        names.teams.insert(team_id.clone(), name);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Team lookup for {} failed: {}", team_id, e),
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{StaticDirectory, TeamMember};
    use crate::engine::test_support::*;
    use crate::models::{MatchSide, MatchValidationError, RosterEntry};
    use crate::notify::MockNotifier;
    use crate::storage::{DocumentStore, MatchLog};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn pickup(a: Vec<RosterEntry>, b: Vec<RosterEntry>) -> MatchSubmission {
        MatchSubmission::new(MatchSide::new(a), MatchSide::new(b))
    }

    #[tokio::test]
    async fn test_record_match_scores_players() {
        let h = harness();
        let id = group(&h, &["p1", "p2"]).await;

        // p1: 2 goals, 1 assist, win -> 2*2 + 1 + 0.5 + 7 = 12.5
        let receipt = h
            .engine
            .record_match(
                &id,
                pickup(
                    vec![RosterEntry::new("p1", 2, 1)],
                    vec![RosterEntry::new("p2", 1, 0)],
                ),
            )
            .await
            .unwrap();
        assert_eq!(receipt.outcome, MatchOutcome::TeamA);
        assert_eq!(receipt.players_credited, 2);
        assert!(receipt.logged);
        assert!(!receipt.team_match);

        let doc = h.engine.get_group(&id).await.unwrap();
        let p1 = &doc.ranking[&PlayerId::from("p1")];
        assert_eq!(p1.points, 12.5);
        assert_eq!(p1.wins, 1);
        assert_eq!(p1.games_played, 1);

        // p2: 2 + 0.5 - 6 clamps to zero
        let p2 = &doc.ranking[&PlayerId::from("p2")];
        assert_eq!(p2.points, 0.0);
        assert_eq!(p2.losses, 1);
        assert!(doc.team_ranking.is_empty());
        assert_eq!(doc.version, receipt.version);

        let log = h.engine.list_matches(&id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, receipt.match_id);
    }

    #[tokio::test]
    async fn test_record_match_adds_unknown_players_as_members() {
        let h = harness_with(
            MockNotifier::new(),
            StaticDirectory::new().with_player("p7", "Sete"),
        );
        let id = group(&h, &[]).await;

        h.engine
            .record_match(
                &id,
                pickup(
                    vec![RosterEntry::new("p7", 0, 0)],
                    vec![RosterEntry::new("owner", 0, 0)],
                ),
            )
            .await
            .unwrap();

        let doc = h.engine.get_group(&id).await.unwrap();
        assert!(doc.is_member(&PlayerId::from("p7")));
        assert_eq!(doc.ranking[&PlayerId::from("p7")].display_name, "Sete");
        assert_eq!(doc.ranking[&PlayerId::from("p7")].draws, 1);
    }

    #[tokio::test]
    async fn test_placeholders_count_toward_score_only() {
        let h = harness();
        let id = group(&h, &["p1", "p2"]).await;

        let receipt = h
            .engine
            .record_match(
                &id,
                pickup(
                    vec![RosterEntry::new("p1", 0, 0), RosterEntry::placeholder("Guest", 2)],
                    vec![RosterEntry::new("p2", 1, 0)],
                ),
            )
            .await
            .unwrap();

        assert_eq!(receipt.score_a, 2);
        assert_eq!(receipt.players_credited, 2);
        let doc = h.engine.get_group(&id).await.unwrap();
        assert_eq!(doc.ranking.len(), 3);
        assert_eq!(doc.ranking[&PlayerId::from("p1")].wins, 1);
    }

    #[tokio::test]
    async fn test_invalid_match_writes_nothing() {
        let h = harness();
        let id = group(&h, &["p1"]).await;
        let before = h.engine.get_group(&id).await.unwrap();

        let err = h
            .engine
            .record_match(&id, pickup(vec![RosterEntry::new("p1", 1, 0)], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidMatch(MatchValidationError::EmptyRoster("B"))
        ));

        let after = h.engine.get_group(&id).await.unwrap();
        assert_eq!(before.version, after.version);
        assert!(h.engine.list_matches(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_goal_counts_are_rejected() {
        let h = harness();
        let id = group(&h, &["a", "b", "p2"]).await;
        let before = h.engine.get_group(&id).await.unwrap();

        let err = h
            .engine
            .record_match(
                &id,
                pickup(
                    vec![RosterEntry::new("a", u32::MAX, 0), RosterEntry::new("b", 1, 0)],
                    vec![RosterEntry::new("p2", 0, 0)],
                ),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidMatch(MatchValidationError::OutOfRange { side: "A", .. })
        ));

        let after = h.engine.get_group(&id).await.unwrap();
        assert_eq!(before.version, after.version);
        assert!(h.engine.list_matches(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_team_match_updates_both_rankings() {
        let directory = StaticDirectory::new().with_team(
            "reds",
            "Reds",
            vec![TeamMember {
                player_id: PlayerId::from("p1"),
                is_captain: true,
            }],
        );
        let h = harness_with(MockNotifier::new(), directory);
        let id = group(&h, &["p1", "p2"]).await;

        let submission = MatchSubmission::new(
            MatchSide::new(vec![RosterEntry::new("p1", 3, 0)]).with_team("reds"),
            MatchSide::new(vec![RosterEntry::new("p2", 1, 0)]).with_team("blues"),
        );
        let receipt = h.engine.record_match(&id, submission).await.unwrap();
        assert!(receipt.team_match);

        let doc = h.engine.get_group(&id).await.unwrap();
        let reds = &doc.team_ranking[&TeamId::from("reds")];
        assert_eq!(reds.display_name, "Reds");
        assert_eq!(reds.wins, 1);
        assert_eq!(reds.goal_diff, 2);
        assert_eq!(reds.points, 3);

        let blues = &doc.team_ranking[&TeamId::from("blues")];
        assert_eq!(blues.display_name, "blues");
        assert_eq!(blues.losses, 1);
        assert_eq!(blues.goal_diff, -2);
        assert_eq!(blues.points, 0);

        let line = &doc.team_player_stats[&TeamId::from("reds")][&PlayerId::from("p1")];
        assert_eq!(line.goals, 3);
        assert_eq!(line.games_played, 1);

        // Player ranking runs for team matches too
        assert_eq!(doc.ranking[&PlayerId::from("p1")].wins, 1);
    }

    #[tokio::test]
    async fn test_matches_accumulate() {
        let h = harness();
        let id = group(&h, &["p1", "p2"]).await;

        for _ in 0..3 {
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
        }

        let doc = h.engine.get_group(&id).await.unwrap();
        let p1 = &doc.ranking[&PlayerId::from("p1")];
        assert_eq!(p1.games_played, 3);
        assert_eq!(p1.points, 3.0 * 9.5);
        assert_eq!(h.engine.list_matches(&id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_matches_are_not_lost() {
        let h = harness();
        let id = group(&h, &["p1", "p2"]).await;

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let engine = h.engine.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                engine
                    .record_match(
                        &id,
                        pickup(
                            vec![RosterEntry::new("p1", 0, 1)],
                            vec![RosterEntry::new("p2", 0, 0)],
                        ),
                    )
                    .await
            }));
        }
        let mut succeeded = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        let doc = h.engine.get_group(&id).await.unwrap();
        assert_eq!(doc.ranking[&PlayerId::from("p1")].games_played, succeeded);
    }

    struct BrokenLog;

    #[async_trait]
    impl MatchLog for BrokenLog {
        async fn append(&self, _record: &MatchRecord) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk full")))
        }

        async fn list(&self, _group_id: &GroupId) -> Result<Vec<MatchRecord>, StorageError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_log_failure_keeps_ranking() {
        let store = Arc::new(crate::storage::MemoryStore::new());
        let engine = SeasonEngine::new(
            store.clone(),
            Arc::new(BrokenLog),
            Arc::new(MockNotifier::new()),
        );
        let id = engine
            .create_group(None, "G", PlayerId::from("p1"), vec![PlayerId::from("p2")])
            .await
            .unwrap()
            .id;

        let receipt = engine
            .record_match(
                &id,
                pickup(
                    vec![RosterEntry::new("p1", 1, 0)],
                    vec![RosterEntry::new("p2", 0, 0)],
                ),
            )
            .await
            .unwrap();
        assert!(!receipt.logged);

        let doc = store.read(&id).await.unwrap().unwrap();
        assert_eq!(doc.ranking[&PlayerId::from("p1")].wins, 1);
    }
}
