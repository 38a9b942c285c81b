//! Season start, edit and activation.

use chrono::{DateTime, Utc};
use tracing::info;

use super::{EngineError, Plan, SeasonEngine};
use crate::models::{GroupId, Season, SeasonEdit, SeasonScope, SeasonStatus, FIELD_SEASON};
use crate::storage::FieldPatch;

impl SeasonEngine {
    /// Start (or restart) a season of `scope`.
    ///
    /// `start_time` defaults to now and `end_time` to the configured season length after
    /// the start. Rankings are left untouched; they are reset when a season is finalized.
    pub async fn start_season(
        &self,
        group_id: &GroupId,
        scope: SeasonScope,
        name: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Season, EngineError> {
        let now = self.clock.now();
        let start = start_time.unwrap_or(now);
        let end = match end_time {
            Some(end) => end,
            None => Season::end_after(start, self.season_length)?,
        };
        let season = Season::start(scope, name, start, end, now)?;

        self.commit(group_id, |doc| {
            Season::ensure_can_start(doc.season.as_ref(), scope)?;
            let mut patch = FieldPatch::new();
            patch.set(FIELD_SEASON, &season)?;
            Ok(Plan::Write(patch, ()))
        })
        .await?;

        info!(
            "Started {} season {:?} in group {} ({} to {}, {:?})",
            scope, season.name, group_id, season.start_time, season.end_time, season.status
        );
        Ok(season)
    }

    /// Edit the name or window of a running season. Status is left as it is.
    pub async fn edit_season(
        &self,
        group_id: &GroupId,
        edit: SeasonEdit,
    ) -> Result<Season, EngineError> {
        let now = self.clock.now();
        let committed = self
            .commit(group_id, |doc| {
                let mut season = doc
                    .season
                    .clone()
                    .ok_or_else(|| EngineError::NoSeason(doc.id.clone()))?;
                season.apply_edit(&edit, now)?;

                let mut patch = FieldPatch::new();
                patch.set(&format!("{}.name", FIELD_SEASON), &season.name)?;
                patch.set(&format!("{}.startTime", FIELD_SEASON), &season.start_time)?;
                patch.set(&format!("{}.endTime", FIELD_SEASON), &season.end_time)?;
                Ok(Plan::Write(patch, season))
            })
            .await?;

        info!(
            "Edited season in group {}: {:?} ends {}",
            group_id, committed.value.name, committed.value.end_time
        );
        Ok(committed.value)
    }

    /// Move an awaiting season to active once its start time has passed.
    ///
    /// Returns whether this call made the transition.
    pub async fn activate_season(&self, group_id: &GroupId) -> Result<bool, EngineError> {
        let now = self.clock.now();
        let committed = self
            .commit(group_id, |doc| match &doc.season {
                Some(season) if season.should_activate(now) => {
                    let mut patch = FieldPatch::new();
                    patch.set(&format!("{}.status", FIELD_SEASON), &SeasonStatus::Active)?;
                    Ok(Plan::Write(patch, true))
                }
                _ => Ok(Plan::Skip(false)),
            })
            .await?;

        if committed.value {
            info!("Season in group {} is now active", group_id);
        }
        Ok(committed.value)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::engine::test_support::*;
    use crate::models::SeasonError;

    #[tokio::test]
    async fn test_start_season_defaults() {
        let h = harness();
        let id = group(&h, &[]).await;

        let season = h
            .engine
            .start_season(&id, SeasonScope::Group, "Summer", None, None)
            .await
            .unwrap();
        assert_eq!(season.status, SeasonStatus::Active);
        assert_eq!(season.start_time, t0());
        assert_eq!(season.end_time, t0() + Duration::days(7));

        let doc = h.engine.get_group(&id).await.unwrap();
        assert_eq!(doc.season, Some(season));
    }

    #[tokio::test]
    async fn test_start_season_in_future_awaits() {
        let h = harness();
        let id = group(&h, &[]).await;

        let season = h
            .engine
            .start_season(
                &id,
                SeasonScope::Team,
                "Cup",
                Some(t0() + Duration::hours(1)),
                Some(t0() + Duration::hours(3)),
            )
            .await
            .unwrap();
        assert_eq!(season.status, SeasonStatus::Awaiting);

        assert!(!h.engine.activate_season(&id).await.unwrap());
        h.clock.advance(Duration::hours(1));
        assert!(h.engine.activate_season(&id).await.unwrap());
        assert!(!h.engine.activate_season(&id).await.unwrap());

        let doc = h.engine.get_group(&id).await.unwrap();
        assert_eq!(doc.season.unwrap().status, SeasonStatus::Active);
    }

    #[tokio::test]
    async fn test_cross_scope_start_is_rejected() {
        let h = harness();
        let id = group(&h, &[]).await;
        h.engine
            .start_season(&id, SeasonScope::Group, "Players", None, None)
            .await
            .unwrap();

        let err = h
            .engine
            .start_season(&id, SeasonScope::Team, "Teams", None, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(matches!(
            err,
            EngineError::Season(SeasonError::Conflict {
                active: SeasonScope::Group
            })
        ));

        let doc = h.engine.get_group(&id).await.unwrap();
        assert_eq!(doc.season.unwrap().scope, SeasonScope::Group);
    }

    #[tokio::test]
    async fn test_same_scope_start_restarts() {
        let h = harness();
        let id = group(&h, &[]).await;
        h.engine
            .start_season(&id, SeasonScope::Group, "First", None, None)
            .await
            .unwrap();
        h.clock.advance(Duration::days(1));

        let season = h
            .engine
            .start_season(&id, SeasonScope::Group, "Second", None, None)
            .await
            .unwrap();
        assert_eq!(season.name, "Second");
        assert_eq!(season.start_time, t0() + Duration::days(1));
    }

    #[tokio::test]
    async fn test_start_season_rejects_bad_window() {
        let h = harness();
        let id = group(&h, &[]).await;
        let err = h
            .engine
            .start_season(&id, SeasonScope::Group, "Bad", Some(t0()), Some(t0()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Season(SeasonError::InvalidBounds { .. })
        ));
        assert!(h.engine.get_group(&id).await.unwrap().season.is_none());
    }

    #[tokio::test]
    async fn test_start_season_past_calendar_end() {
        let h = harness();
        let id = group(&h, &[]).await;
        let start = chrono::DateTime::<chrono::Utc>::MAX_UTC - Duration::days(1);

        let err = h
            .engine
            .start_season(&id, SeasonScope::Group, "S", Some(start), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Season(SeasonError::LengthOutOfRange { .. })
        ));
        assert!(h.engine.get_group(&id).await.unwrap().season.is_none());
    }

    #[tokio::test]
    async fn test_edit_season() {
        let h = harness();
        let id = group(&h, &[]).await;
        h.engine
            .start_season(&id, SeasonScope::Group, "Summer", None, None)
            .await
            .unwrap();

        let edited = h
            .engine
            .edit_season(
                &id,
                SeasonEdit {
                    name: Some("Long Summer".into()),
                    end_time: Some(t0() + Duration::days(14)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.name, "Long Summer");
        assert_eq!(edited.status, SeasonStatus::Active);

        let doc = h.engine.get_group(&id).await.unwrap();
        assert_eq!(doc.season.unwrap().end_time, t0() + Duration::days(14));
    }

    #[tokio::test]
    async fn test_edit_without_season_or_after_expiry() {
        let h = harness();
        let id = group(&h, &[]).await;
        let err = h
            .engine
            .edit_season(&id, SeasonEdit::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSeason(_)));

        h.engine
            .start_season(&id, SeasonScope::Group, "Short", None, Some(t0() + Duration::minutes(1)))
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(2));
        let err = h
            .engine
            .edit_season(&id, SeasonEdit::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Season(SeasonError::Expired)));
    }
}
