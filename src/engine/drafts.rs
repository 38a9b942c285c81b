//! The in-progress match of a Group.
//!
//! A Group holds at most one draft in its `draftMatch` field. Finishing a draft runs the
//! normal aggregation and clears the draft in the same write, so a draft is counted at
//! most once even when two clients press "finish" together.

use tracing::info;
use uuid::Uuid;

use super::{EngineError, MatchReceipt, Plan, SeasonEngine};
use crate::models::{DraftMatch, GroupId, MatchSubmission, FIELD_DRAFT};
use crate::storage::FieldPatch;

impl SeasonEngine {
    /// Create or replace the draft. Replacing keeps the draft's id and creation time.
    pub async fn save_draft(
        &self,
        group_id: &GroupId,
        submission: MatchSubmission,
    ) -> Result<DraftMatch, EngineError> {
        let now = self.clock.now();
        let committed = self
            .commit(group_id, |doc| {
                let draft = match &doc.draft_match {
                    Some(existing) => DraftMatch {
                        id: existing.id,
                        created_at: existing.created_at,
                        updated_at: now,
                        submission: submission.clone(),
                    },
                    None => DraftMatch {
                        id: Uuid::new_v4(),
                        created_at: now,
                        updated_at: now,
                        submission: submission.clone(),
                    },
                };
                let mut patch = FieldPatch::new();
                patch.set(FIELD_DRAFT, &draft)?;
                Ok(Plan::Write(patch, draft))
            })
            .await?;

        info!("Saved draft {} in group {}", committed.value.id, group_id);
        Ok(committed.value)
    }

    /// The current draft, if any.
    pub async fn load_draft(&self, group_id: &GroupId) -> Result<Option<DraftMatch>, EngineError> {
        Ok(self.get_group(group_id).await?.draft_match)
    }

    /// Drop the draft without recording it. Returns whether there was one.
    pub async fn discard_draft(&self, group_id: &GroupId) -> Result<bool, EngineError> {
        let committed = self
            .commit(group_id, |doc| {
                if doc.draft_match.is_none() {
                    return Ok(Plan::Skip(false));
                }
                let mut patch = FieldPatch::new();
                patch.set(FIELD_DRAFT, &serde_json::Value::Null)?;
                Ok(Plan::Write(patch, true))
            })
            .await?;

        if committed.value {
            info!("Discarded draft in group {}", group_id);
        }
        Ok(committed.value)
    }

    /// Record the current draft as a finished match.
    ///
    /// With `draft_id`, only that draft is finished; a different or missing draft is
    /// `DraftNotFound`.
    pub async fn finish_draft(
        &self,
        group_id: &GroupId,
        draft_id: Option<Uuid>,
    ) -> Result<MatchReceipt, EngineError> {
        let draft = self
            .load_draft(group_id)
            .await?
            .ok_or_else(|| EngineError::DraftNotFound(group_id.to_string()))?;
        if let Some(expected) = draft_id {
            if expected != draft.id {
                return Err(EngineError::DraftNotFound(expected.to_string()));
            }
        }

        self.commit_match(group_id, draft.submission, Some(draft.id))
            .await
    }
}
