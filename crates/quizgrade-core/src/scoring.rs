//! Score finalization for finished and retried quiz sets.

use std::collections::BTreeSet;

use tracing::info;

use crate::error::GradingError;
use crate::traits::{CompletenessRepo, ShuffledQuizSetRepo};

/// Percentage score, rounded down. An empty set scores 0.
pub fn compute_score(correct: u32, total: u32) -> f32 {
    if total == 0 {
        return 0.0;
    }
    ((u64::from(correct) * 100) / u64::from(total)) as f32
}

/// Denominator of a retry set: every quiz answered in the original set plus
/// every quiz of the retry, counted once.
pub fn retry_denominator(original_history_ids: &[String], retry_ids: &[String]) -> u32 {
    original_history_ids
        .iter()
        .chain(retry_ids)
        .collect::<BTreeSet<_>>()
        .len() as u32
}

/// A score written to completeness tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedScore {
    pub lo_id: String,
    pub student_id: String,
    pub correct: u32,
    pub total: u32,
    pub score: f32,
    pub is_retry: bool,
}

/// Decides whether a set is ready for scoring and records the score.
pub struct ScoreAggregator;

impl ScoreAggregator {
    /// Finalize the score of `set_id` if the set is finished or is a retry.
    ///
    /// Returns `Ok(None)` when there is nothing to finalize yet.
    pub async fn finalize<R>(repo: &R, set_id: &str) -> Result<Option<FinalizedScore>, GradingError>
    where
        R: ShuffledQuizSetRepo + CompletenessRepo + ?Sized,
    {
        let is_finished = repo
            .is_finished(set_id)
            .await
            .map_err(GradingError::storage("IsFinished"))?;
        let set = repo
            .get_shuffled_quiz_set(set_id)
            .await
            .map_err(GradingError::storage("Get"))?;

        let original_id = set.original_shuffle_quiz_set_id.as_deref();
        if !is_finished && original_id.is_none() {
            return Ok(None);
        }

        let student_id = repo
            .get_student_id(set_id)
            .await
            .map_err(GradingError::storage("GetStudentId"))?;
        let (correct, mut total) = repo
            .get_score(set_id)
            .await
            .map_err(GradingError::storage("GetScore"))?;

        if let Some(original_id) = original_id {
            let history_ids = repo
                .get_external_ids_from_submission_history(original_id, false)
                .await
                .map_err(GradingError::storage("GetExternalIdsFromSubmissionHistory"))?;
            total = retry_denominator(&history_ids, &set.quiz_external_ids);
        }

        let score = compute_score(correct, total);

        repo.upsert_first_quiz_completeness(&set.lo_id, &student_id, score)
            .await
            .map_err(GradingError::storage("UpsertFirstQuizCompleteness"))?;
        repo.upsert_highest_quiz_score(&set.lo_id, &student_id, score)
            .await
            .map_err(GradingError::storage("UpsertHighestQuizScore"))?;

        info!(
            set_id,
            lo_id = %set.lo_id,
            student_id = %student_id,
            correct,
            total,
            score,
            "finalized quiz score"
        );

        Ok(Some(FinalizedScore {
            lo_id: set.lo_id,
            student_id,
            correct,
            total,
            score,
            is_retry: original_id.is_some(),
        }))
    }
}
