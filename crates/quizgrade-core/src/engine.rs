//! Submission orchestration.
//!
//! A submission is validated, graded quiz by quiz, and then persisted in two
//! independently committed phases:
//!
//! 1. the grade results are merged into the set's submission history and the
//!    correctness counter is recomputed;
//! 2. if the set is now finished (or is a retry) its score is finalized into
//!    completeness tracking.
//!
//! A failure in phase 2 never undoes phase 1.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{GradingError, StoreError};
use crate::grading::Evaluator;
use crate::model::{GradeResult, Quiz, SubmitQuizAnswersRequest, SubmitQuizAnswersResponse};
use crate::scoring::{FinalizedScore, ScoreAggregator};
use crate::traits::{Store, Transaction};

/// Configuration for quiz-test assignment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Random seeds tried when creating a set, looking for one that visibly
    /// reorders every select-type quiz.
    pub seed_attempts: u32,
    /// Also shuffle the order of quizzes in a new set.
    pub shuffle_quiz_order: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed_attempts: 20,
            shuffle_quiz_order: false,
        }
    }
}

/// Grades submissions and records them against a [`Store`].
pub struct SubmissionEngine {
    store: Arc<dyn Store>,
}

impl SubmissionEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Grade and record a submission.
    ///
    /// Returns one [`GradeResult`] per submitted quiz, in request order.
    pub async fn submit(
        &self,
        request: &SubmitQuizAnswersRequest,
    ) -> Result<SubmitQuizAnswersResponse, GradingError> {
        self.submit_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`SubmissionEngine::submit`], but stops when `cancel` fires.
    ///
    /// Cancellation before phase 1 commits leaves no trace. Cancellation
    /// after it leaves the submission recorded but its score unfinalized.
    pub async fn submit_with_cancel(
        &self,
        request: &SubmitQuizAnswersRequest,
        cancel: &CancellationToken,
    ) -> Result<SubmitQuizAnswersResponse, GradingError> {
        validate_request(request)?;
        let set_id = request.set_id.as_str();

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(set_id, "submission cancelled before it was recorded");
                return Err(GradingError::Cancelled);
            }
            recorded = self.grade_and_record(request) => recorded,
        };
        let results = results.inspect_err(|e| {
            tracing::error!(set_id, code = ?e.code(), "submission failed: {e}");
        })?;

        if cancel.is_cancelled() {
            tracing::warn!(set_id, "submission cancelled after it was recorded; score not finalized");
            return Err(GradingError::Cancelled);
        }

        let finalized = match self.finalize(set_id).await {
            Ok(finalized) => finalized,
            Err(e) => {
                tracing::warn!(set_id, "submission recorded but score finalization failed: {e}");
                return Err(e);
            }
        };

        Ok(SubmitQuizAnswersResponse {
            results,
            score: finalized.map(|f| f.score),
        })
    }

    async fn grade_and_record(
        &self,
        request: &SubmitQuizAnswersRequest,
    ) -> Result<Vec<GradeResult>, GradingError> {
        let results = self.grade(request).await?;
        self.record(&request.set_id, &results).await?;
        Ok(results)
    }

    /// Grade every quiz of the request without writing anything.
    pub async fn grade(
        &self,
        request: &SubmitQuizAnswersRequest,
    ) -> Result<Vec<GradeResult>, GradingError> {
        let set_id = request.set_id.as_str();

        let lo_id = self
            .store
            .get_lo_id(set_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(what) => {
                    GradingError::InvalidArgument(format!("GetLoId: quiz set {what} not found"))
                }
                e => GradingError::storage("GetLoId")(e),
            })?;

        let quiz_ids: Vec<String> = request
            .quiz_answers
            .iter()
            .map(|qa| qa.quiz_id.clone())
            .collect();
        let quizzes = self
            .store
            .get_by_external_ids(&quiz_ids, &lo_id)
            .await
            .map_err(GradingError::storage("GetQuizzesByExternalIds"))?;
        let by_id: HashMap<&str, &Quiz> = quizzes
            .iter()
            .map(|q| (q.external_id.as_str(), q))
            .collect();

        let mut results = Vec::with_capacity(request.quiz_answers.len());
        for quiz_answer in &request.quiz_answers {
            let quiz = by_id.get(quiz_answer.quiz_id.as_str()).ok_or_else(|| {
                GradingError::FailedPrecondition(format!(
                    "quiz {} not found in learning objective {lo_id}",
                    quiz_answer.quiz_id
                ))
            })?;
            // Every kind must belong to the set, not only to its learning objective.
            let index = self
                .store
                .get_quiz_index(set_id, &quiz.external_id)
                .await
                .map_err(GradingError::lookup("GetQuizIndex"))?;
            if index.is_none() {
                return Err(GradingError::FailedPrecondition(format!(
                    "quiz {} is not part of quiz set {set_id}",
                    quiz.external_id
                )));
            }
            let evaluator = Evaluator::for_quiz(quiz, set_id, self.store.as_ref())?;
            results.push(evaluator.evaluate(&quiz_answer.answers).await?);
        }

        Ok(results)
    }

    /// Phase 1: merge results into the history and recompute the counter.
    async fn record(&self, set_id: &str, results: &[GradeResult]) -> Result<(), GradingError> {
        let tx = self
            .store
            .begin()
            .await
            .map_err(GradingError::storage("Begin"))?;

        if let Err(e) = write_history(tx.as_ref(), set_id, results).await {
            rollback(tx, set_id).await;
            return Err(e);
        }

        tx.commit().await.map_err(GradingError::storage("Commit"))?;
        tracing::info!(set_id, quizzes = results.len(), "recorded submission");
        Ok(())
    }

    /// Phase 2: finalize the score if the set is finished or a retry.
    pub async fn finalize(&self, set_id: &str) -> Result<Option<FinalizedScore>, GradingError> {
        let tx = self
            .store
            .begin()
            .await
            .map_err(GradingError::storage("Begin"))?;

        let finalized = match ScoreAggregator::finalize(tx.as_ref(), set_id).await {
            Ok(finalized) => finalized,
            Err(e) => {
                rollback(tx, set_id).await;
                return Err(e);
            }
        };

        tx.commit().await.map_err(GradingError::storage("Commit"))?;
        Ok(finalized)
    }
}

async fn write_history(
    tx: &dyn Transaction,
    set_id: &str,
    results: &[GradeResult],
) -> Result<(), GradingError> {
    tx.update_submission_history(set_id, results)
        .await
        .map_err(GradingError::storage("UpdateSubmissionHistory"))?;
    tx.update_total_correctness(set_id)
        .await
        .map_err(GradingError::storage("UpdateTotalCorrectness"))?;
    Ok(())
}

async fn rollback(tx: Box<dyn Transaction>, set_id: &str) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(set_id, "rollback failed: {e}");
    }
}

/// Check the request shape before touching storage.
pub fn validate_request(request: &SubmitQuizAnswersRequest) -> Result<(), GradingError> {
    if request.set_id.is_empty() {
        return Err(GradingError::InvalidArgument("set_id is required".into()));
    }

    for quiz_answer in &request.quiz_answers {
        if quiz_answer.quiz_id.is_empty() {
            return Err(GradingError::InvalidArgument("quiz_id is required".into()));
        }
        let Some(first) = quiz_answer.answers.first() else {
            return Err(GradingError::InvalidArgument(format!(
                "quiz {} has no answers",
                quiz_answer.quiz_id
            )));
        };
        if first.format().is_none() {
            return Err(GradingError::InvalidArgument(format!(
                "answer of quiz {} has no recognizable format",
                quiz_answer.quiz_id
            )));
        }
    }

    Ok(())
}
