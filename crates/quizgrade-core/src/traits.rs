//! Storage capabilities consumed by the engine.
//!
//! These async traits are implemented by `quizgrade-store`. The engine never
//! sees a concrete backend: it reads through a [`Store`] and writes through a
//! [`Transaction`] begun on it.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::{Completeness, GradeResult, Quiz, QuizSet, ShuffledQuizSet};

/// Shuffled quiz set records.
#[async_trait]
pub trait ShuffledQuizSetRepo: Send + Sync {
    async fn create_shuffled_quiz_set(&self, set: &ShuffledQuizSet) -> StoreResult<()>;

    async fn get_shuffled_quiz_set(&self, set_id: &str) -> StoreResult<ShuffledQuizSet>;

    /// The set's seed, an integer encoded as text.
    async fn get_seed(&self, set_id: &str) -> StoreResult<String>;

    /// 1-based position of a quiz within the set, `None` when the quiz is not
    /// part of it.
    async fn get_quiz_index(&self, set_id: &str, quiz_external_id: &str)
        -> StoreResult<Option<i32>>;

    async fn get_lo_id(&self, set_id: &str) -> StoreResult<String>;

    async fn get_student_id(&self, set_id: &str) -> StoreResult<String>;

    /// `(total_correctness, quiz count)` of the set.
    async fn get_score(&self, set_id: &str) -> StoreResult<(u32, u32)>;

    async fn is_finished(&self, set_id: &str) -> StoreResult<bool>;

    async fn get_external_ids_from_submission_history(
        &self,
        set_id: &str,
        accepted_only: bool,
    ) -> StoreResult<Vec<String>>;

    /// Merge `results` into the submission history, replacing earlier results
    /// for the same quizzes.
    async fn update_submission_history(
        &self,
        set_id: &str,
        results: &[GradeResult],
    ) -> StoreResult<()>;

    /// Recompute the running correctness counter from the history.
    async fn update_total_correctness(&self, set_id: &str) -> StoreResult<()>;
}

/// Published quizzes and problem sets. Read-only to the engine.
#[async_trait]
pub trait QuizRepo: Send + Sync {
    /// Quizzes with the given external ids tagged with `lo_id`. Unknown ids
    /// are skipped.
    async fn get_by_external_ids(&self, external_ids: &[String], lo_id: &str)
        -> StoreResult<Vec<Quiz>>;

    async fn get_quiz_set_by_lo_id(&self, lo_id: &str) -> StoreResult<QuizSet>;
}

/// Completeness tracking.
#[async_trait]
pub trait CompletenessRepo: Send + Sync {
    /// Record the first score; a no-op when one is already recorded.
    async fn upsert_first_quiz_completeness(
        &self,
        lo_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()>;

    /// Record the score if it beats the highest one so far.
    async fn upsert_highest_quiz_score(
        &self,
        lo_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()>;

    async fn get_completeness(
        &self,
        lo_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<Completeness>>;
}

/// An all-or-nothing unit of writes.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait Transaction: ShuffledQuizSetRepo + CompletenessRepo {
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// A backing store: direct reads plus transactions.
#[async_trait]
pub trait Store: ShuffledQuizSetRepo + QuizRepo + CompletenessRepo {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;
}
