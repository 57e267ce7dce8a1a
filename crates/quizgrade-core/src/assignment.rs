//! Quiz-test assignment and the student's view of a set.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::EngineConfig;
use crate::error::GradingError;
use crate::grading::SelectQuiz;
use crate::model::{Quiz, QuizKind, QuizOption, ShuffledQuizSet};
use crate::shuffle::{generate_seed, shuffled};
use crate::traits::Store;

/// A quiz as shown to the student: no correctness information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentedQuiz {
    pub external_id: String,
    pub kind: QuizKind,
    pub question: String,
    /// 1-based position within the set.
    pub position: i32,
    pub options: Vec<PresentedOption>,
    pub point: u32,
    /// Whether the set's history already holds a result for this quiz.
    pub answered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentedOption {
    /// The index a student submits to pick this option.
    pub index: u32,
    pub label: String,
    pub text: String,
}

impl PresentedOption {
    fn from_options(options: &[QuizOption]) -> Vec<Self> {
        options
            .iter()
            .enumerate()
            .map(|(pos, o)| PresentedOption {
                index: pos as u32 + 1,
                label: o.label.clone(),
                text: o.content.text(),
            })
            .collect()
    }
}

/// Creates shuffled quiz sets and renders them for students.
pub struct AssignmentService {
    store: Arc<dyn Store>,
    config: EngineConfig,
}

impl AssignmentService {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Assign the learning objective's quiz set to a student.
    pub async fn create_quiz_test(
        &self,
        lo_id: &str,
        student_id: &str,
    ) -> Result<ShuffledQuizSet, GradingError> {
        if lo_id.is_empty() || student_id.is_empty() {
            return Err(GradingError::InvalidArgument(
                "lo_id and student_id are required".into(),
            ));
        }

        let quiz_set = self
            .store
            .get_quiz_set_by_lo_id(lo_id)
            .await
            .map_err(GradingError::lookup("GetQuizSetByLoId"))?;
        if quiz_set.quiz_external_ids.is_empty() {
            return Err(GradingError::FailedPrecondition(format!(
                "learning objective {lo_id} has no quizzes"
            )));
        }

        let (seed, quiz_external_ids) =
            self.choose_seed(lo_id, &quiz_set.quiz_external_ids).await?;

        let now = Utc::now();
        let set = ShuffledQuizSet {
            id: Uuid::new_v4().to_string(),
            lo_id: lo_id.to_string(),
            student_id: student_id.to_string(),
            quiz_external_ids,
            random_seed: seed.to_string(),
            submission_history: Default::default(),
            total_correctness: 0,
            original_shuffle_quiz_set_id: None,
            created_at: now,
            updated_at: now,
        };

        self.store
            .create_shuffled_quiz_set(&set)
            .await
            .map_err(GradingError::storage("CreateShuffledQuizSet"))?;
        tracing::info!(set_id = %set.id, lo_id, student_id, "created quiz test");
        Ok(set)
    }

    /// Create a retry of `original_set_id` holding only the quizzes that were
    /// not accepted.
    pub async fn create_retry_quiz_test(
        &self,
        original_set_id: &str,
    ) -> Result<ShuffledQuizSet, GradingError> {
        let original = self
            .store
            .get_shuffled_quiz_set(original_set_id)
            .await
            .map_err(GradingError::lookup("Get"))?;

        let missed: Vec<String> = original
            .quiz_external_ids
            .iter()
            .filter(|id| {
                !original
                    .submission_history
                    .get(*id)
                    .is_some_and(|r| r.is_accepted)
            })
            .cloned()
            .collect();
        if missed.is_empty() {
            return Err(GradingError::FailedPrecondition(format!(
                "every quiz of set {original_set_id} is already accepted"
            )));
        }

        // Positions differ from the original set; pick a seed for the new ones.
        let (seed, quiz_external_ids) = self.choose_seed(&original.lo_id, &missed).await?;

        let now = Utc::now();
        let set = ShuffledQuizSet {
            id: Uuid::new_v4().to_string(),
            lo_id: original.lo_id.clone(),
            student_id: original.student_id.clone(),
            quiz_external_ids,
            random_seed: seed.to_string(),
            submission_history: original.submission_history.clone(),
            total_correctness: original.total_correctness,
            original_shuffle_quiz_set_id: Some(original.id.clone()),
            created_at: now,
            updated_at: now,
        };

        self.store
            .create_shuffled_quiz_set(&set)
            .await
            .map_err(GradingError::storage("CreateShuffledQuizSet"))?;
        tracing::info!(
            set_id = %set.id,
            original_set_id,
            quizzes = set.quiz_external_ids.len(),
            "created retry quiz test"
        );
        Ok(set)
    }

    /// Try up to `seed_attempts` random seeds for a set holding `quiz_ids`,
    /// stopping at the first that visibly reorders every select-type quiz.
    /// Returns the seed and the set's quiz order under it.
    async fn choose_seed(
        &self,
        lo_id: &str,
        quiz_ids: &[String],
    ) -> Result<(i64, Vec<String>), GradingError> {
        let quizzes = self
            .store
            .get_by_external_ids(quiz_ids, lo_id)
            .await
            .map_err(GradingError::storage("GetQuizzesByExternalIds"))?;
        let by_id: HashMap<&str, &Quiz> =
            quizzes.iter().map(|q| (q.external_id.as_str(), q)).collect();

        let attempts = self.config.seed_attempts.max(1);
        let mut chosen = None;
        for attempt in 1..=attempts {
            let seed = generate_seed();
            let ids = if self.config.shuffle_quiz_order {
                shuffled(quiz_ids, seed, 0)
            } else {
                quiz_ids.to_vec()
            };
            let reordered = every_select_quiz_reordered(&ids, &by_id, seed);
            chosen = Some((seed, ids));
            if reordered {
                tracing::debug!(lo_id, attempt, "picked seed");
                break;
            }
            if attempt == attempts {
                tracing::warn!(
                    lo_id,
                    attempts,
                    "no seed reordered every quiz; keeping the last one"
                );
            }
        }
        chosen.ok_or_else(|| GradingError::Internal("no seed generated".into()))
    }

    /// The quizzes of a set in set order, with select-type options in the
    /// order grading expects.
    pub async fn present(&self, set_id: &str) -> Result<Vec<PresentedQuiz>, GradingError> {
        let set = self
            .store
            .get_shuffled_quiz_set(set_id)
            .await
            .map_err(GradingError::lookup("Get"))?;
        let quizzes = self
            .store
            .get_by_external_ids(&set.quiz_external_ids, &set.lo_id)
            .await
            .map_err(GradingError::storage("GetQuizzesByExternalIds"))?;
        let by_id: HashMap<&str, &Quiz> =
            quizzes.iter().map(|q| (q.external_id.as_str(), q)).collect();

        let mut presented = Vec::with_capacity(set.quiz_external_ids.len());
        for (pos, external_id) in set.quiz_external_ids.iter().enumerate() {
            let Some(quiz) = by_id.get(external_id.as_str()) else {
                tracing::warn!(set_id, quiz = %external_id, "quiz missing from bank; skipped");
                continue;
            };
            let options = if quiz.kind.is_select() {
                SelectQuiz::new(quiz, set_id, self.store.as_ref())
                    .shuffled_options()
                    .await?
            } else {
                quiz.options.clone()
            };

            presented.push(PresentedQuiz {
                external_id: quiz.external_id.clone(),
                kind: quiz.kind.clone(),
                question: quiz.question.text(),
                position: pos as i32 + 1,
                options: PresentedOption::from_options(&options),
                point: quiz.point,
                answered: set.submission_history.contains_key(external_id),
            });
        }

        Ok(presented)
    }
}

/// Whether every select-type quiz with two or more options is shown in an
/// order different from its authored one.
fn every_select_quiz_reordered(ids: &[String], by_id: &HashMap<&str, &Quiz>, seed: i64) -> bool {
    ids.iter().enumerate().all(|(pos, id)| {
        let Some(quiz) = by_id.get(id.as_str()) else {
            return true;
        };
        let n = quiz.options.len();
        if !quiz.kind.is_select() || n < 2 {
            return true;
        }
        let identity: Vec<usize> = (0..n).collect();
        shuffled(&identity, seed, pos as i32 + 1) != identity
    })
}
