//! In-memory transactional store.
//!
//! All state lives in one [`Snapshot`] behind an async mutex. A transaction
//! holds the mutex for its whole lifetime and works on a staged copy, which
//! replaces the shared state on commit and is discarded otherwise. Writes to
//! the same store are therefore serialized.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use quizgrade_core::error::{StoreError, StoreResult};
use quizgrade_core::model::{Completeness, GradeResult, Quiz, QuizSet, ShuffledQuizSet};
use quizgrade_core::parser::QuizBank;
use quizgrade_core::traits::{CompletenessRepo, QuizRepo, ShuffledQuizSetRepo, Store, Transaction};

/// Everything the store holds, as persisted to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Published quizzes by external id.
    #[serde(default)]
    pub quizzes: BTreeMap<String, Quiz>,
    /// Quiz sets by learning objective id.
    #[serde(default)]
    pub quiz_sets: BTreeMap<String, QuizSet>,
    /// Shuffled quiz sets by id.
    #[serde(default)]
    pub shuffled_quiz_sets: BTreeMap<String, ShuffledQuizSet>,
    #[serde(default)]
    pub completeness: Vec<Completeness>,
}

impl Snapshot {
    fn set(&self, set_id: &str) -> StoreResult<&ShuffledQuizSet> {
        self.shuffled_quiz_sets
            .get(set_id)
            .ok_or_else(|| StoreError::NotFound(format!("shuffled quiz set {set_id}")))
    }

    fn set_mut(&mut self, set_id: &str) -> StoreResult<&mut ShuffledQuizSet> {
        self.shuffled_quiz_sets
            .get_mut(set_id)
            .ok_or_else(|| StoreError::NotFound(format!("shuffled quiz set {set_id}")))
    }

    fn completeness_mut(&mut self, lo_id: &str, student_id: &str) -> &mut Completeness {
        let pos = self
            .completeness
            .iter()
            .position(|c| c.lo_id == lo_id && c.student_id == student_id);
        let pos = match pos {
            Some(pos) => pos,
            None => {
                self.completeness.push(Completeness {
                    lo_id: lo_id.to_string(),
                    student_id: student_id.to_string(),
                    first_quiz_score: None,
                    highest_quiz_score: None,
                    updated_at: Utc::now(),
                });
                self.completeness.len() - 1
            }
        };
        &mut self.completeness[pos]
    }

    /// Add a bank's quizzes and quiz sets, replacing entries with the same
    /// external id or learning objective.
    pub fn import_bank(&mut self, bank: &QuizBank) {
        for quiz in &bank.quizzes {
            self.quizzes.insert(quiz.external_id.clone(), quiz.clone());
        }
        for set in &bank.quiz_sets {
            self.quiz_sets.insert(set.lo_id.clone(), set.clone());
        }
    }
}

/// Operations that fail on demand, for exercising error paths.
#[derive(Debug, Default)]
struct Failpoints(Mutex<HashSet<String>>);

impl Failpoints {
    fn ops(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, op: &str) -> StoreResult<()> {
        if self.ops().contains(op) {
            return Err(StoreError::Backend(format!("injected failure in {op}")));
        }
        Ok(())
    }
}

/// A [`Store`] kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<tokio::sync::Mutex<Snapshot>>,
    failpoints: Arc<Failpoints>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: Arc::new(tokio::sync::Mutex::new(snapshot)),
            failpoints: Arc::default(),
        }
    }

    /// Load a snapshot file; a missing file yields an empty store.
    pub fn load_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no snapshot at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot from {}", path.display()))?;
        let snapshot: Snapshot =
            serde_json::from_str(&content).context("failed to parse snapshot JSON")?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the committed state to a snapshot file.
    pub async fn save_json(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        let json = serde_json::to_string_pretty(&snapshot).context("failed to serialize snapshot")?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
        Ok(())
    }

    /// A copy of the committed state.
    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.clone()
    }

    pub async fn import_bank(&self, bank: &QuizBank) {
        self.state.lock().await.import_bank(bank);
    }

    /// Make every later call of `op` fail with a backend error. `op` is the
    /// method name, or `"begin"` / `"commit"`.
    pub fn fail_on(&self, op: &str) {
        self.failpoints.ops().insert(op.to_string());
    }

    pub fn clear_failpoints(&self) {
        self.failpoints.ops().clear();
    }

    async fn transaction(&self) -> MemoryTransaction {
        let guard = self.state.clone().lock_owned().await;
        MemoryTransaction {
            staged: Mutex::new(Snapshot::clone(&guard)),
            guard,
            failpoints: self.failpoints.clone(),
        }
    }
}

/// A transaction on a [`MemoryStore`].
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Snapshot>,
    staged: Mutex<Snapshot>,
    failpoints: Arc<Failpoints>,
}

impl MemoryTransaction {
    fn read<T>(&self, op: &str, f: impl FnOnce(&Snapshot) -> StoreResult<T>) -> StoreResult<T> {
        self.failpoints.check(op)?;
        let staged = self.staged.lock().unwrap_or_else(|p| p.into_inner());
        f(&staged)
    }

    fn write<T>(&self, op: &str, f: impl FnOnce(&mut Snapshot) -> StoreResult<T>) -> StoreResult<T> {
        self.failpoints.check(op)?;
        let mut staged = self.staged.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut staged)
    }

    fn commit_now(self) -> StoreResult<()> {
        self.failpoints.check("commit")?;
        let MemoryTransaction { mut guard, staged, .. } = self;
        *guard = staged.into_inner().unwrap_or_else(|p| p.into_inner());
        Ok(())
    }
}

#[async_trait]
impl ShuffledQuizSetRepo for MemoryTransaction {
    async fn create_shuffled_quiz_set(&self, set: &ShuffledQuizSet) -> StoreResult<()> {
        self.write("create_shuffled_quiz_set", |s| {
            if s.shuffled_quiz_sets.contains_key(&set.id) {
                return Err(StoreError::Backend(format!(
                    "shuffled quiz set {} already exists",
                    set.id
                )));
            }
            s.shuffled_quiz_sets.insert(set.id.clone(), set.clone());
            Ok(())
        })
    }

    async fn get_shuffled_quiz_set(&self, set_id: &str) -> StoreResult<ShuffledQuizSet> {
        self.read("get_shuffled_quiz_set", |s| s.set(set_id).cloned())
    }

    async fn get_seed(&self, set_id: &str) -> StoreResult<String> {
        self.read("get_seed", |s| Ok(s.set(set_id)?.random_seed.clone()))
    }

    async fn get_quiz_index(
        &self,
        set_id: &str,
        quiz_external_id: &str,
    ) -> StoreResult<Option<i32>> {
        self.read("get_quiz_index", |s| {
            Ok(s.set(set_id)?.quiz_index(quiz_external_id))
        })
    }

    async fn get_lo_id(&self, set_id: &str) -> StoreResult<String> {
        self.read("get_lo_id", |s| Ok(s.set(set_id)?.lo_id.clone()))
    }

    async fn get_student_id(&self, set_id: &str) -> StoreResult<String> {
        self.read("get_student_id", |s| Ok(s.set(set_id)?.student_id.clone()))
    }

    async fn get_score(&self, set_id: &str) -> StoreResult<(u32, u32)> {
        self.read("get_score", |s| {
            let set = s.set(set_id)?;
            Ok((set.total_correctness, set.quiz_external_ids.len() as u32))
        })
    }

    async fn is_finished(&self, set_id: &str) -> StoreResult<bool> {
        self.read("is_finished", |s| Ok(s.set(set_id)?.is_finished()))
    }

    async fn get_external_ids_from_submission_history(
        &self,
        set_id: &str,
        accepted_only: bool,
    ) -> StoreResult<Vec<String>> {
        self.read("get_external_ids_from_submission_history", |s| {
            Ok(s.set(set_id)?.external_ids_from_history(accepted_only))
        })
    }

    async fn update_submission_history(
        &self,
        set_id: &str,
        results: &[GradeResult],
    ) -> StoreResult<()> {
        self.write("update_submission_history", |s| {
            let set = s.set_mut(set_id)?;
            for result in results {
                set.submission_history
                    .insert(result.quiz_id.clone(), result.clone());
            }
            set.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn update_total_correctness(&self, set_id: &str) -> StoreResult<()> {
        self.write("update_total_correctness", |s| {
            let set = s.set_mut(set_id)?;
            set.total_correctness = set.accepted_count();
            set.updated_at = Utc::now();
            Ok(())
        })
    }
}

#[async_trait]
impl CompletenessRepo for MemoryTransaction {
    async fn upsert_first_quiz_completeness(
        &self,
        lo_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()> {
        self.write("upsert_first_quiz_completeness", |s| {
            let c = s.completeness_mut(lo_id, student_id);
            if c.first_quiz_score.is_none() {
                c.first_quiz_score = Some(score);
                c.updated_at = Utc::now();
            }
            Ok(())
        })
    }

    async fn upsert_highest_quiz_score(
        &self,
        lo_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()> {
        self.write("upsert_highest_quiz_score", |s| {
            let c = s.completeness_mut(lo_id, student_id);
            if c.highest_quiz_score.map_or(true, |best| score > best) {
                c.highest_quiz_score = Some(score);
                c.updated_at = Utc::now();
            }
            Ok(())
        })
    }

    async fn get_completeness(
        &self,
        lo_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<Completeness>> {
        self.read("get_completeness", |s| {
            Ok(s.completeness
                .iter()
                .find(|c| c.lo_id == lo_id && c.student_id == student_id)
                .cloned())
        })
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        (*self).commit_now()
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

// Outside a transaction every call runs in a transaction of its own.

#[async_trait]
impl ShuffledQuizSetRepo for MemoryStore {
    async fn create_shuffled_quiz_set(&self, set: &ShuffledQuizSet) -> StoreResult<()> {
        let tx = self.transaction().await;
        tx.create_shuffled_quiz_set(set).await?;
        tx.commit_now()
    }

    async fn get_shuffled_quiz_set(&self, set_id: &str) -> StoreResult<ShuffledQuizSet> {
        self.transaction().await.get_shuffled_quiz_set(set_id).await
    }

    async fn get_seed(&self, set_id: &str) -> StoreResult<String> {
        self.transaction().await.get_seed(set_id).await
    }

    async fn get_quiz_index(
        &self,
        set_id: &str,
        quiz_external_id: &str,
    ) -> StoreResult<Option<i32>> {
        self.transaction()
            .await
            .get_quiz_index(set_id, quiz_external_id)
            .await
    }

    async fn get_lo_id(&self, set_id: &str) -> StoreResult<String> {
        self.transaction().await.get_lo_id(set_id).await
    }

    async fn get_student_id(&self, set_id: &str) -> StoreResult<String> {
        self.transaction().await.get_student_id(set_id).await
    }

    async fn get_score(&self, set_id: &str) -> StoreResult<(u32, u32)> {
        self.transaction().await.get_score(set_id).await
    }

    async fn is_finished(&self, set_id: &str) -> StoreResult<bool> {
        self.transaction().await.is_finished(set_id).await
    }

    async fn get_external_ids_from_submission_history(
        &self,
        set_id: &str,
        accepted_only: bool,
    ) -> StoreResult<Vec<String>> {
        self.transaction()
            .await
            .get_external_ids_from_submission_history(set_id, accepted_only)
            .await
    }

    async fn update_submission_history(
        &self,
        set_id: &str,
        results: &[GradeResult],
    ) -> StoreResult<()> {
        let tx = self.transaction().await;
        tx.update_submission_history(set_id, results).await?;
        tx.commit_now()
    }

    async fn update_total_correctness(&self, set_id: &str) -> StoreResult<()> {
        let tx = self.transaction().await;
        tx.update_total_correctness(set_id).await?;
        tx.commit_now()
    }
}

#[async_trait]
impl CompletenessRepo for MemoryStore {
    async fn upsert_first_quiz_completeness(
        &self,
        lo_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()> {
        let tx = self.transaction().await;
        tx.upsert_first_quiz_completeness(lo_id, student_id, score)
            .await?;
        tx.commit_now()
    }

    async fn upsert_highest_quiz_score(
        &self,
        lo_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()> {
        let tx = self.transaction().await;
        tx.upsert_highest_quiz_score(lo_id, student_id, score).await?;
        tx.commit_now()
    }

    async fn get_completeness(
        &self,
        lo_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<Completeness>> {
        self.transaction()
            .await
            .get_completeness(lo_id, student_id)
            .await
    }
}

#[async_trait]
impl QuizRepo for MemoryStore {
    async fn get_by_external_ids(
        &self,
        external_ids: &[String],
        lo_id: &str,
    ) -> StoreResult<Vec<Quiz>> {
        self.failpoints.check("get_by_external_ids")?;
        let state = self.state.lock().await;
        let mut seen = HashSet::new();
        Ok(external_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| state.quizzes.get(id))
            .filter(|q| q.tagged_los.iter().any(|lo| lo == lo_id))
            .cloned()
            .collect())
    }

    async fn get_quiz_set_by_lo_id(&self, lo_id: &str) -> StoreResult<QuizSet> {
        self.failpoints.check("get_quiz_set_by_lo_id")?;
        self.state
            .lock()
            .await
            .quiz_sets
            .get(lo_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("quiz set of learning objective {lo_id}")))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        self.failpoints.check("begin")?;
        Ok(Box::new(self.transaction().await))
    }
}
