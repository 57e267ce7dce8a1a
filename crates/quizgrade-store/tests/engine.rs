//! Engine tests against the in-memory store.
//!
//! These drive submission, assignment and score finalization end to end,
//! including injected storage failures and cancellation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use quizgrade_core::assignment::AssignmentService;
use quizgrade_core::engine::{EngineConfig, SubmissionEngine};
use quizgrade_core::error::ErrorCode;
use quizgrade_core::model::{
    AnswerEntry, Quiz, QuizAnswer, QuizKind, QuizOption, QuizSet, RichText, ShuffledQuizSet,
    SubmitQuizAnswersRequest, OPTION_CONFIG_PARTIAL_CREDIT,
};
use quizgrade_core::parser::QuizBank;
use quizgrade_core::shuffle::shuffled;
use quizgrade_core::traits::{CompletenessRepo, ShuffledQuizSetRepo};
use quizgrade_store::MemoryStore;

const LO: &str = "lo-1";
const STUDENT: &str = "student-1";
const SEED: &str = "1623";

fn option(text: &str, correct: bool) -> QuizOption {
    QuizOption {
        content: RichText::plain(text),
        correctness: correct,
        ..Default::default()
    }
}

fn quiz(id: &str, kind: QuizKind, options: Vec<QuizOption>) -> Quiz {
    Quiz {
        id: format!("id-{id}"),
        external_id: id.into(),
        kind,
        question: RichText::plain(format!("question {id}")),
        options,
        difficulty_level: 1,
        tagged_los: vec![LO.into()],
        point: 1,
    }
}

/// Manual-input quiz: answer 1 is correct, answer 2 is not.
fn manual(id: &str) -> Quiz {
    quiz(
        id,
        QuizKind::ManualInput,
        vec![option("I got it", true), option("I missed it", false)],
    )
}

fn shuffled_set(id: &str, quizzes: &[&str], seed: &str) -> ShuffledQuizSet {
    let now = Utc::now();
    ShuffledQuizSet {
        id: id.into(),
        lo_id: LO.into(),
        student_id: STUDENT.into(),
        quiz_external_ids: quizzes.iter().map(|q| q.to_string()).collect(),
        random_seed: seed.into(),
        submission_history: BTreeMap::new(),
        total_correctness: 0,
        original_shuffle_quiz_set_id: None,
        created_at: now,
        updated_at: now,
    }
}

async fn store_with(quizzes: Vec<Quiz>, sets: Vec<ShuffledQuizSet>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let quiz_set = QuizSet {
        id: "qs-1".into(),
        lo_id: LO.into(),
        quiz_external_ids: quizzes.iter().map(|q| q.external_id.clone()).collect(),
    };
    store
        .import_bank(&QuizBank {
            quizzes,
            quiz_sets: vec![quiz_set],
        })
        .await;
    for set in sets {
        store.create_shuffled_quiz_set(&set).await.unwrap();
    }
    store
}

fn request(set_id: &str, answers: &[(&str, Vec<AnswerEntry>)]) -> SubmitQuizAnswersRequest {
    SubmitQuizAnswersRequest {
        set_id: set_id.into(),
        quiz_answers: answers
            .iter()
            .map(|(quiz_id, answers)| QuizAnswer {
                quiz_id: quiz_id.to_string(),
                answers: answers.clone(),
            })
            .collect(),
    }
}

fn pick(index: u32) -> Vec<AnswerEntry> {
    vec![AnswerEntry::selected(index)]
}

/// Three options laid out so that the second one *as presented* is correct.
fn quiz_a_with_second_shown_correct(seed: i64, quiz_index: i32) -> Quiz {
    let perm = shuffled(&[0usize, 1, 2], seed, quiz_index);
    let options = (0..3)
        .map(|i| option(&format!("option {i}"), i == perm[1]))
        .collect();
    quiz("quizA", QuizKind::SingleSelect, options)
}

#[tokio::test]
async fn submit_grades_against_presented_order() {
    let store = store_with(
        vec![quiz_a_with_second_shown_correct(1623, 1)],
        vec![shuffled_set("set-1", &["quizA"], SEED)],
    )
    .await;
    let engine = SubmissionEngine::new(store.clone());

    let response = engine
        .submit(&request("set-1", &[("quizA", pick(2))]))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    let result = &response.results[0];
    assert_eq!(result.correct_index, vec![2]);
    assert_eq!(result.selected_index, vec![2]);
    assert!(result.is_accepted);
    assert_eq!(store.get_score("set-1").await.unwrap(), (1, 1));
    assert_eq!(response.score, Some(100.0));
}

#[tokio::test]
async fn presentation_and_grading_agree() {
    let select = |id: &str| {
        quiz(
            id,
            QuizKind::MultiSelect,
            vec![
                option("wrong 1", false),
                option("right", true),
                option("wrong 2", false),
                option("wrong 3", false),
            ],
        )
    };
    let store = store_with(vec![select("s1"), select("s2"), select("s3")], vec![]).await;
    let assignment = AssignmentService::new(
        store.clone(),
        EngineConfig {
            seed_attempts: 5,
            shuffle_quiz_order: true,
        },
    );
    let set = assignment.create_quiz_test(LO, STUDENT).await.unwrap();
    let presented = assignment.present(&set.id).await.unwrap();
    assert_eq!(presented.len(), 3);

    let answers: Vec<(&str, Vec<AnswerEntry>)> = presented
        .iter()
        .map(|q| {
            let right = q.options.iter().find(|o| o.text == "right").unwrap();
            (q.external_id.as_str(), pick(right.index))
        })
        .collect();

    let engine = SubmissionEngine::new(store.clone());
    let response = engine.submit(&request(&set.id, &answers)).await.unwrap();
    assert!(response.results.iter().all(|r| r.is_accepted));
    assert_eq!(response.score, Some(100.0));

    let completeness = store.get_completeness(LO, STUDENT).await.unwrap().unwrap();
    assert_eq!(completeness.first_quiz_score, Some(100.0));
}

#[tokio::test]
async fn partial_credit_accepts_single_pick() {
    let mut partial = option("b", true);
    partial.configs = vec![OPTION_CONFIG_PARTIAL_CREDIT.into()];
    let q = quiz(
        "quizP",
        QuizKind::MultiSelect,
        vec![option("a", false), partial, option("c", true)],
    );
    let store = store_with(vec![q.clone()], vec![shuffled_set("set-1", &["quizP"], SEED)]).await;

    let presented = shuffled(q.options(), 1623, 1);
    let partial_index = presented.iter().position(|o| o.is_partial_credit()).unwrap() as u32 + 1;

    let engine = SubmissionEngine::new(store.clone());
    let response = engine
        .submit(&request("set-1", &[("quizP", pick(partial_index))]))
        .await
        .unwrap();
    let result = &response.results[0];
    assert!(result.is_accepted);
    assert!(result.is_partial);
    assert!(!result.is_all_correct);

    let stored = store.get_shuffled_quiz_set("set-1").await.unwrap();
    assert!(stored.submission_history["quizP"].is_partial);
}

#[tokio::test]
async fn unfinished_set_is_not_finalized() {
    let store = store_with(
        vec![manual("m1"), manual("m2")],
        vec![shuffled_set("set-1", &["m1", "m2"], SEED)],
    )
    .await;
    let engine = SubmissionEngine::new(store.clone());

    let response = engine
        .submit(&request("set-1", &[("m1", pick(1))]))
        .await
        .unwrap();
    assert_eq!(response.score, None);
    assert!(store.get_completeness(LO, STUDENT).await.unwrap().is_none());

    let response = engine
        .submit(&request("set-1", &[("m2", pick(2))]))
        .await
        .unwrap();
    assert_eq!(response.score, Some(50.0));
}

#[tokio::test]
async fn retry_scores_against_full_problem_set() {
    let ids = ["q1", "q2", "q3", "q4", "q5"];
    let store = store_with(ids.iter().map(|id| manual(id)).collect(), vec![]).await;
    let assignment = AssignmentService::new(store.clone(), EngineConfig::default());
    let engine = SubmissionEngine::new(store.clone());

    let original = assignment.create_quiz_test(LO, STUDENT).await.unwrap();
    let first = engine
        .submit(&request(
            &original.id,
            &[
                ("q1", pick(1)),
                ("q2", pick(2)),
                ("q3", pick(1)),
                ("q4", pick(2)),
                ("q5", pick(1)),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(first.score, Some(60.0));

    let retry = assignment.create_retry_quiz_test(&original.id).await.unwrap();
    assert_eq!(retry.quiz_external_ids, vec!["q2", "q4"]);
    assert_eq!(retry.original_shuffle_quiz_set_id.as_deref(), Some(original.id.as_str()));

    let second = engine
        .submit(&request(&retry.id, &[("q2", pick(1)), ("q4", pick(1))]))
        .await
        .unwrap();
    assert_eq!(second.score, Some(100.0));

    let denominator = quizgrade_core::scoring::retry_denominator(
        &store
            .get_external_ids_from_submission_history(&original.id, false)
            .await
            .unwrap(),
        &retry.quiz_external_ids,
    );
    assert_eq!(denominator, 5);

    let completeness = store.get_completeness(LO, STUDENT).await.unwrap().unwrap();
    assert_eq!(completeness.first_quiz_score, Some(60.0));
    assert_eq!(completeness.highest_quiz_score, Some(100.0));
}

#[tokio::test]
async fn retry_of_fully_accepted_set_is_refused() {
    let store = store_with(vec![manual("m1")], vec![]).await;
    let assignment = AssignmentService::new(store.clone(), EngineConfig::default());
    let engine = SubmissionEngine::new(store.clone());

    let set = assignment.create_quiz_test(LO, STUDENT).await.unwrap();
    engine
        .submit(&request(&set.id, &[("m1", pick(1))]))
        .await
        .unwrap();

    let err = assignment.create_retry_quiz_test(&set.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);
}

#[tokio::test]
async fn retry_gets_a_seed_that_reorders_its_own_positions() {
    let select = |id: &str| {
        quiz(
            id,
            QuizKind::SingleSelect,
            vec![
                option("right", true),
                option("wrong 1", false),
                option("wrong 2", false),
                option("wrong 3", false),
            ],
        )
    };
    let store = store_with(vec![select("s1"), select("s2"), select("s3")], vec![]).await;
    let assignment = AssignmentService::new(
        store.clone(),
        EngineConfig {
            seed_attempts: 50,
            shuffle_quiz_order: false,
        },
    );
    let engine = SubmissionEngine::new(store.clone());

    let original = assignment.create_quiz_test(LO, STUDENT).await.unwrap();
    let presented = assignment.present(&original.id).await.unwrap();
    let answers: Vec<(&str, Vec<AnswerEntry>)> = presented
        .iter()
        .map(|q| {
            let text = if q.external_id == "s1" { "right" } else { "wrong 1" };
            let o = q.options.iter().find(|o| o.text == text).unwrap();
            (q.external_id.as_str(), pick(o.index))
        })
        .collect();
    let first = engine.submit(&request(&original.id, &answers)).await.unwrap();
    assert_eq!(first.score, Some(33.0));

    let retry = assignment.create_retry_quiz_test(&original.id).await.unwrap();
    assert_eq!(retry.quiz_external_ids, vec!["s2", "s3"]);
    let seed: i64 = retry.random_seed.parse().unwrap();
    let identity = [0usize, 1, 2, 3];
    for position in 1..=2 {
        assert_ne!(shuffled(&identity, seed, position), identity.to_vec());
    }

    let presented = assignment.present(&retry.id).await.unwrap();
    let answers: Vec<(&str, Vec<AnswerEntry>)> = presented
        .iter()
        .map(|q| {
            let o = q.options.iter().find(|o| o.text == "right").unwrap();
            (q.external_id.as_str(), pick(o.index))
        })
        .collect();
    let second = engine.submit(&request(&retry.id, &answers)).await.unwrap();
    assert!(second.results.iter().all(|r| r.is_accepted));
    assert_eq!(second.score, Some(100.0));
}

#[tokio::test]
async fn phase_one_failure_rolls_back_everything() {
    let store = store_with(vec![manual("m1")], vec![shuffled_set("set-1", &["m1"], SEED)]).await;
    let engine = SubmissionEngine::new(store.clone());

    store.fail_on("update_total_correctness");
    let err = engine
        .submit(&request("set-1", &[("m1", pick(1))]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);

    store.clear_failpoints();
    let set = store.get_shuffled_quiz_set("set-1").await.unwrap();
    assert!(set.submission_history.is_empty());
    assert_eq!(set.total_correctness, 0);
}

#[tokio::test]
async fn phase_two_failure_keeps_submission() {
    let store = store_with(vec![manual("m1")], vec![shuffled_set("set-1", &["m1"], SEED)]).await;
    let engine = SubmissionEngine::new(store.clone());

    store.fail_on("upsert_highest_quiz_score");
    let err = engine
        .submit(&request("set-1", &[("m1", pick(1))]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);

    store.clear_failpoints();
    assert_eq!(store.get_score("set-1").await.unwrap(), (1, 1));
    assert!(store.get_completeness(LO, STUDENT).await.unwrap().is_none());

    // A later finalization picks the score up.
    let finalized = engine.finalize("set-1").await.unwrap().unwrap();
    assert_eq!(finalized.score, 100.0);
}

#[tokio::test]
async fn cancelled_submission_writes_nothing() {
    let store = store_with(vec![manual("m1")], vec![shuffled_set("set-1", &["m1"], SEED)]).await;
    let engine = SubmissionEngine::new(store.clone());

    let token = CancellationToken::new();
    token.cancel();
    let err = engine
        .submit_with_cancel(&request("set-1", &[("m1", pick(1))]), &token)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Cancelled);
    assert!(store
        .get_shuffled_quiz_set("set-1")
        .await
        .unwrap()
        .submission_history
        .is_empty());
}

#[tokio::test]
async fn validation_happens_before_storage_access() {
    let store = store_with(vec![], vec![]).await;
    store.fail_on("get_lo_id");
    let engine = SubmissionEngine::new(store.clone());

    let err = engine.submit(&request("", &[])).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let err = engine
        .submit(&request("set-1", &[("m1", vec![])]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn unknown_set_is_invalid_argument() {
    let store = store_with(vec![manual("m1")], vec![]).await;
    let engine = SubmissionEngine::new(store.clone());
    let err = engine
        .submit(&request("nope", &[("m1", pick(1))]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn precondition_failures_persist_nothing() {
    let essay = quiz("essay", QuizKind::from("essay"), vec![option("x", true)]);
    let select = quiz(
        "sel",
        QuizKind::SingleSelect,
        vec![option("a", true), option("b", false)],
    );
    let blank = quiz("fb", QuizKind::FillBlank, vec![option("hello", true)]);
    let store = store_with(
        vec![manual("m1"), manual("m2"), essay, select, blank],
        vec![
            shuffled_set("set-1", &["m1", "essay", "sel"], SEED),
            shuffled_set("bad-seed", &["sel"], "not-a-number"),
            shuffled_set("other", &["m1"], SEED),
        ],
    )
    .await;
    let engine = SubmissionEngine::new(store.clone());

    let cases = [
        request("set-1", &[("m1", pick(1)), ("essay", pick(1))]),
        request("set-1", &[("m1", pick(3))]),
        request("set-1", &[("m1", pick(0))]),
        request("set-1", &[("m1", vec![AnswerEntry::selected(1), AnswerEntry::filled("x")])]),
        request("set-1", &[("missing", pick(1))]),
        request("bad-seed", &[("sel", pick(1))]),
        request("other", &[("sel", pick(1))]),
        request("other", &[("m1", pick(1)), ("m2", pick(1))]),
        request("other", &[("fb", vec![AnswerEntry::filled("hello")])]),
    ];
    for req in &cases {
        let err = engine.submit(req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::FailedPrecondition, "{req:?}: {err}");
    }

    for set_id in ["set-1", "bad-seed", "other"] {
        let set = store.get_shuffled_quiz_set(set_id).await.unwrap();
        assert!(set.submission_history.is_empty(), "{set_id} was written");
    }
    assert_eq!(store.get_score("other").await.unwrap(), (0, 1));
}

#[tokio::test]
async fn resubmission_is_idempotent() {
    let store = store_with(
        vec![quiz_a_with_second_shown_correct(1623, 1)],
        vec![shuffled_set("set-1", &["quizA"], SEED)],
    )
    .await;
    let engine = SubmissionEngine::new(store.clone());
    let req = request("set-1", &[("quizA", pick(3))]);

    let first = engine.submit(&req).await.unwrap().results.remove(0);
    let second = engine.submit(&req).await.unwrap().results.remove(0);
    assert_eq!(
        quizgrade_core::model::GradeResult {
            submitted_at: first.submitted_at,
            ..second
        },
        first
    );
    assert_eq!(store.get_score("set-1").await.unwrap(), (0, 1));
}

#[tokio::test]
async fn concurrent_submissions_to_one_set_stay_consistent() {
    let store = store_with(
        vec![manual("m1"), manual("m2")],
        vec![shuffled_set("set-1", &["m1", "m2"], SEED)],
    )
    .await;
    let engine = Arc::new(SubmissionEngine::new(store.clone()));

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.submit(&request("set-1", &[("m1", pick(1))])).await })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.submit(&request("set-1", &[("m2", pick(1))])).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(store.get_score("set-1").await.unwrap(), (2, 2));
    let completeness = store.get_completeness(LO, STUDENT).await.unwrap().unwrap();
    assert_eq!(completeness.highest_quiz_score, Some(100.0));
}
