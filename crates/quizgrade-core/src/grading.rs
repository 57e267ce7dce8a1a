//! Correctness evaluation, one evaluator per quiz kind.
//!
//! Select-type quizzes are graded against the options as the student saw
//! them, rebuilt from the set's seed and the quiz's position in the set.
//! Manual-input quizzes use their two fixed options unshuffled. Fill-blank
//! quizzes compare normalized texts against each blank's alternatives.

use chrono::Utc;
use tracing::debug;

use crate::error::GradingError;
use crate::model::{normalize_text, AnswerEntry, AnswerFormat, Blank, GradeResult, Quiz, QuizOption};
use crate::shuffle::{parse_seed, shuffled};
use crate::traits::ShuffledQuizSetRepo;

/// Outcome of checking one evaluated entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Verdict {
    correct: bool,
    partial_credit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Acceptance {
    is_accepted: bool,
    is_all_correct: bool,
    is_partial: bool,
}

/// Apply the partial-credit and strict acceptance policy.
///
/// The first correct entry flagged partial-credit accepts the quiz outright.
/// Otherwise every entry must be correct and `submitted` must equal
/// `expected`. `is_all_correct` always reports the strict check, also when
/// partial credit accepted the quiz.
fn decide_acceptance(verdicts: &[Verdict], submitted: usize, expected: usize) -> Acceptance {
    let is_partial = verdicts.iter().any(|v| v.partial_credit && v.correct);
    let is_all_correct = verdicts.iter().all(|v| v.correct) && submitted == expected;

    Acceptance {
        is_accepted: is_partial || is_all_correct,
        is_all_correct,
        is_partial,
    }
}

/// Collect selected indices, rejecting other formats and out-of-range values.
fn selected_indices(answers: &[AnswerEntry], option_count: usize) -> Result<Vec<u32>, GradingError> {
    let mut indices = Vec::with_capacity(answers.len());
    for entry in answers {
        match entry.format() {
            Some(AnswerFormat::SelectedIndex(index)) => indices.push(index),
            _ => {
                return Err(GradingError::FailedPrecondition(
                    "answer is not a selected index".into(),
                ))
            }
        }
    }

    if let Some(&bad) = indices
        .iter()
        .find(|&&index| index == 0 || index as usize > option_count)
    {
        return Err(GradingError::FailedPrecondition(format!(
            "selected index {bad} out of range 1..={option_count}"
        )));
    }

    indices.truncate(option_count);
    Ok(indices)
}

fn filled_texts(answers: &[AnswerEntry]) -> Result<Vec<String>, GradingError> {
    answers
        .iter()
        .map(|entry| match entry.format() {
            Some(AnswerFormat::FilledText(text)) => Ok(text.to_string()),
            _ => Err(GradingError::FailedPrecondition(
                "answer is not a filled text".into(),
            )),
        })
        .collect()
}

fn grade_result(quiz: &Quiz, acceptance: Acceptance) -> GradeResult {
    GradeResult {
        quiz_id: quiz.external_id.clone(),
        quiz_type: quiz.kind.clone(),
        selected_index: Vec::new(),
        correct_index: Vec::new(),
        filled_text: Vec::new(),
        correct_text: Vec::new(),
        correctness: Vec::new(),
        is_accepted: acceptance.is_accepted,
        is_all_correct: acceptance.is_all_correct,
        is_partial: acceptance.is_partial,
        submitted_at: Utc::now(),
        point: if acceptance.is_accepted { quiz.point } else { 0 },
    }
}

/// Grade selected indices against `options` in the order presented.
pub fn grade_selection(
    quiz: &Quiz,
    options: &[QuizOption],
    answers: &[AnswerEntry],
) -> Result<GradeResult, GradingError> {
    let selected = selected_indices(answers, options.len())?;

    let verdicts: Vec<Verdict> = selected
        .iter()
        .map(|&index| {
            let option = &options[index as usize - 1];
            Verdict {
                correct: option.correctness,
                partial_credit: option.is_partial_credit(),
            }
        })
        .collect();

    let correct_index: Vec<u32> = options
        .iter()
        .enumerate()
        .filter(|(_, o)| o.correctness)
        .map(|(pos, _)| pos as u32 + 1)
        .collect();

    let acceptance = decide_acceptance(&verdicts, selected.len(), correct_index.len());

    Ok(GradeResult {
        selected_index: selected,
        correct_index,
        correctness: verdicts.iter().map(|v| v.correct).collect(),
        ..grade_result(quiz, acceptance)
    })
}

/// Grade filled texts against the quiz's blanks.
///
/// Every submitted text is echoed back, but only the first `blanks.len()` are
/// evaluated. The count check uses the full submitted count.
pub fn grade_fill_blank(
    quiz: &Quiz,
    blanks: &[Blank],
    answers: &[AnswerEntry],
) -> Result<GradeResult, GradingError> {
    let filled = filled_texts(answers)?;

    let verdicts: Vec<Verdict> = filled
        .iter()
        .zip(blanks)
        .map(|(text, blank)| Verdict {
            correct: blank.is_correct(text),
            partial_credit: blank.is_partial_credit(),
        })
        .collect();

    let acceptance = decide_acceptance(&verdicts, filled.len(), blanks.len());

    Ok(GradeResult {
        correct_text: blanks
            .iter()
            .map(|b| normalize_text(&b.canonical_text()))
            .collect(),
        filled_text: filled,
        correctness: verdicts.iter().map(|v| v.correct).collect(),
        ..grade_result(quiz, acceptance)
    })
}

/// Single and multi select quizzes.
#[derive(Debug)]
pub struct SelectQuiz<'a, R: ?Sized> {
    quiz: &'a Quiz,
    set_id: &'a str,
    repo: &'a R,
}

impl<'a, R: ShuffledQuizSetRepo + ?Sized> SelectQuiz<'a, R> {
    pub fn new(quiz: &'a Quiz, set_id: &'a str, repo: &'a R) -> Self {
        Self { quiz, set_id, repo }
    }

    /// The options in the order the student saw them.
    pub async fn shuffled_options(&self) -> Result<Vec<QuizOption>, GradingError> {
        let raw_seed = self
            .repo
            .get_seed(self.set_id)
            .await
            .map_err(GradingError::lookup("GetSeed"))?;
        let seed = parse_seed(&raw_seed).ok_or_else(|| {
            GradingError::FailedPrecondition(format!(
                "seed {raw_seed:?} of set {} is not an integer",
                self.set_id
            ))
        })?;

        let index = self
            .repo
            .get_quiz_index(self.set_id, &self.quiz.external_id)
            .await
            .map_err(GradingError::lookup("GetQuizIndex"))?
            .ok_or_else(|| {
                GradingError::FailedPrecondition(format!(
                    "quiz {} is not part of set {}",
                    self.quiz.external_id, self.set_id
                ))
            })?;

        Ok(shuffled(self.quiz.options(), seed, index))
    }

    pub async fn evaluate(&self, answers: &[AnswerEntry]) -> Result<GradeResult, GradingError> {
        let options = self.shuffled_options().await?;
        grade_selection(self.quiz, &options, answers)
    }
}

/// Self-graded quizzes: option 1 means correct, option 2 incorrect.
#[derive(Debug)]
pub struct ManualInputQuiz<'a> {
    quiz: &'a Quiz,
}

impl<'a> ManualInputQuiz<'a> {
    pub fn new(quiz: &'a Quiz) -> Self {
        Self { quiz }
    }

    pub fn evaluate(&self, answers: &[AnswerEntry]) -> Result<GradeResult, GradingError> {
        grade_selection(self.quiz, self.quiz.options(), answers)
    }
}

/// Fill-blank quizzes and their sibling kinds.
#[derive(Debug)]
pub struct FillBlankQuiz<'a> {
    quiz: &'a Quiz,
}

impl<'a> FillBlankQuiz<'a> {
    pub fn new(quiz: &'a Quiz) -> Self {
        Self { quiz }
    }

    pub fn evaluate(&self, answers: &[AnswerEntry]) -> Result<GradeResult, GradingError> {
        grade_fill_blank(self.quiz, &self.quiz.options_with_alternatives(), answers)
    }
}

/// The evaluator chosen for a quiz kind.
#[derive(Debug)]
pub enum Evaluator<'a, R: ?Sized> {
    Select(SelectQuiz<'a, R>),
    ManualInput(ManualInputQuiz<'a>),
    FillBlank(FillBlankQuiz<'a>),
}

impl<'a, R: ShuffledQuizSetRepo + ?Sized> Evaluator<'a, R> {
    /// Pick the evaluator for `quiz`. Unknown kinds are a failed precondition.
    pub fn for_quiz(quiz: &'a Quiz, set_id: &'a str, repo: &'a R) -> Result<Self, GradingError> {
        if quiz.kind.is_select() {
            Ok(Evaluator::Select(SelectQuiz::new(quiz, set_id, repo)))
        } else if quiz.kind.is_fill_blank() {
            Ok(Evaluator::FillBlank(FillBlankQuiz::new(quiz)))
        } else if quiz.kind == crate::model::QuizKind::ManualInput {
            Ok(Evaluator::ManualInput(ManualInputQuiz::new(quiz)))
        } else {
            Err(GradingError::FailedPrecondition(format!(
                "quiz {} has unsupported kind {}",
                quiz.external_id, quiz.kind
            )))
        }
    }

    pub async fn evaluate(&self, answers: &[AnswerEntry]) -> Result<GradeResult, GradingError> {
        let result = match self {
            Evaluator::Select(q) => q.evaluate(answers).await,
            Evaluator::ManualInput(q) => q.evaluate(answers),
            Evaluator::FillBlank(q) => q.evaluate(answers),
        }?;
        debug!(
            quiz = %result.quiz_id,
            kind = %result.quiz_type,
            accepted = result.is_accepted,
            "graded quiz"
        );
        Ok(result)
    }
}
