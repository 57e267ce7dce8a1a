//! TOML quiz bank parser.
//!
//! Loads quiz banks (published quizzes plus the quiz set of each learning
//! objective) from TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{
    OptionAttribute, Quiz, QuizKind, QuizOption, QuizSet, RichText, OPTION_CONFIG_PARTIAL_CREDIT,
};

/// Quizzes and quiz sets loaded from one or more bank files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizBank {
    pub quizzes: Vec<Quiz>,
    pub quiz_sets: Vec<QuizSet>,
}

impl QuizBank {
    /// Append another bank's contents.
    pub fn merge(&mut self, other: QuizBank) {
        self.quizzes.extend(other.quizzes);
        self.quiz_sets.extend(other.quiz_sets);
    }
}

/// Intermediate TOML structure for parsing bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    #[serde(default)]
    quizzes: Vec<TomlQuiz>,
    #[serde(default)]
    quiz_sets: Vec<TomlQuizSet>,
}

#[derive(Debug, Deserialize)]
struct TomlQuiz {
    #[serde(default)]
    id: Option<String>,
    external_id: String,
    kind: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    difficulty_level: i32,
    #[serde(default)]
    lo_ids: Vec<String>,
    #[serde(default = "default_point")]
    point: u32,
    #[serde(default)]
    options: Vec<TomlOption>,
}

fn default_point() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct TomlOption {
    text: String,
    #[serde(default)]
    correct: bool,
    #[serde(default)]
    partial_credit: bool,
    #[serde(default)]
    key: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    configs: Vec<String>,
    #[serde(default)]
    img_link: String,
    #[serde(default)]
    audio_link: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuizSet {
    #[serde(default)]
    id: Option<String>,
    lo_id: String,
    quizzes: Vec<String>,
}

/// Parse a single TOML bank file.
pub fn parse_bank(path: &Path) -> Result<QuizBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read quiz bank file: {}", path.display()))?;

    parse_bank_str(&content, path)
}

/// Parse a TOML string into a `QuizBank`.
pub fn parse_bank_str(content: &str, source_path: &Path) -> Result<QuizBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let quizzes = parsed
        .quizzes
        .into_iter()
        .map(|q| {
            let options = q
                .options
                .into_iter()
                .map(|o| {
                    let mut configs = o.configs;
                    if o.partial_credit && !configs.iter().any(|c| c == OPTION_CONFIG_PARTIAL_CREDIT)
                    {
                        configs.push(OPTION_CONFIG_PARTIAL_CREDIT.to_string());
                    }
                    QuizOption {
                        label: o.label,
                        key: o.key,
                        content: RichText::plain(o.text),
                        correctness: o.correct,
                        attribute: OptionAttribute {
                            configs: configs.clone(),
                            img_link: o.img_link,
                            audio_link: o.audio_link,
                        },
                        configs,
                    }
                })
                .collect();

            Quiz {
                id: q.id.unwrap_or_else(|| q.external_id.clone()),
                external_id: q.external_id,
                kind: QuizKind::from(q.kind),
                question: RichText::plain(q.question),
                options,
                difficulty_level: q.difficulty_level,
                tagged_los: q.lo_ids,
                point: q.point,
            }
        })
        .collect();

    let quiz_sets = parsed
        .quiz_sets
        .into_iter()
        .map(|s| QuizSet {
            id: s.id.unwrap_or_else(|| format!("{}-set", s.lo_id)),
            lo_id: s.lo_id,
            quiz_external_ids: s.quizzes,
        })
        .collect();

    Ok(QuizBank { quizzes, quiz_sets })
}

/// Load a bank from a file, or every `.toml` file under a directory.
pub fn load_bank(path: &Path) -> Result<QuizBank> {
    if !path.is_dir() {
        return parse_bank(path);
    }

    let mut bank = QuizBank::default();
    let mut entries: Vec<_> = std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory: {}", path.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            bank.merge(load_bank(&entry_path)?);
        } else if entry_path.extension().is_some_and(|ext| ext == "toml") {
            match parse_bank(&entry_path) {
                Ok(parsed) => bank.merge(parsed),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", entry_path.display(), e);
                }
            }
        }
    }

    Ok(bank)
}

/// A warning from bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The quiz external id or quiz set id (if applicable).
    pub subject: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a bank for problems that would break assignment or grading.
pub fn validate_bank(bank: &QuizBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let warn = |warnings: &mut Vec<ValidationWarning>, subject: &str, message: String| {
        warnings.push(ValidationWarning {
            subject: Some(subject.to_string()),
            message,
        });
    };

    let mut seen = HashSet::new();
    for quiz in &bank.quizzes {
        if !seen.insert(quiz.external_id.as_str()) {
            warn(
                &mut warnings,
                &quiz.external_id,
                format!("duplicate quiz external id: {}", quiz.external_id),
            );
        }
    }

    for quiz in &bank.quizzes {
        let id = quiz.external_id.as_str();
        if quiz.options.is_empty() {
            warn(&mut warnings, id, "quiz has no options".into());
            continue;
        }
        match &quiz.kind {
            kind if kind.is_select() => {
                if !quiz.options.iter().any(|o| o.correctness) {
                    warn(&mut warnings, id, "select quiz has no correct option".into());
                }
            }
            QuizKind::ManualInput => {
                if quiz.options.len() != 2 {
                    warn(
                        &mut warnings,
                        id,
                        format!(
                            "manual-input quiz needs exactly 2 options, found {}",
                            quiz.options.len()
                        ),
                    );
                }
            }
            QuizKind::Other(kind) => {
                warn(&mut warnings, id, format!("unsupported quiz kind: {kind}"));
            }
            _ => {}
        }
    }

    for set in &bank.quiz_sets {
        if set.quiz_external_ids.is_empty() {
            warn(&mut warnings, &set.id, "quiz set is empty".into());
        }
        for member in &set.quiz_external_ids {
            match bank.quizzes.iter().find(|q| &q.external_id == member) {
                None => warn(
                    &mut warnings,
                    &set.id,
                    format!("quiz set references unknown quiz: {member}"),
                ),
                Some(quiz) if !quiz.tagged_los.contains(&set.lo_id) => warn(
                    &mut warnings,
                    &set.id,
                    format!("quiz {member} is not tagged with {}", set.lo_id),
                ),
                Some(_) => {}
            }
        }
    }

    warnings
}
