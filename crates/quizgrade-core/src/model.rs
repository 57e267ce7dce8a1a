//! Core data model types for quizgrade.
//!
//! These types describe published quizzes, the shuffled quiz sets assigned to
//! students, submitted answers and the grade results persisted for them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Option configuration flag that lets a single correct pick accept the quiz.
pub const OPTION_CONFIG_PARTIAL_CREDIT: &str = "partial-credit";

/// Kind of a quiz, deciding how its answers are graded.
///
/// Unknown kinds are kept as [`QuizKind::Other`] so a published quiz never
/// fails to load; grading rejects them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QuizKind {
    SingleSelect,
    MultiSelect,
    ManualInput,
    FillBlank,
    PairOfWords,
    TermAndDefinition,
    Other(String),
}

impl QuizKind {
    pub fn as_str(&self) -> &str {
        match self {
            QuizKind::SingleSelect => "single-select",
            QuizKind::MultiSelect => "multi-select",
            QuizKind::ManualInput => "manual-input",
            QuizKind::FillBlank => "fill-blank",
            QuizKind::PairOfWords => "pair-of-words",
            QuizKind::TermAndDefinition => "term-and-definition",
            QuizKind::Other(kind) => kind,
        }
    }

    /// Single or multi select: the only kinds whose options are shuffled.
    pub fn is_select(&self) -> bool {
        matches!(self, QuizKind::SingleSelect | QuizKind::MultiSelect)
    }

    /// Fill-blank and its sibling kinds, graded by text comparison.
    pub fn is_fill_blank(&self) -> bool {
        matches!(
            self,
            QuizKind::FillBlank | QuizKind::PairOfWords | QuizKind::TermAndDefinition
        )
    }
}

impl From<&str> for QuizKind {
    fn from(s: &str) -> Self {
        match s {
            "single-select" => QuizKind::SingleSelect,
            "multi-select" => QuizKind::MultiSelect,
            "manual-input" => QuizKind::ManualInput,
            "fill-blank" => QuizKind::FillBlank,
            "pair-of-words" => QuizKind::PairOfWords,
            "term-and-definition" => QuizKind::TermAndDefinition,
            other => QuizKind::Other(other.to_string()),
        }
    }
}

impl From<String> for QuizKind {
    fn from(s: String) -> Self {
        QuizKind::from(s.as_str())
    }
}

impl From<QuizKind> for String {
    fn from(kind: QuizKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for QuizKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rich-text content as stored by the authoring editor.
///
/// `raw` is normally a block-editor JSON document; plain strings are accepted
/// too and used verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub rendered_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct EditorDocument {
    #[serde(default)]
    blocks: Vec<EditorBlock>,
    #[serde(default, rename = "entityMap")]
    entity_map: BTreeMap<String, EditorEntity>,
}

#[derive(Debug, Default, Deserialize)]
struct EditorBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct EditorEntity {
    #[serde(default)]
    data: serde_json::Value,
}

impl RichText {
    /// Rich text holding a plain string.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            raw: text.into(),
            rendered_url: String::new(),
        }
    }

    /// Plain text of the content.
    ///
    /// Block texts are joined by newlines. Blocks that only anchor inline
    /// entities (e.g. math) have blank text, in which case the entity data is
    /// used instead.
    pub fn text(&self) -> String {
        let Ok(doc) = serde_json::from_str::<EditorDocument>(&self.raw) else {
            return self.raw.clone();
        };

        let text = doc
            .blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if !text.trim().is_empty() {
            return text;
        }

        let mut entities: Vec<(&String, &EditorEntity)> = doc.entity_map.iter().collect();
        entities.sort_by_key(|(key, _)| (key.parse::<u64>().unwrap_or(u64::MAX), key.to_string()));
        let data: Vec<&str> = entities
            .iter()
            .filter_map(|(_, e)| e.data.get("data").and_then(|d| d.as_str()))
            .collect();
        if data.is_empty() {
            text
        } else {
            data.join("\n")
        }
    }
}

/// Media attributes attached to an option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionAttribute {
    #[serde(default)]
    pub configs: Vec<String>,
    #[serde(default)]
    pub img_link: String,
    #[serde(default)]
    pub audio_link: String,
}

/// One option of a quiz.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    #[serde(default)]
    pub label: String,
    /// Fill-blank options sharing a key are alternatives of the same blank.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub content: RichText,
    #[serde(default)]
    pub correctness: bool,
    #[serde(default)]
    pub configs: Vec<String>,
    #[serde(default)]
    pub attribute: OptionAttribute,
}

impl QuizOption {
    pub fn has_config(&self, config: &str) -> bool {
        self.configs.iter().any(|c| c == config)
    }

    pub fn is_partial_credit(&self) -> bool {
        self.has_config(OPTION_CONFIG_PARTIAL_CREDIT)
    }
}

/// A fill-blank position: the canonical text plus accepted alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blank {
    pub key: String,
    /// The first alternative carries the canonical text and the configs.
    pub alternatives: Vec<QuizOption>,
}

/// Normalization applied to filled texts before comparison.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

impl Blank {
    pub fn canonical_text(&self) -> String {
        self.alternatives
            .first()
            .map(|o| o.content.text())
            .unwrap_or_default()
    }

    /// Configuration flags of the blank (those of its first alternative).
    pub fn configs(&self) -> &[String] {
        self.alternatives
            .first()
            .map(|o| o.configs.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_partial_credit(&self) -> bool {
        self.configs()
            .iter()
            .any(|c| c == OPTION_CONFIG_PARTIAL_CREDIT)
    }

    /// Whether `answer` matches any alternative, ignoring case and
    /// surrounding whitespace.
    pub fn is_correct(&self, answer: &str) -> bool {
        let answer = normalize_text(answer);
        self.alternatives
            .iter()
            .any(|o| normalize_text(&o.content.text()) == answer)
    }
}

fn default_point() -> u32 {
    1
}

/// A published quiz. Read-only to the grading engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    /// Stable across shuffles and retries; what answers refer to.
    pub external_id: String,
    pub kind: QuizKind,
    #[serde(default)]
    pub question: RichText,
    /// Options in authored (unshuffled) order.
    #[serde(default)]
    pub options: Vec<QuizOption>,
    #[serde(default)]
    pub difficulty_level: i32,
    #[serde(default)]
    pub tagged_los: Vec<String>,
    #[serde(default = "default_point")]
    pub point: u32,
}

impl Quiz {
    /// Options in authored order.
    pub fn options(&self) -> &[QuizOption] {
        &self.options
    }

    /// Group options into blanks by key, in order of first appearance.
    /// Options without a key form a blank of their own.
    pub fn options_with_alternatives(&self) -> Vec<Blank> {
        let mut blanks: Vec<Blank> = Vec::new();
        let mut by_key: BTreeMap<&str, usize> = BTreeMap::new();

        for option in &self.options {
            if !option.key.is_empty() {
                if let Some(&pos) = by_key.get(option.key.as_str()) {
                    blanks[pos].alternatives.push(option.clone());
                    continue;
                }
                by_key.insert(option.key.as_str(), blanks.len());
            }
            blanks.push(Blank {
                key: option.key.clone(),
                alternatives: vec![option.clone()],
            });
        }

        blanks
    }
}

/// One submitted answer entry.
///
/// Exactly one of the two fields is expected to be set; an entry with neither
/// (or both) has no recognizable format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntry {
    /// 1-based index into the options as presented to the student.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_text: Option<String>,
}

/// The recognized format of an [`AnswerEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerFormat<'a> {
    SelectedIndex(u32),
    FilledText(&'a str),
}

impl AnswerEntry {
    pub fn selected(index: u32) -> Self {
        Self {
            selected_index: Some(index),
            filled_text: None,
        }
    }

    pub fn filled(text: impl Into<String>) -> Self {
        Self {
            selected_index: None,
            filled_text: Some(text.into()),
        }
    }

    pub fn format(&self) -> Option<AnswerFormat<'_>> {
        match (self.selected_index, self.filled_text.as_deref()) {
            (Some(index), None) => Some(AnswerFormat::SelectedIndex(index)),
            (None, Some(text)) => Some(AnswerFormat::FilledText(text)),
            _ => None,
        }
    }
}

/// Answers for one quiz of a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub quiz_id: String,
    #[serde(default)]
    pub answers: Vec<AnswerEntry>,
}

/// A student's submission against one shuffled quiz set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitQuizAnswersRequest {
    pub set_id: String,
    #[serde(default)]
    pub quiz_answers: Vec<QuizAnswer>,
}

/// Result of a submission: one grade result per submitted quiz, in request
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitQuizAnswersResponse {
    pub results: Vec<GradeResult>,
    /// Score written to completeness tracking, when finalization ran.
    #[serde(default)]
    pub score: Option<f32>,
}

/// The graded outcome of one quiz; the unit of submission history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResult {
    pub quiz_id: String,
    pub quiz_type: QuizKind,
    #[serde(default)]
    pub selected_index: Vec<u32>,
    #[serde(default)]
    pub correct_index: Vec<u32>,
    #[serde(default)]
    pub filled_text: Vec<String>,
    #[serde(default)]
    pub correct_text: Vec<String>,
    /// Per evaluated entry, whether it was correct.
    pub correctness: Vec<bool>,
    /// Whether the submission counts as correct, honoring partial credit.
    pub is_accepted: bool,
    /// Strict all-correct: nothing wrong, nothing missing.
    pub is_all_correct: bool,
    #[serde(default)]
    pub is_partial: bool,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub point: u32,
}

/// The published problem set of a learning objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSet {
    pub id: String,
    pub lo_id: String,
    pub quiz_external_ids: Vec<String>,
}

/// One quiz test assigned to a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffledQuizSet {
    pub id: String,
    pub lo_id: String,
    pub student_id: String,
    pub quiz_external_ids: Vec<String>,
    /// Integer seed encoded as text.
    pub random_seed: String,
    /// Quiz external id to the latest grade result for it.
    #[serde(default)]
    pub submission_history: BTreeMap<String, GradeResult>,
    #[serde(default)]
    pub total_correctness: u32,
    /// Set when this is a retry of a previous set.
    #[serde(default)]
    pub original_shuffle_quiz_set_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShuffledQuizSet {
    pub fn is_retry(&self) -> bool {
        self.original_shuffle_quiz_set_id.is_some()
    }

    /// 1-based position of a quiz within the set.
    pub fn quiz_index(&self, quiz_external_id: &str) -> Option<i32> {
        self.quiz_external_ids
            .iter()
            .position(|id| id == quiz_external_id)
            .and_then(|pos| i32::try_from(pos + 1).ok())
    }

    /// Every quiz of the set has been answered at least once.
    pub fn is_finished(&self) -> bool {
        self.quiz_external_ids
            .iter()
            .all(|id| self.submission_history.contains_key(id))
    }

    pub fn accepted_count(&self) -> u32 {
        self.submission_history
            .values()
            .filter(|r| r.is_accepted)
            .count() as u32
    }

    /// Distinct quiz ids present in the submission history, optionally only
    /// the accepted ones.
    pub fn external_ids_from_history(&self, accepted_only: bool) -> Vec<String> {
        self.submission_history
            .values()
            .filter(|r| !accepted_only || r.is_accepted)
            .map(|r| r.quiz_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Completeness tracking for a student on a learning objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completeness {
    pub lo_id: String,
    pub student_id: String,
    #[serde(default)]
    pub first_quiz_score: Option<f32>,
    #[serde(default)]
    pub highest_quiz_score: Option<f32>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(key: &str, text: &str, correct: bool) -> QuizOption {
        QuizOption {
            key: key.into(),
            content: RichText::plain(text),
            correctness: correct,
            ..Default::default()
        }
    }

    #[test]
    fn quiz_kind_string_forms() {
        assert_eq!(QuizKind::from("multi-select"), QuizKind::MultiSelect);
        assert_eq!(QuizKind::TermAndDefinition.to_string(), "term-and-definition");
        assert_eq!(
            QuizKind::from("essay"),
            QuizKind::Other("essay".to_string())
        );
        assert!(QuizKind::PairOfWords.is_fill_blank());
        assert!(!QuizKind::ManualInput.is_select());

        let json = serde_json::to_string(&QuizKind::FillBlank).unwrap();
        assert_eq!(json, "\"fill-blank\"");
        let kind: QuizKind = serde_json::from_str("\"ordering\"").unwrap();
        assert_eq!(kind, QuizKind::Other("ordering".into()));
    }

    #[test]
    fn rich_text_joins_blocks() {
        let rt = RichText {
            raw: r#"{"blocks":[{"key":"a","text":"Line 1"},{"key":"b","text":"Line 2"}],"entityMap":{}}"#
                .into(),
            rendered_url: String::new(),
        };
        assert_eq!(rt.text(), "Line 1\nLine 2");
    }

    #[test]
    fn rich_text_falls_back_to_entity_data() {
        let rt = RichText {
            raw: r#"{"blocks":[{"key":"e","text":"  "}],"entityMap":{
                "10":{"type":"INLINE_MATHJAX","data":{"data":"c"}},
                "0":{"type":"INLINE_MATHJAX","data":{"data":"a"}},
                "2":{"type":"INLINE_MATHJAX","data":{"data":"b"}}}}"#
                .into(),
            rendered_url: String::new(),
        };
        assert_eq!(rt.text(), "a\nb\nc");
    }

    #[test]
    fn rich_text_plain_string() {
        assert_eq!(RichText::plain("  Hello ").text(), "  Hello ");
    }

    #[test]
    fn blanks_group_by_key_in_first_appearance_order() {
        let quiz = Quiz {
            id: "q".into(),
            external_id: "q".into(),
            kind: QuizKind::FillBlank,
            question: RichText::default(),
            options: vec![
                option("key-1", "qwe", false),
                option("key-1", "hello", true),
                option("key-2", "goodbye", true),
                option("key-3", "bonjour", true),
                option("key-1", "greeting", true),
                option("key-3", "salut", true),
            ],
            difficulty_level: 0,
            tagged_los: vec![],
            point: 1,
        };

        let blanks = quiz.options_with_alternatives();
        assert_eq!(blanks.len(), 3);
        assert_eq!(blanks[0].alternatives.len(), 3);
        assert_eq!(blanks[1].alternatives.len(), 1);
        assert_eq!(blanks[2].alternatives.len(), 2);
        assert_eq!(blanks[0].canonical_text(), "qwe");
        assert!(blanks[0].is_correct(" Greeting "));
        assert!(blanks[2].is_correct("SALUT"));
        assert!(!blanks[1].is_correct("hello"));
    }

    #[test]
    fn unkeyed_options_are_separate_blanks() {
        let quiz = Quiz {
            id: "q".into(),
            external_id: "q".into(),
            kind: QuizKind::FillBlank,
            question: RichText::default(),
            options: vec![option("", "a", true), option("", "b", true)],
            difficulty_level: 0,
            tagged_los: vec![],
            point: 1,
        };
        assert_eq!(quiz.options_with_alternatives().len(), 2);
    }

    #[test]
    fn answer_entry_format() {
        assert_eq!(
            AnswerEntry::selected(2).format(),
            Some(AnswerFormat::SelectedIndex(2))
        );
        assert_eq!(
            AnswerEntry::filled("x").format(),
            Some(AnswerFormat::FilledText("x"))
        );
        assert_eq!(AnswerEntry::default().format(), None);
        let both = AnswerEntry {
            selected_index: Some(1),
            filled_text: Some("x".into()),
        };
        assert_eq!(both.format(), None);
    }

    #[test]
    fn grade_result_json_roundtrip_is_lossless() {
        let result = GradeResult {
            quiz_id: "quiz-a".into(),
            quiz_type: QuizKind::MultiSelect,
            selected_index: vec![1, 3],
            correct_index: vec![1, 3],
            filled_text: vec![],
            correct_text: vec![],
            correctness: vec![true, true],
            is_accepted: true,
            is_all_correct: true,
            is_partial: false,
            submitted_at: Utc::now(),
            point: 2,
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: GradeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn shuffled_quiz_set_helpers() {
        let now = Utc::now();
        let graded = |id: &str, accepted: bool| GradeResult {
            quiz_id: id.into(),
            quiz_type: QuizKind::SingleSelect,
            selected_index: vec![1],
            correct_index: vec![1],
            filled_text: vec![],
            correct_text: vec![],
            correctness: vec![accepted],
            is_accepted: accepted,
            is_all_correct: accepted,
            is_partial: false,
            submitted_at: now,
            point: 0,
        };
        let mut set = ShuffledQuizSet {
            id: "set-1".into(),
            lo_id: "lo-1".into(),
            student_id: "student-1".into(),
            quiz_external_ids: vec!["a".into(), "b".into(), "c".into()],
            random_seed: "42".into(),
            submission_history: BTreeMap::new(),
            total_correctness: 0,
            original_shuffle_quiz_set_id: None,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(set.quiz_index("a"), Some(1));
        assert_eq!(set.quiz_index("c"), Some(3));
        assert_eq!(set.quiz_index("z"), None);
        assert!(!set.is_finished());

        set.submission_history.insert("a".into(), graded("a", true));
        set.submission_history.insert("b".into(), graded("b", false));
        set.submission_history.insert("c".into(), graded("c", true));
        assert!(set.is_finished());
        assert_eq!(set.accepted_count(), 2);
        assert_eq!(set.external_ids_from_history(true), vec!["a", "c"]);
        assert_eq!(set.external_ids_from_history(false), vec!["a", "b", "c"]);
    }
}
