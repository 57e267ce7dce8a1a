//! Submission reports with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{GradeResult, SubmitQuizAnswersResponse};

/// The outcome of one submission, as handed back to a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// The shuffled quiz set that was submitted against.
    pub set_id: String,
    /// Grade results in request order.
    pub results: Vec<GradeResult>,
    /// Number of accepted results in this submission.
    pub accepted: usize,
    /// Number of graded quizzes in this submission.
    pub total: usize,
    /// Score written to completeness tracking, if the set was finalized.
    #[serde(default)]
    pub finalized_score: Option<f32>,
}

impl SubmissionReport {
    pub fn new(set_id: &str, response: SubmitQuizAnswersResponse) -> Self {
        let accepted = response.results.iter().filter(|r| r.is_accepted).count();
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            set_id: set_id.to_string(),
            total: response.results.len(),
            accepted,
            results: response.results,
            finalized_score: response.score,
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SubmissionReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Render a short markdown summary.
    pub fn to_markdown(&self) -> String {
        let mut md = format!(
            "## Submission `{}`\n\n{} of {} accepted",
            self.set_id, self.accepted, self.total
        );
        if let Some(score) = self.finalized_score {
            md.push_str(&format!(", final score {score}"));
        }
        md.push_str("\n\n| Quiz | Kind | Accepted | Partial |\n|------|------|----------|---------|\n");
        for r in &self.results {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                r.quiz_id,
                r.quiz_type,
                if r.is_accepted { "yes" } else { "no" },
                if r.is_partial { "yes" } else { "no" },
            ));
        }
        md
    }
}
