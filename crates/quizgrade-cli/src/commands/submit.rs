//! The `quizgrade submit` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use quizgrade_core::engine::SubmissionEngine;
use quizgrade_core::model::{GradeResult, QuizAnswer, SubmitQuizAnswersRequest};
use quizgrade_core::report::SubmissionReport;

use super::{Paths, Workspace};

pub async fn execute(
    paths: &Paths,
    set_id: String,
    answers: String,
    out: Option<PathBuf>,
    format: String,
) -> Result<()> {
    let quiz_answers: Vec<QuizAnswer> =
        serde_json::from_str(&answers).context("failed to parse --answers JSON")?;

    let workspace = Workspace::open(paths)?;
    let engine = SubmissionEngine::new(workspace.store.clone());
    let request = SubmitQuizAnswersRequest {
        set_id: set_id.clone(),
        quiz_answers,
    };

    let outcome = engine.submit(&request).await;
    // Phase 1 may have committed even when finalization failed.
    workspace.save().await?;
    let response = outcome.with_context(|| format!("submission to {set_id} failed"))?;

    let report = SubmissionReport::new(&set_id, response);
    if let Some(path) = &out {
        report.save_json(path)?;
        eprintln!("Report written to {}", path.display());
    }

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "markdown" | "md" => println!("{}", report.to_markdown()),
        _ => print_results(&report),
    }
    Ok(())
}

fn print_results(report: &SubmissionReport) {
    let mut table = Table::new();
    table.set_header(vec![
        "Quiz", "Kind", "Submitted", "Expected", "Accepted", "Partial", "Points",
    ]);
    for r in &report.results {
        let (submitted, expected) = answer_columns(r);
        table.add_row(vec![
            Cell::new(&r.quiz_id),
            Cell::new(&r.quiz_type),
            Cell::new(submitted),
            Cell::new(expected),
            Cell::new(if r.is_accepted { "yes" } else { "no" }),
            Cell::new(if r.is_partial { "yes" } else { "no" }),
            Cell::new(r.point),
        ]);
    }
    println!("{table}");
    println!("{} of {} accepted", report.accepted, report.total);
    if let Some(score) = report.finalized_score {
        println!("Final score: {score}");
    }
}

fn answer_columns(r: &GradeResult) -> (String, String) {
    let join = |v: &[u32]| {
        v.iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    if r.quiz_type.is_fill_blank() {
        (r.filled_text.join(", "), r.correct_text.join(", "))
    } else {
        (join(&r.selected_index), join(&r.correct_index))
    }
}
