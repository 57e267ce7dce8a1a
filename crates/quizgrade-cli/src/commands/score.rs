//! The `quizgrade score` command.

use anyhow::Result;

use quizgrade_core::scoring::{compute_score, retry_denominator};
use quizgrade_core::traits::{CompletenessRepo, ShuffledQuizSetRepo};

use super::{Paths, Workspace};

pub async fn execute(paths: &Paths, set_id: String) -> Result<()> {
    let workspace = Workspace::open(paths)?;
    let store = &workspace.store;

    let set = store.get_shuffled_quiz_set(&set_id).await?;
    let (correct, mut total) = store.get_score(&set_id).await?;
    if let Some(original_id) = &set.original_shuffle_quiz_set_id {
        let history = store
            .get_external_ids_from_submission_history(original_id, false)
            .await?;
        total = retry_denominator(&history, &set.quiz_external_ids);
    }
    let finished = store.is_finished(&set_id).await?;

    println!("Set:       {}", set.id);
    println!("Student:   {}", set.student_id);
    println!("Objective: {}", set.lo_id);
    println!("Correct:   {correct}/{total}");
    println!("Finished:  {}", if finished { "yes" } else { "no" });
    if finished || set.original_shuffle_quiz_set_id.is_some() {
        println!("Score:     {}", compute_score(correct, total));
    }

    if let Some(c) = store.get_completeness(&set.lo_id, &set.student_id).await? {
        let fmt = |s: Option<f32>| s.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
        println!("First:     {}", fmt(c.first_quiz_score));
        println!("Highest:   {}", fmt(c.highest_quiz_score));
    }
    Ok(())
}
