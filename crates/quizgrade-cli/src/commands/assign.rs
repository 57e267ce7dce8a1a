//! The `quizgrade assign` and `quizgrade retry` commands.

use anyhow::Result;

use quizgrade_core::assignment::AssignmentService;
use quizgrade_core::model::ShuffledQuizSet;

use super::{Paths, Workspace};

pub async fn execute(paths: &Paths, lo_id: String, student_id: String) -> Result<()> {
    let workspace = Workspace::open(paths)?;
    let service = AssignmentService::new(
        workspace.store.clone(),
        workspace.config.engine_config(),
    );

    let set = service.create_quiz_test(&lo_id, &student_id).await?;
    workspace.save().await?;

    print_set(&set);
    Ok(())
}

pub async fn retry(paths: &Paths, original_set_id: String) -> Result<()> {
    let workspace = Workspace::open(paths)?;
    let service = AssignmentService::new(
        workspace.store.clone(),
        workspace.config.engine_config(),
    );

    let set = service.create_retry_quiz_test(&original_set_id).await?;
    workspace.save().await?;

    print_set(&set);
    Ok(())
}

fn print_set(set: &ShuffledQuizSet) {
    println!("{}", set.id);
    eprintln!(
        "Assigned {} quiz(zes) of {} to {}{}",
        set.quiz_external_ids.len(),
        set.lo_id,
        set.student_id,
        set.original_shuffle_quiz_set_id
            .as_deref()
            .map(|id| format!(" (retry of {id})"))
            .unwrap_or_default()
    );
}
