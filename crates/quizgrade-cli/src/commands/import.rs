//! The `quizgrade import` command.

use std::path::PathBuf;

use anyhow::Result;

use quizgrade_core::parser::{load_bank, validate_bank};

use super::{Paths, Workspace};

pub async fn execute(paths: &Paths, bank_path: PathBuf) -> Result<()> {
    let bank = load_bank(&bank_path)?;
    let warnings = validate_bank(&bank);
    for w in &warnings {
        tracing::warn!(subject = w.subject.as_deref().unwrap_or("-"), "{}", w.message);
    }

    let workspace = Workspace::open(paths)?;
    workspace.store.import_bank(&bank).await;
    workspace.save().await?;

    println!(
        "Imported {} quizzes and {} quiz sets ({} warning(s)).",
        bank.quizzes.len(),
        bank.quiz_sets.len(),
        warnings.len()
    );
    Ok(())
}
