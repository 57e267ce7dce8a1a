//! The `quizgrade show` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use quizgrade_core::assignment::{AssignmentService, PresentedQuiz};

use super::{Paths, Workspace};

pub async fn execute(paths: &Paths, set_id: String, format: String) -> Result<()> {
    let workspace = Workspace::open(paths)?;
    let service = AssignmentService::new(
        workspace.store.clone(),
        workspace.config.engine_config(),
    );

    let quizzes = service.present(&set_id).await?;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&quizzes)?),
        _ => print_quizzes(&quizzes),
    }
    Ok(())
}

fn print_quizzes(quizzes: &[PresentedQuiz]) {
    for quiz in quizzes {
        println!(
            "{}. {} [{}, {} pt{}]{}",
            quiz.position,
            quiz.question,
            quiz.kind,
            quiz.point,
            if quiz.point == 1 { "" } else { "s" },
            if quiz.answered { " (answered)" } else { "" }
        );
        println!("   quiz id: {}", quiz.external_id);

        if quiz.kind.is_fill_blank() {
            continue;
        }
        let mut table = Table::new();
        table.set_header(vec!["#", "Option"]);
        for option in &quiz.options {
            table.add_row(vec![Cell::new(option.index), Cell::new(&option.text)]);
        }
        println!("{table}\n");
    }
}
