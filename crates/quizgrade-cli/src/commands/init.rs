//! The `quizgrade init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("quizgrade.toml").exists() {
        println!("quizgrade.toml already exists, skipping.");
    } else {
        std::fs::write("quizgrade.toml", SAMPLE_CONFIG)?;
        println!("Created quizgrade.toml");
    }

    std::fs::create_dir_all("banks")?;
    let example_path = Path::new("banks/example.toml");
    if example_path.exists() {
        println!("banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BANK)?;
        println!("Created banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: quizgrade validate --bank banks/example.toml");
    println!("  2. Run: quizgrade import --bank banks/example.toml");
    println!("  3. Run: quizgrade assign --lo lo-geography --student student-1");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quizgrade configuration

# Snapshot holding quizzes, assigned sets and completeness.
data_file = "./quizgrade-data.json"

# Random seeds tried per new set so every choice quiz is visibly reordered.
seed_attempts = 20

# Also shuffle the order of quizzes in new sets.
shuffle_quiz_order = false
"#;

const EXAMPLE_BANK: &str = r#"[[quizzes]]
external_id = "capital-of-france"
kind = "single-select"
question = "What is the capital of France?"
lo_ids = ["lo-geography"]

[[quizzes.options]]
text = "Paris"
correct = true

[[quizzes.options]]
text = "Lyon"

[[quizzes.options]]
text = "Marseille"

[[quizzes]]
external_id = "rivers"
kind = "multi-select"
question = "Which of these rivers flow through France?"
lo_ids = ["lo-geography"]
point = 2

[[quizzes.options]]
text = "Loire"
correct = true

[[quizzes.options]]
text = "Seine"
correct = true
partial_credit = true

[[quizzes.options]]
text = "Danube"

[[quizzes]]
external_id = "greetings"
kind = "fill-blank"
question = "Hello in French is ___, goodbye is ___"
lo_ids = ["lo-geography"]

[[quizzes.options]]
key = "hello"
text = "bonjour"

[[quizzes.options]]
key = "hello"
text = "salut"

[[quizzes.options]]
key = "goodbye"
text = "au revoir"

[[quizzes]]
external_id = "map-drawing"
kind = "manual-input"
question = "Draw the map of France from memory. Did you get it right?"
lo_ids = ["lo-geography"]

[[quizzes.options]]
text = "Yes"
correct = true

[[quizzes.options]]
text = "No"

[[quiz_sets]]
lo_id = "lo-geography"
quizzes = ["capital-of-france", "rivers", "greetings", "map-drawing"]
"#;
