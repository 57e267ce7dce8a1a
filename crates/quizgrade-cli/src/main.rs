//! quizgrade CLI: assign, present and grade quizzes from the command line.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "quizgrade", version, about = "Quiz shuffling and grading engine")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot file (overrides the configured data_file)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and example quiz bank
    Init,

    /// Validate quiz bank TOML files
    Validate {
        /// Path to a bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Load a quiz bank into the snapshot
    Import {
        /// Path to a bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Assign a learning objective's quiz set to a student
    Assign {
        /// Learning objective id
        #[arg(long)]
        lo: String,

        /// Student id
        #[arg(long)]
        student: String,
    },

    /// Create a retry set holding the quizzes a set got wrong
    Retry {
        /// Original shuffled quiz set id
        #[arg(long)]
        set: String,
    },

    /// Show a set as the student sees it
    Show {
        /// Shuffled quiz set id
        #[arg(long)]
        set: String,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Submit answers for a set
    Submit {
        /// Shuffled quiz set id
        #[arg(long)]
        set: String,

        /// Answers as JSON, e.g. '[{"quiz_id":"q1","answers":[{"selected_index":2}]}]'
        #[arg(long)]
        answers: String,

        /// Write a JSON submission report here
        #[arg(long)]
        out: Option<PathBuf>,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show the score and completeness of a set
    Score {
        /// Shuffled quiz set id
        #[arg(long)]
        set: String,
    },
}

fn init_tracing() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "quizgrade=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let paths = commands::Paths {
        config: cli.config,
        data: cli.data,
    };

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Import { bank } => commands::import::execute(&paths, bank).await,
        Commands::Assign { lo, student } => commands::assign::execute(&paths, lo, student).await,
        Commands::Retry { set } => commands::assign::retry(&paths, set).await,
        Commands::Show { set, format } => commands::show::execute(&paths, set, format).await,
        Commands::Submit {
            set,
            answers,
            out,
            format,
        } => commands::submit::execute(&paths, set, answers, out, format).await,
        Commands::Score { set } => commands::score::execute(&paths, set).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
