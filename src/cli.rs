use agent_learning::AttemptRecord;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line access to a project's learning store.
#[derive(Debug, Parser)]
#[command(author, version, about = "Feature-attempt learning engine for coding agents", long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file (defaults to ./agent-learning.toml if present).
    #[arg(long, value_name = "FILE")]
    pub config_path: Option<PathBuf>,
    /// Project whose learning database is used.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_dir: PathBuf,
    /// Use this database file instead of the project's.
    #[arg(long, value_name = "FILE")]
    pub database: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record a single feature attempt.
    Record(RecordArgs),
    /// Record attempts from a JSON-lines file, one attempt object per line.
    Ingest {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Recommend a model and strategy for a feature in CATEGORY.
    Recommend {
        category: String,
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// List recent insights, newest first.
    Insights {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Analyse the statistics and store new insights.
    Generate,
    /// Show statistics for every category.
    Categories,
    /// Show model performance for a category, or overall.
    Models {
        #[arg(long)]
        category: Option<String>,
    },
    /// Mark an insight as applied.
    Apply { id: i64 },
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    #[arg(long)]
    pub category: String,
    #[arg(long)]
    pub model: String,
    /// The attempt succeeded.
    #[arg(long)]
    pub success: bool,
    #[arg(long, default_value_t = 0)]
    pub input_tokens: u64,
    #[arg(long, default_value_t = 0)]
    pub output_tokens: u64,
    #[arg(long, default_value_t = 0.0)]
    pub cost: f64,
    #[arg(long, default_value_t = 0)]
    pub duration_ms: u64,
    #[arg(long, default_value_t = 1)]
    pub attempt_number: u32,
    #[arg(long, default_value_t = 1)]
    pub steps: u32,
}

impl From<RecordArgs> for AttemptRecord {
    fn from(args: RecordArgs) -> Self {
        Self {
            category: args.category,
            model_id: args.model,
            success: args.success,
            input_tokens: args.input_tokens,
            output_tokens: args.output_tokens,
            cost: args.cost,
            duration_ms: args.duration_ms,
            attempt_number: args.attempt_number,
            num_steps: args.steps,
        }
    }
}
