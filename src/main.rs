mod app;
mod cli;
mod ingest;

use agent_learning::AppConfig;
use anyhow::Result;
use clap::Parser;
use std::fs::OpenOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = cli::Cli::parse();
    let config = AppConfig::load(cli.config_path.as_deref())?;
    let app = app::App::new(config, cli.project_dir, cli.database);
    app.run(cli.command).await
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout carries command output; tracing goes to a file.
    let writer = || {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open("agent-learning.log")
            .expect("failed to open agent-learning.log for tracing output")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
}
