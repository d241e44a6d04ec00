use crate::{cli::Command, ingest};
use agent_learning::{AppConfig, AttemptRecord, EngineRegistry, LearningEngine, attempts};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Runs one command against the selected project's learning store.
pub struct App {
    config: AppConfig,
    project_dir: PathBuf,
    database: Option<PathBuf>,
}

impl App {
    pub fn new(config: AppConfig, project_dir: PathBuf, database: Option<PathBuf>) -> Self {
        Self {
            config,
            project_dir,
            database,
        }
    }

    pub async fn run(self, command: Command) -> Result<()> {
        let registry =
            EngineRegistry::new(self.config.storage.clone(), self.config.learning.clone());
        let engine = match &self.database {
            Some(path) => registry.for_database(path).await,
            None => registry.for_project(&self.project_dir).await,
        }
        .with_context(|| "failed to open learning database")?;
        tracing::debug!(path = %engine.database_path().display(), ?command, "running command");

        match command {
            Command::Record(args) => {
                engine
                    .record_attempt(&AttemptRecord::from(args))
                    .await
                    .with_context(|| "attempt was not recorded")?;
                print_json(&serde_json::json!({ "recorded": true }))
            }
            Command::Ingest { file } => self.ingest(engine, &file).await,
            Command::Recommend { category, steps } => {
                let recommendation = engine.get_recommendation(&category, steps).await?;
                print_json(&recommendation)
            }
            Command::Insights { limit } => {
                let insights = engine.get_insights(limit).await?;
                print_json(&insights.iter().map(|i| i.view()).collect::<Vec<_>>())
            }
            Command::Generate => {
                let created = engine.generate_insights().await?;
                print_json(&created.iter().map(|i| i.view()).collect::<Vec<_>>())
            }
            Command::Categories => {
                let patterns = engine.get_category_stats().await?;
                print_json(&patterns.iter().map(|p| p.view()).collect::<Vec<_>>())
            }
            Command::Models { category } => {
                let models = engine.get_model_stats(category.as_deref()).await?;
                print_json(&models.iter().map(|m| m.view()).collect::<Vec<_>>())
            }
            Command::Apply { id } => {
                if !engine.mark_insight_applied(id).await? {
                    bail!("no insight with id {id}");
                }
                print_json(&serde_json::json!({ "id": id, "applied": true }))
            }
        }
    }

    async fn ingest(&self, engine: Arc<LearningEngine>, file: &Path) -> Result<()> {
        let (handle, tx) = attempts::spawn_recorder(engine, 256);
        let stats = ingest::ingest_file(file, &tx).await;
        drop(tx);
        let summary = handle.shutdown().await?;
        let stats = stats?;

        tracing::info!(
            queued = stats.queued,
            skipped = stats.skipped,
            recorded = summary.recorded,
            failed = summary.failed,
            "ingested attempts file"
        );
        print_json(&serde_json::json!({
            "queued": stats.queued,
            "skipped": stats.skipped,
            "recorded": summary.recorded,
            "failed": summary.failed,
        }))
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).with_context(|| "failed to render output")?;
    println!("{rendered}");
    Ok(())
}
